//! Storage resolver port
//!
//! Maps user-supplied paths onto the configured storage root. The filesystem
//! adapter lives in the infrastructure layer.

use gis_mcp_domain::StorageCategory;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while resolving a storage path
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Path is empty")]
    EmptyPath,

    #[error("Path '{0}' contains parent-directory segments and would escape the storage root")]
    Traversal(String),

    #[error("Absolute path '{0}' is outside the storage root")]
    OutsideRoot(String),

    #[error("Failed to create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Port for resolving storage-relative paths.
///
/// Implementations must be safe to call concurrently; creating a directory
/// that already exists is not an error.
pub trait StorageResolverPort: Send + Sync {
    /// The absolute storage root
    fn root(&self) -> &Path;

    /// Resolve a path that will be written. Every missing directory on the
    /// resolved path's ancestry is created.
    fn resolve(&self, raw: &str, category: Option<StorageCategory>)
    -> Result<PathBuf, StorageError>;

    /// Resolve a path that will be read. Nothing is created.
    fn locate(&self, raw: &str, category: Option<StorageCategory>)
    -> Result<PathBuf, StorageError>;

    /// Absolute directory of a category, created if missing
    fn category_dir(&self, category: StorageCategory) -> Result<PathBuf, StorageError>;
}
