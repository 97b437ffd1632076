//! Filesystem storage resolver
//!
//! Implements [`StorageResolverPort`] against a real directory tree:
//!
//! ```text
//! <root>/
//! ├── movement_data/
//! ├── land_products/
//! ├── satellite_imagery/
//! ├── ecology_data/
//! ├── climate_data/
//! ├── administrative_boundaries/
//! └── outputs/
//! ```
//!
//! Relative paths are joined under the root (optionally under a category
//! directory) and may not contain `..`. Absolute paths are returned
//! unchanged unless `allow_absolute_paths` is off, in which case they must
//! already lie under the root.

use gis_mcp_application::ports::storage_resolver::{StorageError, StorageResolverPort};
use gis_mcp_domain::StorageCategory;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

pub struct FsStorageResolver {
    root: PathBuf,
    allow_absolute_paths: bool,
}

impl FsStorageResolver {
    /// Create a resolver. A relative root is made absolute against the
    /// working directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        Self {
            root,
            allow_absolute_paths: true,
        }
    }

    pub fn with_allow_absolute_paths(mut self, allow: bool) -> Self {
        self.allow_absolute_paths = allow;
        self
    }

    /// Create the root and every category directory.
    pub fn ensure_layout(&self) -> Result<(), StorageError> {
        create_dir_all(&self.root)?;
        for category in StorageCategory::ALL {
            create_dir_all(&self.root.join(category.dir_name()))?;
        }
        debug!(root = %self.root.display(), "Storage layout ready");
        Ok(())
    }

    fn join(&self, raw: &str, category: Option<StorageCategory>) -> Result<PathBuf, StorageError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(StorageError::EmptyPath);
        }

        let path = Path::new(trimmed);
        if path.is_absolute() {
            return self.check_absolute(trimmed, path);
        }

        let mut parts = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => parts.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(StorageError::Traversal(trimmed.to_string()));
                }
            }
        }
        if parts.is_empty() {
            return Err(StorageError::EmptyPath);
        }

        let mut resolved = self.root.clone();
        if let Some(category) = category {
            // "climate_data/x.nc" under the climate_data category is not doubled
            if parts.first().map(|p| *p != category.dir_name()).unwrap_or(true) {
                resolved.push(category.dir_name());
            }
        }
        resolved.extend(parts);
        Ok(resolved)
    }

    fn check_absolute(&self, raw: &str, path: &Path) -> Result<PathBuf, StorageError> {
        if self.allow_absolute_paths {
            return Ok(path.to_path_buf());
        }
        let escapes = path
            .components()
            .any(|c| matches!(c, Component::ParentDir));
        if escapes || !path.starts_with(&self.root) {
            return Err(StorageError::OutsideRoot(raw.to_string()));
        }
        Ok(path.to_path_buf())
    }
}

fn create_dir_all(path: &Path) -> Result<(), StorageError> {
    // create_dir_all treats a directory that appears concurrently as success
    std::fs::create_dir_all(path).map_err(|source| StorageError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}

impl StorageResolverPort for FsStorageResolver {
    fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(
        &self,
        raw: &str,
        category: Option<StorageCategory>,
    ) -> Result<PathBuf, StorageError> {
        let resolved = self.join(raw, category)?;
        if resolved.starts_with(&self.root)
            && let Some(parent) = resolved.parent()
        {
            create_dir_all(parent)?;
        }
        Ok(resolved)
    }

    fn locate(
        &self,
        raw: &str,
        category: Option<StorageCategory>,
    ) -> Result<PathBuf, StorageError> {
        self.join(raw, category)
    }

    fn category_dir(&self, category: StorageCategory) -> Result<PathBuf, StorageError> {
        let dir = self.root.join(category.dir_name());
        create_dir_all(&dir)?;
        Ok(dir)
    }
}
