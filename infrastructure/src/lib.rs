//! Infrastructure layer for gis-mcp
//!
//! This crate contains adapters that implement the ports defined
//! in the application layer: the filesystem storage resolver,
//! configuration file loading, the invocation journal, and the
//! operation providers for every capability group.

pub mod config;
pub mod logging;
pub mod storage;
pub mod tools;

// Re-export commonly used types
pub use config::{
    ConfigLoader, ConfigOverrides, ConfigValidationError, FileConfig, FileDatasetsConfig,
    FileLoggingConfig, FileServerConfig, FileStorageConfig, TransportMode,
};
pub use logging::JsonlInvocationLogger;
pub use storage::FsStorageResolver;
pub use tools::{JsonSchemaToolConverter, all_providers, build_registry};
