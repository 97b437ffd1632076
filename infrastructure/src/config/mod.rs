//! Configuration file loading for gis-mcp
//!
//! This module handles file I/O and merging of configuration from multiple sources.
//! The priority order (highest to lowest):
//!
//! 1. Command-line flags (`ConfigOverrides`)
//! 2. `GIS_MCP_*` environment variables
//! 3. `--config <path>` specified file
//! 4. Project root: `./gis-mcp.toml` or `./.gis-mcp.toml`
//! 5. XDG config: `$XDG_CONFIG_HOME/gis-mcp/config.toml`
//! 6. Default values

mod file_config;
mod loader;

pub use file_config::{
    ConfigValidationError, FileConfig, FileDatasetsConfig, FileLoggingConfig, FileServerConfig,
    FileStorageConfig, TransportMode, default_storage_root,
};
pub use loader::{ConfigLoader, ConfigOverrides, ENV_VARS};
