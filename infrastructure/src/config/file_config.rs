//! Raw TOML configuration data types
//!
//! These structs represent the exact structure of the TOML config file.
//! They are deserialized directly and merged by [`super::ConfigLoader`].

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

/// Configuration validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigValidationError {
    #[error("server.port cannot be 0")]
    InvalidPort,

    #[error("server.host cannot be empty")]
    EmptyHost,

    #[error("storage.root must be an absolute path, got '{0}'")]
    RelativeStorageRoot(String),

    #[error("datasets.timeout_secs cannot be 0")]
    InvalidTimeout,

    #[error("datasets.max_download_bytes cannot be 0")]
    InvalidDownloadLimit,
}

/// Which transport adapter the process runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Single client over stdin/stdout
    #[default]
    Stdio,
    /// Multi-client network listener
    #[serde(alias = "sse", alias = "streamable-http", alias = "streamable_http")]
    Http,
}

impl TransportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMode::Stdio => "stdio",
            TransportMode::Http => "http",
        }
    }
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stdio" => Ok(TransportMode::Stdio),
            "http" | "sse" | "streamable-http" | "streamable_http" => Ok(TransportMode::Http),
            other => Err(format!("unknown transport '{}'", other)),
        }
    }
}

/// Raw server configuration from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileServerConfig {
    pub transport: TransportMode,
    /// Bind address for the network listener
    pub host: String,
    /// Bind port for the network listener
    pub port: u16,
}

impl Default for FileServerConfig {
    fn default() -> Self {
        Self {
            transport: TransportMode::Stdio,
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Raw storage configuration from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileStorageConfig {
    /// Storage root; `~/.gis_mcp/data` when unset
    pub root: Option<PathBuf>,
    /// Accept absolute path arguments outside the root
    pub allow_absolute_paths: bool,
}

impl Default for FileStorageConfig {
    fn default() -> Self {
        Self {
            root: None,
            allow_absolute_paths: true,
        }
    }
}

impl FileStorageConfig {
    /// Configured root, or the default under the home directory
    pub fn effective_root(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(default_storage_root)
    }
}

/// `~/.gis_mcp/data`, falling back to the working directory without a home
pub fn default_storage_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".gis_mcp")
        .join("data")
}

/// Raw dataset download configuration from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileDatasetsConfig {
    /// HTTP timeout for dataset downloads
    pub timeout_secs: u64,
    /// User-Agent header sent with downloads
    pub user_agent: String,
    /// Downloads larger than this are aborted and their partial file removed
    pub max_download_bytes: u64,
}

impl Default for FileDatasetsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            user_agent: format!("gis-mcp/{}", env!("CARGO_PKG_VERSION")),
            max_download_bytes: 512 * 1024 * 1024,
        }
    }
}

/// Raw logging configuration from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLoggingConfig {
    /// JSONL invocation journal; disabled when unset
    pub invocation_log: Option<PathBuf>,
}

/// Complete configuration file structure
///
/// Example:
///
/// ```toml
/// [server]
/// transport = "http"
/// host = "127.0.0.1"
/// port = 9010
///
/// [storage]
/// root = "/srv/gis"
/// allow_absolute_paths = false
///
/// [datasets]
/// timeout_secs = 120
/// max_download_bytes = 1073741824
///
/// [logging]
/// invocation_log = "/var/log/gis-mcp/invocations.jsonl"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub server: FileServerConfig,
    pub storage: FileStorageConfig,
    pub datasets: FileDatasetsConfig,
    pub logging: FileLoggingConfig,
}

impl FileConfig {
    /// Validate the configuration and return an error if invalid
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidPort);
        }

        if self.server.host.trim().is_empty() {
            return Err(ConfigValidationError::EmptyHost);
        }

        if let Some(root) = &self.storage.root
            && !root.is_absolute()
        {
            return Err(ConfigValidationError::RelativeStorageRoot(
                root.display().to_string(),
            ));
        }

        if self.datasets.timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidTimeout);
        }

        if self.datasets.max_download_bytes == 0 {
            return Err(ConfigValidationError::InvalidDownloadLimit);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_full_config() {
        let toml_str = r#"
[server]
transport = "http"
host = "127.0.0.1"
port = 9010

[storage]
root = "/srv/gis"
allow_absolute_paths = false

[datasets]
timeout_secs = 5
user_agent = "test-agent"

[logging]
invocation_log = "/tmp/invocations.jsonl"
"#;

        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.transport, TransportMode::Http);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9010);
        assert_eq!(config.storage.effective_root(), PathBuf::from("/srv/gis"));
        assert!(!config.storage.allow_absolute_paths);
        assert_eq!(config.datasets.timeout_secs, 5);
        assert_eq!(
            config.logging.invocation_log,
            Some(PathBuf::from("/tmp/invocations.jsonl"))
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_partial_config() {
        let toml_str = r#"
[server]
port = 3000
"#;

        let config: FileConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.transport, TransportMode::Stdio);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(config.storage.allow_absolute_paths);
        assert!(config.logging.invocation_log.is_none());
    }

    #[test]
    fn test_default_storage_root() {
        let config = FileConfig::default();
        let root = config.storage.effective_root();
        assert!(root.ends_with(".gis_mcp/data"));
    }

    #[test]
    fn test_transport_aliases() {
        let config: FileConfig = toml::from_str("[server]\ntransport = \"sse\"").unwrap();
        assert_eq!(config.server.transport, TransportMode::Http);
        assert_eq!("STDIO".parse::<TransportMode>().unwrap(), TransportMode::Stdio);
        assert!("pigeon".parse::<TransportMode>().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = FileConfig::default();
        config.server.port = 0;
        assert_eq!(config.validate(), Err(ConfigValidationError::InvalidPort));

        let mut config = FileConfig::default();
        config.storage.root = Some(PathBuf::from("relative/data"));
        assert!(matches!(
            config.validate(),
            Err(ConfigValidationError::RelativeStorageRoot(_))
        ));

        let mut config = FileConfig::default();
        config.datasets.timeout_secs = 0;
        assert_eq!(config.validate(), Err(ConfigValidationError::InvalidTimeout));

        let mut config = FileConfig::default();
        config.datasets.max_download_bytes = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigValidationError::InvalidDownloadLimit)
        );
    }
}
