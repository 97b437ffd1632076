//! Configuration file loader with multi-source merging

use super::file_config::{FileConfig, TransportMode};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::path::{Path, PathBuf};

const PROJECT_CONFIG_FILES: [&str; 2] = ["gis-mcp.toml", ".gis-mcp.toml"];

/// Environment variables understood by the loader, and the key each one sets
pub const ENV_VARS: [(&str, &str); 4] = [
    ("GIS_MCP_TRANSPORT", "server.transport"),
    ("GIS_MCP_HOST", "server.host"),
    ("GIS_MCP_PORT", "server.port"),
    ("GIS_MCP_STORAGE_PATH", "storage.root"),
];

/// Values given explicitly on the command line; they win over every source
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub transport: Option<TransportMode>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub storage_root: Option<PathBuf>,
    pub invocation_log: Option<PathBuf>,
}

impl ConfigOverrides {
    pub fn apply(self, config: &mut FileConfig) {
        if let Some(transport) = self.transport {
            config.server.transport = transport;
        }
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(root) = self.storage_root {
            config.storage.root = Some(root);
        }
        if let Some(path) = self.invocation_log {
            config.logging.invocation_log = Some(path);
        }
    }
}

/// Configuration loader that handles file discovery and merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from all sources with proper priority
    ///
    /// Priority (highest to lowest):
    /// 1. Environment: `GIS_MCP_TRANSPORT`, `GIS_MCP_HOST`, `GIS_MCP_PORT`, `GIS_MCP_STORAGE_PATH`
    /// 2. Explicit config path (if provided)
    /// 3. Project root: `./gis-mcp.toml` or `./.gis-mcp.toml`
    /// 4. Global: `$XDG_CONFIG_HOME/gis-mcp/config.toml`
    /// 5. Default values
    ///
    /// CLI flags are applied on top by the caller through [`ConfigOverrides`].
    pub fn load(config_path: Option<&PathBuf>) -> Result<FileConfig, Box<figment::Error>> {
        Self::figment(config_path)
            .merge(Self::env_provider())
            .extract()
            .map_err(Box::new)
    }

    /// File-based layers only (no environment)
    fn figment(config_path: Option<&PathBuf>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(FileConfig::default()));

        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            figment = figment.merge(Toml::file(&global_path));
        }

        if let Some(path) = Self::project_config_path() {
            figment = figment.merge(Toml::file(&path));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment
    }

    fn env_provider() -> Env {
        Env::raw().filter_map(|key| {
            let upper = key.as_str().to_ascii_uppercase();
            ENV_VARS
                .iter()
                .find(|(var, _)| *var == upper)
                .map(|(_, target)| (*target).into())
        })
    }

    /// Defaults plus the environment layer; no configuration files are read
    pub fn load_env_only() -> Result<FileConfig, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(FileConfig::default()))
            .merge(Self::env_provider())
            .extract()
            .map_err(Box::new)
    }

    /// Get the global config file path
    ///
    /// Returns XDG_CONFIG_HOME/gis-mcp/config.toml if set,
    /// otherwise falls back to ~/.config/gis-mcp/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("gis-mcp").join("config.toml"))
    }

    /// Get the project-level config file path (if it exists)
    pub fn project_config_path() -> Option<PathBuf> {
        PROJECT_CONFIG_FILES
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
    }

    /// Print the config file locations being used (for debugging)
    pub fn print_config_sources(explicit: Option<&Path>) {
        println!("Configuration sources (in priority order):");

        for (var, key) in ENV_VARS {
            let state = if std::env::var_os(var).is_some() {
                "SET  "
            } else {
                "     "
            };
            println!("  [{}] Env:     {} -> {}", state, var, key);
        }

        if let Some(path) = explicit {
            let state = if path.exists() { "FOUND" } else { "MISSING" };
            println!("  [{}] Explicit: {}", state, path.display());
        }

        if let Some(path) = Self::project_config_path() {
            println!("  [FOUND] Project: {}", path.display());
        } else {
            println!("  [     ] Project: ./gis-mcp.toml or ./.gis-mcp.toml");
        }

        if let Some(path) = Self::global_config_path() {
            if path.exists() {
                println!("  [FOUND] Global:  {}", path.display());
            } else {
                println!("  [     ] Global:  {}", path.display());
            }
        }

        println!("  [     ] Default: built-in defaults");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use std::io::Write;

    /// Point the global config lookup inside the jail
    fn isolate_global_config(jail: &mut Jail) {
        let xdg = jail.directory().join("xdg");
        jail.set_env("XDG_CONFIG_HOME", xdg.display());
    }

    #[test]
    fn test_env_overrides_defaults() {
        Jail::expect_with(|jail| {
            isolate_global_config(jail);
            jail.set_env("GIS_MCP_TRANSPORT", "http");
            jail.set_env("GIS_MCP_PORT", "9100");
            jail.set_env("GIS_MCP_HOST", "127.0.0.1");
            jail.set_env("GIS_MCP_STORAGE_PATH", "/srv/from-env");

            let config = ConfigLoader::load(None).map_err(|e| *e)?;
            assert_eq!(config.server.transport, TransportMode::Http);
            assert_eq!(config.server.port, 9100);
            assert_eq!(config.server.host, "127.0.0.1");
            assert_eq!(config.storage.effective_root(), PathBuf::from("/srv/from-env"));
            Ok(())
        });
    }

    #[test]
    fn test_env_beats_project_file() {
        Jail::expect_with(|jail| {
            isolate_global_config(jail);
            jail.create_file(
                "gis-mcp.toml",
                "[server]\nport = 7001\nhost = \"10.0.0.1\"\n\n[storage]\nroot = \"/srv/from-file\"",
            )?;

            let config = ConfigLoader::load(None).map_err(|e| *e)?;
            assert_eq!(config.server.port, 7001);
            assert_eq!(config.storage.effective_root(), PathBuf::from("/srv/from-file"));

            jail.set_env("GIS_MCP_STORAGE_PATH", "/srv/from-env");
            jail.set_env("GIS_MCP_PORT", "7002");
            let config = ConfigLoader::load(None).map_err(|e| *e)?;
            assert_eq!(config.server.port, 7002);
            assert_eq!(config.server.host, "10.0.0.1");
            assert_eq!(config.storage.effective_root(), PathBuf::from("/srv/from-env"));
            Ok(())
        });
    }

    #[test]
    fn test_env_beats_explicit_file_and_overrides_beat_env() {
        Jail::expect_with(|jail| {
            isolate_global_config(jail);
            jail.create_file("explicit.toml", "[storage]\nroot = \"/srv/explicit\"")?;
            jail.set_env("GIS_MCP_STORAGE_PATH", "/srv/from-env");

            let explicit = jail.directory().join("explicit.toml");
            let mut config = ConfigLoader::load(Some(&explicit)).map_err(|e| *e)?;
            assert_eq!(config.storage.effective_root(), PathBuf::from("/srv/from-env"));

            ConfigOverrides {
                storage_root: Some(PathBuf::from("/srv/from-flag")),
                ..Default::default()
            }
            .apply(&mut config);
            assert_eq!(config.storage.effective_root(), PathBuf::from("/srv/from-flag"));
            Ok(())
        });
    }

    #[test]
    fn test_env_only_skips_files() {
        Jail::expect_with(|jail| {
            isolate_global_config(jail);
            jail.create_file("gis-mcp.toml", "[server]\nport = 7001")?;
            jail.set_env("GIS_MCP_TRANSPORT", "http");

            let config = ConfigLoader::load_env_only().map_err(|e| *e)?;
            assert_eq!(config.server.transport, TransportMode::Http);
            assert_eq!(config.server.port, 8080);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_env_value_is_an_error() {
        Jail::expect_with(|jail| {
            isolate_global_config(jail);
            jail.set_env("GIS_MCP_PORT", "not-a-port");
            assert!(ConfigLoader::load(None).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_load_without_sources_gives_defaults() {
        Jail::expect_with(|jail| {
            isolate_global_config(jail);
            let config = ConfigLoader::load(None).map_err(|e| *e)?;
            assert_eq!(config.server.transport, TransportMode::Stdio);
            assert_eq!(config.server.port, 8080);
            Ok(())
        });
    }

    #[test]
    fn test_global_config_path_returns_some() {
        let path = ConfigLoader::global_config_path();
        assert!(path.is_some());
        assert!(path.unwrap().to_string_lossy().contains("gis-mcp"));
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\ntransport = \"http\"\nport = 9010\n\n[storage]\nallow_absolute_paths = false"
        )
        .unwrap();

        let path = file.path().to_path_buf();
        let config: FileConfig = ConfigLoader::figment(Some(&path)).extract().unwrap();
        assert_eq!(config.server.transport, TransportMode::Http);
        assert_eq!(config.server.port, 9010);
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(!config.storage.allow_absolute_paths);
    }

    #[test]
    fn test_overrides_win() {
        let mut config = FileConfig::default();
        ConfigOverrides {
            transport: Some(TransportMode::Http),
            port: Some(7000),
            storage_root: Some(PathBuf::from("/srv/gis")),
            ..Default::default()
        }
        .apply(&mut config);

        assert_eq!(config.server.transport, TransportMode::Http);
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.storage.effective_root(), PathBuf::from("/srv/gis"));
    }
}
