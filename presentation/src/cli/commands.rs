//! CLI command definitions

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Transport selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportArg {
    /// Newline-delimited JSON-RPC over stdin/stdout (one client)
    Stdio,
    /// HTTP listener (many clients)
    Http,
}

/// CLI arguments for gis-mcp
#[derive(Parser, Debug)]
#[command(name = "gis-mcp")]
#[command(author, version, about = "Geospatial operations exposed as JSON-RPC tools")]
#[command(long_about = r#"
gis-mcp exposes geometry, projection, vector, raster, statistics,
visualization and dataset operations as callable tools over JSON-RPC.

Configuration is merged from (lowest to highest priority):
1. Built-in defaults
2. ~/.config/gis-mcp/config.toml     Global config
3. ./gis-mcp.toml                     Project-level config
4. --config <path>                    Explicit config file
5. GIS_MCP_TRANSPORT, GIS_MCP_HOST, GIS_MCP_PORT, GIS_MCP_STORAGE_PATH
6. Command-line flags

Example:
  gis-mcp                                   # stdio, for a local client
  gis-mcp --transport http --port 9010      # network listener
  gis-mcp --list-tools
"#)]
pub struct Cli {
    /// Transport to serve
    #[arg(short, long, value_enum)]
    pub transport: Option<TransportArg>,

    /// Listen address for the HTTP transport
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Listen port for the HTTP transport
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Storage root for inputs and outputs
    #[arg(long, value_name = "DIR")]
    pub storage_root: Option<PathBuf>,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Skip configuration files; environment variables still apply
    #[arg(long)]
    pub no_config: bool,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Append one JSON line per invocation to this file
    #[arg(long, value_name = "PATH")]
    pub invocation_log: Option<PathBuf>,

    /// Show configuration file locations and exit
    #[arg(long)]
    pub show_config: bool,

    /// Print the operation catalog as JSON and exit
    #[arg(long)]
    pub list_tools: bool,
}
