//! CLI entrypoint for gis-mcp
//!
//! This is the main binary that wires together all layers using
//! dependency injection.

use anyhow::{Context, Result};
use clap::Parser;
use gis_mcp_application::{
    ExportCatalogUseCase, InvocationLogger, InvokeOperationUseCase, StorageResolverPort,
};
use gis_mcp_infrastructure::{
    ConfigLoader, ConfigOverrides, FileConfig, FsStorageResolver, JsonSchemaToolConverter,
    JsonlInvocationLogger, TransportMode, build_registry,
};
use gis_mcp_presentation::{Cli, GatewayService, HttpTransport, StdioTransport, TransportArg};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _log_guard = init_logging(cli.verbose, cli.log_file.as_deref())?;

    if cli.show_config {
        ConfigLoader::print_config_sources(cli.config.as_deref());
        return Ok(());
    }

    // === Configuration ===
    let loaded = if cli.no_config {
        ConfigLoader::load_env_only()
    } else {
        ConfigLoader::load(cli.config.as_ref())
    };
    let mut config: FileConfig =
        loaded.map_err(|err| anyhow::anyhow!("Failed to load configuration: {}", err))?;
    ConfigOverrides {
        transport: cli.transport.map(|t| match t {
            TransportArg::Stdio => TransportMode::Stdio,
            TransportArg::Http => TransportMode::Http,
        }),
        host: cli.host.clone(),
        port: cli.port,
        storage_root: cli.storage_root.clone(),
        invocation_log: cli.invocation_log.clone(),
    }
    .apply(&mut config);
    config.validate().context("Invalid configuration")?;

    // === Dependency Injection ===
    let storage = FsStorageResolver::new(config.storage.effective_root())
        .with_allow_absolute_paths(config.storage.allow_absolute_paths);
    storage
        .ensure_layout()
        .context("Failed to prepare storage root")?;
    info!(root = %storage.root().display(), "Storage ready");
    let storage: Arc<dyn StorageResolverPort> = Arc::new(storage);

    let registry = Arc::new(build_registry(&config).context("Failed to build registry")?);

    let mut invoke = InvokeOperationUseCase::new(registry.clone(), storage);
    if let Some(path) = &config.logging.invocation_log {
        match JsonlInvocationLogger::open(path) {
            Ok(logger) => {
                info!(path = %path.display(), "Recording invocations");
                invoke = invoke.with_invocation_logger(Arc::new(logger) as Arc<dyn InvocationLogger>);
            }
            Err(err) => warn!(
                path = %path.display(),
                error = %err,
                "Invocation log unavailable, continuing without it"
            ),
        }
    }
    let catalog = ExportCatalogUseCase::new(registry, Arc::new(JsonSchemaToolConverter));

    if cli.list_tools {
        let listing = serde_json::json!({ "tools": catalog.export() });
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    let service = GatewayService::new(invoke, catalog).into_shared();

    match config.server.transport {
        TransportMode::Stdio => StdioTransport::new(service).run().await?,
        TransportMode::Http => {
            HttpTransport::new(service, config.server.host.clone(), config.server.port)
                .run()
                .await?
        }
    }

    Ok(())
}

/// Logs never go to stdout; it carries protocol frames in stdio mode.
fn init_logging(verbose: u8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.is_empty() => EnvFilter::new(directives),
        _ => match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"), // -vvv or more
        },
    };

    match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let file_name = path
                .file_name()
                .context("Log file path has no file name")?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}
