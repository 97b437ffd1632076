//! External dataset fetch and storage listing
//!
//! Downloads are plain HTTP GETs streamed into a storage category directory.
//! The client timeout, user agent and size limit come from the `[datasets]`
//! config section.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use gis_mcp_application::{
    Artifact, HandlerContext, HandlerResult, OperationDescriptor, OperationError, OperationProvider,
};
use gis_mcp_domain::{
    OperationGroup, ParameterKind, StorageCategory, ToolArguments, ToolDefinition, ToolParameter,
};
use reqwest::Url;
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::config::FileDatasetsConfig;

/// Tool name constants
pub const DOWNLOAD_DATASET: &str = "download_dataset";
pub const LIST_STORED_FILES: &str = "list_stored_files";

const FALLBACK_FILE_NAME: &str = "download";

fn define(name: &str, description: &str) -> ToolDefinition {
    ToolDefinition::new(name, description, OperationGroup::Datasets)
}

fn category_names() -> String {
    StorageCategory::ALL
        .iter()
        .map(StorageCategory::dir_name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_category(raw: &str) -> Result<StorageCategory, OperationError> {
    raw.parse().map_err(|_| {
        OperationError::domain(format!(
            "Unknown storage category '{}' (known: {})",
            raw,
            category_names()
        ))
    })
}

#[derive(Debug, Clone)]
pub struct DatasetsProvider {
    timeout: Duration,
    user_agent: String,
    max_bytes: u64,
}

impl DatasetsProvider {
    pub fn new(config: &FileDatasetsConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_download_bytes,
        }
    }
}

/// Why a capped copy stopped
#[derive(Debug)]
enum CopyError {
    TooLarge,
    Io(std::io::Error),
}

/// Copy at most `cap` bytes; one byte more means the source is too large.
fn copy_capped<R: Read, W: Write>(reader: R, writer: &mut W, cap: u64) -> Result<u64, CopyError> {
    let copied = std::io::copy(&mut reader.take(cap.saturating_add(1)), writer)
        .map_err(CopyError::Io)?;
    if copied > cap {
        return Err(CopyError::TooLarge);
    }
    writer.flush().map_err(CopyError::Io)?;
    Ok(copied)
}

impl Default for DatasetsProvider {
    fn default() -> Self {
        Self::new(&FileDatasetsConfig::default())
    }
}

impl OperationProvider for DatasetsProvider {
    fn id(&self) -> &str {
        "datasets"
    }

    fn group(&self) -> OperationGroup {
        OperationGroup::Datasets
    }

    fn operations(&self) -> Vec<OperationDescriptor> {
        let downloader = self.clone();
        vec![
            OperationDescriptor::new(
                define(DOWNLOAD_DATASET, "Download a file over HTTP(S) into a storage category")
                    .with_parameter(ToolParameter::new("url", "HTTP or HTTPS URL", true))
                    .with_parameter(
                        ToolParameter::new("category", "Storage category directory", false)
                            .with_default(StorageCategory::Outputs.dir_name()),
                    )
                    .with_parameter(
                        ToolParameter::new(
                            "save_as",
                            "File name inside the category (defaults to the URL's last segment)",
                            false,
                        )
                        .with_kind(ParameterKind::optional(ParameterKind::String)),
                    ),
                move |args: &ToolArguments, ctx: &HandlerContext| -> HandlerResult {
                    downloader.download(args, ctx)
                },
            ),
            OperationDescriptor::new(
                define(LIST_STORED_FILES, "List files under the storage root by category")
                    .with_parameter(
                        ToolParameter::new("category", "Only this category", false)
                            .with_kind(ParameterKind::optional(ParameterKind::String)),
                    ),
                execute_list_stored_files,
            ),
        ]
    }
}

impl DatasetsProvider {
    fn download(&self, args: &ToolArguments, ctx: &HandlerContext) -> HandlerResult {
        let raw_url = args.str("url")?;
        let url = Url::parse(raw_url)
            .map_err(|e| OperationError::domain(format!("Invalid URL '{}': {}", raw_url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(OperationError::domain(format!(
                "Unsupported URL scheme '{}' (expected http or https)",
                url.scheme()
            )));
        }
        let category = parse_category(args.str("category")?)?;
        let name = match args.opt_str("save_as")? {
            Some(name) => name.to_string(),
            None => file_name_from_url(&url),
        };
        let target = ctx.storage.resolve(&name, Some(category))?;

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent.as_str())
            .build()
            .map_err(|e| OperationError::internal(format!("HTTP client setup failed: {}", e)))?;

        info!(url = %url, target = %target.display(), "Downloading dataset");
        let response = client
            .get(url.clone())
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| OperationError::domain(format!("Download of {} failed: {}", url, e)))?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if let Some(length) = response.content_length()
            && length > self.max_bytes
        {
            return Err(OperationError::domain(format!(
                "Download of {} is {} bytes, above the {} byte limit",
                url, length, self.max_bytes
            )));
        }

        let mut file = File::create(&target)
            .map_err(|e| OperationError::io("Failed to write", &target, e))?;
        let copied = copy_capped(response, &mut file, self.max_bytes);
        drop(file);
        let size = match copied {
            Ok(size) => size,
            Err(err) => {
                if let Err(remove) = std::fs::remove_file(&target) {
                    warn!(target = %target.display(), error = %remove, "Could not remove partial download");
                }
                return Err(match err {
                    CopyError::TooLarge => OperationError::domain(format!(
                        "Download of {} exceeded the {} byte limit",
                        url, self.max_bytes
                    )),
                    CopyError::Io(e) => {
                        OperationError::domain(format!("Download of {} failed: {}", url, e))
                    }
                });
            }
        };
        debug!(bytes = size, "Download complete");

        Ok(Artifact::new(&target, format_of(&target))
            .with_metadata("url", url.as_str())
            .with_metadata("category", category.dir_name())
            .with_metadata("size_bytes", size)
            .with_metadata("content_type", json!(content_type))
            .into())
    }
}

fn file_name_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}

fn format_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_else(|| "binary".to_string())
}

/// Files below `dir`, depth-first, paths relative to `dir`
fn walk(dir: &Path) -> Result<Vec<Value>, OperationError> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let entries = std::fs::read_dir(&current)
            .map_err(|e| OperationError::io("Failed to list", &current, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| OperationError::io("Failed to list", &current, e))?;
            let path = entry.path();
            let metadata = entry
                .metadata()
                .map_err(|e| OperationError::io("Failed to inspect", &path, e))?;
            if metadata.is_dir() {
                pending.push(path);
            } else {
                let relative = path.strip_prefix(dir).unwrap_or(&path);
                files.push(json!({
                    "name": relative.display().to_string(),
                    "path": path.display().to_string(),
                    "size_bytes": metadata.len(),
                }));
            }
        }
    }
    files.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
    Ok(files)
}

fn execute_list_stored_files(args: &ToolArguments, ctx: &HandlerContext) -> HandlerResult {
    let categories = match args.opt_str("category")? {
        Some(raw) => vec![parse_category(raw)?],
        None => StorageCategory::ALL.to_vec(),
    };

    let mut listing = Map::new();
    let mut total = 0;
    for category in categories {
        let dir = ctx.category_dir(category)?;
        let files = walk(&dir)?;
        total += files.len();
        listing.insert(category.dir_name().to_string(), Value::Array(files));
    }
    Ok(json!({
        "root": ctx.storage.root().display().to_string(),
        "categories": listing,
        "total_files": total,
    })
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FsStorageResolver;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn setup() -> (TempDir, HandlerContext) {
        let dir = TempDir::new().unwrap();
        let ctx = HandlerContext::new(Arc::new(FsStorageResolver::new(dir.path())));
        (dir, ctx)
    }

    fn call(ctx: &HandlerContext, name: &str, args: ToolArguments) -> HandlerResult {
        call_with(DatasetsProvider::default(), ctx, name, args)
    }

    fn call_with(
        provider: DatasetsProvider,
        ctx: &HandlerContext,
        name: &str,
        args: ToolArguments,
    ) -> HandlerResult {
        provider
            .operations()
            .into_iter()
            .find(|d| d.name() == name)
            .unwrap()
            .handler
            .call(&args, ctx)
    }

    #[test]
    fn test_file_name_from_url() {
        let url = Url::parse("https://example.com/data/roads.geojson?v=2").unwrap();
        assert_eq!(file_name_from_url(&url), "roads.geojson");
        let bare = Url::parse("https://example.com/").unwrap();
        assert_eq!(file_name_from_url(&bare), FALLBACK_FILE_NAME);
    }

    #[test]
    fn test_download_rejects_bad_urls() {
        let (_dir, ctx) = setup();
        for url in ["not a url", "ftp://example.com/file.zip"] {
            let args = ToolArguments::new()
                .with("url", url)
                .with("category", "outputs");
            let result = call(&ctx, DOWNLOAD_DATASET, args);
            assert!(matches!(result, Err(OperationError::Domain(_))), "{}", url);
        }
    }

    #[test]
    fn test_download_rejects_unknown_category() {
        let (_dir, ctx) = setup();
        let args = ToolArguments::new()
            .with("url", "https://example.com/a.csv")
            .with("category", "music");
        let err = call(&ctx, DOWNLOAD_DATASET, args).unwrap_err();
        assert!(err.to_string().contains("climate_data"));
    }

    /// Serve `len` bytes at `/files/{name}` from a background runtime
    fn serve_bytes(len: usize) -> std::net::SocketAddr {
        use axum::{Router, routing::get};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                let app = Router::new().route(
                    "/files/{name}",
                    get(move || async move { vec![b'x'; len] }),
                );
                axum::serve(listener, app).await.unwrap();
            });
        });
        addr
    }

    fn limited(max_bytes: u64) -> DatasetsProvider {
        DatasetsProvider::new(&FileDatasetsConfig {
            max_download_bytes: max_bytes,
            ..Default::default()
        })
    }

    #[test]
    fn test_download_writes_into_category() {
        let (dir, ctx) = setup();
        let addr = serve_bytes(64);
        let args = ToolArguments::new()
            .with("url", format!("http://{addr}/files/tracks.csv"))
            .with("category", "movement_data");
        let data = call_with(limited(1024), &ctx, DOWNLOAD_DATASET, args)
            .unwrap()
            .into_data();

        let expected = dir.path().join("movement_data").join("tracks.csv");
        assert_eq!(data["path"], expected.display().to_string());
        assert_eq!(data["format"], "csv");
        assert_eq!(data["size_bytes"], 64);
        assert_eq!(std::fs::read(&expected).unwrap().len(), 64);
    }

    #[test]
    fn test_download_over_limit_leaves_no_file() {
        let (dir, ctx) = setup();
        let addr = serve_bytes(4096);
        let args = ToolArguments::new()
            .with("url", format!("http://{addr}/files/huge.tif"))
            .with("category", "satellite_imagery");
        let err = call_with(limited(1024), &ctx, DOWNLOAD_DATASET, args).unwrap_err();

        assert!(matches!(err, OperationError::Domain(_)));
        assert!(err.to_string().contains("1024 byte limit"));
        assert!(!dir.path().join("satellite_imagery").join("huge.tif").exists());
    }

    #[test]
    fn test_capped_copy_stops_without_length_header() {
        let mut sink = Vec::new();
        let copied = copy_capped(&b"abcdef"[..], &mut sink, 6).unwrap();
        assert_eq!(copied, 6);

        let mut sink = Vec::new();
        let result = copy_capped(&b"abcdefg"[..], &mut sink, 6);
        assert!(matches!(result, Err(CopyError::TooLarge)));
        assert!(sink.len() <= 7);
    }

    #[test]
    fn test_list_stored_files() {
        let (dir, ctx) = setup();
        let climate = dir.path().join("climate_data").join("era5");
        std::fs::create_dir_all(&climate).unwrap();
        std::fs::write(climate.join("t2m.nc"), b"1234").unwrap();
        std::fs::create_dir_all(dir.path().join("outputs")).unwrap();
        std::fs::write(dir.path().join("outputs").join("map.svg"), b"<svg/>").unwrap();

        let data = call(&ctx, LIST_STORED_FILES, ToolArguments::new())
            .unwrap()
            .into_data();
        assert_eq!(data["total_files"], 2);
        assert_eq!(data["categories"]["climate_data"][0]["size_bytes"], 4);
        assert!(
            data["categories"]["climate_data"][0]["name"]
                .as_str()
                .unwrap()
                .ends_with("t2m.nc")
        );
        assert_eq!(data["categories"]["movement_data"], json!([]));

        let only = call(
            &ctx,
            LIST_STORED_FILES,
            ToolArguments::new().with("category", "outputs"),
        )
        .unwrap()
        .into_data();
        assert_eq!(only["total_files"], 1);
        assert!(only["categories"].get("climate_data").is_none());
    }
}
