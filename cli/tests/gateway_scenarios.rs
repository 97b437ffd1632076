//! End-to-end scenarios over the fully composed gateway

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::http::Request;
use gis_mcp_application::{ExportCatalogUseCase, InvokeOperationUseCase, StorageResolverPort};
use gis_mcp_domain::{ResultEnvelope, ToolCall};
use gis_mcp_infrastructure::{FileConfig, FsStorageResolver, JsonSchemaToolConverter, build_registry};
use gis_mcp_presentation::GatewayService;
use gis_mcp_presentation::StdioTransport;
use gis_mcp_presentation::transport::http::router;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::io::BufReader;
use tower::ServiceExt;

fn gateway(root: &TempDir) -> GatewayService {
    let config = FileConfig::default();
    let storage = FsStorageResolver::new(root.path());
    storage.ensure_layout().unwrap();
    let storage: Arc<dyn StorageResolverPort> = Arc::new(storage);
    let registry = Arc::new(build_registry(&config).unwrap());
    let invoke = InvokeOperationUseCase::new(registry.clone(), storage);
    let catalog = ExportCatalogUseCase::new(registry, Arc::new(JsonSchemaToolConverter));
    GatewayService::new(invoke, catalog)
}

fn call(name: &str, arguments: Value) -> ToolCall {
    serde_json::from_value(json!({ "name": name, "arguments": arguments })).unwrap()
}

fn envelope_json(envelope: &ResultEnvelope) -> Value {
    serde_json::to_value(envelope).unwrap()
}

#[tokio::test]
async fn test_transform_coordinates_to_web_mercator() {
    let dir = TempDir::new().unwrap();
    let service = gateway(&dir);
    let envelope = envelope_json(
        &service
            .call(call(
                "transform_coordinates",
                json!({"coordinates": [0, 0], "source_crs": "EPSG:4326", "target_crs": "EPSG:3857"}),
            ))
            .await,
    );
    assert_eq!(envelope["status"], "success");
    let pair = envelope["data"]["coordinates"].as_array().unwrap();
    assert_eq!(pair.len(), 2);
    assert!(pair[0].as_f64().unwrap().abs() < 1e-6);
    assert!(pair[1].as_f64().unwrap().abs() < 1e-6);
}

#[tokio::test]
async fn test_negative_buffer_is_operation_error() {
    let dir = TempDir::new().unwrap();
    let service = gateway(&dir);
    let envelope = envelope_json(
        &service
            .call(call("buffer", json!({"geometry": "POINT(0 0)", "distance": -1})))
            .await,
    );
    assert_eq!(envelope["status"], "error");
    assert_eq!(envelope["error_kind"], "operation_error");
}

#[tokio::test]
async fn test_relative_output_lands_under_storage_root() {
    let dir = TempDir::new().unwrap();
    let service = gateway(&dir);
    let envelope = envelope_json(
        &service
            .call(call("write_file_gpd", json!({"filename": "outputs/test.geojson"})))
            .await,
    );
    assert_eq!(envelope["status"], "success", "{envelope}");

    let expected = dir.path().join("outputs").join("test.geojson");
    assert!(expected.exists());
    assert_eq!(envelope["data"]["path"], expected.display().to_string());
}

#[tokio::test]
async fn test_every_catalog_name_is_invocable() {
    let dir = TempDir::new().unwrap();
    let service = gateway(&dir);
    let catalog = service.catalog();
    assert_eq!(catalog.len(), service.operation_count());

    let mut reachable = 0;
    for entry in &catalog {
        let envelope = envelope_json(&service.call(call(&entry.name, json!({}))).await);
        assert_ne!(envelope["error_kind"], "unknown_operation", "{}", entry.name);
        reachable += 1;
    }
    assert_eq!(reachable, catalog.len());
}

#[tokio::test]
async fn test_unknown_operation() {
    let dir = TempDir::new().unwrap();
    let service = gateway(&dir);
    let envelope = envelope_json(&service.call(call("nonexistent_tool_xyz", json!({}))).await);
    assert_eq!(envelope["status"], "error");
    assert_eq!(envelope["error_kind"], "unknown_operation");
}

#[tokio::test]
async fn test_missing_argument_names_parameter() {
    let dir = TempDir::new().unwrap();
    let service = gateway(&dir);
    let envelope = envelope_json(
        &service
            .call(call("transform_coordinates", json!({"coordinates": [0, 0]})))
            .await,
    );
    assert_eq!(envelope["error_kind"], "missing_argument");
    assert!(
        envelope["error_message"]
            .as_str()
            .unwrap()
            .contains("source_crs")
    );
}

#[tokio::test]
async fn test_dispatch_is_total_on_hostile_input() {
    let dir = TempDir::new().unwrap();
    let service = gateway(&dir);
    let hostile = [
        ("buffer", json!({"geometry": 42, "distance": "far"})),
        ("write_file_gpd", json!({"filename": "../../escape.geojson"})),
        ("create_map", json!({"layers": "not a list"})),
        ("read_file_gpd", json!({"file_path": ""})),
        ("metadata_raster", json!({"path_or_url": "/does/not/exist.asc"})),
    ];
    for (name, arguments) in hostile {
        let envelope = envelope_json(&service.call(call(name, arguments)).await);
        assert_eq!(envelope["status"], "error", "{name}");
        assert!(envelope.get("data").is_none());
        assert!(envelope["error_kind"].is_string());
    }
}

#[tokio::test]
async fn test_transport_parity() {
    let dir = TempDir::new().unwrap();
    let service = gateway(&dir).into_shared();
    let arguments = json!({"geometry": "POLYGON((0 0, 4 0, 4 3, 0 3, 0 0))"});

    let frame = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": {"name": "get_area", "arguments": arguments},
    });
    let mut output = Vec::new();
    StdioTransport::new(service.clone())
        .serve(
            BufReader::new(format!("{frame}\n").as_bytes()),
            &mut output,
        )
        .await
        .unwrap();
    let stdio: Value = serde_json::from_slice(&output).unwrap();
    let via_stdio = stdio["result"].clone();

    let request = Request::builder()
        .method("POST")
        .uri("/tools/call")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"name": "get_area", "arguments": arguments}).to_string(),
        ))
        .unwrap();
    let response = router(service).oneshot(request).await.unwrap();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let via_http: Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(via_stdio["status"], "success");
    assert_eq!(via_stdio, via_http);
}

#[tokio::test]
async fn test_storage_resolve_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let storage = FsStorageResolver::new(dir.path());
    let first = storage.resolve("outputs/result.json", None).unwrap();
    let second = storage.resolve("outputs/result.json", None).unwrap();
    assert_eq!(first, second);
    assert!(first.starts_with(dir.path()));
    assert!(first.parent().unwrap().is_dir());
}
