//! Network listener: JSON-RPC and REST endpoints over axum
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `POST /mcp` | JSON-RPC frame, same handling as stdio |
//! | `GET /tools` | Catalog |
//! | `POST /tools/call` | `{name, arguments}` → result envelope |
//! | `GET /health` | Liveness and operation count |

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use gis_mcp_domain::{ResultEnvelope, ToolCall, ToolError};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::TransportError;
use crate::rpc::service::GatewayService;

pub struct HttpTransport {
    service: Arc<GatewayService>,
    host: String,
    port: u16,
}

impl HttpTransport {
    pub fn new(service: Arc<GatewayService>, host: impl Into<String>, port: u16) -> Self {
        Self {
            service,
            host: host.into(),
            port,
        }
    }

    /// Serve until Ctrl-C; in-flight requests finish before returning.
    pub async fn run(&self) -> Result<(), TransportError> {
        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!(addr = %addr, operations = self.service.operation_count(), "Listening");
        axum::serve(listener, router(self.service.clone()))
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        info!("Listener stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Could not install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

pub fn router(service: Arc<GatewayService>) -> Router {
    Router::new()
        .route("/mcp", post(rpc))
        .route("/tools", get(list_tools))
        .route("/tools/call", post(call_tool))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(service)
}

async fn rpc(State(service): State<Arc<GatewayService>>, body: String) -> Response {
    match service.handle_text(&body).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

async fn list_tools(State(service): State<Arc<GatewayService>>) -> impl IntoResponse {
    Json(json!({ "tools": service.catalog() }))
}

/// A body that does not decode as `{name, arguments}` still gets an envelope.
async fn call_tool(
    State(service): State<Arc<GatewayService>>,
    payload: Result<Json<ToolCall>, JsonRejection>,
) -> impl IntoResponse {
    match payload {
        Ok(Json(call)) => Json(service.call(call).await),
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Malformed /tools/call body");
            Json(ResultEnvelope::failure(ToolError::invalid_argument(
                "body",
                rejection.body_text(),
            )))
        }
    }
}

async fn health(State(service): State<Arc<GatewayService>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "operations": service.operation_count(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::service;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    fn app() -> Router {
        router(service().into_shared())
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["operations"], 1);
    }

    #[tokio::test]
    async fn test_list_tools() {
        let response = app()
            .oneshot(Request::builder().uri("/tools").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["tools"][0]["name"], "add");
    }

    #[tokio::test]
    async fn test_rest_call_returns_envelope() {
        let response = app()
            .oneshot(post_json(
                "/tools/call",
                r#"{"name":"add","arguments":{"a":2,"b":"2.5"}}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "success");
        assert_eq!(body["data"], 4.5);
    }

    #[tokio::test]
    async fn test_rest_call_missing_argument() {
        let response = app()
            .oneshot(post_json("/tools/call", r#"{"name":"add","arguments":{"a":2}}"#))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["error_kind"], "missing_argument");
        assert!(body["error_message"].as_str().unwrap().contains('b'));
    }

    #[tokio::test]
    async fn test_rest_call_malformed_body_is_envelope() {
        for body in [
            r#"{"name":"add","arguments":"{\"a\":1}"}"#,
            r#"{"arguments":{"a":1}}"#,
            "not json at all",
        ] {
            let response = app().oneshot(post_json("/tools/call", body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{body}");
            let body = body_json(response).await;
            assert_eq!(body["status"], "error");
            assert_eq!(body["error_kind"], "invalid_argument");
            assert!(body.get("data").is_none());
        }
    }

    #[tokio::test]
    async fn test_rpc_endpoint_matches_stdio_handling() {
        let response = app()
            .oneshot(post_json(
                "/mcp",
                r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"operation_name":"add","arguments":{"a":1,"b":1}}}"#,
            ))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["id"], 7);
        assert_eq!(body["result"]["data"], 2.0);
    }

    #[tokio::test]
    async fn test_rpc_notification_is_accepted() {
        let response = app()
            .oneshot(post_json(
                "/mcp",
                r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}
