//! Transport-independent request handling
//!
//! Both adapters feed decoded requests through [`GatewayService`], which is
//! why the same call produces the same envelope over either transport.

use std::sync::Arc;

use gis_mcp_application::{CatalogEntry, ExportCatalogUseCase, InvokeOperationUseCase};
use gis_mcp_domain::{ResultEnvelope, ToolCall};
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::protocol::{JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION, codes};

pub const SERVER_NAME: &str = "gis-mcp";

/// Shared JSON-RPC front end over the dispatcher and the catalog
#[derive(Clone)]
pub struct GatewayService {
    invoke: InvokeOperationUseCase,
    catalog: ExportCatalogUseCase,
    version: String,
}

impl GatewayService {
    pub fn new(invoke: InvokeOperationUseCase, catalog: ExportCatalogUseCase) -> Self {
        Self {
            invoke,
            catalog,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn catalog(&self) -> Vec<CatalogEntry> {
        self.catalog.export()
    }

    pub fn operation_count(&self) -> usize {
        self.catalog.len()
    }

    /// Dispatch one invocation. Never fails; failures are error envelopes.
    pub async fn call(&self, call: ToolCall) -> ResultEnvelope {
        self.invoke.execute(call).await
    }

    /// Handle one raw frame. `None` means nothing is sent back (notification).
    pub async fn handle_text(&self, text: &str) -> Option<JsonRpcResponse> {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => self.handle_value(value).await,
            Err(err) => {
                warn!(error = %err, "Malformed JSON-RPC frame");
                Some(JsonRpcResponse::failure(
                    Value::Null,
                    codes::PARSE_ERROR,
                    format!("Parse error: {}", err),
                ))
            }
        }
    }

    pub async fn handle_value(&self, value: Value) -> Option<JsonRpcResponse> {
        let id = value.get("id").cloned().unwrap_or(Value::Null);
        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) => self.handle(request).await,
            Err(err) => Some(JsonRpcResponse::failure(
                id,
                codes::INVALID_REQUEST,
                format!("Invalid request: {}", err),
            )),
        }
    }

    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!(method = %request.method, "JSON-RPC request");
        if request.is_notification() {
            return None;
        }
        let id = request.id.clone().unwrap_or(Value::Null);

        let response = match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(id, self.initialize_result()),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => JsonRpcResponse::success(id, json!({ "tools": self.catalog() })),
            "tools/call" => {
                let params = request.params.unwrap_or(Value::Null);
                match serde_json::from_value::<ToolCall>(params) {
                    Ok(call) => {
                        let envelope = self.call(call).await;
                        match serde_json::to_value(&envelope) {
                            Ok(result) => JsonRpcResponse::success(id, result),
                            Err(err) => JsonRpcResponse::failure(
                                id,
                                codes::INVALID_PARAMS,
                                format!("Result could not be encoded: {}", err),
                            ),
                        }
                    }
                    Err(err) => JsonRpcResponse::failure(
                        id,
                        codes::INVALID_PARAMS,
                        format!("Invalid params for tools/call: {}", err),
                    ),
                }
            }
            other => JsonRpcResponse::failure(
                id,
                codes::METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            ),
        };
        Some(response)
    }

    fn initialize_result(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": { "name": SERVER_NAME, "version": self.version },
            "capabilities": { "tools": { "listChanged": false } },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::service;

    #[tokio::test]
    async fn test_initialize_and_ping() {
        let service = service();
        let response = service
            .handle_text(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);

        let pong = service
            .handle_text(r#"{"jsonrpc":"2.0","id":"p","method":"ping"}"#)
            .await
            .unwrap();
        assert_eq!(pong.id, json!("p"));
        assert_eq!(pong.result, Some(json!({})));
    }

    #[tokio::test]
    async fn test_tools_list_matches_catalog() {
        let service = service();
        let response = service
            .handle_text(r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#)
            .await
            .unwrap();
        let tools = response.result.unwrap()["tools"].as_array().unwrap().clone();
        assert_eq!(tools.len(), service.operation_count());
        assert_eq!(tools[0]["name"], "add");
        assert!(tools[0]["inputSchema"].is_object());
    }

    #[tokio::test]
    async fn test_tools_call_returns_envelope() {
        let service = service();
        let response = service
            .handle_text(
                r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"add","arguments":{"a":"2","b":3}}}"#,
            )
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["status"], "success");
        assert_eq!(result["data"], 5.0);
    }

    #[tokio::test]
    async fn test_dispatch_failure_is_not_rpc_error() {
        let service = service();
        let response = service
            .handle_text(
                r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"nope","arguments":{}}}"#,
            )
            .await
            .unwrap();
        assert!(response.error.is_none());
        let result = response.result.unwrap();
        assert_eq!(result["status"], "error");
        assert_eq!(result["error_kind"], "unknown_operation");
    }

    #[tokio::test]
    async fn test_protocol_errors() {
        let service = service();
        let parse = service.handle_text("{not json").await.unwrap();
        assert_eq!(parse.error.unwrap().code, codes::PARSE_ERROR);

        let unknown = service
            .handle_text(r#"{"jsonrpc":"2.0","id":5,"method":"resources/list"}"#)
            .await
            .unwrap();
        assert_eq!(unknown.error.unwrap().code, codes::METHOD_NOT_FOUND);

        let bad_params = service
            .handle_text(r#"{"jsonrpc":"2.0","id":6,"method":"tools/call","params":[1,2]}"#)
            .await
            .unwrap();
        assert_eq!(bad_params.error.unwrap().code, codes::INVALID_PARAMS);

        let batch = service.handle_text("[]").await.unwrap();
        assert_eq!(batch.error.unwrap().code, codes::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_notification_gets_no_response() {
        let service = service();
        let response = service
            .handle_text(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(response.is_none());
    }
}
