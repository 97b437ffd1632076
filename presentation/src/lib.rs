//! Presentation layer for gis-mcp
//!
//! This crate contains the JSON-RPC protocol types, the shared request
//! handler, the stdio and HTTP transport adapters, and the CLI definition.

pub mod cli;
pub mod rpc;
pub mod transport;

// Re-export commonly used types
pub use cli::commands::{Cli, TransportArg};
pub use rpc::protocol::{JsonRpcRequest, JsonRpcResponse, RpcError};
pub use rpc::service::GatewayService;
pub use transport::{TransportError, http::HttpTransport, stdio::StdioTransport};

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use gis_mcp_application::{
        ExportCatalogUseCase, HandlerContext, HandlerResult, InvokeOperationUseCase,
        OperationDescriptor, OperationRegistry, StorageError, StorageResolverPort, ToolSchemaPort,
    };
    use gis_mcp_domain::{
        OperationGroup, ParameterKind, StorageCategory, ToolArguments, ToolDefinition,
        ToolParameter,
    };
    use serde_json::{Value, json};

    use crate::GatewayService;

    struct FakeStorage(PathBuf);

    impl StorageResolverPort for FakeStorage {
        fn root(&self) -> &Path {
            &self.0
        }

        fn resolve(
            &self,
            raw: &str,
            category: Option<StorageCategory>,
        ) -> Result<PathBuf, StorageError> {
            self.locate(raw, category)
        }

        fn locate(
            &self,
            raw: &str,
            _category: Option<StorageCategory>,
        ) -> Result<PathBuf, StorageError> {
            Ok(self.0.join(raw))
        }

        fn category_dir(&self, category: StorageCategory) -> Result<PathBuf, StorageError> {
            Ok(self.0.join(category.dir_name()))
        }
    }

    struct ObjectSchema;

    impl ToolSchemaPort for ObjectSchema {
        fn input_schema(&self, tool: &ToolDefinition) -> Value {
            let properties: serde_json::Map<String, Value> = tool
                .parameters
                .iter()
                .map(|p| (p.name.clone(), json!({"type": "number"})))
                .collect();
            json!({"type": "object", "properties": properties})
        }

        fn tool_to_schema(&self, tool: &ToolDefinition) -> Value {
            json!({"name": tool.name, "inputSchema": self.input_schema(tool)})
        }
    }

    fn add(args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
        Ok(json!(args.f64("a")? + args.f64("b")?).into())
    }

    /// Gateway with a single `add(a, b)` operation
    pub fn service() -> GatewayService {
        let mut registry = OperationRegistry::new();
        registry
            .register(OperationDescriptor::new(
                ToolDefinition::new("add", "Add two numbers", OperationGroup::Geometry)
                    .with_parameter(
                        ToolParameter::new("a", "First", true).with_kind(ParameterKind::Number),
                    )
                    .with_parameter(
                        ToolParameter::new("b", "Second", true).with_kind(ParameterKind::Number),
                    ),
                add,
            ))
            .unwrap();
        let registry = Arc::new(registry);
        let invoke = InvokeOperationUseCase::new(
            registry.clone(),
            Arc::new(FakeStorage(PathBuf::from("/srv/gis"))),
        );
        let catalog = ExportCatalogUseCase::new(registry, Arc::new(ObjectSchema));
        GatewayService::new(invoke, catalog)
    }
}
