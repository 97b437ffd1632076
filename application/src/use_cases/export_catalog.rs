//! Export Catalog use case.
//!
//! Produces the discovery listing: one record per registered operation with
//! its parameter table and a JSON Schema for clients that want one.

use std::sync::Arc;

use gis_mcp_domain::{OperationGroup, ToolParameter};
use serde::Serialize;
use serde_json::Value;

use crate::ports::tool_schema::ToolSchemaPort;
use crate::registry::OperationRegistry;

/// One catalog record
#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    pub name: String,
    pub description: String,
    pub group: OperationGroup,
    pub parameters: Vec<ToolParameter>,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Use case for exporting the operation catalog.
#[derive(Clone)]
pub struct ExportCatalogUseCase {
    registry: Arc<OperationRegistry>,
    tool_schema: Arc<dyn ToolSchemaPort>,
}

impl ExportCatalogUseCase {
    pub fn new(registry: Arc<OperationRegistry>, tool_schema: Arc<dyn ToolSchemaPort>) -> Self {
        Self {
            registry,
            tool_schema,
        }
    }

    /// Snapshot of the catalog in registration order. No side effects.
    pub fn export(&self) -> Vec<CatalogEntry> {
        self.registry
            .list_all()
            .map(|descriptor| {
                let definition = &descriptor.definition;
                CatalogEntry {
                    name: definition.name.clone(),
                    description: definition.description.clone(),
                    group: definition.group,
                    parameters: definition.parameters.clone(),
                    input_schema: self.tool_schema.input_schema(definition),
                }
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::operation::{HandlerContext, HandlerResult};
    use crate::registry::OperationDescriptor;
    use gis_mcp_domain::{ParameterKind, ToolArguments, ToolDefinition};
    use serde_json::json;

    struct NamesOnlySchema;

    impl ToolSchemaPort for NamesOnlySchema {
        fn input_schema(&self, tool: &ToolDefinition) -> Value {
            json!({
                "type": "object",
                "properties": tool.parameters.iter().map(|p| p.name.clone()).collect::<Vec<_>>(),
            })
        }

        fn tool_to_schema(&self, tool: &ToolDefinition) -> Value {
            json!({"name": tool.name})
        }
    }

    fn noop(_args: &ToolArguments, _ctx: &HandlerContext) -> HandlerResult {
        Ok(Value::Null.into())
    }

    #[test]
    fn test_export_matches_registry() {
        let mut registry = OperationRegistry::new();
        registry
            .register(OperationDescriptor::new(
                ToolDefinition::new("get_area", "Area", OperationGroup::Geometry).with_parameter(
                    ToolParameter::new("geometry", "WKT", true),
                ),
                noop,
            ))
            .unwrap();
        registry
            .register(OperationDescriptor::new(
                ToolDefinition::new("get_utm_zone", "UTM zone", OperationGroup::Projection)
                    .with_parameter(
                        ToolParameter::new("coordinates", "lon, lat", true)
                            .with_kind(ParameterKind::sequence_of(ParameterKind::Number)),
                    ),
                noop,
            ))
            .unwrap();

        let exporter = ExportCatalogUseCase::new(Arc::new(registry), Arc::new(NamesOnlySchema));
        let catalog = exporter.export();
        assert_eq!(catalog.len(), exporter.len());
        assert_eq!(catalog[0].name, "get_area");
        assert_eq!(catalog[1].group, OperationGroup::Projection);

        let json = serde_json::to_value(&catalog[1]).unwrap();
        assert_eq!(json["parameters"][0]["type"], "array<number>");
        assert_eq!(json["inputSchema"]["properties"][0], "coordinates");
    }
}
