//! JSON Schema tool converter.
//!
//! Default implementation of [`ToolSchemaPort`] producing the `inputSchema`
//! objects clients use for discovery.

use gis_mcp_application::ports::tool_schema::ToolSchemaPort;
use gis_mcp_domain::{ParameterKind, ToolDefinition};
use serde_json::{Map, Value, json};

/// Default implementation producing JSON Schema (draft 2020-12 subset).
///
/// Kind → schema mapping:
/// - `string`, `path` → `"string"` (`path` adds `"format": "path"`)
/// - `number` / `integer` / `boolean` → same name
/// - `array<T>` → `"array"` with `items`
/// - `object` → `"object"`
/// - `optional<T>` → schema of `T` with `null` added to its `type`
/// - `any` → no `type` constraint
pub struct JsonSchemaToolConverter;

fn kind_schema(kind: &ParameterKind) -> Map<String, Value> {
    let mut schema = Map::new();
    match kind {
        ParameterKind::Any => {}
        ParameterKind::String => {
            schema.insert("type".into(), json!("string"));
        }
        ParameterKind::Path => {
            schema.insert("type".into(), json!("string"));
            schema.insert("format".into(), json!("path"));
        }
        ParameterKind::Number => {
            schema.insert("type".into(), json!("number"));
        }
        ParameterKind::Integer => {
            schema.insert("type".into(), json!("integer"));
        }
        ParameterKind::Boolean => {
            schema.insert("type".into(), json!("boolean"));
        }
        ParameterKind::Mapping => {
            schema.insert("type".into(), json!("object"));
        }
        ParameterKind::Sequence(item) => {
            schema.insert("type".into(), json!("array"));
            schema.insert("items".into(), Value::Object(kind_schema(item)));
        }
        ParameterKind::Optional(inner) => {
            schema = kind_schema(inner);
            if let Some(Value::String(t)) = schema.get("type").cloned() {
                schema.insert("type".into(), json!([t, "null"]));
            }
        }
    }
    schema
}

impl ToolSchemaPort for JsonSchemaToolConverter {
    fn input_schema(&self, tool: &ToolDefinition) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in &tool.parameters {
            let mut prop = kind_schema(&param.kind);
            prop.insert("description".into(), json!(param.description));
            if let Some(default) = &param.default {
                prop.insert("default".into(), default.clone());
            }
            properties.insert(param.name.clone(), Value::Object(prop));

            if param.required {
                required.push(json!(param.name));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    fn tool_to_schema(&self, tool: &ToolDefinition) -> Value {
        json!({
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
            "inputSchema": self.input_schema(tool),
        })
    }
}
