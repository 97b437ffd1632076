//! Tool schema conversion port.
//!
//! Separates "what an operation accepts" (domain [`ToolDefinition`]) from
//! "how clients expect to see it" (JSON Schema, produced in infrastructure).

use gis_mcp_domain::ToolDefinition;

/// Port for converting operation definitions to JSON Schema.
pub trait ToolSchemaPort: Send + Sync {
    /// Convert a single definition to an `inputSchema` object.
    fn input_schema(&self, tool: &ToolDefinition) -> serde_json::Value;

    /// Convert a definition to a full catalog record (name, description,
    /// parameters and `inputSchema`).
    fn tool_to_schema(&self, tool: &ToolDefinition) -> serde_json::Value;
}
