//! Tool domain entities

use serde::ser::Serializer;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::storage::{PathRole, StorageBinding, StorageCategory};

/// Parameter names that are storage-relative output paths by convention,
/// even when the schema does not flag them explicitly.
pub const CONVENTIONAL_OUTPUT_PARAMETERS: &[&str] = &["filename", "output_path"];

/// Capability group an operation belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationGroup {
    /// Geometry algebra and measurements (WKT in, WKT out)
    Geometry,
    /// Coordinate reference systems and geodesy
    Projection,
    /// Vector file I/O and feature-level operations
    Vector,
    /// Raster grids
    Raster,
    /// Spatial statistics
    Statistics,
    /// Map rendering
    Visualization,
    /// External dataset fetch
    Datasets,
}

impl OperationGroup {
    pub const ALL: [OperationGroup; 7] = [
        OperationGroup::Geometry,
        OperationGroup::Projection,
        OperationGroup::Vector,
        OperationGroup::Raster,
        OperationGroup::Statistics,
        OperationGroup::Visualization,
        OperationGroup::Datasets,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationGroup::Geometry => "geometry",
            OperationGroup::Projection => "projection",
            OperationGroup::Vector => "vector",
            OperationGroup::Raster => "raster",
            OperationGroup::Statistics => "statistics",
            OperationGroup::Visualization => "visualization",
            OperationGroup::Datasets => "datasets",
        }
    }
}

impl std::fmt::Display for OperationGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Declared type of a parameter.
///
/// Drives the coercion step of the dispatcher (see [`super::coercion`]).
/// `Path` behaves like `String` on the wire but signals a filesystem path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterKind {
    /// Any JSON value, passed through untouched
    Any,
    String,
    Number,
    Integer,
    Boolean,
    Path,
    /// Homogeneous list; items are coerced to the inner kind
    Sequence(Box<ParameterKind>),
    /// JSON object
    Mapping,
    /// Explicit `null` is a legal value
    Optional(Box<ParameterKind>),
}

impl ParameterKind {
    pub fn sequence_of(item: ParameterKind) -> Self {
        ParameterKind::Sequence(Box::new(item))
    }

    pub fn optional(inner: ParameterKind) -> Self {
        ParameterKind::Optional(Box::new(inner))
    }

    /// Kind with any `Optional` wrapper removed
    pub fn base(&self) -> &ParameterKind {
        match self {
            ParameterKind::Optional(inner) => inner.base(),
            other => other,
        }
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, ParameterKind::Optional(_))
    }

    /// Human/catalog-facing type name, e.g. `array<number>` or `optional<string>`
    pub fn type_name(&self) -> String {
        match self {
            ParameterKind::Any => "any".to_string(),
            ParameterKind::String => "string".to_string(),
            ParameterKind::Number => "number".to_string(),
            ParameterKind::Integer => "integer".to_string(),
            ParameterKind::Boolean => "boolean".to_string(),
            ParameterKind::Path => "path".to_string(),
            ParameterKind::Sequence(item) => format!("array<{}>", item.type_name()),
            ParameterKind::Mapping => "object".to_string(),
            ParameterKind::Optional(inner) => format!("optional<{}>", inner.type_name()),
        }
    }
}

impl std::fmt::Display for ParameterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

impl Serialize for ParameterKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.type_name())
    }
}

/// Parameter specification for an operation
#[derive(Debug, Clone, Serialize)]
pub struct ToolParameter {
    /// Parameter name
    pub name: String,
    /// Parameter description
    pub description: String,
    /// Declared kind
    #[serde(rename = "type")]
    pub kind: ParameterKind,
    /// Whether this parameter is required
    pub required: bool,
    /// Value substituted when an optional parameter is absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Explicit storage binding (path parameters)
    #[serde(skip)]
    pub storage: Option<StorageBinding>,
}

impl ToolParameter {
    pub fn new(name: impl Into<String>, description: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind: ParameterKind::String,
            required,
            default: None,
            storage: None,
        }
    }

    pub fn with_kind(mut self, kind: ParameterKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set a default value. A parameter with a default is never required.
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self.required = false;
        self
    }

    /// Mark as a path read from storage (resolved, nothing created)
    pub fn storage_input(mut self, category: Option<StorageCategory>) -> Self {
        self.kind = self.path_kind();
        self.storage = Some(StorageBinding::new(PathRole::Input, category));
        self
    }

    /// Mark as a path written to storage (resolved, parents created)
    pub fn storage_output(mut self, category: Option<StorageCategory>) -> Self {
        self.kind = self.path_kind();
        self.storage = Some(StorageBinding::new(PathRole::Output, category));
        self
    }

    /// `Path`, keeping an `Optional` wrapper set earlier
    fn path_kind(&self) -> ParameterKind {
        if self.kind.is_optional() {
            ParameterKind::optional(ParameterKind::Path)
        } else {
            ParameterKind::Path
        }
    }

    /// Effective storage binding: explicit flag first, then the naming convention.
    pub fn storage_binding(&self) -> Option<StorageBinding> {
        if let Some(binding) = self.storage {
            return Some(binding);
        }
        if CONVENTIONAL_OUTPUT_PARAMETERS.contains(&self.name.as_str()) {
            return Some(StorageBinding::new(PathRole::Output, None));
        }
        None
    }
}

/// Definition of an operation exposed in the catalog
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    /// Unique name of the operation (e.g., "buffer")
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Capability group
    pub group: OperationGroup,
    /// Parameter specifications, in declaration order
    pub parameters: Vec<ToolParameter>,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        group: OperationGroup,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            group,
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, param: ToolParameter) -> Self {
        self.parameters.push(param);
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&ToolParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn required_parameters(&self) -> impl Iterator<Item = &ToolParameter> {
        self.parameters.iter().filter(|p| p.required)
    }

    /// Parameters whose values must pass through the storage resolver
    pub fn storage_parameters(&self) -> impl Iterator<Item = (&ToolParameter, StorageBinding)> {
        self.parameters
            .iter()
            .filter_map(|p| p.storage_binding().map(|b| (p, b)))
    }
}

/// A call to an operation with raw, untyped arguments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the operation to call
    #[serde(alias = "name", alias = "operation_name")]
    pub tool_name: String,
    /// Arguments as received from the client
    #[serde(default, deserialize_with = "null_as_empty_map")]
    pub arguments: Map<String, Value>,
}

fn null_as_empty_map<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments: Map::new(),
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    pub fn with_arguments(mut self, arguments: Map<String, Value>) -> Self {
        self.arguments = arguments;
        self
    }
}
