//! Operation handler port
//!
//! A handler is the pure function behind one catalog entry. It receives the
//! prepared [`ToolArguments`] (coerced, defaulted, paths resolved) and returns
//! an [`OperationOutput`] or an [`OperationError`]. Handlers are synchronous;
//! the dispatcher runs them on the blocking pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use gis_mcp_domain::{ArgumentAccessError, StorageCategory, ToolArguments};
use serde_json::{Map, Value};
use thiserror::Error;

use super::storage_resolver::{StorageError, StorageResolverPort};

/// Failure raised by a handler
#[derive(Error, Debug)]
pub enum OperationError {
    /// The handler rejected well-typed input (invalid geometry, unsupported CRS, ...)
    #[error("{0}")]
    Domain(String),

    /// The handler could not resolve or create a storage location
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Anything the handler did not anticipate
    #[error("{0}")]
    Internal(String),
}

impl OperationError {
    pub fn domain(message: impl Into<String>) -> Self {
        OperationError::Domain(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        OperationError::Internal(message.into())
    }

    /// File I/O failure while reading or writing a handler's artifact
    pub fn io(context: &str, path: &Path, err: std::io::Error) -> Self {
        OperationError::Domain(format!("{} {}: {}", context, path.display(), err))
    }
}

/// A schema/handler mismatch is the handler's bug, not the client's.
impl From<ArgumentAccessError> for OperationError {
    fn from(err: ArgumentAccessError) -> Self {
        OperationError::Internal(err.to_string())
    }
}

/// Summary of a file written by a handler.
///
/// Reported to the client as `{"path": …, "format": …, …metadata}` rather
/// than raw bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub path: PathBuf,
    pub format: String,
    pub metadata: Map<String, Value>,
}

impl Artifact {
    pub fn new(path: impl Into<PathBuf>, format: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            format: format.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert(
            "path".to_string(),
            Value::String(self.path.display().to_string()),
        );
        object.insert("format".to_string(), Value::String(self.format.clone()));
        for (key, value) in &self.metadata {
            object.insert(key.clone(), value.clone());
        }
        Value::Object(object)
    }
}

/// Successful handler result before envelope normalization
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutput {
    /// Already-normalized JSON (primitives, geometry `{"wkt": …}`, tables)
    Value(Value),
    /// One file written to storage
    Artifact(Artifact),
    /// Several files written by one call (e.g. `save_results` with many formats)
    Artifacts(Vec<Artifact>),
}

impl OperationOutput {
    /// Normalized representation placed in `ResultEnvelope.data`
    pub fn into_data(self) -> Value {
        match self {
            OperationOutput::Value(value) => value,
            OperationOutput::Artifact(artifact) => artifact.to_json(),
            OperationOutput::Artifacts(artifacts) => {
                Value::Array(artifacts.iter().map(Artifact::to_json).collect())
            }
        }
    }
}

impl From<Value> for OperationOutput {
    fn from(value: Value) -> Self {
        OperationOutput::Value(value)
    }
}

impl From<Artifact> for OperationOutput {
    fn from(artifact: Artifact) -> Self {
        OperationOutput::Artifact(artifact)
    }
}

/// Services a handler may use beyond its arguments
#[derive(Clone)]
pub struct HandlerContext {
    pub storage: Arc<dyn StorageResolverPort>,
}

impl HandlerContext {
    pub fn new(storage: Arc<dyn StorageResolverPort>) -> Self {
        Self { storage }
    }

    /// Shortcut for a category directory under the storage root
    pub fn category_dir(&self, category: StorageCategory) -> Result<PathBuf, OperationError> {
        Ok(self.storage.category_dir(category)?)
    }
}

pub type HandlerResult = Result<OperationOutput, OperationError>;

/// The function behind one operation
pub trait OperationHandler: Send + Sync {
    fn call(&self, args: &ToolArguments, ctx: &HandlerContext) -> HandlerResult;
}

impl<F> OperationHandler for F
where
    F: Fn(&ToolArguments, &HandlerContext) -> HandlerResult + Send + Sync,
{
    fn call(&self, args: &ToolArguments, ctx: &HandlerContext) -> HandlerResult {
        self(args, ctx)
    }
}
