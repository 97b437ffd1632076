//! Tool domain value objects: immutable result and error types
//!
//! These types form the **output side** of the dispatch pipeline. Every
//! invocation produces exactly one [`ResultEnvelope`]; failures carry an
//! [`ErrorKind`] that tells the client whether retrying can help.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::util::truncate_str;

/// Upper bound for error messages crossing the transport boundary
pub const MAX_ERROR_MESSAGE_BYTES: usize = 2048;

/// Failure classification surfaced in `ResultEnvelope.error_kind`.
///
/// | Kind | Retryable? | Description |
/// |------|-----------|-------------|
/// | `unknown_operation` | No | Name not in the registry |
/// | `missing_argument` | No | Required parameter omitted |
/// | `invalid_argument` | No | Value could not be coerced to the declared kind |
/// | `storage_access_error` | Yes | Path resolution or directory creation failed |
/// | `operation_error` | No | Handler rejected well-typed input |
/// | `internal_error` | No | Anything unanticipated |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownOperation,
    MissingArgument,
    InvalidArgument,
    StorageAccessError,
    OperationError,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnknownOperation => "unknown_operation",
            ErrorKind::MissingArgument => "missing_argument",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::StorageAccessError => "storage_access_error",
            ErrorKind::OperationError => "operation_error",
            ErrorKind::InternalError => "internal_error",
        }
    }

    /// Only transient storage failures may succeed on an identical retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::StorageAccessError)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error that occurred while dispatching an invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolError {
    pub kind: ErrorKind,
    /// Human-readable, sanitized message
    pub message: String,
}

impl ToolError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind,
            message: truncate_str(&message, MAX_ERROR_MESSAGE_BYTES).to_string(),
        }
    }

    pub fn unknown_operation(name: &str) -> Self {
        Self::new(
            ErrorKind::UnknownOperation,
            format!("Unknown operation: {}", name),
        )
    }

    pub fn missing_argument(parameter: &str, operation: &str) -> Self {
        Self::new(
            ErrorKind::MissingArgument,
            format!(
                "Missing required argument '{}' for operation '{}'",
                parameter, operation
            ),
        )
    }

    pub fn invalid_argument(parameter: &str, reason: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorKind::InvalidArgument,
            format!("Invalid argument '{}': {}", parameter, reason),
        )
    }

    pub fn storage_access(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StorageAccessError, message)
    }

    pub fn operation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::OperationError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InternalError, message)
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::error::Error for ToolError {}

/// Uniform outbound payload of every invocation.
///
/// Serializes as `{"status": "success", "data": …}` or
/// `{"status": "error", "error_kind": "…", "error_message": "…"}`; the enum
/// makes it impossible to populate both halves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ResultEnvelope {
    Success {
        data: Value,
    },
    Error {
        error_kind: ErrorKind,
        error_message: String,
    },
}

impl ResultEnvelope {
    pub fn success(data: Value) -> Self {
        ResultEnvelope::Success { data }
    }

    pub fn failure(error: ToolError) -> Self {
        ResultEnvelope::Error {
            error_kind: error.kind,
            error_message: error.message,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResultEnvelope::Success { .. })
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            ResultEnvelope::Success { data } => Some(data),
            ResultEnvelope::Error { .. } => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ResultEnvelope::Success { .. } => None,
            ResultEnvelope::Error { error_kind, .. } => Some(*error_kind),
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            ResultEnvelope::Success { .. } => None,
            ResultEnvelope::Error { error_message, .. } => Some(error_message),
        }
    }

    pub fn status(&self) -> &'static str {
        if self.is_success() { "success" } else { "error" }
    }
}

impl From<ToolError> for ResultEnvelope {
    fn from(error: ToolError) -> Self {
        ResultEnvelope::failure(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_envelope_shape() {
        let envelope = ResultEnvelope::success(json!({"area": 1.0}));
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json, json!({"status": "success", "data": {"area": 1.0}}));
        assert!(envelope.error_kind().is_none());
    }

    #[test]
    fn test_error_envelope_shape() {
        let envelope = ResultEnvelope::failure(ToolError::unknown_operation("nope"));
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error_kind"], "unknown_operation");
        assert!(json["error_message"].as_str().unwrap().contains("nope"));
        assert!(json.get("data").is_none());
    }

    #[test]
    fn test_envelope_deserialize() {
        let envelope: ResultEnvelope = serde_json::from_value(json!({
            "status": "error",
            "error_kind": "missing_argument",
            "error_message": "Missing required argument 'geometry'"
        }))
        .unwrap();
        assert_eq!(envelope.error_kind(), Some(ErrorKind::MissingArgument));
        assert_eq!(envelope.status(), "error");
    }

    #[test]
    fn test_error_message_is_truncated() {
        let long = "x".repeat(MAX_ERROR_MESSAGE_BYTES * 2);
        let error = ToolError::operation(long);
        assert_eq!(error.message.len(), MAX_ERROR_MESSAGE_BYTES);
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::StorageAccessError.is_retryable());
        assert!(!ErrorKind::MissingArgument.is_retryable());
        assert!(!ErrorKind::InternalError.is_retryable());
    }

    #[test]
    fn test_display() {
        let err = ToolError::invalid_argument("distance", "expected number");
        assert_eq!(
            err.to_string(),
            "[invalid_argument] Invalid argument 'distance': expected number"
        );
    }
}
