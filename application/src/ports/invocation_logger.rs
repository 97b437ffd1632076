//! Port for the invocation journal.
//!
//! One [`InvocationRecord`] per dispatched call: which operation ran, how it
//! ended and how long it took. Arguments and result data are never recorded.
//! Human-readable diagnostics stay on `tracing`.

use gis_mcp_domain::{ErrorKind, ResultEnvelope};
use serde::Serialize;

/// Outcome of a single dispatch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvocationRecord {
    pub operation: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub elapsed_ms: u64,
}

impl InvocationRecord {
    pub fn from_envelope(operation: impl Into<String>, envelope: &ResultEnvelope, elapsed_ms: u64) -> Self {
        Self {
            operation: operation.into(),
            status: envelope.status(),
            error_kind: envelope.error_kind(),
            elapsed_ms,
        }
    }
}

/// Sink for invocation records.
///
/// `record` is synchronous and non-fallible; a failing journal must never
/// turn a successful invocation into an error.
pub trait InvocationLogger: Send + Sync {
    fn record(&self, record: &InvocationRecord);
}

/// Used when the journal is disabled
pub struct NoInvocationLogger;

impl InvocationLogger for NoInvocationLogger {
    fn record(&self, _record: &InvocationRecord) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use gis_mcp_domain::ToolError;
    use serde_json::json;

    #[test]
    fn test_record_from_failure() {
        let envelope = ResultEnvelope::failure(ToolError::unknown_operation("nope"));
        let record = InvocationRecord::from_envelope("nope", &envelope, 2);
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"operation": "nope", "status": "error", "error_kind": "unknown_operation", "elapsed_ms": 2})
        );
    }

    #[test]
    fn test_success_omits_error_kind() {
        let envelope = ResultEnvelope::success(json!(1));
        let record = InvocationRecord::from_envelope("get_area", &envelope, 0);
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("error_kind").is_none());
        assert_eq!(value["status"], "success");
    }
}
