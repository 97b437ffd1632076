//! Invoke Operation use case (the dispatcher).
//!
//! Turns one [`ToolCall`] into exactly one [`ResultEnvelope`]:
//!
//! 1. Look up the descriptor (`unknown_operation`)
//! 2. Coerce arguments and substitute defaults (`missing_argument` / `invalid_argument`)
//! 3. Rewrite storage-bound path arguments through the resolver (`storage_access_error`)
//! 4. Run the handler on the blocking pool
//! 5. Normalize the output, or classify the failure (`operation_error` / `internal_error`)
//!
//! Nothing escapes [`InvokeOperationUseCase::execute`]: handler panics surface
//! as a `JoinError` and become `internal_error` envelopes.

use std::sync::Arc;
use std::time::Instant;

use gis_mcp_domain::{
    ArgumentValidator, DefaultArgumentValidator, ErrorKind, PathRole, ResultEnvelope, ToolArguments,
    ToolCall, ToolDefinition, ToolError, util::truncate_str,
};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::ports::invocation_logger::{InvocationLogger, InvocationRecord, NoInvocationLogger};
use crate::ports::operation::{HandlerContext, OperationError, OperationOutput};
use crate::ports::storage_resolver::StorageResolverPort;
use crate::registry::{OperationDescriptor, OperationRegistry};

/// Use case for dispatching a single invocation.
///
/// Holds no per-invocation state; one instance is shared by every transport
/// session and may be called concurrently.
pub struct InvokeOperationUseCase {
    registry: Arc<OperationRegistry>,
    storage: Arc<dyn StorageResolverPort>,
    validator: Arc<dyn ArgumentValidator + Send + Sync>,
    invocation_logger: Arc<dyn InvocationLogger>,
}

impl Clone for InvokeOperationUseCase {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            storage: self.storage.clone(),
            validator: self.validator.clone(),
            invocation_logger: self.invocation_logger.clone(),
        }
    }
}

impl InvokeOperationUseCase {
    pub fn new(registry: Arc<OperationRegistry>, storage: Arc<dyn StorageResolverPort>) -> Self {
        Self {
            registry,
            storage,
            validator: Arc::new(DefaultArgumentValidator),
            invocation_logger: Arc::new(NoInvocationLogger),
        }
    }

    /// Create with an invocation logger.
    pub fn with_invocation_logger(mut self, logger: Arc<dyn InvocationLogger>) -> Self {
        self.invocation_logger = logger;
        self
    }

    /// Replace the argument validator.
    pub fn with_validator(mut self, validator: Arc<dyn ArgumentValidator + Send + Sync>) -> Self {
        self.validator = validator;
        self
    }

    pub fn registry(&self) -> &Arc<OperationRegistry> {
        &self.registry
    }

    /// Dispatch a call. Always returns an envelope.
    pub async fn execute(&self, call: ToolCall) -> ResultEnvelope {
        let started = Instant::now();
        let operation = call.tool_name.clone();

        let outcome = self.dispatch(call).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let envelope = match outcome {
            Ok(output) => {
                info!(operation = %operation, elapsed_ms, "Operation succeeded");
                ResultEnvelope::success(output.into_data())
            }
            Err(err) => {
                match err.kind {
                    ErrorKind::InternalError => {
                        error!(operation = %operation, elapsed_ms, error = %err.message, "Operation failed unexpectedly")
                    }
                    _ => {
                        warn!(operation = %operation, elapsed_ms, kind = %err.kind, error = %err.message, "Operation failed")
                    }
                }
                ResultEnvelope::failure(err)
            }
        };

        self.invocation_logger
            .record(&InvocationRecord::from_envelope(operation, &envelope, elapsed_ms));

        envelope
    }

    async fn dispatch(&self, call: ToolCall) -> Result<OperationOutput, ToolError> {
        let descriptor = self
            .registry
            .lookup(&call.tool_name)
            .map_err(|_| ToolError::unknown_operation(truncate_str(&call.tool_name, 128)))?
            .clone();

        let args = self
            .validator
            .prepare(&descriptor.definition, &call.arguments)?;

        debug!(
            operation = %descriptor.name(),
            arguments = args.len(),
            "Dispatching operation"
        );

        let storage = self.storage.clone();
        let name = descriptor.name().to_string();

        // Path resolution touches the filesystem, so it runs on the blocking
        // pool together with the handler.
        let joined = tokio::task::spawn_blocking(move || run_handler(&descriptor, args, storage))
            .await;

        match joined {
            Ok(result) => result,
            Err(join_error) => {
                error!(operation = %name, error = %join_error, "Operation handler panicked");
                Err(ToolError::internal(format!(
                    "Operation '{}' terminated unexpectedly",
                    name
                )))
            }
        }
    }
}

fn run_handler(
    descriptor: &OperationDescriptor,
    args: ToolArguments,
    storage: Arc<dyn StorageResolverPort>,
) -> Result<OperationOutput, ToolError> {
    let args = resolve_storage_paths(&descriptor.definition, args, storage.as_ref())?;
    let ctx = HandlerContext::new(storage);

    descriptor
        .handler
        .call(&args, &ctx)
        .map_err(|err| classify(&descriptor.definition.name, err))
}

/// Rewrite every storage-bound argument to its absolute path.
fn resolve_storage_paths(
    definition: &ToolDefinition,
    mut args: ToolArguments,
    storage: &dyn StorageResolverPort,
) -> Result<ToolArguments, ToolError> {
    for (param, binding) in definition.storage_parameters() {
        let Some(raw) = args.get(&param.name).and_then(Value::as_str) else {
            continue;
        };

        let resolved = match binding.role {
            PathRole::Output => storage.resolve(raw, binding.category),
            PathRole::Input => storage.locate(raw, binding.category),
        }
        .map_err(|e| {
            ToolError::storage_access(format!("Argument '{}': {}", param.name, e))
        })?;

        args.insert(
            param.name.clone(),
            Value::String(resolved.display().to_string()),
        );
    }
    Ok(args)
}

fn classify(operation: &str, err: OperationError) -> ToolError {
    match err {
        OperationError::Domain(message) => ToolError::operation(message),
        OperationError::Storage(e) => ToolError::storage_access(e.to_string()),
        OperationError::Internal(message) => {
            error!(operation = %operation, error = %message, "Internal handler error");
            ToolError::internal(format!("Internal error in '{}': {}", operation, message))
        }
    }
}
