//! Tool domain traits
//!
//! Contains pure domain logic for argument validation.
//! Path rewriting needs the filesystem and therefore lives in the
//! application layer (`StorageResolverPort`).

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use super::arguments::ToolArguments;
use super::coercion::{CoercionError, coerce};
use super::entities::ToolDefinition;
use super::value_objects::ToolError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Missing required argument '{parameter}' for operation '{operation}'")]
    MissingArgument { parameter: String, operation: String },

    #[error("Invalid argument '{parameter}': {source}")]
    InvalidArgument {
        parameter: String,
        #[source]
        source: CoercionError,
    },
}

impl From<ValidationError> for ToolError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::MissingArgument {
                parameter,
                operation,
            } => ToolError::missing_argument(&parameter, &operation),
            ValidationError::InvalidArgument { parameter, source } => {
                ToolError::invalid_argument(&parameter, source)
            }
        }
    }
}

/// Validator for raw invocation arguments
///
/// This is a pure domain trait that checks and coerces arguments
/// against an operation definition without any I/O operations.
pub trait ArgumentValidator {
    /// Produce the prepared argument mapping, or the first validation failure
    /// in parameter declaration order.
    fn prepare(
        &self,
        definition: &ToolDefinition,
        raw: &Map<String, Value>,
    ) -> Result<ToolArguments, ValidationError>;
}

/// Default implementation of ArgumentValidator
///
/// - `null` for a non-optional parameter counts as absent
/// - absent optional parameters get their declared default, or are omitted
/// - arguments the schema does not declare are dropped
#[derive(Debug, Clone, Default)]
pub struct DefaultArgumentValidator;

impl ArgumentValidator for DefaultArgumentValidator {
    fn prepare(
        &self,
        definition: &ToolDefinition,
        raw: &Map<String, Value>,
    ) -> Result<ToolArguments, ValidationError> {
        let mut prepared = ToolArguments::new();

        for param in &definition.parameters {
            let supplied = raw
                .get(&param.name)
                .filter(|v| !v.is_null() || param.kind.is_optional());

            match supplied {
                Some(value) if !value.is_null() => {
                    let coerced = coerce(&param.kind, value).map_err(|source| {
                        ValidationError::InvalidArgument {
                            parameter: param.name.clone(),
                            source,
                        }
                    })?;
                    prepared.insert(param.name.clone(), coerced);
                }
                // Explicit null on an optional parameter
                Some(_) => {
                    let value = param.default.clone().unwrap_or(Value::Null);
                    prepared.insert(param.name.clone(), value);
                }
                None if param.required => {
                    return Err(ValidationError::MissingArgument {
                        parameter: param.name.clone(),
                        operation: definition.name.clone(),
                    });
                }
                None => {
                    if let Some(default) = &param.default {
                        prepared.insert(param.name.clone(), default.clone());
                    }
                }
            }
        }

        for name in raw.keys() {
            if definition.parameter(name).is_none() {
                debug!(operation = %definition.name, argument = %name, "Ignoring undeclared argument");
            }
        }

        Ok(prepared)
    }
}
