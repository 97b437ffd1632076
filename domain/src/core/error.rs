//! Domain error types

use thiserror::Error;

/// Errors raised while building or querying the operation registry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Operation '{0}' is already registered")]
    DuplicateOperation(String),

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),
}

impl RegistryError {
    /// Name of the operation the error refers to
    pub fn operation_name(&self) -> &str {
        match self {
            RegistryError::DuplicateOperation(name) | RegistryError::UnknownOperation(name) => {
                name
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_error_display() {
        let error = RegistryError::DuplicateOperation("buffer".to_string());
        assert_eq!(error.to_string(), "Operation 'buffer' is already registered");
        assert_eq!(error.operation_name(), "buffer");
    }

    #[test]
    fn test_unknown_error_display() {
        let error = RegistryError::UnknownOperation("nonexistent_tool_xyz".to_string());
        assert_eq!(error.to_string(), "Unknown operation: nonexistent_tool_xyz");
    }
}
