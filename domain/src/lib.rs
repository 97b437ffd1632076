//! Domain layer for gis-mcp
//!
//! This crate contains the operation schemas, argument coercion rules and the
//! result envelope. It has no dependencies on infrastructure or presentation
//! concerns.
//!
//! # Core Concepts
//!
//! - **Operation**: a named, schema-described callable capability
//!   ([`ToolDefinition`])
//! - **Envelope**: the uniform success/error wrapper returned for every
//!   invocation ([`ResultEnvelope`])
//! - **Storage layout**: the fixed category subdirectories of the storage
//!   root ([`StorageCategory`])

pub mod core;
pub mod storage;
pub mod tool;
pub mod util;

// Re-export commonly used types
pub use core::error::RegistryError;
pub use storage::{PathRole, StorageBinding, StorageCategory, UnknownCategory};
pub use tool::{
    arguments::{ArgumentAccessError, ToolArguments},
    coercion::{CoercionError, coerce},
    entities::{
        CONVENTIONAL_OUTPUT_PARAMETERS, OperationGroup, ParameterKind, ToolCall, ToolDefinition,
        ToolParameter,
    },
    traits::{ArgumentValidator, DefaultArgumentValidator, ValidationError},
    value_objects::{ErrorKind, ResultEnvelope, ToolError},
};
