//! Tool domain module
//!
//! Pure definitions for the operation catalog and the dispatch pipeline:
//!
//! ```text
//! ┌────────────────┐   ┌────────────────┐   ┌────────────────┐   ┌────────────────┐
//! │ ToolCall       │──▶│ ArgumentValid- │──▶│ ToolArguments  │──▶│ ResultEnvelope │
//! │ (raw request)  │   │ ator (coerce)  │   │ (prepared)     │   │ (outcome)      │
//! └────────────────┘   └───────┬────────┘   └────────────────┘   └────────────────┘
//!                              │
//!                        ToolDefinition
//!                     (ParameterKind per param)
//! ```
//!
//! # Key Types
//!
//! - [`ToolDefinition`]: name, description, group and ordered parameter schema
//! - [`ToolParameter`]: one declared parameter, with optional storage binding
//! - [`ParameterKind`]: tagged kind driving [`coercion::coerce`]
//! - [`ToolCall`]: an invocation request with untyped arguments
//! - [`ToolArguments`]: validated arguments with typed getters
//! - [`ResultEnvelope`]: uniform success/error payload
//!
//! # Architecture
//!
//! - **Domain** (this module): schemas, coercion, envelopes; no I/O
//! - **Application**: registry, dispatcher use case, storage port
//! - **Infrastructure**: filesystem resolver and the operation handlers

pub mod arguments;
pub mod coercion;
pub mod entities;
pub mod traits;
pub mod value_objects;

pub use arguments::{ArgumentAccessError, ToolArguments};
pub use coercion::{CoercionError, coerce};
pub use entities::{OperationGroup, ParameterKind, ToolCall, ToolDefinition, ToolParameter};
pub use traits::{ArgumentValidator, DefaultArgumentValidator, ValidationError};
pub use value_objects::{ErrorKind, ResultEnvelope, ToolError};
