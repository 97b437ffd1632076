//! Application layer for gis-mcp
//!
//! This crate contains the operation registry, the dispatcher and catalog
//! use cases, and the port definitions adapters implement.
//! It depends only on the domain layer.

pub mod ports;
pub mod registry;
pub mod use_cases;

// Re-export commonly used types
pub use ports::{
    invocation_logger::{InvocationLogger, InvocationRecord, NoInvocationLogger},
    operation::{
        Artifact, HandlerContext, HandlerResult, OperationError, OperationHandler, OperationOutput,
    },
    storage_resolver::{StorageError, StorageResolverPort},
    tool_schema::ToolSchemaPort,
};
pub use registry::{OperationDescriptor, OperationProvider, OperationRegistry};
pub use use_cases::export_catalog::{CatalogEntry, ExportCatalogUseCase};
pub use use_cases::invoke_operation::InvokeOperationUseCase;
