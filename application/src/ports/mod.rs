//! Port definitions (interfaces for external adapters)
//!
//! Ports define the contracts that infrastructure adapters must implement.

pub mod invocation_logger;
pub mod operation;
pub mod storage_resolver;
pub mod tool_schema;
