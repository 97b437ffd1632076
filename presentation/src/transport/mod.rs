//! Transport adapters
//!
//! - [`stdio`]: one client, newline-delimited JSON-RPC over stdin/stdout
//! - [`http`]: many clients over an axum listener

pub mod http;
pub mod stdio;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}
