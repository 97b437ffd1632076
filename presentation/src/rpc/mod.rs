//! JSON-RPC protocol and the shared gateway service

pub mod protocol;
pub mod service;
