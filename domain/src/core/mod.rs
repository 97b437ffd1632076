//! Core domain concepts shared across all subdomains.
//!
//! - [`error::RegistryError`]: registry construction and lookup errors

pub mod error;
