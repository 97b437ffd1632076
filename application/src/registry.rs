//! Operation Registry
//!
//! The [`OperationRegistry`] owns every [`OperationDescriptor`] the gateway
//! exposes. It is built once at startup by registering each capability
//! group's [`OperationProvider`] and is read-only afterwards, so it can be
//! shared behind an `Arc` without locking.
//!
//! # Usage
//!
//! ```ignore
//! let mut registry = OperationRegistry::new();
//! registry.register_provider(&GeometryProvider::new())?;   // buffer, union, ...
//! registry.register_provider(&ProjectionProvider::new())?; // transform_coordinates, ...
//!
//! let descriptor = registry.lookup("buffer")?;
//! ```
//!
//! # Ordering
//!
//! Iteration follows registration order. The order is stable across calls
//! but carries no meaning beyond catalog presentation.

use std::collections::HashSet;
use std::sync::Arc;

use gis_mcp_domain::{OperationGroup, RegistryError, ToolDefinition};
use indexmap::IndexMap;
use tracing::debug;

use crate::ports::operation::OperationHandler;

/// One callable capability: its schema plus the function behind it
#[derive(Clone)]
pub struct OperationDescriptor {
    pub definition: ToolDefinition,
    pub handler: Arc<dyn OperationHandler>,
}

impl OperationDescriptor {
    pub fn new(definition: ToolDefinition, handler: impl OperationHandler + 'static) -> Self {
        Self {
            definition,
            handler: Arc::new(handler),
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }
}

impl std::fmt::Debug for OperationDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationDescriptor")
            .field("name", &self.definition.name)
            .field("group", &self.definition.group)
            .field("parameters", &self.definition.parameters.len())
            .finish()
    }
}

/// A capability group contributing operations to the registry
///
/// Each group (geometry, projection, vector, ...) implements this once and is
/// registered explicitly during startup composition.
pub trait OperationProvider: Send + Sync {
    /// Unique identifier used in logs
    fn id(&self) -> &str;

    /// Capability group of every operation this provider contributes
    fn group(&self) -> OperationGroup;

    /// Build the provider's descriptors
    fn operations(&self) -> Vec<OperationDescriptor>;
}

/// Name-keyed, insertion-ordered set of operations
#[derive(Debug, Default)]
pub struct OperationRegistry {
    operations: IndexMap<String, OperationDescriptor>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a descriptor. Fails if the name is already taken.
    pub fn register(&mut self, descriptor: OperationDescriptor) -> Result<(), RegistryError> {
        let name = descriptor.definition.name.clone();
        if self.operations.contains_key(&name) {
            return Err(RegistryError::DuplicateOperation(name));
        }
        self.operations.insert(name, descriptor);
        Ok(())
    }

    /// Register every operation of a provider; returns how many were added.
    ///
    /// All or nothing: on a name collision, within the provider or with an
    /// earlier registration, the registry is left unchanged.
    pub fn register_provider(
        &mut self,
        provider: &dyn OperationProvider,
    ) -> Result<usize, RegistryError> {
        let operations = provider.operations();
        let mut seen = HashSet::with_capacity(operations.len());
        for descriptor in &operations {
            let name = descriptor.name();
            if self.operations.contains_key(name) || !seen.insert(name) {
                return Err(RegistryError::DuplicateOperation(name.to_string()));
            }
        }

        let count = operations.len();
        for descriptor in operations {
            debug!(
                operation = %descriptor.name(),
                provider = provider.id(),
                "Registered operation"
            );
            self.operations
                .insert(descriptor.definition.name.clone(), descriptor);
        }
        Ok(count)
    }

    pub fn lookup(&self, name: &str) -> Result<&OperationDescriptor, RegistryError> {
        self.operations
            .get(name)
            .ok_or_else(|| RegistryError::UnknownOperation(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    /// Descriptors in registration order; restartable (call again for a fresh pass)
    pub fn list_all(&self) -> impl Iterator<Item = &OperationDescriptor> {
        self.operations.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Number of operations per capability group
    pub fn stats(&self) -> IndexMap<OperationGroup, usize> {
        let mut counts = IndexMap::new();
        for descriptor in self.operations.values() {
            *counts.entry(descriptor.definition.group).or_insert(0) += 1;
        }
        counts
    }
}
