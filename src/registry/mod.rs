// Handler registry: (resource type, operation name) → invocable + output flag.
// Filled once at startup from static handler-group tables, read-only afterwards.

pub mod operation;

pub use operation::{
    invocable, HandlerGroup, Invocable, Operation, OperationError, OperationFuture, OperationResult,
};

use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::debug;

use crate::routing::ResourceType;

/// Marks operations a group keeps to itself
pub const INTERNAL_PREFIX: char = '_';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Handler for {resource_type}/{name} already exists")]
    Duplicate {
        resource_type: ResourceType,
        name: String,
    },

    #[error("No handler for {resource_type}/{name}")]
    NotFound {
        resource_type: ResourceType,
        name: String,
    },
}

/// A registered operation, ready to submit to a collection worker
#[derive(Clone)]
pub struct RegisteredOperation {
    pub invocable: Invocable,
    pub produces_output: bool,
}

impl fmt::Debug for RegisteredOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredOperation")
            .field("produces_output", &self.produces_output)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<ResourceType, HashMap<String, RegisteredOperation>>,
}

impl HandlerRegistry {
    /// Create an empty registry; see [`HandlerRegistry::with_default_handlers`]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in collection/model/note/deck/card groups
    pub fn with_default_handlers() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        crate::handlers::register_defaults(&mut registry)?;
        Ok(registry)
    }

    /// Register a single operation. Fails if the pair is taken, leaving the
    /// existing entry untouched.
    pub fn register(
        &mut self,
        resource_type: ResourceType,
        name: impl Into<String>,
        invocable: Invocable,
        produces_output: bool,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        let operations = self.handlers.entry(resource_type).or_default();
        if operations.contains_key(&name) {
            return Err(RegistryError::Duplicate {
                resource_type,
                name,
            });
        }

        debug!("Registered operation '{}/{}' (output: {})", resource_type, name, produces_output);
        operations.insert(
            name,
            RegisteredOperation {
                invocable,
                produces_output,
            },
        );
        Ok(())
    }

    /// Register every public operation of `group`. Returns how many were added.
    ///
    /// Stops at the first duplicate; operations registered before it stay registered.
    pub fn register_group(
        &mut self,
        resource_type: ResourceType,
        group: &dyn HandlerGroup,
    ) -> Result<usize, RegistryError> {
        let default_output = group.produces_output();
        let mut count = 0;

        for operation in group.operations() {
            if operation.name.starts_with(INTERNAL_PREFIX) {
                continue;
            }
            let produces_output = operation.produces_output.unwrap_or(default_output);
            self.register(resource_type, operation.name, operation.invocable, produces_output)?;
            count += 1;
        }

        debug!("Registered {} operations from group {} for {}", count, group.name(), resource_type);
        Ok(count)
    }

    pub fn lookup(
        &self,
        resource_type: ResourceType,
        name: &str,
    ) -> Result<&RegisteredOperation, RegistryError> {
        self.handlers
            .get(&resource_type)
            .and_then(|operations| operations.get(name))
            .ok_or_else(|| RegistryError::NotFound {
                resource_type,
                name: name.to_string(),
            })
    }

    /// Sorted operation names registered for `resource_type`
    pub fn operation_names(&self, resource_type: ResourceType) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .handlers
            .get(&resource_type)
            .map(|operations| operations.keys().map(String::as_str).collect())
            .unwrap_or_default();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
