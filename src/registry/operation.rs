use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::database::{Collection, StoreError};
use crate::routing::ResourceType;
use crate::types::{OperationOutput, RequestData};

/// Errors an operation reports back through the executor
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("Missing required key '{0}'")]
    MissingKey(&'static str),

    #[error("Key '{key}' must be {expected}")]
    InvalidValue { key: &'static str, expected: &'static str },

    #[error("Path has no {0} id")]
    MissingId(ResourceType),

    #[error("Invalid {kind} id: {value}")]
    InvalidId { kind: ResourceType, value: String },

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type OperationResult = Result<OperationOutput, OperationError>;

pub type OperationFuture<'a> = BoxFuture<'a, OperationResult>;

/// Something that can run against an open collection with `(data, ids)`.
pub type Invocable =
    Arc<dyn for<'a> Fn(&'a mut Collection, RequestData, Vec<String>) -> OperationFuture<'a> + Send + Sync>;

/// Wrap a function or closure as an [`Invocable`].
///
/// Going through this bound lets closures borrow the collection in the future they return.
pub fn invocable<F>(f: F) -> Invocable
where
    F: for<'a> Fn(&'a mut Collection, RequestData, Vec<String>) -> OperationFuture<'a>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// One entry in a handler group's operation table.
pub struct Operation {
    pub name: String,
    pub invocable: Invocable,
    /// Overrides the group default when set
    pub produces_output: Option<bool>,
}

impl Operation {
    pub fn new<F>(name: impl Into<String>, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Collection, RequestData, Vec<String>) -> OperationFuture<'a>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            invocable: invocable(f),
            produces_output: None,
        }
    }

    /// The operation's result is discarded and the response is an empty 200.
    pub fn no_output(mut self) -> Self {
        self.produces_output = Some(false);
        self
    }

    pub fn with_output(mut self) -> Self {
        self.produces_output = Some(true);
        self
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("produces_output", &self.produces_output)
            .finish_non_exhaustive()
    }
}

/// A named set of related operations registered under one resource type.
///
/// Operations whose name starts with `_` are private to the group and never registered.
pub trait HandlerGroup: Send + Sync {
    fn name(&self) -> &'static str;

    /// Default for operations that don't set `produces_output` themselves
    fn produces_output(&self) -> bool {
        true
    }

    fn operations(&self) -> Vec<Operation>;
}
