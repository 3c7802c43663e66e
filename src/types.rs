/// Shared types used across the codebase

use serde_json::{Map, Value};

/// Decoded JSON request body handed to every operation.
/// Keys are plain strings; values are left untyped for the operation to interpret.
pub type RequestData = Map<String, Value>;

/// Result of a single operation run against a collection.
/// `None` means "nothing to return" and is rendered as an empty 200.
pub type OperationOutput = Option<Value>;
