use serde_json::Value;

use crate::registry::OperationError;
use crate::routing::ResourceType;
use crate::types::RequestData;

/// Optional string key; present but not a string is an error
pub fn optional_str<'a>(
    data: &'a RequestData,
    key: &'static str,
) -> Result<Option<&'a str>, OperationError> {
    match data.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(OperationError::InvalidValue {
            key,
            expected: "a string",
        }),
    }
}

pub fn require_str<'a>(data: &'a RequestData, key: &'static str) -> Result<&'a str, OperationError> {
    optional_str(data, key)?.ok_or(OperationError::MissingKey(key))
}

/// Integer key, given either as a JSON number or a numeric string
pub fn require_i64(data: &RequestData, key: &'static str) -> Result<i64, OperationError> {
    let invalid = OperationError::InvalidValue {
        key,
        expected: "an integer",
    };
    match data.get(key) {
        None | Some(Value::Null) => Err(OperationError::MissingKey(key)),
        Some(Value::Number(n)) => n.as_i64().ok_or(invalid),
        Some(Value::String(s)) => s.trim().parse().map_err(|_| invalid),
        Some(_) => Err(invalid),
    }
}

/// Loose truthiness for flags like `preload`: missing, null, false, 0, "" and empty containers are false
pub fn flag(data: &RequestData, key: &str) -> bool {
    match data.get(key) {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

/// Parse the path id at `index` as a store id of `kind`
pub fn path_id(ids: &[String], index: usize, kind: ResourceType) -> Result<i64, OperationError> {
    let raw = ids.get(index).ok_or(OperationError::MissingId(kind))?;
    raw.parse().map_err(|_| OperationError::InvalidId {
        kind,
        value: raw.clone(),
    })
}

/// The innermost id in the path, i.e. the one the operation's resource type refers to
pub fn last_path_id(ids: &[String], kind: ResourceType) -> Result<i64, OperationError> {
    match ids.len() {
        0 => Err(OperationError::MissingId(kind)),
        n => path_id(ids, n - 1, kind),
    }
}
