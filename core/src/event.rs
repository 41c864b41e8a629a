//! Commit and dispatch call shapes.
//!
//! Callers may name a handler type directly (`commit("cart/add", payload)`)
//! or pass an object carrying its own `type` field
//! (`commit(json!({ "type": "cart/add", "id": 3 }), Value::Null)`). Both
//! shapes normalize into a [`Record`].

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// First argument of `commit`/`dispatch`, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum CallType {
    Named(String),
    Object(Value),
}

impl From<&str> for CallType {
    fn from(kind: &str) -> Self {
        CallType::Named(kind.to_string())
    }
}

impl From<String> for CallType {
    fn from(kind: String) -> Self {
        CallType::Named(kind)
    }
}

impl From<&String> for CallType {
    fn from(kind: &String) -> Self {
        CallType::Named(kind.clone())
    }
}

impl From<Value> for CallType {
    fn from(value: Value) -> Self {
        match value {
            Value::String(kind) => CallType::Named(kind),
            other => CallType::Object(other),
        }
    }
}

impl CallType {
    /// Resolve the handler type and payload.
    ///
    /// In object style the object itself is the payload and the separate
    /// `payload` argument is ignored. A missing or non-string `type` is fatal.
    pub fn normalize(self, payload: Value) -> Result<Record, StoreError> {
        match self {
            CallType::Named(kind) => Ok(Record { kind, payload }),
            CallType::Object(object) => match object.get("type") {
                Some(Value::String(kind)) => Ok(Record {
                    kind: kind.clone(),
                    payload: object,
                }),
                Some(other) => Err(StoreError::InvalidType {
                    found: value_kind(other),
                }),
                None => Err(StoreError::InvalidType {
                    found: value_kind(&object),
                }),
            },
        }
    }
}

/// A normalized mutation or action, as handed to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Value,
}

pub type MutationRecord = Record;
pub type ActionRecord = Record;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitOptions {
    /// From a local context: commit the type as given, without the namespace prefix.
    pub root: bool,
    /// Accepted for compatibility only; produces a diagnostic and has no effect.
    pub silent: bool,
}

impl CommitOptions {
    pub fn root() -> Self {
        Self {
            root: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOptions {
    /// From a local context: dispatch the type as given, without the namespace prefix.
    pub root: bool,
}

impl DispatchOptions {
    pub fn root() -> Self {
        Self { root: true }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
