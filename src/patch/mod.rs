//! Patch Module
//!
//! Generic partial updates for any serde entity. A conforming caller runs the
//! steps in this order: authorize, apply, preserve critical fields,
//! business-validate, persist, invalidate caches. [`PatchPipeline`] bundles
//! the first four.

mod engine;
mod pointer;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::ApiError;

pub use engine::{
    apply_patch_operations, check_ownership_changes, preserve_critical_fields,
    validate_patch_authorization, validate_patched_entity, PatchPipeline, Validator,
};

// == Patch Operation ==
/// One caller-supplied edit. `op` stays a string on the wire so an unknown
/// operation is rejected when applied, not when the body is parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub value: Value,
}

impl PatchOperation {
    pub fn new(op: impl Into<String>, path: impl Into<String>, value: Value) -> Self {
        Self {
            op: op.into(),
            path: path.into(),
            value,
        }
    }

    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self::new("add", path, value)
    }

    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self::new("replace", path, value)
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self::new("remove", path, Value::Null)
    }

    pub fn test(path: impl Into<String>, value: Value) -> Self {
        Self::new("test", path, value)
    }
}

/// Supported operation names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Add,
    Replace,
    Remove,
    Test,
}

impl FromStr for OpKind {
    type Err = PatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(OpKind::Add),
            "replace" => Ok(OpKind::Replace),
            "remove" => Ok(OpKind::Remove),
            "test" => Ok(OpKind::Test),
            other => Err(PatchError::InvalidOperation(other.to_string())),
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OpKind::Add => "add",
            OpKind::Replace => "replace",
            OpKind::Remove => "remove",
            OpKind::Test => "test",
        };
        f.write_str(s)
    }
}

// == Patch Error ==
#[derive(Error, Debug, PartialEq)]
pub enum PatchError {
    #[error("unsupported patch operation '{0}'")]
    InvalidOperation(String),

    #[error("invalid patch path '{0}'")]
    InvalidPath(String),

    #[error("patch target path does not exist: {0}")]
    PathNotFound(String),

    #[error("test operation failed at {0}")]
    TestFailed(String),

    /// The patched document no longer deserializes into the entity type
    #[error("patched value has the wrong type: {0}")]
    TypeMismatch(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("failed to serialize entity: {0}")]
    Serialization(String),
}

impl From<PatchError> for ApiError {
    fn from(err: PatchError) -> Self {
        match err {
            PatchError::Forbidden(msg) => ApiError::Forbidden(msg),
            PatchError::Serialization(_) => ApiError::ServerError(err.to_string()),
            _ => ApiError::InvalidInput(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operation_deserializes_without_value() {
        let op: PatchOperation = serde_json::from_str(r#"{"op":"remove","path":"/description"}"#).unwrap();
        assert_eq!(op, PatchOperation::remove("/description"));
    }

    #[test]
    fn test_unknown_op_name_parses_but_does_not_resolve() {
        let op: PatchOperation =
            serde_json::from_str(r#"{"op":"move","path":"/a","value":1}"#).unwrap();
        assert!(matches!(
            op.op.parse::<OpKind>(),
            Err(PatchError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            ApiError::from(PatchError::Forbidden("no".into())),
            ApiError::Forbidden(_)
        ));
        assert!(matches!(
            ApiError::from(PatchError::TypeMismatch("x".into())),
            ApiError::InvalidInput(_)
        ));
        assert!(matches!(
            ApiError::from(PatchError::ValidationFailed("x".into())),
            ApiError::InvalidInput(_)
        ));
        assert!(matches!(
            ApiError::from(PatchError::Serialization("x".into())),
            ApiError::ServerError(_)
        ));
    }

    #[test]
    fn test_builders() {
        let op = PatchOperation::replace("/name", json!("X"));
        assert_eq!(op.op, "replace");
        assert_eq!(op.value, json!("X"));
    }
}
