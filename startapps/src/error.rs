//! Typed errors for malformed driver input.

use thiserror::Error;

/// Input shapes the driver refuses to work with.
///
/// These are always fatal: they unwind the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    /// An app reference that is neither a path string nor a `{source, name}` mapping.
    #[error("invalid app reference: {0}")]
    InvalidReference(String),
    /// An answer list (or nested `questions`/`answers` field) with the wrong shape.
    #[error("malformed answers: {0}")]
    MalformedAnswers(String),
}

/// Short type name of a dynamic value, for error messages.
pub(crate) fn type_name(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}
