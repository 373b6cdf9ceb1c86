//! Errors raised while evaluating values.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// A standard library function the evaluator does not model
    #[error("unsupported call {package}.{function}")]
    UnsupportedCall { package: String, function: String },

    #[error("{function} expects {expected} argument(s), found {found}")]
    ArgumentCount {
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("{context}: expected {expected}, found {found}")]
    TypeMismatch {
        context: String,
        expected: &'static str,
        found: String,
    },
}

impl EvalError {
    pub(crate) fn mismatch(
        context: impl Into<String>,
        expected: &'static str,
        found: &serde_json::Value,
    ) -> Self {
        EvalError::TypeMismatch {
            context: context.into(),
            expected,
            found: kind_name(found).to_string(),
        }
    }
}

/// Short name of a JSON value's kind, for error messages.
pub fn kind_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "list",
        serde_json::Value::Object(_) => "struct",
    }
}
