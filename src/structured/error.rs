//! Error type for provider payload validation.

use crate::{Error, ErrorContext};
use std::fmt;

/// Validation failure with the JSON path of the offending field.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub message: String,
    /// Dotted path to the field (e.g. `general_rating.score`,
    /// `nutritional_information.per_100g.protein`).
    pub path: String,
    /// The rejected value, if any.
    pub value: Option<serde_json::Value>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: path.into(),
            value: None,
        }
    }

    pub fn malformed(path: impl Into<String>, expected: &str, value: &serde_json::Value) -> Self {
        Self {
            message: format!("expected {}, found {}", expected, json_type(value)),
            path: path.into(),
            value: Some(value.clone()),
        }
    }

    pub fn required(path: impl Into<String>) -> Self {
        Self::new("required field is missing or null", path)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        let mut context = ErrorContext::new().with_source("analysis_report");
        if !e.path.is_empty() {
            context = context.with_field_path(e.path);
        }
        if let Some(v) = e.value {
            context = context.with_details(format!("value: {}", v));
        }
        Error::validation_with_context(e.message, context)
    }
}

pub(crate) fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

pub type ValidationResult<T> = std::result::Result<T, ValidationError>;
