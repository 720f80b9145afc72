use crate::store::StoreError;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path that caused the error (e.g., "general_rating.score", "provider.base_url")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "orchestrator", "openai_provider")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the analysis core.
///
/// Only `Provider`, `ProviderTimeout`, `Validation` and `Persistence` can end an
/// orchestration call. Cache and store failures on the analysis path are absorbed
/// and logged; `Store` is only returned by the read-only history/lookup surface.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {message}{}", format_context(.context))]
    Provider {
        message: String,
        context: ErrorContext,
    },

    #[error("Provider timed out after {timeout_ms}ms")]
    ProviderTimeout { timeout_ms: u64 },

    #[error("Analysis validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Persistence error: {message}{}", format_context(.context))]
    Persistence {
        message: String,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Network transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a new provider error with structured context
    pub fn provider_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Provider {
            message: msg.into(),
            context,
        }
    }

    /// Create a new validation error with structured context
    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    /// Create a new persistence error with structured context
    pub fn persistence_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Persistence {
            message: msg.into(),
            context,
        }
    }

    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Provider { context, .. }
            | Error::Validation { context, .. }
            | Error::Persistence { context, .. }
            | Error::Configuration { context, .. } => Some(context),
            _ => None,
        }
    }

    /// True for the terminal provider-side categories (unavailable analysis).
    pub fn is_provider_failure(&self) -> bool {
        matches!(self, Error::Provider { .. } | Error::ProviderTimeout { .. })
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_context() {
        let err = Error::validation_with_context(
            "expected number",
            ErrorContext::new()
                .with_field_path("general_rating.score")
                .with_source("report"),
        );
        let msg = err.to_string();
        assert!(msg.contains("expected number"));
        assert!(msg.contains("field: general_rating.score"));
        assert!(msg.contains("source: report"));
    }

    #[test]
    fn test_display_without_context() {
        let err = Error::provider_with_context("empty output", ErrorContext::new());
        assert_eq!(err.to_string(), "Provider error: empty output");
        assert!(err.is_provider_failure());
        assert!(Error::ProviderTimeout { timeout_ms: 10 }.is_provider_failure());
    }

    #[test]
    fn test_store_error_converts() {
        let err: Error = StoreError::Backend("connection refused".into()).into();
        assert!(matches!(err, Error::Store(_)));
        assert!(err.context().is_none());
    }
}
