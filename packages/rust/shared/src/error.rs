//! Error types for esbridge.
//!
//! Library crates use [`EsBridgeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all esbridge operations.
///
/// Every variant is fatal to the current invocation: the pipelines never skip
/// a record and carry on.
#[derive(Debug, thiserror::Error)]
pub enum EsBridgeError {
    /// A time expression matched none of the supported grammars.
    #[error("invalid time expression '{expr}': {reason}")]
    InvalidTimeExpression { expr: String, reason: String },

    /// A document timestamp did not have the `YYYY-MM-DDTHH:MM:SS.ffffffZ` shape.
    #[error("timestamp '{value}' does not match YYYY-MM-DDTHH:MM:SS.ffffffZ")]
    TimestampFormat { value: String },

    /// The current record lacks a configured correlation field.
    #[error("record {record} is missing correlation field '{field}'")]
    MissingCorrelationField { record: usize, field: String },

    /// Neither a configured target nor the routing field on the record was available.
    #[error("record {record}: no {target} given via '{option}' or record field '{field}'")]
    MissingRoutingField {
        record: usize,
        target: &'static str,
        option: &'static str,
        field: String,
    },

    /// The record lacks the configured id field.
    #[error("record {record} is missing id field '{field}'")]
    MissingIdField { record: usize, field: String },

    /// Persisted configuration could not be read or parsed.
    #[error("config error: {message}")]
    ConfigLoad { message: String },

    /// Network failure or an error reported by the search backend.
    #[error("backend error: {message}")]
    Backend {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Filesystem or stream I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A row on the input stream could not be decoded.
    #[error("parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Invalid option value or record content.
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, EsBridgeError>;

impl EsBridgeError {
    /// Create a config load error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigLoad {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create an invalid time expression error.
    pub fn time_expr(expr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTimeExpression {
            expr: expr.into(),
            reason: reason.into(),
        }
    }

    /// Create a backend error without an underlying transport error.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a backend error wrapping the transport error that caused it.
    pub fn backend_with(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Backend {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
