//! Error types surfaced to native callers.
//!
//! Every failure that crosses the embedding boundary is reported as a
//! [`BridgeError`]: a tagged error value with a kind, an optional numeric
//! code, and a human-readable message.

use thiserror::Error;

/// The kind of bridge failure.
///
/// These correspond to the distinct failure channels of the embedding layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The engine reported an exception while running submitted source or a
    /// call; the message carries the engine's description and stack.
    EvaluationFailed,
    /// Dot-path resolution failed; the message names the first unresolved
    /// segment.
    FunctionNotFound,
    /// A native⇄script value decode did not succeed.
    ConversionFailed,
    /// A bridged promise settled with a rejection.
    PromiseFailed,
    /// Promise bridging could not observe a settlement (e.g. the called
    /// function did not return a thenable).
    PromiseReturnedEmpty,
    /// A request-level network failure, surfaced through the `error` event
    /// channel rather than thrown.
    NetworkError,
}

impl ErrorKind {
    /// Stable name for the kind, used in messages and event payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::EvaluationFailed => "EvaluationFailed",
            ErrorKind::FunctionNotFound => "FunctionNotFound",
            ErrorKind::ConversionFailed => "ConversionFailed",
            ErrorKind::PromiseFailed => "PromiseFailed",
            ErrorKind::PromiseReturnedEmpty => "PromiseReturnedEmpty",
            ErrorKind::NetworkError => "NetworkError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tagged error value delivered across the embedding boundary.
///
/// # Examples
///
/// ```
/// use core_types::{BridgeError, ErrorKind};
///
/// let error = BridgeError::new(ErrorKind::FunctionNotFound, "segment `foo` is undefined");
/// assert_eq!(error.kind, ErrorKind::FunctionNotFound);
/// assert!(error.code.is_none());
/// ```
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{kind}: {message}")]
pub struct BridgeError {
    /// The failure channel this error belongs to.
    pub kind: ErrorKind,
    /// Optional numeric code (e.g. an HTTP status).
    pub code: Option<i64>,
    /// Human-readable description.
    pub message: String,
}

impl BridgeError {
    /// Creates an error with the given kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    /// Attaches a numeric code to the error.
    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

    /// Shorthand for an [`ErrorKind::EvaluationFailed`] error.
    pub fn evaluation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::EvaluationFailed, message)
    }

    /// Shorthand for an [`ErrorKind::FunctionNotFound`] error naming the
    /// first unresolved path segment.
    pub fn function_not_found(segment: &str) -> Self {
        Self::new(
            ErrorKind::FunctionNotFound,
            format!("path segment `{}` did not resolve to a defined value", segment),
        )
    }

    /// Shorthand for an [`ErrorKind::ConversionFailed`] error.
    pub fn conversion_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConversionFailed, message)
    }
}
