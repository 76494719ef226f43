//! Error types for the Podio client.
//!
//! # Design
//! The transport never swallows a failure; it classifies every non-success
//! outcome into one `PodioError` variant so callers can decide on retry
//! policy without inspecting status codes. Field access has its own
//! `FieldFormatError`, since "no value" is not an error for a field but a
//! value the field cannot be coerced from is.

use std::time::Duration;

use crate::item::FieldKind;

/// Errors returned by the transport and the services built on it.
#[derive(Debug, thiserror::Error)]
pub enum PodioError {
    /// The request never produced an HTTP response.
    #[error("connectivity error: {0}")]
    Connectivity(#[from] reqwest::Error),

    /// Podio rejected the request with a structured error payload.
    #[error("Podio API error (status {status}, {code}): {description}")]
    Api {
        status: u16,
        code: String,
        description: String,
    },

    /// Podio throttled the request; back off before sending another.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Podio answered with a 5xx status.
    #[error("server error (status {status}): {body}")]
    Server { status: u16, body: String },

    /// No usable access token, or the token was rejected after a refresh.
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error(transparent)]
    FieldFormat(#[from] FieldFormatError),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("deserialization failed: {0}")]
    Deserialization(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl PodioError {
    /// Whether sending the same request again later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PodioError::Connectivity(_) | PodioError::Server { .. } | PodioError::RateLimited { .. }
        )
    }
}

/// A field slot holds data the requested view cannot interpret.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FieldFormatError {
    #[error("field `{field}`: first value slot is not an object")]
    MalformedSlot { field: String },

    #[error("field `{field}`: expected {expected} at `{key}`, found {found}")]
    UnexpectedType {
        field: String,
        key: String,
        expected: &'static str,
        found: String,
    },

    #[error("field `{field}`: cannot parse `{value}` as {expected}")]
    Unparseable {
        field: String,
        value: String,
        expected: &'static str,
    },

    #[error("field `{field}` is of kind {actual:?}, not {requested:?}")]
    KindMismatch {
        field: String,
        actual: FieldKind,
        requested: FieldKind,
    },
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PodioError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display() {
        let err = PodioError::Api {
            status: 404,
            code: "not_found".to_string(),
            description: "Object not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Podio API error (status 404, not_found): Object not found"
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn server_and_rate_limit_are_retryable() {
        let server = PodioError::Server {
            status: 503,
            body: String::new(),
        };
        let limited = PodioError::RateLimited {
            retry_after: Some(Duration::from_secs(5)),
        };
        assert!(server.is_retryable());
        assert!(limited.is_retryable());
        assert!(!PodioError::Auth("expired".to_string()).is_retryable());
    }

    #[test]
    fn field_format_error_converts() {
        let err: PodioError = FieldFormatError::MalformedSlot {
            field: "status".to_string(),
        }
        .into();
        assert!(matches!(err, PodioError::FieldFormat(_)));
        assert_eq!(
            err.to_string(),
            "field `status`: first value slot is not an object"
        );
    }
}
