//! Error types for the Team Password Manager client.
//!
//! # Design
//! `Forbidden` and `NotFound` get dedicated variants because the service
//! answers those statuses with plain-text bodies and callers routinely
//! branch on them. A JSON body flagged with `error: true` becomes `Protocol`
//! with the server's message verbatim. Any other body that is not JSON lands
//! in `MalformedResponse` together with the parse diagnostic and the raw text
//! for debugging.
//!
//! `Config` is only produced while building a `ClientConfig`; request paths
//! never return it.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TpmError>;

/// Errors returned by `TpmClient` and `ClientConfig` construction.
#[derive(Debug, Error)]
pub enum TpmError {
    /// Invalid base URL, unknown API version, or ambiguous credentials.
    #[error("{0}")]
    Config(String),

    /// DNS, connect, TLS or timeout failure reported by the transport.
    #[error("Connection error for {0}")]
    Connection(String),

    /// The server returned 403 with a body that is not JSON.
    #[error("{url} forbidden")]
    Forbidden { url: String },

    /// The server returned 404 with a body that is not JSON.
    #[error("{url} not found")]
    NotFound { url: String },

    /// The server returned a JSON payload with a truthy `error` field.
    #[error("{0}")]
    Protocol(String),

    /// The body was neither JSON nor classifiable by status code.
    #[error("{diagnostic}: {url} {body}")]
    MalformedResponse {
        diagnostic: String,
        url: String,
        body: String,
    },

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The resource operation does not exist in the configured API version.
    #[error("{operation} is not available in API {version}")]
    Unsupported {
        operation: &'static str,
        version: String,
    },
}

impl TpmError {
    /// Whether re-sending the same request could plausibly succeed.
    ///
    /// Only unparsable bodies qualify. Transport failures always surface to
    /// the caller: the request may already have reached the server.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TpmError::MalformedResponse { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_message_contains_url() {
        let err = TpmError::Forbidden {
            url: "https://tpm.example.com/index.php/api/v4/passwords.json".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "https://tpm.example.com/index.php/api/v4/passwords.json forbidden"
        );
    }

    #[test]
    fn not_found_message_contains_url() {
        let err = TpmError::NotFound {
            url: "https://tpm.example.com/x.json".to_string(),
        };
        assert!(err.to_string().ends_with("not found"));
    }

    #[test]
    fn malformed_message_carries_body() {
        let err = TpmError::MalformedResponse {
            diagnostic: "expected value at line 1 column 1".to_string(),
            url: "https://tpm.example.com/x.json".to_string(),
            body: "Method Not Allowed".to_string(),
        };
        assert!(err
            .to_string()
            .ends_with("https://tpm.example.com/x.json Method Not Allowed"));
    }

    #[test]
    fn connection_message_prefix() {
        let err = TpmError::Connection("dns error".to_string());
        assert_eq!(err.to_string(), "Connection error for dns error");
    }

    #[test]
    fn only_parse_failures_are_retryable() {
        assert!(!TpmError::Connection(String::new()).is_retryable());
        assert!(TpmError::MalformedResponse {
            diagnostic: String::new(),
            url: String::new(),
            body: String::new(),
        }
        .is_retryable());
        assert!(!TpmError::Forbidden { url: String::new() }.is_retryable());
        assert!(!TpmError::NotFound { url: String::new() }.is_retryable());
        assert!(!TpmError::Protocol(String::new()).is_retryable());
    }
}
