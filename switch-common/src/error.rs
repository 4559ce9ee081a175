//! # Error Taxonomy
//!
//! Purpose: One error type shared by every layer of the client, so a failed
//! call reports which operation failed and, when available, what the remote
//! end or transport said.
//!
//! ## Design Principles
//! 1. **Fail Fast**: Validation errors (`Configuration`, `InvalidQuery`,
//!    `NotConnected`) are raised before any I/O.
//! 2. **Operation-Tagged**: Every I/O error carries the `OperationKind`.
//! 3. **No Swallowing**: Nothing here is retried; callers see every failure.

use thiserror::Error;

use crate::types::OperationKind;

/// Result type for SwitchDB client operations.
pub type SwitchResult<T> = Result<T, SwitchError>;

/// Errors surfaced by the SwitchDB client.
#[derive(Debug, Error)]
pub enum SwitchError {
    /// Connection profile or client configuration is missing or malformed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Query failed validation; nothing was sent.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// An operation was attempted before `connect()` obtained a credential.
    #[error("database not connected")]
    NotConnected,

    /// Token exchange failed.
    #[error("credential exchange failed{}: {message}", status_suffix(.status))]
    Credential {
        status: Option<u16>,
        message: String,
    },

    /// Remote end rejected the call or the channel reported an error event.
    #[error("remote error on {operation}{}: {message}", status_suffix(.status))]
    Remote {
        operation: OperationKind,
        status: Option<u16>,
        message: String,
    },

    /// Channel could not be opened.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// No response arrived within the configured timeout.
    #[error("{operation} timed out")]
    Timeout { operation: OperationKind },

    /// Caller cancelled the blocking wait.
    #[error("{operation} was cancelled")]
    Canceled { operation: OperationKind },

    /// Outbound item could not be serialized to JSON.
    #[error("could not encode {operation} payload: {source}")]
    Encode {
        operation: OperationKind,
        #[source]
        source: serde_json::Error,
    },

    /// Response body was not the JSON shape the operation returns.
    #[error("could not decode {operation} response: {source}")]
    Decode {
        operation: OperationKind,
        #[source]
        source: serde_json::Error,
    },
}

impl SwitchError {
    /// Builds a `Remote` error from a non-success HTTP status.
    pub fn remote_status(operation: OperationKind, status: u16, body: impl Into<String>) -> Self {
        SwitchError::Remote {
            operation,
            status: Some(status),
            message: body.into(),
        }
    }

    /// Builds a `Remote` error from a transport event without a status.
    pub fn remote_event(operation: OperationKind, message: impl Into<String>) -> Self {
        SwitchError::Remote {
            operation,
            status: None,
            message: message.into(),
        }
    }

    /// Operation the error belongs to, when it is tied to one.
    pub fn operation(&self) -> Option<OperationKind> {
        match self {
            SwitchError::Remote { operation, .. }
            | SwitchError::Timeout { operation }
            | SwitchError::Canceled { operation }
            | SwitchError::Encode { operation, .. }
            | SwitchError::Decode { operation, .. } => Some(*operation),
            _ => None,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (status {code})"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_mentions_operation_and_status() {
        let err = SwitchError::remote_status(OperationKind::Add, 500, "boom");
        assert_eq!(err.to_string(), "remote error on add (status 500): boom");
        assert_eq!(err.operation(), Some(OperationKind::Add));
    }

    #[test]
    fn event_error_has_no_status() {
        let err = SwitchError::remote_event(OperationKind::List, "connection reset");
        assert_eq!(err.to_string(), "remote error on list: connection reset");
    }

    #[test]
    fn validation_errors_are_not_operation_tagged() {
        assert_eq!(SwitchError::NotConnected.operation(), None);
        assert_eq!(SwitchError::InvalidQuery("x".into()).operation(), None);
    }
}
