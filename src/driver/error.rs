//! Driver Error Types
//!
//! Connection-scoped failures (transport, codec) end the receive loop and
//! reach the owner through the error callback. Exchange-scoped failures
//! (authentication, status) are attached to a single result set.

use std::collections::HashMap;

use thiserror::Error;

use crate::binary::{CodecError, GraphValue, RequestId};

// ============================================================================
// DriverError
// ============================================================================

/// Driver error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    /// Connect/send/receive failure in the transport
    #[error("Transport error: {0}")]
    Transport(String),

    /// Transport closed, no more responses will arrive
    #[error("Connection closed")]
    ConnectionClosed,

    /// Malformed or unsupported message
    #[error("Codec error: {0}")]
    Codec(String),

    /// Response for a correlation id that has no result set
    #[error("Bookkeeping error: no result set registered for request {0}")]
    Bookkeeping(RequestId),

    /// Duplicate registration of a correlation id
    #[error("Bookkeeping error: request {0} is already registered")]
    DuplicateRequest(RequestId),

    /// Authentication challenge that could not be answered
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Non-success status returned by the server
    #[error("Server returned status {code}: {}", .message.as_deref().unwrap_or("no message"))]
    Status {
        /// Status code
        code: u16,
        /// Server message
        message: Option<String>,
        /// Status attributes (exception details, stack trace, ...)
        attributes: HashMap<String, GraphValue>,
    },

    /// Deadline expired
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid settings or endpoint
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Misuse of a result set (append after completion, ...)
    #[error("Result set error: {0}")]
    ResultSet(String),
}

impl DriverError {
    /// Transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Authentication error
    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Status error
    pub fn status(
        code: u16,
        message: Option<String>,
        attributes: HashMap<String, GraphValue>,
    ) -> Self {
        Self::Status {
            code,
            message,
            attributes,
        }
    }

    /// Timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Result set misuse
    pub fn result_set(msg: impl Into<String>) -> Self {
        Self::ResultSet(msg.into())
    }

    /// Whether the failure ends the connection rather than a single exchange.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::ConnectionClosed | Self::Codec(_) | Self::Timeout(_)
        )
    }

    /// Whether a higher layer may retry on a fresh connection.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::ConnectionClosed | Self::Timeout(_) => true,
            Self::Status { code, .. } => is_retryable_code(*code),
            _ => false,
        }
    }

    /// Status code, for status errors.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Server-side transient conditions.
fn is_retryable_code(code: u16) -> bool {
    matches!(code, 429 | 503)
}

impl From<CodecError> for DriverError {
    fn from(err: CodecError) -> Self {
        DriverError::Codec(err.to_string())
    }
}

// ============================================================================
// Result Type
// ============================================================================

/// Driver result type
pub type DriverResult<T> = Result<T, DriverError>;

// ============================================================================
// Tests
// ============================================================================
