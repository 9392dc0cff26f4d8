use opsdesk_core::{CoreError, ValidationError};
use serde_json::Value;

/// Failures of the HTTP transport itself.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The request never produced an HTTP response.
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with a non-success status code.
    #[error("HTTP error: status {status}")]
    Status {
        status: u16,
        /// Error body sent by the server, if any.
        payload: Option<Value>,
    },

    /// The response body was not valid JSON.
    #[error("Failed to decode response body: {0}")]
    Decode(String),
}

impl TransportError {
    /// Network failures and 5xx responses may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Decode(_) => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::Status { payload, .. } => payload.as_ref(),
            _ => None,
        }
    }

    /// The `message` field of the server's error payload.
    pub fn server_message(&self) -> Option<&str> {
        match self.payload()? {
            Value::String(s) => Some(s.as_str()),
            other => other.get("message").and_then(Value::as_str),
        }
    }
}

/// Errors returned by fetch and mutation operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A precondition blocked the call before any request was sent.
    #[error("{operation} is not ready: {reason}")]
    NotReady { operation: String, reason: String },

    #[error("{operation} failed: {source}")]
    Transport {
        operation: String,
        #[source]
        source: TransportError,
    },

    #[error("{operation} returned an invalid response: {source}")]
    Validation {
        operation: String,
        #[source]
        source: ValidationError,
    },

    #[error("Registration error: {0}")]
    Registration(String),
}

impl ClientError {
    pub fn not_ready(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotReady {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn transport(operation: impl Into<String>, source: TransportError) -> Self {
        Self::Transport {
            operation: operation.into(),
            source,
        }
    }

    pub fn validation(operation: impl Into<String>, source: ValidationError) -> Self {
        Self::Validation {
            operation: operation.into(),
            source,
        }
    }

    pub fn registration(message: impl Into<String>) -> Self {
        Self::Registration(message.into())
    }

    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::NotReady { .. })
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            Self::Transport { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn validation_error(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Message the server attached to a failed request.
    pub fn server_message(&self) -> Option<&str> {
        self.transport_error().and_then(TransportError::server_message)
    }
}
