use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tonic::{Code, Status};

/// The fixed failure taxonomy every backend error is translated into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Unavailable,
    DecodeError,
    Internal,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "INVALID_ARGUMENT",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Unavailable => "UNAVAILABLE",
            ErrorKind::DecodeError => "DECODE_ERROR",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ServiceError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ServiceError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        ServiceError {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DecodeError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

// Cancelled/DeadlineExceeded coming back from a backend are connection-level
// outcomes; the gateway's own cancellation never reaches this mapping.
impl From<Status> for ServiceError {
    fn from(status: Status) -> Self {
        let kind = match status.code() {
            Code::NotFound => ErrorKind::NotFound,
            Code::InvalidArgument | Code::FailedPrecondition | Code::OutOfRange => {
                ErrorKind::InvalidArgument
            }
            Code::Unavailable
            | Code::DeadlineExceeded
            | Code::Cancelled
            | Code::ResourceExhausted => ErrorKind::Unavailable,
            _ => ErrorKind::Internal,
        };
        ServiceError::new(kind, status.message())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("invalid {service} target {target:?}: {source}")]
    InvalidTarget {
        service: &'static str,
        target: String,
        #[source]
        source: tonic::transport::Error,
    },

    #[error("failed to connect to {service} at {target}: {source}")]
    Unreachable {
        service: &'static str,
        target: String,
        #[source]
        source: tonic::transport::Error,
    },
}

/// Failures that end a whole request rather than a single field.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("query was cancelled")]
    Cancelled,

    #[error("query exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),
}
