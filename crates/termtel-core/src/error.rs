//! Shared error type across termtel crates.

use thiserror::Error;

/// Stable error codes (used in logs, metrics labels and tests).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Undecodable or incomplete envelope.
    MalformedMessage,
    /// Envelope addressed to a session nobody registered.
    UnknownSession,
    /// No correlated response before the deadline.
    RequestTimeout,
    /// A newer identical request replaced this one.
    Superseded,
    /// Waiter cancelled explicitly or by session teardown.
    Cancelled,
    /// Send attempted while no backend is attached.
    TransportUnavailable,
    /// Backend reported an error envelope.
    BackendError,
    /// Device info failed validation.
    InvalidDeviceInfo,
    /// Configuration rejected.
    BadConfig,
    /// Unsupported config/protocol version.
    UnsupportedVersion,
    /// Session has no connection lifecycle.
    NotConnectable,
    /// Internal failure.
    Internal,
}

impl ErrorCode {
    /// String representation used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::MalformedMessage => "MALFORMED_MESSAGE",
            ErrorCode::UnknownSession => "UNKNOWN_SESSION",
            ErrorCode::RequestTimeout => "REQUEST_TIMEOUT",
            ErrorCode::Superseded => "SUPERSEDED",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::TransportUnavailable => "TRANSPORT_UNAVAILABLE",
            ErrorCode::BackendError => "BACKEND_ERROR",
            ErrorCode::InvalidDeviceInfo => "INVALID_DEVICE_INFO",
            ErrorCode::BadConfig => "BAD_CONFIG",
            ErrorCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorCode::NotConnectable => "NOT_CONNECTABLE",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, TermtelError>;

/// Unified error type used by core and bridge.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TermtelError {
    #[error("malformed message: {0}")]
    MalformedMessage(String),
    #[error("unknown session: {0}")]
    UnknownSession(String),
    #[error("request timed out: {action}")]
    RequestTimeout { action: String },
    #[error("request superseded: {action}")]
    Superseded { action: String },
    #[error("request cancelled: {action}")]
    Cancelled { action: String },
    #[error("transport unavailable")]
    TransportUnavailable,
    #[error("backend error: {0}")]
    BackendError(String),
    #[error("invalid device info: {0}")]
    InvalidDeviceInfo(String),
    #[error("bad config: {0}")]
    BadConfig(String),
    #[error("unsupported version")]
    UnsupportedVersion,
    #[error("session has no connection: {0}")]
    NotConnectable(String),
    #[error("internal: {0}")]
    Internal(String),
}

impl TermtelError {
    /// Map to a stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            TermtelError::MalformedMessage(_) => ErrorCode::MalformedMessage,
            TermtelError::UnknownSession(_) => ErrorCode::UnknownSession,
            TermtelError::RequestTimeout { .. } => ErrorCode::RequestTimeout,
            TermtelError::Superseded { .. } => ErrorCode::Superseded,
            TermtelError::Cancelled { .. } => ErrorCode::Cancelled,
            TermtelError::TransportUnavailable => ErrorCode::TransportUnavailable,
            TermtelError::BackendError(_) => ErrorCode::BackendError,
            TermtelError::InvalidDeviceInfo(_) => ErrorCode::InvalidDeviceInfo,
            TermtelError::BadConfig(_) => ErrorCode::BadConfig,
            TermtelError::UnsupportedVersion => ErrorCode::UnsupportedVersion,
            TermtelError::NotConnectable(_) => ErrorCode::NotConnectable,
            TermtelError::Internal(_) => ErrorCode::Internal,
        }
    }
}
