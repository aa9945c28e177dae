use thiserror::Error;

use crate::core::protocol::ErrorKind;

pub type Result<T> = std::result::Result<T, P2PError>;

#[derive(Error, Debug)]
pub enum P2PError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Integrity mismatch for {filename}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        filename: String,
        expected: String,
        actual: String,
    },

    #[error("Unreachable: {0}")]
    Unreachable(String),

    #[error("Protocol fault: {0}")]
    ProtocolFault(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl P2PError {
    /// Wire-level classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            P2PError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            P2PError::NotFound(_) => ErrorKind::NotFound,
            P2PError::IntegrityMismatch { .. } => ErrorKind::IntegrityMismatch,
            P2PError::Unreachable(_) => ErrorKind::Unreachable,
            P2PError::ProtocolFault(_)
            | P2PError::SerializationError(_)
            | P2PError::MessageTooLarge(_) => ErrorKind::ProtocolFault,
            P2PError::IoError(_) | P2PError::ConfigError(_) => ErrorKind::Internal,
        }
    }

    /// Error text without the variant prefix, for carrying across the wire.
    pub fn detail(&self) -> String {
        match self {
            P2PError::InvalidArgument(m)
            | P2PError::NotFound(m)
            | P2PError::Unreachable(m)
            | P2PError::ProtocolFault(m)
            | P2PError::IoError(m)
            | P2PError::SerializationError(m)
            | P2PError::ConfigError(m) => m.clone(),
            other => other.to_string(),
        }
    }

    /// Rebuild an error received as `Response::Error` from a remote handler.
    pub fn from_remote(kind: ErrorKind, message: String) -> Self {
        match kind {
            ErrorKind::InvalidArgument => P2PError::InvalidArgument(message),
            ErrorKind::NotFound => P2PError::NotFound(message),
            ErrorKind::IntegrityMismatch => P2PError::IntegrityMismatch {
                filename: message,
                expected: String::new(),
                actual: String::new(),
            },
            ErrorKind::Unreachable => P2PError::Unreachable(message),
            ErrorKind::ProtocolFault => P2PError::ProtocolFault(message),
            ErrorKind::Internal => P2PError::IoError(message),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            P2PError::Unreachable(_) | P2PError::ProtocolFault(_) | P2PError::IoError(_)
        )
    }
}

impl From<std::io::Error> for P2PError {
    fn from(err: std::io::Error) -> Self {
        P2PError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for P2PError {
    fn from(err: serde_json::Error) -> Self {
        P2PError::SerializationError(err.to_string())
    }
}
