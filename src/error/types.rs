//! Error types for the bridgeward daemon.

use thiserror::Error;

/// Main error type for the daemon.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration-related errors.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Socket-related errors.
    #[error("Socket error: {message}")]
    Socket { message: String },

    /// Authentication errors.
    #[error("Authentication error: {kind}")]
    Auth { kind: AuthErrorKind },

    /// A connection exceeded its per-window message allowance.
    #[error("Message rate limit exceeded")]
    RateLimitExceeded,

    /// Persistent state could not be read or written.
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    /// Protocol errors.
    #[error("Protocol error: {kind}")]
    Protocol { kind: ProtocolErrorKind },

    /// Command dispatch errors.
    #[error("Dispatch error: {kind}")]
    Dispatch { kind: DispatchErrorKind },

    /// Internal faults that should never reach a client verbatim.
    #[error("Internal error: {message}")]
    Internal { message: String },

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Authentication error kinds.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    #[error("Token is malformed or its signature does not verify")]
    Invalid,

    #[error("Token has expired")]
    Expired,

    #[error("Token has been revoked")]
    Revoked,

    #[error("Token issuer or audience does not match this bridge")]
    WrongOrigin,

    #[error("Source address is blocked")]
    Blocked,

    #[error("Too many failed attempts from this address")]
    TooManyAttempts,
}

impl AuthErrorKind {
    /// Stable error code used in client responses and audit records.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Invalid => "AUTH_INVALID",
            Self::Expired => "AUTH_EXPIRED",
            Self::Revoked => "AUTH_REVOKED",
            Self::WrongOrigin => "AUTH_WRONG_ORIGIN",
            Self::Blocked => "AUTH_BLOCKED",
            Self::TooManyAttempts => "AUTH_TOO_MANY_ATTEMPTS",
        }
    }
}

/// Protocol error kinds.
#[derive(Error, Debug)]
pub enum ProtocolErrorKind {
    #[error("Message too large: {size} bytes exceeds maximum of {max} bytes")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Compressed payloads are not accepted")]
    CompressedPayload,

    #[error("Invalid message format: {message}")]
    InvalidMessageFormat { message: String },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connection timed out")]
    ConnectionTimeout,
}

/// Command dispatch error kinds.
#[derive(Error, Debug)]
pub enum DispatchErrorKind {
    #[error("Unknown command: {name}")]
    UnknownCommand { name: String },

    #[error("Command failed: {message}")]
    Failed { message: String },
}

impl BridgeError {
    /// Stable error code for client responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Auth { kind } => kind.code(),
            Self::RateLimitExceeded => "RATE_LIMITED",
            Self::Persistence { .. } => "PERSISTENCE_ERROR",
            Self::Protocol { kind } => match kind {
                ProtocolErrorKind::MessageTooLarge { .. } => "PAYLOAD_TOO_LARGE",
                ProtocolErrorKind::CompressedPayload => "COMPRESSED_PAYLOAD",
                ProtocolErrorKind::InvalidMessageFormat { .. } => "MALFORMED_MESSAGE",
                ProtocolErrorKind::ConnectionClosed => "CONNECTION_CLOSED",
                ProtocolErrorKind::ConnectionTimeout => "CONNECTION_TIMEOUT",
            },
            Self::Dispatch { kind } => match kind {
                DispatchErrorKind::UnknownCommand { .. } => "UNKNOWN_COMMAND",
                DispatchErrorKind::Failed { .. } => "DISPATCH_ERROR",
            },
            _ => "INTERNAL_ERROR",
        }
    }
}

/// Result type alias for daemon operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_kind_codes_are_distinct() {
        let kinds = [
            AuthErrorKind::Invalid,
            AuthErrorKind::Expired,
            AuthErrorKind::Revoked,
            AuthErrorKind::WrongOrigin,
            AuthErrorKind::Blocked,
            AuthErrorKind::TooManyAttempts,
        ];
        let codes: std::collections::HashSet<_> = kinds.iter().map(|k| k.code()).collect();
        assert_eq!(codes.len(), kinds.len());
    }

    #[test]
    fn test_protocol_error_codes() {
        let err = BridgeError::Protocol {
            kind: ProtocolErrorKind::MessageTooLarge {
                size: 2_000_000,
                max: 1_048_576,
            },
        };
        assert_eq!(err.code(), "PAYLOAD_TOO_LARGE");

        let err = BridgeError::Protocol {
            kind: ProtocolErrorKind::CompressedPayload,
        };
        assert_eq!(err.code(), "COMPRESSED_PAYLOAD");
    }

    #[test]
    fn test_rate_limit_code() {
        assert_eq!(BridgeError::RateLimitExceeded.code(), "RATE_LIMITED");
    }
}
