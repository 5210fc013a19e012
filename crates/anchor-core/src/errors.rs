//! Unified error type for anchor identity operations
//!
//! Every failure maps onto a small user-facing taxonomy (`ErrorKind`) so that
//! callers can tell "try again" apart from "this cannot succeed" without
//! matching on individual variants.

use serde::{Deserialize, Serialize};

/// Unified error type for all anchor operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum AnchorError {
    /// The user explicitly cancelled a ceremony or flow
    #[error("Cancelled by user")]
    UserCancelled,

    /// An authenticator ceremony was rejected or timed out
    #[error("Authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the authentication failure
        message: String,
    },

    /// User input did not validate (CAPTCHA, confirmation code)
    #[error("Validation failed: {message}")]
    ValidationFailed {
        /// Description of what failed to validate
        message: String,
    },

    /// The registry has no capacity left for new anchors
    #[error("Registry capacity exhausted")]
    CapacityExhausted,

    /// A local policy invariant would be broken by the requested operation
    #[error("Invariant violation: {message}")]
    InvariantViolation {
        /// Description of the violated invariant
        message: String,
    },

    /// Removing the device would leave the anchor without any device
    #[error("Cannot remove the last device of an anchor")]
    LastDeviceRemoval,

    /// The resolver has not yet bound to a concrete credential
    #[error("Credential not yet resolved; sign before reading the public key")]
    NotYetResolved,

    /// The authenticator returned a credential that matches no known device
    #[error("Authenticator returned an unknown credential")]
    NoMatchingCredential,

    /// The long-term credential failed to sign a delegation
    #[error("Signing failed: {message}")]
    SigningFailed {
        /// Description of the signing failure
        message: String,
        /// Whether the failure was an explicit user cancellation
        cancelled: bool,
    },

    /// The registry rejected a CAPTCHA solution
    #[error("Incorrect challenge solution")]
    BadChallenge,

    /// The session delegation expired or the session was logged out
    #[error("Session expired")]
    SessionExpired,

    /// The registry could not be reached
    #[error("Transport error: {message}")]
    Transport {
        /// Description of the transport failure
        message: String,
    },

    /// Invalid input or configuration
    #[error("Invalid: {message}")]
    Invalid {
        /// Description of the invalid input
        message: String,
    },

    /// Resource not found
    #[error("Not found: {message}")]
    NotFound {
        /// Description of what was not found
        message: String,
    },

    /// Permission denied
    #[error("Permission denied: {message}")]
    PermissionDenied {
        /// Description of the permission issue
        message: String,
    },

    /// Cryptographic operation failed
    #[error("Crypto error: {message}")]
    Crypto {
        /// Description of the cryptographic failure
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure
        message: String,
    },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error
        message: String,
    },
}

/// User-facing failure classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Explicit cancellation, always recoverable
    UserCancelled,
    /// Ceremony rejected or timed out, the whole flow may be retried
    AuthenticationFailed,
    /// Bad user input, recoverable a bounded number of times
    ValidationFailed,
    /// Permanent until an operator intervenes
    CapacityExhausted,
    /// Rejected locally before any network call
    InvariantViolation,
    /// Registry unreachable
    TransportFailure,
    /// Programming or data errors
    Internal,
}

/// Human-readable description of a failure for presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    /// Short title
    pub title: String,
    /// Explanation for the user
    pub message: String,
    /// Technical detail, if any
    pub detail: Option<String>,
    /// Whether offering a retry makes sense
    pub retriable: bool,
}

impl AnchorError {
    /// Create an authentication failure
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::AuthenticationFailed {
            message: message.into(),
        }
    }

    /// Create a validation failure
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }

    /// Create an invariant violation
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }

    /// Create a signing failure
    pub fn signing(message: impl Into<String>) -> Self {
        Self::SigningFailed {
            message: message.into(),
            cancelled: false,
        }
    }

    /// Create a transport failure
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a permission denied error
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: message.into(),
        }
    }

    /// Create a crypto error
    pub fn crypto(message: impl Into<String>) -> Self {
        Self::Crypto {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Wrap a ceremony error raised while signing a delegation.
    ///
    /// Cancellation stays distinguishable so the caller can return to idle.
    pub fn from_signing_ceremony(err: AnchorError) -> Self {
        match err {
            Self::SigningFailed { .. } => err,
            Self::UserCancelled => Self::SigningFailed {
                message: "signing ceremony cancelled".to_string(),
                cancelled: true,
            },
            other => Self::SigningFailed {
                message: other.to_string(),
                cancelled: false,
            },
        }
    }

    /// Classify this error into the user-facing taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UserCancelled => ErrorKind::UserCancelled,
            Self::SigningFailed { cancelled: true, .. } => ErrorKind::UserCancelled,
            Self::AuthenticationFailed { .. }
            | Self::SigningFailed { .. }
            | Self::NoMatchingCredential
            | Self::SessionExpired
            | Self::PermissionDenied { .. } => ErrorKind::AuthenticationFailed,
            Self::ValidationFailed { .. } | Self::BadChallenge => ErrorKind::ValidationFailed,
            Self::CapacityExhausted => ErrorKind::CapacityExhausted,
            Self::InvariantViolation { .. } | Self::LastDeviceRemoval => {
                ErrorKind::InvariantViolation
            }
            Self::Transport { .. } => ErrorKind::TransportFailure,
            Self::NotYetResolved
            | Self::Invalid { .. }
            | Self::NotFound { .. }
            | Self::Crypto { .. }
            | Self::Serialization { .. }
            | Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Whether re-entering the flow can possibly succeed
    pub fn is_retriable(&self) -> bool {
        !matches!(
            self.kind(),
            ErrorKind::CapacityExhausted | ErrorKind::InvariantViolation
        )
    }

    /// Build the user-facing description of this error
    pub fn report(&self) -> FailureReport {
        let (title, message) = match self.kind() {
            ErrorKind::UserCancelled => ("Cancelled", "The operation was cancelled."),
            ErrorKind::AuthenticationFailed => (
                "Failed to authenticate",
                "We failed to authenticate you using your security device. Please try again.",
            ),
            ErrorKind::ValidationFailed => (
                "Incorrect value",
                "The value you entered is incorrect. Please try again.",
            ),
            ErrorKind::CapacityExhausted => (
                "No space left",
                "The identity registry is at maximum capacity. This cannot succeed until capacity is increased.",
            ),
            ErrorKind::InvariantViolation => (
                "Operation not allowed",
                "This change would leave the identity anchor unusable.",
            ),
            ErrorKind::TransportFailure => (
                "Registry unreachable",
                "We failed to reach the identity registry. Please try again.",
            ),
            ErrorKind::Internal => (
                "Something went wrong",
                "An unexpected error occurred.",
            ),
        };

        FailureReport {
            title: title.to_string(),
            message: message.to_string(),
            detail: Some(self.to_string()),
            retriable: self.is_retriable(),
        }
    }
}

/// Standard result type for anchor operations
pub type AnchorResult<T> = std::result::Result<T, AnchorError>;

impl From<serde_json::Error> for AnchorError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<std::io::Error> for AnchorError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(err.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::permission_denied(err.to_string()),
            _ => Self::internal(err.to_string()),
        }
    }
}

impl From<hex::FromHexError> for AnchorError {
    fn from(err: hex::FromHexError) -> Self {
        Self::invalid(format!("invalid hex: {err}"))
    }
}
