/// Tether Error Types
///
/// Two classes of failure cross the binding boundary: programming errors
/// (bad handles, malformed arguments) that abort a call before any native
/// resource is touched, and native runtime errors reported by the messaging
/// library itself.

use crate::handle::Tag;
use crate::native::NativeError;
use thiserror::Error;

/// Reasons a handle fails validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandleError {
    /// No handle was supplied where one is required
    #[error("handle is absent")]
    Absent,

    /// The handle carries a tag of the wrong resource kind
    #[error("handle tag does not match: expected {expected}, found {found}")]
    TagMismatch { expected: Tag, found: Tag },

    /// The handle was issued by a different bridge
    #[error("handle belongs to another bridge")]
    Foreign,

    /// The handle's resource was already torn down
    #[error("{0} handle has already been released")]
    Released(Tag),

    /// The table has no slot for this handle
    #[error("unknown {0} handle")]
    Unknown(Tag),
}

/// Main error type for Tether operations
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Handle validation failed
    #[error("invalid handle: {0}")]
    InvalidHandle(#[from] HandleError),

    /// Argument has the wrong shape or names an unknown value
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Received frame length differs from the fixed scalar width
    #[error("frame size mismatch: expected {expected} bytes, received {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// A polled socket's context was terminated
    #[error("at least one polled socket refers to a context that was terminated")]
    ContextTerminated,

    /// The native poll rejected the item table
    #[error("the poll item table is not valid")]
    InvalidPollItems,

    /// A host interrupt was pending while the native call was interrupted
    #[error("interrupted by delivery of a signal before any events were available")]
    Interrupted,

    /// Host codec failed to encode or decode a value
    #[error("codec error: {0}")]
    Codec(String),

    /// Fatal native error
    #[error("native error: {0}")]
    Native(#[from] NativeError),
}

/// Result type alias for Tether operations
pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    /// Create an invalid argument error with a message
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a codec error from any displayable cause
    pub fn codec(cause: impl std::fmt::Display) -> Self {
        Self::Codec(cause.to_string())
    }

    /// Check if this error stems from misuse of the API rather than the
    /// native library.
    ///
    /// Programming errors are raised before any native call and are never
    /// worth retrying.
    #[must_use]
    pub const fn is_programming_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidHandle(_) | Self::InvalidArgument(_) | Self::SizeMismatch { .. }
        )
    }
}
