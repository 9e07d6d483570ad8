//! RHI error types.

use thiserror::Error;

/// Errors raised by the render hardware interface.
///
/// Each variant is one error kind. Recoverable conditions such as a fence
/// wait running out of time or an out-of-date swap chain are reported as
/// status values by the operations that can hit them, not through this type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RhiError {
    /// A descriptor field is out of domain, dimensions disagree, or the
    /// operation is not legal in the object's current state.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The backend rejected creation of a handle.
    #[error("Creation of {what} failed: {reason}")]
    CreationFailed {
        /// What was being created.
        what: &'static str,
        /// Backend-provided reason.
        reason: String,
    },

    /// The backend rejected shader byte-code.
    #[error("Shader compilation failed: {0}")]
    CompileFailed(String),

    /// Host or device memory allocation failed.
    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    /// No memory type satisfies the filter and the required properties.
    #[error("No memory type matches filter {type_filter:#x} with properties {required:#x}")]
    NoMatchingMemoryType {
        /// Bitmask of acceptable memory type indices.
        type_filter: u32,
        /// Raw bits of the required property flags.
        required: u32,
    },

    /// A blocking wait exceeded its bound.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The operation exists in the contract but has no implementation.
    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),

    /// The device was lost.
    #[error("Device lost")]
    DeviceLost,
}

impl RhiError {
    /// Shorthand for an [`RhiError::InvalidArgument`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Whether this error is an invalid-argument error.
    pub const fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, RhiError>;
