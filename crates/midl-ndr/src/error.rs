//! NDR error types

use thiserror::Error;

/// NDR encoding/decoding errors
///
/// Every variant is fatal to the call that produced it. `UnsupportedDiscriminant`
/// is kept apart from the corruption cases because it usually means the peer
/// speaks a newer revision of the protocol.
#[derive(Debug, Error)]
pub enum NdrError {
    /// A declared size does not fit in what is left of the buffer
    #[error("malformed length: {what} needs {needed} bytes, {remaining} remaining")]
    MalformedLength {
        what: &'static str,
        needed: usize,
        remaining: usize,
    },

    /// A full-pointer referent was seen twice with inconsistent content
    #[error("alias mismatch: full pointer referent {referent:#010x} {reason}")]
    AliasMismatch { referent: u32, reason: &'static str },

    /// Pointer bookkeeping or structural rule broken by the peer
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Union, variant or array tag this codec does not know
    #[error("unsupported discriminant {value:#x} for {context}")]
    UnsupportedDiscriminant { context: &'static str, value: u32 },

    /// Conformant string without its trailing terminator
    #[error("invalid string: {0}")]
    InvalidString(String),

    /// Arithmetic overflow while computing a wire size
    #[error("integer overflow computing {0}")]
    IntegerOverflow(&'static str),

    /// UTF-8 decoding error
    #[error("UTF-8 error: {0}")]
    Utf8Error(#[from] std::string::FromUtf8Error),

    /// UTF-16 decoding error
    #[error("UTF-16 error: {0}")]
    Utf16Error(#[from] std::char::DecodeUtf16Error),
}

impl NdrError {
    /// Shorthand for a `ProtocolViolation` with a formatted message
    pub fn violation(msg: impl Into<String>) -> Self {
        NdrError::ProtocolViolation(msg.into())
    }

    /// True when the error names a tag this codec does not implement, as
    /// opposed to malformed or hostile input.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, NdrError::UnsupportedDiscriminant { .. })
    }
}

/// Result type for NDR operations
pub type Result<T> = std::result::Result<T, NdrError>;
