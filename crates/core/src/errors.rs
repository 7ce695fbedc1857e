//! Errors for transaction encoding and decoding.

use thiserror::Error;

/// Error returned by a transaction decoder when the input is not a well-formed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to decode transaction: {reason}")]
pub struct DecodeError {
    reason: String,
}

impl DecodeError {
    /// Creates a new decode error with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// The reason reported by the underlying decoder.
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Error returned by a transaction encoder.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to encode transaction: {0}")]
pub struct EncodeError(pub String);

/// Errors that can occur while decoding into a concrete transaction type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The underlying decoder rejected the bytes.
    #[error(transparent)]
    DecodeFailure(#[from] DecodeError),

    /// The bytes decoded fine but into a different transaction type than the one expected.
    #[error("unexpected tx type: expected {expected}, decoded {found}")]
    TypeMismatch {
        /// Type the caller asked for.
        expected: &'static str,

        /// Type the decoder produced.
        found: &'static str,
    },
}
