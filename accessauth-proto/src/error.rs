//! Wire decoding error types.

/// Errors produced while decoding wire records.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum WireError {
    /// The record is not a usable protocol message.
    #[error("malformed message: {0}")]
    MalformedMessage(&'static str),

    /// A hex-encoded field could not be decoded.
    #[error("invalid hex encoding: {0}")]
    InvalidHexEncoding(&'static str),
}
