//! Crypto error type.

/// Failure of a cryptographic operation.
///
/// Callers must treat this as a hard authentication failure and never
/// retry with the same material.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation}: {reason}")]
pub struct CryptoError {
    operation: &'static str,
    reason: &'static str,
}

impl CryptoError {
    pub(crate) fn new(operation: &'static str, reason: &'static str) -> Self {
        Self { operation, reason }
    }

    /// The operation that failed ("encrypt", "decrypt", ...).
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// What went wrong, suitable for server-side logs only.
    pub fn reason(&self) -> &'static str {
        self.reason
    }
}
