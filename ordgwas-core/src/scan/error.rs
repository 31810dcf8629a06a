//! Typed errors raised while setting up a scan.

use thiserror::Error;

/// Fatal, pre-scan errors. Wrapped in `anyhow::Error` by callers and
/// recoverable with `downcast_ref`.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Missing inputs, bad option values, sample-count mismatch.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Inputs that disagree with each other (mapping order vs. source order).
    #[error("data consistency error: {0}")]
    DataConsistency(String),
}
