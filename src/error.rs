//! Error types for pmtree

use thiserror::Error;

/// Why a durable-list insert attempt had to be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    /// The predecessor record was mid-update by another thread.
    DuplicateContended,
    /// The compare-and-swap on the predecessor's link lost to a racer.
    CasLost,
    /// The predecessor/successor window no longer bracketed the key.
    ViewChanged,
}

/// The main error type for pmtree operations.
///
/// Not-found on search or remove is a normal negative result and is reported
/// through `Option`/`bool`, never through this type. Arena exhaustion is
/// fatal by contract (the region is write-once, there is no reclamation
/// path) and terminates the process instead of surfacing here.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The bounded durable-list insert loop gave up.
    #[error("insert retries exhausted after {attempts} attempts ({reason:?})")]
    RetriesExhausted {
        /// Number of link attempts made.
        attempts: u32,
        /// The reason the last attempt failed.
        reason: RetryReason,
    },

    /// A retry re-descended for a key that vanished from the index.
    #[error("key not found")]
    KeyNotFound,
}

/// Result type alias for pmtree operations.
pub type Result<T> = std::result::Result<T, Error>;
