//! Sync engine error types.

/// Errors raised by an [`crate::tracker::ExternalTracker`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// The remote rejected or dropped the request; worth retrying.
    #[error("transient tracker failure: {0}")]
    Transient(String),

    /// The remote is rate-limiting this client.
    #[error("rate limited by tracker")]
    RateLimited,

    /// The configured credentials were rejected.
    #[error("tracker authentication failed: {0}")]
    Auth(String),

    /// The remote record referenced by an operation doesn't exist.
    #[error("external record not found: {0}")]
    NotFound(String),
}

impl TrackerError {
    /// Whether a retry is worth attempting for this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::RateLimited)
    }
}

/// Errors from running the reconciliation engine.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("store error: {0}")]
    Store(#[from] beads_storage::StorageError),

    #[error("retry budget exhausted after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: TrackerError,
    },
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, SyncError>;
