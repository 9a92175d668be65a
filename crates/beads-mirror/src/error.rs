//! Mirror error types.

/// Errors from export/import of the JSONL mirror.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// Underlying filesystem failure (staging write, fsync, rename).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A mirror or deletions record could not be parsed.
    #[error("malformed jsonl record at line {line}: {source}")]
    Record {
        /// 1-based line number in the mirror file.
        line: usize,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The sibling metadata file was malformed.
    #[error("malformed metadata: {0}")]
    Metadata(String),

    /// JSON encoding of an outgoing record failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Acquiring the `.sync.lock` file failed.
    #[error("failed to acquire sync lock: {0}")]
    Lock(#[from] beads_lockfile::LockError),

    /// The underlying store rejected a read or write.
    #[error("store error: {0}")]
    Store(#[from] beads_storage::StorageError),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, MirrorError>;
