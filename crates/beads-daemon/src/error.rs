//! Daemon error types.

/// Errors raised by the daemon transport and request dispatch layer.
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] beads_storage::StorageError),

    #[error("mirror error: {0}")]
    Mirror(#[from] beads_mirror::MirrorError),

    #[error("lock error: {0}")]
    Lock(#[from] beads_lockfile::LockError),

    #[error("malformed request envelope: {0}")]
    Protocol(String),

    #[error("unknown operation: {0}")]
    UnknownOp(String),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, DaemonError>;
