//! Merge driver error types.

/// Errors raised while running a three-way JSONL merge.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("malformed jsonl mirror: {0}")]
    Jsonl(#[from] beads_core::jsonl::JsonlError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, MergeError>;
