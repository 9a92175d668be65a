//! Router error types.

/// Errors from prefix resolution and foreign-store lookup.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    /// No route entry (env override or `routes.jsonl`) matched the prefix.
    #[error("no route registered for prefix {prefix:?}")]
    NoRoute { prefix: String },

    /// A route pointed at a directory that doesn't hold a beads store.
    #[error("route target {path:?} for prefix {prefix:?} does not exist")]
    TargetMissing { prefix: String, path: std::path::PathBuf },

    /// `routes.jsonl` exists but a line failed to parse.
    #[error("malformed routes.jsonl at line {line}: {source}")]
    Malformed { line: usize, source: serde_json::Error },

    /// Underlying filesystem failure reading `routes.jsonl`.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Opening or querying the foreign store failed.
    #[error("foreign store error: {0}")]
    Store(#[from] beads_storage::StorageError),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, RouterError>;
