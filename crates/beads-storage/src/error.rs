//! Storage error types.
//!
//! Every variant maps to exactly one tag in the closed error taxonomy the rest
//! of the system relies on (the daemon's RPC envelopes, the sync engine's retry
//! policy, and the CLI's exit-code mapping all branch on [`StorageError::kind`]
//! rather than matching variants directly).

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested entity was not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g., "issue", "config").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// A partial ID prefix matched more than one full ID.
    #[error("ambiguous id prefix {prefix}: matches {matches:?}")]
    Ambiguous {
        /// The prefix that was looked up.
        prefix: String,
        /// The full IDs it matched.
        matches: Vec<String>,
    },

    /// An issue is already claimed by another assignee.
    #[error("issue already claimed by {assignee}")]
    AlreadyClaimed {
        /// Current assignee who holds the claim.
        assignee: String,
    },

    /// A mutation conflicts with the current state of the row (a supplied ID
    /// already exists, a concurrent writer won a race, etc).
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the conflicting state.
        message: String,
    },

    /// The database has not been initialized.
    #[error("database not initialized: {reason}")]
    NotInitialized {
        /// Why the database is considered uninitialized.
        reason: String,
    },

    /// An issue ID does not match the configured prefix.
    #[error("issue {id} does not match configured prefix {prefix}")]
    PrefixMismatch {
        /// The issue ID.
        id: String,
        /// The expected prefix.
        prefix: String,
    },

    /// A validation constraint was violated.
    #[error("validation error: {message}")]
    Validation {
        /// Description of the validation failure.
        message: String,
    },

    /// A policy rule rejected the operation (e.g. mutating a template, or a
    /// closed issue's identity fields).
    #[error("policy violation: {message}")]
    Policy {
        /// Description of the policy that was violated.
        message: String,
    },

    /// The operation is blocked by an open predecessor (e.g. closing an issue
    /// with an open `blocks` dependency, absent an override).
    #[error("blocked by: {blockers:?}")]
    Blocked {
        /// IDs of the issues blocking this operation.
        blockers: Vec<String>,
    },

    /// Adding a dependency would create a cycle in the dependency graph.
    #[error("adding this dependency would create a cycle")]
    CycleDetected,

    /// ID allocation exhausted the maximum suffix length without finding a
    /// free slot.
    #[error("id allocation exhausted at max suffix length for prefix {prefix}")]
    Exhausted {
        /// The prefix allocation was attempted under.
        prefix: String,
    },

    /// The database is locked by another process.
    #[error("database locked: {0}")]
    DatabaseLocked(String),

    /// Failed to establish or maintain a database connection.
    #[error("connection error: {0}")]
    Connection(String),

    /// A transaction operation failed.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// A schema migration failed.
    #[error("migration {name} failed: {reason}")]
    Migration {
        /// Name of the migration that failed.
        name: String,
        /// Underlying error description.
        reason: String,
    },

    /// An operation was cancelled (client disconnect, cooperative cancellation
    /// signal) before it committed.
    #[error("operation cancelled")]
    Cancelled,

    /// A filesystem-level failure (mirror write, lock file, staging file).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A raw SQLite query error.
    #[error("query error: {0}")]
    Query(#[from] rusqlite::Error),

    /// JSON serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Catch-all for unexpected internal errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the storage crate.
pub type Result<T> = std::result::Result<T, StorageError>;

/// The wire tag for an error, matching the closed taxonomy shared by the
/// daemon's RPC envelopes and the CLI's exit-code mapping.
///
/// `Auth` and `RateLimited` are not produced by the Store itself (they belong
/// to the sync engine's external-tracker errors) but are part of the same
/// closed set and are reserved here so callers can match on one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Ambiguous,
    Conflict,
    Validation,
    Policy,
    Blocked,
    Cycle,
    Exhausted,
    Transient,
    Io,
    Auth,
    RateLimited,
    Cancelled,
}

impl ErrorKind {
    /// The lowercase wire string used in RPC envelopes and JSON output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Ambiguous => "ambiguous",
            Self::Conflict => "conflict",
            Self::Validation => "validation",
            Self::Policy => "policy",
            Self::Blocked => "blocked",
            Self::Cycle => "cycle",
            Self::Exhausted => "exhausted",
            Self::Transient => "transient",
            Self::Io => "io",
            Self::Auth => "auth",
            Self::RateLimited => "rate_limited",
            Self::Cancelled => "cancelled",
        }
    }
}

impl StorageError {
    // -- Constructors --------------------------------------------------------

    /// Creates a [`StorageError::NotFound`] for the given entity kind and id.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a [`StorageError::Validation`] with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a [`StorageError::Conflict`] with the given message.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a [`StorageError::Policy`] with the given message.
    pub fn policy(message: impl Into<String>) -> Self {
        Self::Policy {
            message: message.into(),
        }
    }

    // -- Predicates ----------------------------------------------------------

    /// Returns `true` if this is a [`StorageError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if the error is transient and the operation may succeed
    /// on retry (e.g., database locked, connection errors).
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient)
    }

    /// Maps this error onto the closed taxonomy tag used by RPC envelopes.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Ambiguous { .. } => ErrorKind::Ambiguous,
            Self::AlreadyClaimed { .. } | Self::Conflict { .. } => ErrorKind::Conflict,
            Self::NotInitialized { .. } => ErrorKind::Io,
            Self::PrefixMismatch { .. } => ErrorKind::Validation,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Policy { .. } => ErrorKind::Policy,
            Self::Blocked { .. } => ErrorKind::Blocked,
            Self::CycleDetected => ErrorKind::Cycle,
            Self::Exhausted { .. } => ErrorKind::Exhausted,
            Self::DatabaseLocked(_) | Self::Connection(_) | Self::Transaction(_) => {
                ErrorKind::Transient
            }
            Self::Migration { .. } | Self::Io(_) | Self::Query(_) | Self::Serialization(_) => {
                ErrorKind::Io
            }
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Internal(_) => ErrorKind::Io,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_not_found() {
        let e = StorageError::not_found("issue", "bd-123");
        assert_eq!(e.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn kind_maps_claim_conflict() {
        let e = StorageError::AlreadyClaimed {
            assignee: "alice".into(),
        };
        assert_eq!(e.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn kind_maps_cycle() {
        assert_eq!(StorageError::CycleDetected.kind(), ErrorKind::Cycle);
    }

    #[test]
    fn retryable_only_for_transient() {
        assert!(StorageError::Connection("x".into()).is_retryable());
        assert!(!StorageError::validation("bad").is_retryable());
    }

    #[test]
    fn exhausted_kind() {
        let e = StorageError::Exhausted {
            prefix: "bd".into(),
        };
        assert_eq!(e.kind(), ErrorKind::Exhausted);
        assert_eq!(e.kind().as_str(), "exhausted");
    }
}
