//! The pluggable backend interface external-tracker sync is built against.
//!
//! Concrete backends (Jira, GitHub, GitLab, Linear) each implement this
//! trait; the reconciliation engine in [`crate::engine`] is backend-agnostic.

use chrono::{DateTime, Utc};

use crate::error::TrackerError;

/// Result alias for tracker operations.
pub type TrackerResult<T> = std::result::Result<T, TrackerError>;

/// A single issue as seen on the external tracker side.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalIssue {
    pub external_id: String,
    pub title: String,
    pub description: String,
    pub status: String,
    pub updated_at: DateTime<Utc>,
}

/// A backend that can list and push issues to an external tracker.
///
/// Implementations own their own HTTP client and auth; the engine only ever
/// calls these three methods and treats [`TrackerError::is_retryable`]
/// failures as eligible for the configured retry budget.
pub trait ExternalTracker: Send + Sync {
    /// Human-readable backend name, used in logs (`"jira"`, `"github"`, ...).
    fn name(&self) -> &str;

    /// Lists issues changed since `since` (or everything, if `None`).
    fn fetch_since(&self, since: Option<DateTime<Utc>>) -> TrackerResult<Vec<ExternalIssue>>;

    /// Creates or updates the external issue. `external_id` is `Some` when
    /// updating an issue already linked via `Issue::external_ref`; `None`
    /// when pushing a local issue that has never been synced before.
    /// Returns the external tracker's ID for the (possibly newly created)
    /// record.
    fn push(
        &self,
        title: &str,
        description: &str,
        status: &str,
        external_id: Option<&str>,
    ) -> TrackerResult<String>;
}
