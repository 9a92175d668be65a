//! Deterministic pull / push / bidirectional reconciliation between the
//! store and an [`ExternalTracker`].

use chrono::{DateTime, Utc};

use beads_config::config::ExternalTrackerConfig;
use beads_core::filter::IssueFilter;
use beads_core::issue::{Issue, IssueBuilder};
use beads_storage::traits::IssueUpdates;
use beads_storage::Storage;

use crate::error::{Result, SyncError, TrackerError};
use crate::tracker::{ExternalIssue, ExternalTracker, TrackerResult};

/// Key under which the last successful sync timestamp for a tracker `kind`
/// is stashed in the store's config table.
fn last_sync_key(kind: &str) -> String {
    format!("sync.tracker.{kind}.last_sync")
}

/// An issue that changed on both sides since the last sync -- surfaced
/// regardless of `direction`, even under a push-only or pull-only
/// configuration, since silently discarding one side's edit is worse than
/// a sync run that reports a conflict and does nothing for that issue.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConflict {
    pub issue_id: String,
    pub local_updated_at: DateTime<Utc>,
    pub external_updated_at: DateTime<Utc>,
}

/// Outcome of one [`run_sync`] call.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub pulled: usize,
    pub pushed: usize,
    pub conflicts: Vec<SyncConflict>,
    pub retries: u32,
}

fn with_retries<T>(
    max_retries: u32,
    retries: &mut u32,
    mut op: impl FnMut() -> TrackerResult<T>,
) -> Result<T> {
    let mut attempt = 0;
    loop {
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                attempt += 1;
                *retries += 1;
            }
            Err(e) if attempt >= max_retries => {
                return Err(SyncError::RetriesExhausted {
                    attempts: attempt,
                    source: e,
                });
            }
            Err(e) => return Err(SyncError::Tracker(e)),
        }
    }
}

fn pull_one(
    store: &dyn Storage,
    tracker: &dyn ExternalTracker,
    remote: &ExternalIssue,
    last_sync: Option<DateTime<Utc>>,
    report: &mut SyncReport,
) -> Result<()> {
    match store.get_issue_by_external_ref(&remote.external_id) {
        Ok(local) => {
            let local_changed_since_sync = last_sync.is_none_or(|t| local.updated_at > t);
            let remote_changed_since_sync = last_sync.is_none_or(|t| remote.updated_at > t);
            if local_changed_since_sync && remote_changed_since_sync {
                report.conflicts.push(SyncConflict {
                    issue_id: local.id.clone(),
                    local_updated_at: local.updated_at,
                    external_updated_at: remote.updated_at,
                });
                return Ok(());
            }
            if remote.updated_at > local.updated_at {
                let updates = IssueUpdates {
                    title: Some(remote.title.clone()),
                    description: Some(remote.description.clone()),
                    source_system: Some(tracker.name().to_string()),
                    updated_at: Some(remote.updated_at),
                    ..Default::default()
                };
                store.update_issue(&local.id, &updates, "sync")?;
                report.pulled += 1;
            }
        }
        Err(e) if e.is_not_found() => {
            let mut issue = IssueBuilder::new(remote.title.as_str())
                .description(remote.description.as_str())
                .build();
            issue.external_ref = Some(remote.external_id.clone());
            issue.source_system = tracker.name().to_string();
            issue.updated_at = remote.updated_at;
            store.create_issue(&issue, "sync")?;
            report.pulled += 1;
        }
        Err(e) => return Err(SyncError::Store(e)),
    }
    Ok(())
}

fn push_candidates(store: &dyn Storage, kind: &str) -> Result<Vec<Issue>> {
    let all = store.search_issues("", &IssueFilter::default())?;
    Ok(all
        .into_iter()
        .filter(|issue| !issue.tombstoned && issue.source_system == kind)
        .collect())
}

fn push_one(
    store: &dyn Storage,
    tracker: &dyn ExternalTracker,
    issue: &Issue,
    report: &mut SyncReport,
    max_retries: u32,
) -> Result<()> {
    let external_id = with_retries(max_retries, &mut report.retries, || {
        tracker.push(
            &issue.title,
            &issue.description,
            issue.status.as_str(),
            issue.external_ref.as_deref(),
        )
    })?;
    if issue.external_ref.as_deref() != Some(external_id.as_str()) {
        store.update_issue(
            &issue.id,
            &IssueUpdates {
                external_ref: Some(Some(external_id)),
                ..Default::default()
            },
            "sync",
        )?;
    }
    report.pushed += 1;
    Ok(())
}

/// Runs one reconciliation pass per `config.direction` (`"pull"`, `"push"`,
/// or `"bidirectional"`). Conflict detection runs unconditionally: even a
/// push-only or pull-only config reports an issue that changed on both
/// sides instead of overwriting one side blind.
pub fn run_sync(
    store: &dyn Storage,
    tracker: &dyn ExternalTracker,
    config: &ExternalTrackerConfig,
) -> Result<SyncReport> {
    let mut report = SyncReport::default();
    let last_sync = store
        .get_config(&last_sync_key(&config.kind))
        .ok()
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let pulls_enabled = matches!(config.direction.as_str(), "pull" | "bidirectional");
    let pushes_enabled = matches!(config.direction.as_str(), "push" | "bidirectional");

    if pulls_enabled || pushes_enabled {
        // Conflict detection needs both sides regardless of direction, so
        // fetch_since always runs; a pull-disabled config just never applies
        // the resulting updates to issues with no prior conflict.
        let remote_issues = with_retries(config.max_retries, &mut report.retries, || {
            tracker.fetch_since(last_sync)
        })?;
        for remote in &remote_issues {
            if pulls_enabled {
                pull_one(store, tracker, remote, last_sync, &mut report)?;
            } else if let Ok(local) = store.get_issue_by_external_ref(&remote.external_id) {
                let local_changed = last_sync.is_none_or(|t| local.updated_at > t);
                let remote_changed = last_sync.is_none_or(|t| remote.updated_at > t);
                if local_changed && remote_changed {
                    report.conflicts.push(SyncConflict {
                        issue_id: local.id,
                        local_updated_at: local.updated_at,
                        external_updated_at: remote.updated_at,
                    });
                }
            }
        }
    }

    if pushes_enabled {
        for issue in push_candidates(store, &config.kind)? {
            let conflicted = report.conflicts.iter().any(|c| c.issue_id == issue.id);
            if conflicted {
                continue;
            }
            push_one(store, tracker, &issue, &mut report, config.max_retries)?;
        }
    }

    store.set_config(&last_sync_key(&config.kind), &Utc::now().to_rfc3339())?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_storage::SqliteStore;
    use std::sync::Mutex;

    struct MockTracker {
        name: String,
        remote: Mutex<Vec<ExternalIssue>>,
        pushed: Mutex<Vec<(String, Option<String>)>>,
        next_id: Mutex<u32>,
    }

    impl MockTracker {
        fn new(name: &str, remote: Vec<ExternalIssue>) -> Self {
            Self {
                name: name.to_string(),
                remote: Mutex::new(remote),
                pushed: Mutex::new(Vec::new()),
                next_id: Mutex::new(1),
            }
        }
    }

    impl ExternalTracker for MockTracker {
        fn name(&self) -> &str {
            &self.name
        }

        fn fetch_since(&self, _since: Option<DateTime<Utc>>) -> TrackerResult<Vec<ExternalIssue>> {
            Ok(self.remote.lock().unwrap().clone())
        }

        fn push(
            &self,
            title: &str,
            _description: &str,
            _status: &str,
            external_id: Option<&str>,
        ) -> TrackerResult<String> {
            let id = match external_id {
                Some(id) => id.to_string(),
                None => {
                    let mut next = self.next_id.lock().unwrap();
                    let id = format!("ext-{next}");
                    *next += 1;
                    id
                }
            };
            self.pushed
                .lock()
                .unwrap()
                .push((title.to_string(), external_id.map(String::from)));
            Ok(id)
        }
    }

    fn config(direction: &str) -> ExternalTrackerConfig {
        ExternalTrackerConfig {
            kind: "mock".into(),
            target: "test/repo".into(),
            token_env: "MOCK_TOKEN".into(),
            direction: direction.into(),
            max_retries: 3,
        }
    }

    #[test]
    fn pull_creates_local_issue_from_remote() {
        let store = SqliteStore::open_in_memory().unwrap();
        let tracker = MockTracker::new(
            "mock",
            vec![ExternalIssue {
                external_id: "ext-1".into(),
                title: "From tracker".into(),
                description: "synced in".into(),
                status: "open".into(),
                updated_at: Utc::now(),
            }],
        );

        let report = run_sync(&store, &tracker, &config("pull")).unwrap();
        assert_eq!(report.pulled, 1);
        assert!(report.conflicts.is_empty());

        let issue = store.get_issue_by_external_ref("ext-1").unwrap();
        assert_eq!(issue.title, "From tracker");
        assert_eq!(issue.source_system, "mock");
    }

    #[test]
    fn push_sends_unsynced_issue_and_records_external_id() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut issue = beads_core::issue::IssueBuilder::new("Needs pushing")
            .id("bd-push1")
            .build();
        issue.source_system = "mock".into();
        store.create_issue(&issue, "alice").unwrap();

        let tracker = MockTracker::new("mock", Vec::new());
        let report = run_sync(&store, &tracker, &config("push")).unwrap();
        assert_eq!(report.pushed, 1);

        let updated = store.get_issue("bd-push1").unwrap();
        assert_eq!(updated.external_ref.as_deref(), Some("ext-1"));
    }

    #[test]
    fn bidirectional_detects_conflict_and_skips_both_sides() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut local = beads_core::issue::IssueBuilder::new("Local edit")
            .id("bd-conf1")
            .build();
        local.external_ref = Some("ext-conf".into());
        local.source_system = "mock".into();
        store.create_issue(&local, "alice").unwrap();
        store
            .set_config(&last_sync_key("mock"), &(Utc::now() - chrono::Duration::hours(1)).to_rfc3339())
            .unwrap();
        store
            .update_issue(
                "bd-conf1",
                &IssueUpdates {
                    title: Some("Locally changed".into()),
                    ..Default::default()
                },
                "alice",
            )
            .unwrap();

        let tracker = MockTracker::new(
            "mock",
            vec![ExternalIssue {
                external_id: "ext-conf".into(),
                title: "Remotely changed".into(),
                description: String::new(),
                status: "open".into(),
                updated_at: Utc::now(),
            }],
        );

        let report = run_sync(&store, &tracker, &config("bidirectional")).unwrap();
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].issue_id, "bd-conf1");
        assert_eq!(report.pushed, 0, "conflicted issue is not pushed this round");

        let untouched = store.get_issue("bd-conf1").unwrap();
        assert_eq!(untouched.title, "Locally changed");
    }
}
