//! Export: gather, canonicalize, stage, fsync, atomic-rename, digest.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use beads_core::enums::EventType;
use beads_core::filter::IssueFilter;
use beads_core::issue::Issue;
use beads_storage::Storage;
use serde::{Deserialize, Serialize};

use crate::digest::{self, DELETIONS_FILE_NAME, MIRROR_FILE_NAME, MirrorMetadata};
use crate::error::Result;

/// A tombstone record written to `deletions.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionRecord {
    pub id: String,
    pub deleted_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub deleted_by: String,
}

fn normalize_newlines(s: &str) -> String {
    if s.contains('\r') {
        s.replace("\r\n", "\n").replace('\r', "\n")
    } else {
        s.to_string()
    }
}

/// Stable field order comes from `Issue`'s own struct declaration (serde
/// serializes structs in declaration order, not alphabetically); this only
/// has to normalize the free-text fields that can carry CRLF.
fn canonicalize(mut issue: Issue) -> Issue {
    issue.title = normalize_newlines(&issue.title);
    issue.description = normalize_newlines(&issue.description);
    issue.design = normalize_newlines(&issue.design);
    issue.acceptance_criteria = normalize_newlines(&issue.acceptance_criteria);
    issue.notes = normalize_newlines(&issue.notes);
    issue
}

/// `search_issues` returns bare issue rows; labels, comments, and outgoing
/// dependency edges live in their own tables and must be hydrated separately
/// before an issue is embedded whole in the mirror.
fn hydrate(store: &dyn Storage, mut issue: Issue) -> Result<Issue> {
    issue.labels = store.get_labels(&issue.id)?;
    issue.comments = store.get_comments(&issue.id)?;
    issue.dependencies = store
        .get_dependencies_with_metadata(&issue.id)?
        .into_iter()
        .map(|with_meta| with_meta.dependency)
        .collect();
    Ok(issue)
}

fn deleted_by(store: &dyn Storage, issue_id: &str) -> String {
    store
        .get_events(issue_id, 20)
        .ok()
        .and_then(|events| {
            events
                .into_iter()
                .rev()
                .find(|e| e.event_type == EventType::Deleted)
                .map(|e| e.actor)
        })
        .unwrap_or_default()
}

/// Exports all non-ephemeral issues to the mirror directory and writes the
/// sibling `deletions.jsonl` tombstone set and `metadata.json` digest.
///
/// Callers must hold the `.sync.lock` guard across this call (see
/// [`beads_lockfile::FileLock`]); this function does not acquire it itself so
/// export and other mirror-affecting operations can share one acquisition.
pub fn export_mirror(store: &dyn Storage, mirror_dir: &Path) -> Result<MirrorMetadata> {
    std::fs::create_dir_all(mirror_dir)?;

    let all = store.search_issues("", &IssueFilter::default())?;

    let mut exported: Vec<Issue> = Vec::new();
    let mut deletions: Vec<DeletionRecord> = Vec::new();

    for issue in all {
        if issue.tombstoned {
            deletions.push(DeletionRecord {
                id: issue.id.clone(),
                deleted_at: issue.updated_at,
                deleted_by: deleted_by(store, &issue.id),
            });
            continue;
        }
        if issue.ephemeral {
            continue;
        }
        exported.push(canonicalize(hydrate(store, issue)?));
    }

    exported.sort_by(|a, b| a.id.cmp(&b.id));
    deletions.sort_by(|a, b| a.id.cmp(&b.id));

    let mirror_path = mirror_dir.join(MIRROR_FILE_NAME);
    let staging_path = mirror_dir.join(format!(".{MIRROR_FILE_NAME}.staging"));
    {
        let mut staging = File::create(&staging_path)?;
        for issue in &exported {
            let line = serde_json::to_string(issue)?;
            staging.write_all(line.as_bytes())?;
            staging.write_all(b"\n")?;
        }
        staging.sync_all()?;
    }
    std::fs::rename(&staging_path, &mirror_path)?;

    let deletions_path = mirror_dir.join(DELETIONS_FILE_NAME);
    let deletions_staging = mirror_dir.join(format!(".{DELETIONS_FILE_NAME}.staging"));
    {
        let mut staging = File::create(&deletions_staging)?;
        for record in &deletions {
            let line = serde_json::to_string(record)?;
            staging.write_all(line.as_bytes())?;
            staging.write_all(b"\n")?;
        }
        staging.sync_all()?;
    }
    std::fs::rename(&deletions_staging, &deletions_path)?;

    let bytes = std::fs::read(&mirror_path)?;
    let metadata = MirrorMetadata {
        exported_at: chrono::Utc::now(),
        record_count: exported.len(),
        digest: digest::digest_bytes(&bytes),
    };
    digest::write_metadata(mirror_dir, &metadata)?;

    tracing::info!(
        record_count = metadata.record_count,
        deletions = deletions.len(),
        "exported jsonl mirror"
    );

    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::issue::IssueBuilder;
    use beads_storage::SqliteStore;

    #[test]
    fn export_writes_mirror_and_metadata() {
        let store = SqliteStore::open_in_memory().unwrap();
        let issue = IssueBuilder::new("Exported").id("bd-exp1").build();
        store.create_issue(&issue, "alice").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let metadata = export_mirror(&store, dir.path()).unwrap();

        assert_eq!(metadata.record_count, 1);
        let content = std::fs::read_to_string(dir.path().join(MIRROR_FILE_NAME)).unwrap();
        assert!(content.contains("bd-exp1"));
        assert!(dir.path().join(crate::digest::METADATA_FILE_NAME).exists());
    }

    #[test]
    fn export_hydrates_labels_comments_and_dependencies() {
        let store = SqliteStore::open_in_memory().unwrap();
        let parent = IssueBuilder::new("Parent").id("bd-hydp").build();
        let child = IssueBuilder::new("Child").id("bd-hydc").build();
        store.create_issue(&parent, "alice").unwrap();
        store.create_issue(&child, "alice").unwrap();
        store.add_label("bd-hydc", "urgent", "alice").unwrap();
        store.add_comment("bd-hydc", "alice", "looking into it").unwrap();
        let dep = beads_core::dependency::Dependency {
            issue_id: "bd-hydc".into(),
            depends_on_id: "bd-hydp".into(),
            dep_type: beads_core::enums::DependencyType::ParentChild,
            created_at: chrono::Utc::now(),
            created_by: "alice".into(),
            metadata: String::new(),
            thread_id: String::new(),
        };
        store.add_dependency(&dep, "alice").unwrap();

        let dir = tempfile::tempdir().unwrap();
        export_mirror(&store, dir.path()).unwrap();

        let content = std::fs::read_to_string(dir.path().join(MIRROR_FILE_NAME)).unwrap();
        let child_line = content
            .lines()
            .find(|line| line.contains("bd-hydc"))
            .expect("child issue present in mirror");
        let parsed: Issue = serde_json::from_str(child_line).unwrap();
        assert_eq!(parsed.labels, vec!["urgent".to_string()]);
        assert_eq!(parsed.comments.len(), 1);
        assert_eq!(parsed.comments[0].text, "looking into it");
        assert_eq!(parsed.dependencies.len(), 1);
        assert_eq!(parsed.dependencies[0].depends_on_id, "bd-hydp");
    }

    #[test]
    fn export_excludes_ephemeral_and_routes_tombstones_to_deletions() {
        let store = SqliteStore::open_in_memory().unwrap();
        let normal = IssueBuilder::new("Kept").id("bd-kept").build();
        let wisp = IssueBuilder::new("Wisp").id("bd-wisp").ephemeral(true).build();
        store.create_issue(&normal, "alice").unwrap();
        store.create_issue(&wisp, "alice").unwrap();
        store.delete_issue("bd-kept", "alice").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let metadata = export_mirror(&store, dir.path()).unwrap();

        assert_eq!(metadata.record_count, 0);
        let deletions =
            std::fs::read_to_string(dir.path().join(DELETIONS_FILE_NAME)).unwrap();
        assert!(deletions.contains("bd-kept"));
        assert!(!deletions.contains("bd-wisp"));
    }
}
