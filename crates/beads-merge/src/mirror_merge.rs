//! Drives [`crate::engine::merge_issue`] over whole JSONL mirrors, the unit
//! a VCS merge driver actually hands this crate (`bd merge-driver %O %A %B`
//! in `.gitattributes` terms: base, ours, theirs).

use std::collections::HashMap;
use std::path::Path;

use beads_config::config::ConflictConfig;
use beads_core::issue::Issue;
use beads_core::jsonl;

use crate::engine::merge_issue;
use crate::error::Result;

/// Outcome of merging three JSONL mirror files.
#[derive(Debug, Clone, Default)]
pub struct MergeReport {
    pub merged: Vec<Issue>,
    pub clean: usize,
    pub auto_resolved: usize,
    /// One entry per issue ID that needed manual resolution, naming the
    /// fields (or `"deleted"`) left in conflict.
    pub conflicts: Vec<(String, Vec<String>)>,
}

fn read_by_id(path: &Path) -> Result<HashMap<String, Issue>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut map = HashMap::new();
    for issue in jsonl::read_jsonl(reader) {
        let issue = issue?;
        map.insert(issue.id.clone(), issue);
    }
    Ok(map)
}

/// Merges `base`, `ours`, and `theirs` JSONL mirror files into one
/// reconciled issue set. Does not write output; callers serialize
/// `MergeReport::merged` wherever the merge driver's contract expects it
/// (typically back over `ours`' path).
pub fn merge_mirrors(base: &Path, ours: &Path, theirs: &Path, config: &ConflictConfig) -> Result<MergeReport> {
    let base_map = read_by_id(base)?;
    let ours_map = read_by_id(ours)?;
    let theirs_map = read_by_id(theirs)?;

    let mut ids: Vec<&str> = base_map
        .keys()
        .chain(ours_map.keys())
        .chain(theirs_map.keys())
        .map(String::as_str)
        .collect();
    ids.sort_unstable();
    ids.dedup();

    let mut report = MergeReport::default();
    for id in ids {
        let outcome = merge_issue(base_map.get(id), ours_map.get(id), theirs_map.get(id), config);
        match (&outcome.issue, outcome.conflicted_fields.is_empty()) {
            (Some(issue), true) => {
                report.clean += 1;
                report.merged.push(issue.clone());
            }
            (Some(issue), false) => {
                report.auto_resolved += 1;
                report.conflicts.push((id.to_string(), outcome.conflicted_fields));
                report.merged.push(issue.clone());
            }
            (None, _) => {}
        }
    }
    report.merged.sort_by(|a, b| a.id.cmp(&b.id));
    tracing::info!(
        clean = report.clean,
        conflicts = report.conflicts.len(),
        "merged jsonl mirrors"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_config::config::ConflictStrategy;
    use beads_core::issue::IssueBuilder;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_mirror(path: &Path, issues: &[Issue]) {
        let mut file = std::fs::File::create(path).unwrap();
        for issue in issues {
            serde_json::to_writer(&mut file, issue).unwrap();
            writeln!(file).unwrap();
        }
    }

    #[test]
    fn merges_independent_additions_from_both_sides() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("base.jsonl");
        let ours = dir.path().join("ours.jsonl");
        let theirs = dir.path().join("theirs.jsonl");

        write_mirror(&base, &[]);
        write_mirror(&ours, &[IssueBuilder::new("Added by ours").id("bd-o1").build()]);
        write_mirror(&theirs, &[IssueBuilder::new("Added by theirs").id("bd-t1").build()]);

        let config = ConflictConfig {
            strategy: ConflictStrategy::Newest,
            fields: Default::default(),
        };
        let report = merge_mirrors(&base, &ours, &theirs, &config).unwrap();
        assert_eq!(report.clean, 2);
        assert!(report.conflicts.is_empty());
        let ids: Vec<&str> = report.merged.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["bd-o1", "bd-t1"]);
    }

    #[test]
    fn records_a_conflict_entry_for_divergent_edits() {
        let dir = tempdir().unwrap();
        let base_issue = IssueBuilder::new("Shared").id("bd-s1").build();
        let mut ours_issue = base_issue.clone();
        ours_issue.title = "Ours renamed it".to_string();
        let mut theirs_issue = base_issue.clone();
        theirs_issue.title = "Theirs renamed it".to_string();

        let base = dir.path().join("base.jsonl");
        let ours = dir.path().join("ours.jsonl");
        let theirs = dir.path().join("theirs.jsonl");
        write_mirror(&base, &[base_issue]);
        write_mirror(&ours, &[ours_issue]);
        write_mirror(&theirs, &[theirs_issue]);

        let config = ConflictConfig {
            strategy: ConflictStrategy::Manual,
            fields: Default::default(),
        };
        let report = merge_mirrors(&base, &ours, &theirs, &config).unwrap();
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].0, "bd-s1");
        assert!(report.conflicts[0].1.contains(&"title".to_string()));
    }
}
