//! Three-way merge of a single issue record, and of a whole JSONL mirror.

use std::collections::{HashMap, HashSet};

use beads_config::config::ConflictConfig;
use beads_core::comment::Comment;
use beads_core::dependency::Dependency;
use beads_core::enums::{IssueType, Status};
use beads_core::issue::Issue;

use crate::resolve::{merge_i32_field, merge_label_set, merge_text_field};

/// Outcome of merging one issue ID across base/ours/theirs.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    /// `None` means the issue was deleted by the merge (removed on both
    /// sides, or removed cleanly on one side with no conflicting edit).
    pub issue: Option<Issue>,
    /// Field names that needed manual resolution and were left with inline
    /// conflict markers, or (for a delete/modify clash) the literal
    /// `"deleted"` marker.
    pub conflicted_fields: Vec<String>,
}

/// Whether the mergeable content fields differ between two issues. Ignores
/// `updated_at`/`content_hash`, which change on every edit regardless of
/// content.
fn fields_equal(a: &Issue, b: &Issue) -> bool {
    a.title == b.title
        && a.description == b.description
        && a.design == b.design
        && a.acceptance_criteria == b.acceptance_criteria
        && a.notes == b.notes
        && a.status == b.status
        && a.priority == b.priority
        && a.issue_type == b.issue_type
        && a.assignee == b.assignee
        && a.owner == b.owner
        && a.labels == b.labels
        && a.compaction_level == b.compaction_level
}

fn dependency_key(d: &Dependency) -> (String, String) {
    (d.depends_on_id.clone(), d.dep_type.as_str().to_string())
}

fn merge_dependencies(ours: &[Dependency], theirs: &[Dependency], ours_is_newer: bool) -> Vec<Dependency> {
    let mut by_key: HashMap<(String, String), Dependency> = HashMap::new();
    let (first, second) = if ours_is_newer {
        (theirs, ours)
    } else {
        (ours, theirs)
    };
    // Insert the older side first so the newer side's entry wins ties on the
    // same (depends_on_id, type) edge.
    for dep in first {
        by_key.insert(dependency_key(dep), dep.clone());
    }
    for dep in second {
        by_key.insert(dependency_key(dep), dep.clone());
    }
    let mut merged: Vec<Dependency> = by_key.into_values().collect();
    merged.sort_by(|a, b| a.depends_on_id.cmp(&b.depends_on_id));
    merged
}

fn comment_key(c: &Comment) -> (String, String, i64) {
    (c.author.clone(), c.text.clone(), c.created_at.timestamp())
}

/// Comments are append-only: the merged set is every comment present on
/// either side, deduplicated by (author, text, timestamp).
fn merge_comments(ours: &[Comment], theirs: &[Comment]) -> Vec<Comment> {
    let mut seen: HashSet<(String, String, i64)> = HashSet::new();
    let mut merged = Vec::new();
    for c in ours.iter().chain(theirs.iter()) {
        if seen.insert(comment_key(c)) {
            merged.push(c.clone());
        }
    }
    merged.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    merged
}

/// Merges the content fields of `ours` and `theirs` against a common `base`,
/// which may be a real prior record or a synthetic empty one (when both
/// sides independently created the same ID).
fn merge_fields(base: &Issue, ours: &Issue, theirs: &Issue, config: &ConflictConfig) -> (Issue, Vec<String>) {
    let ours_is_newer = ours.updated_at >= theirs.updated_at;
    let mut conflicts = Vec::new();
    let mut merged = ours.clone();

    let (title, c) = merge_text_field("title", &base.title, &ours.title, &theirs.title, ours_is_newer, config);
    merged.title = title;
    if c {
        conflicts.push("title".to_string());
    }

    let (description, c) = merge_text_field(
        "description",
        &base.description,
        &ours.description,
        &theirs.description,
        ours_is_newer,
        config,
    );
    merged.description = description;
    if c {
        conflicts.push("description".to_string());
    }

    let (design, c) = merge_text_field("design", &base.design, &ours.design, &theirs.design, ours_is_newer, config);
    merged.design = design;
    if c {
        conflicts.push("design".to_string());
    }

    let (ac, c) = merge_text_field(
        "acceptance_criteria",
        &base.acceptance_criteria,
        &ours.acceptance_criteria,
        &theirs.acceptance_criteria,
        ours_is_newer,
        config,
    );
    merged.acceptance_criteria = ac;
    if c {
        conflicts.push("acceptance_criteria".to_string());
    }

    let (notes, c) = merge_text_field("notes", &base.notes, &ours.notes, &theirs.notes, ours_is_newer, config);
    merged.notes = notes;
    if c {
        conflicts.push("notes".to_string());
    }

    let (status_str, c) = merge_text_field(
        "status",
        base.status.as_str(),
        ours.status.as_str(),
        theirs.status.as_str(),
        ours_is_newer,
        config,
    );
    if c {
        conflicts.push("status".to_string());
    }
    merged.status = Status::from(status_str.as_str());

    let (type_str, c) = merge_text_field(
        "issue_type",
        base.issue_type.as_str(),
        ours.issue_type.as_str(),
        theirs.issue_type.as_str(),
        ours_is_newer,
        config,
    );
    if c {
        conflicts.push("issue_type".to_string());
    }
    merged.issue_type = IssueType::from(type_str.as_str());

    let (assignee, c) = merge_text_field(
        "assignee",
        &base.assignee,
        &ours.assignee,
        &theirs.assignee,
        ours_is_newer,
        config,
    );
    merged.assignee = assignee;
    if c {
        conflicts.push("assignee".to_string());
    }

    let (priority, c) = merge_i32_field("priority", base.priority, ours.priority, theirs.priority, ours_is_newer, config);
    merged.priority = priority;
    if c {
        conflicts.push("priority".to_string());
    }

    let (compaction_level, c) = merge_i32_field(
        "compaction_level",
        base.compaction_level,
        ours.compaction_level,
        theirs.compaction_level,
        ours_is_newer,
        config,
    );
    merged.compaction_level = compaction_level;
    if c {
        conflicts.push("compaction_level".to_string());
    }

    let (labels, c) = merge_label_set("labels", &base.labels, &ours.labels, &theirs.labels, ours_is_newer, config);
    merged.labels = labels;
    if c {
        conflicts.push("labels".to_string());
    }

    merged.dependencies = merge_dependencies(&ours.dependencies, &theirs.dependencies, ours_is_newer);
    merged.comments = merge_comments(&ours.comments, &theirs.comments);
    merged.updated_at = if ours_is_newer { ours.updated_at } else { theirs.updated_at };

    (merged, conflicts)
}

/// Merges one issue ID's three versions. `base` is the common ancestor
/// record, or `None` if the ID didn't exist there.
pub fn merge_issue(
    base: Option<&Issue>,
    ours: Option<&Issue>,
    theirs: Option<&Issue>,
    config: &ConflictConfig,
) -> MergeOutcome {
    match (base, ours, theirs) {
        (_, None, None) => MergeOutcome {
            issue: None,
            conflicted_fields: Vec::new(),
        },
        (None, Some(o), None) => MergeOutcome {
            issue: Some(o.clone()),
            conflicted_fields: Vec::new(),
        },
        (None, None, Some(t)) => MergeOutcome {
            issue: Some(t.clone()),
            conflicted_fields: Vec::new(),
        },
        (None, Some(o), Some(t)) => {
            // Same ID created independently on both sides (an allocator
            // collision retried to the same slot is vanishingly unlikely,
            // but the merge still needs a deterministic answer). Merge
            // against a synthetic empty ancestor so unequal fields resolve
            // through the same per-field strategy as a real conflict.
            let synthetic_base = Issue {
                id: o.id.clone(),
                ..Issue::default()
            };
            let (merged, conflicts) = merge_fields(&synthetic_base, o, t, config);
            MergeOutcome {
                issue: Some(merged),
                conflicted_fields: conflicts,
            }
        }
        (Some(b), Some(o), Some(t)) => {
            let (merged, conflicts) = merge_fields(b, o, t, config);
            MergeOutcome {
                issue: Some(merged),
                conflicted_fields: conflicts,
            }
        }
        (Some(b), Some(o), None) => {
            if fields_equal(b, o) {
                MergeOutcome {
                    issue: None,
                    conflicted_fields: Vec::new(),
                }
            } else {
                MergeOutcome {
                    issue: Some(o.clone()),
                    conflicted_fields: vec!["deleted".to_string()],
                }
            }
        }
        (Some(b), None, Some(t)) => {
            if fields_equal(b, t) {
                MergeOutcome {
                    issue: None,
                    conflicted_fields: Vec::new(),
                }
            } else {
                MergeOutcome {
                    issue: Some(t.clone()),
                    conflicted_fields: vec!["deleted".to_string()],
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_config::config::{ConflictStrategy, FieldStrategy};
    use beads_core::issue::IssueBuilder;
    use chrono::{Duration, Utc};
    use std::collections::HashMap as Map;

    fn config(strategy: ConflictStrategy, fields: &[(&str, FieldStrategy)]) -> ConflictConfig {
        ConflictConfig {
            strategy,
            fields: fields.iter().map(|(k, v)| (k.to_string(), v.clone())).collect::<Map<_, _>>(),
        }
    }

    #[test]
    fn unmodified_side_yields_to_the_changed_one() {
        let base = IssueBuilder::new("Original").id("bd-m1").build();
        let ours = base.clone();
        let mut theirs = base.clone();
        theirs.title = "Renamed".to_string();
        theirs.updated_at = Utc::now();

        let outcome = merge_issue(Some(&base), Some(&ours), Some(&theirs), &config(ConflictStrategy::Newest, &[]));
        let merged = outcome.issue.unwrap();
        assert_eq!(merged.title, "Renamed");
        assert!(outcome.conflicted_fields.is_empty());
    }

    #[test]
    fn label_additions_on_both_sides_union_under_override() {
        let base = IssueBuilder::new("Task").id("bd-m2").labels(vec!["a".into()]).build();
        let mut ours = base.clone();
        ours.labels = vec!["a".into(), "urgent".into()];
        let mut theirs = base.clone();
        theirs.labels = vec!["a".into(), "blocked".into()];

        let cfg = config(ConflictStrategy::Newest, &[("labels", FieldStrategy::Union)]);
        let outcome = merge_issue(Some(&base), Some(&ours), Some(&theirs), &cfg);
        let merged = outcome.issue.unwrap();
        assert_eq!(merged.labels, vec!["a", "blocked", "urgent"]);
        assert!(!outcome.conflicted_fields.contains(&"labels".to_string()));
    }

    #[test]
    fn divergent_edits_under_manual_strategy_carry_markers() {
        let base = IssueBuilder::new("Task").id("bd-m3").build();
        let mut ours = base.clone();
        ours.description = "ours wrote this".to_string();
        let mut theirs = base.clone();
        theirs.description = "theirs wrote something else".to_string();

        let outcome = merge_issue(
            Some(&base),
            Some(&ours),
            Some(&theirs),
            &config(ConflictStrategy::Manual, &[]),
        );
        let merged = outcome.issue.unwrap();
        assert!(merged.description.contains("<<<<<<< ours"));
        assert!(outcome.conflicted_fields.contains(&"description".to_string()));
    }

    #[test]
    fn deleted_one_side_modified_other_is_flagged_not_silently_dropped() {
        let base = IssueBuilder::new("Task").id("bd-m4").build();
        let mut ours = base.clone();
        ours.notes = "kept working on it".to_string();

        let outcome = merge_issue(Some(&base), Some(&ours), None, &config(ConflictStrategy::Newest, &[]));
        assert!(outcome.issue.is_some());
        assert_eq!(outcome.conflicted_fields, vec!["deleted".to_string()]);
    }

    #[test]
    fn deleted_cleanly_on_one_side_unmodified_on_the_other_is_removed() {
        let base = IssueBuilder::new("Task").id("bd-m5").build();
        let ours = base.clone();

        let outcome = merge_issue(Some(&base), Some(&ours), None, &config(ConflictStrategy::Newest, &[]));
        assert!(outcome.issue.is_none());
        assert!(outcome.conflicted_fields.is_empty());
    }

    #[test]
    fn dependencies_union_across_both_sides() {
        let base = IssueBuilder::new("Task").id("bd-m6").build();
        let mut ours = base.clone();
        ours.dependencies = vec![Dependency {
            issue_id: "bd-m6".into(),
            depends_on_id: "bd-dep1".into(),
            dep_type: beads_core::enums::DependencyType::Blocks,
            created_at: Utc::now() - Duration::hours(1),
            created_by: "alice".into(),
            metadata: String::new(),
            thread_id: String::new(),
        }];
        let mut theirs = base.clone();
        theirs.dependencies = vec![Dependency {
            issue_id: "bd-m6".into(),
            depends_on_id: "bd-dep2".into(),
            dep_type: beads_core::enums::DependencyType::ParentChild,
            created_at: Utc::now(),
            created_by: "bob".into(),
            metadata: String::new(),
            thread_id: String::new(),
        }];

        let outcome = merge_issue(Some(&base), Some(&ours), Some(&theirs), &config(ConflictStrategy::Newest, &[]));
        let merged = outcome.issue.unwrap();
        assert_eq!(merged.dependencies.len(), 2);
    }
}
