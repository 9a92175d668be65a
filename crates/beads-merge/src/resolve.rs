//! Field-level conflict resolution, reused from the [`beads_config`] conflict
//! configuration for both the sync engine's record-level decisions and this
//! crate's per-field three-way merges.

use std::collections::HashSet;

use beads_config::config::{ConflictConfig, ConflictStrategy, FieldStrategy};

/// A [`FieldStrategy`] widened with the two global-only outcomes
/// ([`ConflictStrategy::Ours`] / [`ConflictStrategy::Theirs`]) so a single
/// match arm in the merge helpers below covers both the global default and
/// any per-field override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Effective {
    Newest,
    Max,
    Union,
    Manual,
    Ours,
    Theirs,
}

fn effective_strategy(field: &str, config: &ConflictConfig) -> Effective {
    if let Some(fs) = config.fields.get(field) {
        return match fs {
            FieldStrategy::Newest => Effective::Newest,
            FieldStrategy::Max => Effective::Max,
            FieldStrategy::Union => Effective::Union,
            FieldStrategy::Manual => Effective::Manual,
        };
    }
    match config.strategy {
        ConflictStrategy::Newest => Effective::Newest,
        ConflictStrategy::Ours => Effective::Ours,
        ConflictStrategy::Theirs => Effective::Theirs,
        ConflictStrategy::Manual => Effective::Manual,
    }
}

/// Wraps a value irreconcilably in conflict with inline markers, the same
/// shape `git merge-file` leaves in a text file.
pub fn conflict_markers(ours: &str, theirs: &str) -> String {
    format!("<<<<<<< ours\n{ours}\n=======\n{theirs}\n>>>>>>> theirs")
}

/// Three-way merge of a single text field. Returns the merged value and
/// whether `field` needed manual resolution (and so was left with inline
/// conflict markers rather than a clean value).
pub fn merge_text_field(
    field: &str,
    base: &str,
    ours: &str,
    theirs: &str,
    ours_is_newer: bool,
    config: &ConflictConfig,
) -> (String, bool) {
    if ours == theirs {
        return (ours.to_string(), false);
    }
    if ours == base {
        return (theirs.to_string(), false);
    }
    if theirs == base {
        return (ours.to_string(), false);
    }
    match effective_strategy(field, config) {
        Effective::Ours => (ours.to_string(), false),
        Effective::Theirs => (theirs.to_string(), false),
        Effective::Newest | Effective::Max => {
            let winner = if ours_is_newer { ours } else { theirs };
            (winner.to_string(), false)
        }
        Effective::Union | Effective::Manual => (conflict_markers(ours, theirs), true),
    }
}

/// Three-way merge of an `i32` field (priority, compaction_level); `Max`
/// picks the larger of the two changed values instead of newest-wins.
pub fn merge_i32_field(
    field: &str,
    base: i32,
    ours: i32,
    theirs: i32,
    ours_is_newer: bool,
    config: &ConflictConfig,
) -> (i32, bool) {
    if ours == theirs {
        return (ours, false);
    }
    if ours == base {
        return (theirs, false);
    }
    if theirs == base {
        return (ours, false);
    }
    match effective_strategy(field, config) {
        Effective::Ours => (ours, false),
        Effective::Theirs => (theirs, false),
        Effective::Newest => (if ours_is_newer { ours } else { theirs }, false),
        Effective::Max => (ours.max(theirs), false),
        Effective::Union => (ours.max(theirs), false),
        Effective::Manual => (ours.max(theirs), true),
    }
}

/// Three-way merge of a string-set field (labels). `Union` keeps every label
/// present on either side; `Newest` replaces the whole set with whichever
/// side changed most recently.
pub fn merge_label_set(
    field: &str,
    base: &[String],
    ours: &[String],
    theirs: &[String],
    ours_is_newer: bool,
    config: &ConflictConfig,
) -> (Vec<String>, bool) {
    if ours == theirs {
        return (ours.to_vec(), false);
    }
    let base_set: HashSet<&str> = base.iter().map(String::as_str).collect();
    let ours_set: HashSet<&str> = ours.iter().map(String::as_str).collect();
    let theirs_set: HashSet<&str> = theirs.iter().map(String::as_str).collect();
    if ours_set == base_set {
        return (theirs.to_vec(), false);
    }
    if theirs_set == base_set {
        return (ours.to_vec(), false);
    }
    let union_sorted = || {
        let mut merged: Vec<String> = ours_set.union(&theirs_set).map(|s| s.to_string()).collect();
        merged.sort();
        merged
    };
    match effective_strategy(field, config) {
        Effective::Ours => (ours.to_vec(), false),
        Effective::Theirs => (theirs.to_vec(), false),
        Effective::Newest => (
            if ours_is_newer { ours.to_vec() } else { theirs.to_vec() },
            false,
        ),
        Effective::Union => (union_sorted(), false),
        Effective::Manual => (union_sorted(), true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(strategy: ConflictStrategy, fields: &[(&str, FieldStrategy)]) -> ConflictConfig {
        ConflictConfig {
            strategy,
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn unchanged_side_loses_to_the_other() {
        let cfg = config(ConflictStrategy::Newest, &[]);
        let (v, conflicted) = merge_text_field("title", "base", "base", "theirs changed", true, &cfg);
        assert_eq!(v, "theirs changed");
        assert!(!conflicted);
    }

    #[test]
    fn both_changed_falls_back_to_newest() {
        let cfg = config(ConflictStrategy::Newest, &[]);
        let (v, conflicted) = merge_text_field("title", "base", "ours", "theirs", true, &cfg);
        assert_eq!(v, "ours");
        assert!(!conflicted);
    }

    #[test]
    fn manual_strategy_emits_conflict_markers() {
        let cfg = config(ConflictStrategy::Manual, &[]);
        let (v, conflicted) = merge_text_field("title", "base", "ours", "theirs", true, &cfg);
        assert!(conflicted);
        assert!(v.contains("<<<<<<< ours"));
        assert!(v.contains(">>>>>>> theirs"));
    }

    #[test]
    fn field_override_wins_over_global_strategy() {
        let cfg = config(ConflictStrategy::Ours, &[("priority", FieldStrategy::Max)]);
        let (v, conflicted) = merge_i32_field("priority", 1, 3, 2, true, &cfg);
        assert_eq!(v, 3);
        assert!(!conflicted);
    }

    #[test]
    fn label_union_keeps_both_sides_additions() {
        let cfg = config(ConflictStrategy::Newest, &[("labels", FieldStrategy::Union)]);
        let base = vec!["a".to_string()];
        let ours = vec!["a".to_string(), "urgent".to_string()];
        let theirs = vec!["a".to_string(), "blocked".to_string()];
        let (merged, conflicted) = merge_label_set("labels", &base, &ours, &theirs, true, &cfg);
        assert!(!conflicted);
        assert_eq!(merged, vec!["a", "blocked", "urgent"]);
    }
}
