//! Label-subscription matching for advice delivery.

use std::collections::HashSet;

/// The set of labels an agent `rig/role/name` is implicitly subscribed to,
/// plus any opt-in custom labels supplied at query time.
#[derive(Debug, Clone)]
pub struct Subscription {
    labels: HashSet<String>,
}

impl Subscription {
    /// Builds the standard subscription set for an agent: `global`,
    /// `rig:<rig>`, `role:<role>`, `agent:<rig>/<role>/<name>`, plus `extra`.
    pub fn for_agent(
        rig: &str,
        role: &str,
        name: &str,
        extra: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut labels: HashSet<String> = HashSet::new();
        labels.insert("global".to_string());
        labels.insert(format!("rig:{rig}"));
        labels.insert(format!("role:{role}"));
        labels.insert(format!("agent:{rig}/{role}/{name}"));
        labels.extend(extra);
        Self { labels }
    }

    /// Builds a subscription from an arbitrary, already-assembled label set
    /// (used in tests and for ad hoc queries).
    pub fn from_labels(labels: impl IntoIterator<Item = String>) -> Self {
        Self {
            labels: labels.into_iter().collect(),
        }
    }

    /// Whether this subscription directly contains `label`.
    pub fn contains(&self, label: &str) -> bool {
        self.labels.contains(label)
    }
}

/// Splits a compound label `g<N>:<payload>` into its group key and payload.
///
/// Returns `None` for labels with no `g<N>:` prefix; each such label is its
/// own single-member AND-group (backward compatible with plain labels).
fn parse_group(label: &str) -> Option<(&str, &str)> {
    let rest = label.strip_prefix('g')?;
    let (num, payload) = rest.split_once(':')?;
    if !num.is_empty() && num.bytes().all(|b| b.is_ascii_digit()) {
        Some((num, payload))
    } else {
        None
    }
}

/// Returns `true` if `advice_labels` matches `subscription`.
///
/// Labels sharing a `g<N>:` prefix form an AND-group; distinct groups (and
/// every ungrouped label, each its own singleton group) form OR-alternatives.
/// The advice matches when any one group is entirely contained in the
/// subscription.
pub fn labels_match(advice_labels: &[String], subscription: &Subscription) -> bool {
    let mut groups: Vec<Vec<&str>> = Vec::new();
    let mut group_index: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();

    for label in advice_labels {
        match parse_group(label) {
            Some((group, payload)) => {
                let idx = *group_index.entry(group).or_insert_with(|| {
                    groups.push(Vec::new());
                    groups.len() - 1
                });
                groups[idx].push(payload);
            }
            None => groups.push(vec![label.as_str()]),
        }
    }

    groups
        .iter()
        .any(|group| group.iter().all(|payload| subscription.contains(payload)))
}

/// Whether an advice issue with the given labels and closed-ness is visible
/// to `subscription`. Closed advice is excluded unless `include_closed` is set.
pub fn advice_matches(
    advice_labels: &[String],
    is_closed: bool,
    include_closed: bool,
    subscription: &Subscription,
) -> bool {
    if is_closed && !include_closed {
        return false;
    }
    labels_match(advice_labels, subscription)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn plain_labels_match_whole_subscription() {
        let sub = Subscription::for_agent("gastown", "crew", "wolf", []);
        let advice = labels(&["global", "rig:gastown", "role:crew"]);
        assert!(labels_match(&advice, &sub));

        let other = Subscription::for_agent("beads", "polecats", "quartz", []);
        assert!(!labels_match(&advice, &other));
    }

    #[test]
    fn compound_groups_are_or_alternatives() {
        let advice = labels(&["g0:role:polecat", "g0:rig:beads", "g1:role:crew"]);

        let quartz = Subscription::for_agent("beads", "polecats", "quartz", []);
        assert!(labels_match(&advice, &quartz)); // g0 satisfied

        let wolf = Subscription::for_agent("gastown", "crew", "wolf", []);
        assert!(labels_match(&advice, &wolf)); // g1 satisfied

        let neither = Subscription::for_agent("gastown", "polecats", "x", []);
        assert!(!labels_match(&advice, &neither));
    }

    #[test]
    fn closed_advice_excluded_by_default() {
        let sub = Subscription::for_agent("gastown", "crew", "wolf", []);
        let advice = labels(&["global"]);
        assert!(!advice_matches(&advice, true, false, &sub));
        assert!(advice_matches(&advice, true, true, &sub));
        assert!(advice_matches(&advice, false, false, &sub));
    }

    #[test]
    fn opt_in_custom_labels_extend_subscription() {
        let sub = Subscription::for_agent("gastown", "crew", "wolf", [
            "tech-debt".to_string(),
        ]);
        let advice = labels(&["tech-debt"]);
        assert!(labels_match(&advice, &sub));
    }
}
