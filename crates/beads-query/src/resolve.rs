//! Partial-ID resolution: expanding an id prefix to the one full id it names.

/// Errors from resolving a partial id against a known id set.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueryError {
    /// No known id starts with the given prefix.
    #[error("no issue matches prefix {prefix}")]
    NotFound {
        /// The prefix that was looked up.
        prefix: String,
    },

    /// More than one known id starts with the given prefix.
    #[error("ambiguous prefix {prefix}: matches {matches:?}")]
    Ambiguous {
        /// The prefix that was looked up.
        prefix: String,
        /// The full ids it matched, sorted.
        matches: Vec<String>,
    },
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, QueryError>;

/// Resolves `prefix` against `ids`, returning the single full id it names.
///
/// An exact match always wins even if it is also a prefix of other ids (e.g.
/// `bd-a1` resolving against `["bd-a1", "bd-a1b2"]`). Otherwise more than one
/// match is [`QueryError::Ambiguous`], listing the candidates sorted for
/// stable error messages.
pub fn resolve_prefix<'a, I>(ids: I, prefix: &str) -> Result<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut matches: Vec<&str> = ids.into_iter().filter(|id| id.starts_with(prefix)).collect();

    if let Some(pos) = matches.iter().position(|id| *id == prefix) {
        return Ok(matches.swap_remove(pos).to_string());
    }

    matches.sort_unstable();
    matches.dedup();

    match matches.len() {
        0 => Err(QueryError::NotFound {
            prefix: prefix.to_string(),
        }),
        1 => Ok(matches[0].to_string()),
        _ => Err(QueryError::Ambiguous {
            prefix: prefix.to_string(),
            matches: matches.into_iter().map(String::from).collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn unique_prefix_resolves() {
        let ids = ["bd-abc123", "bd-def456"];
        assert_eq!(resolve_prefix(ids, "bd-abc").unwrap(), "bd-abc123");
    }

    #[test]
    fn missing_prefix_is_not_found() {
        let ids = ["bd-abc123"];
        assert_eq!(
            resolve_prefix(ids, "bd-zzz").unwrap_err(),
            QueryError::NotFound {
                prefix: "bd-zzz".to_string()
            }
        );
    }

    #[test]
    fn shared_prefix_is_ambiguous() {
        let ids = ["bd-ab1", "bd-ab2"];
        let err = resolve_prefix(ids, "bd-ab").unwrap_err();
        assert!(matches!(err, QueryError::Ambiguous { .. }));
    }

    #[test]
    fn exact_match_wins_over_longer_ids() {
        let ids = ["bd-a1", "bd-a1b2"];
        assert_eq!(resolve_prefix(ids, "bd-a1").unwrap(), "bd-a1");
    }
}
