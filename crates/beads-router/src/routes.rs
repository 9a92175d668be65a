//! Parsing and resolution of `routes.jsonl`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RouterError};

/// One line of `routes.jsonl`: an ID prefix and the directory holding the
/// store that owns it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteEntry {
    pub prefix: String,
    pub path: PathBuf,
}

/// Where a prefix resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteTarget {
    /// The prefix belongs to the caller's own store; no routing needed.
    Local,
    /// The prefix belongs to a foreign store rooted at this directory.
    Foreign(PathBuf),
}

/// Reads `routes.jsonl` from `beads_dir`. Returns an empty list if the file
/// doesn't exist -- a store with no federation configured routes nowhere.
pub fn load_routes(beads_dir: &Path) -> Result<Vec<RouteEntry>> {
    let path = beads_dir.join("routes.jsonl");
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(&path)?;
    let mut entries = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let entry: RouteEntry = serde_json::from_str(trimmed).map_err(|source| {
            RouterError::Malformed {
                line: idx + 1,
                source,
            }
        })?;
        entries.push(entry);
    }
    Ok(entries)
}

fn env_override(prefix: &str) -> Option<PathBuf> {
    let key = format!("BEADS_ROUTE_{}", prefix.to_uppercase());
    std::env::var(&key).ok().map(PathBuf::from)
}

/// Resolves an ID prefix to a route target.
///
/// Precedence: self-reference (always wins, never routes to yourself) >
/// `BEADS_ROUTE_<PREFIX>` environment override > first matching line in
/// `routes.jsonl` (first-match-wins, same as the rest of the beads config
/// layering).
pub fn resolve(prefix: &str, self_prefix: &str, routes: &[RouteEntry]) -> Result<RouteTarget> {
    if prefix.eq_ignore_ascii_case(self_prefix) {
        return Ok(RouteTarget::Local);
    }
    if let Some(path) = env_override(prefix) {
        return Ok(RouteTarget::Foreign(path));
    }
    for entry in routes {
        if entry.prefix.eq_ignore_ascii_case(prefix) {
            return Ok(RouteTarget::Foreign(entry.path.clone()));
        }
    }
    Err(RouterError::NoRoute {
        prefix: prefix.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_prefix_is_always_local() {
        let routes = vec![RouteEntry {
            prefix: "bd".into(),
            path: "/somewhere".into(),
        }];
        let target = resolve("bd", "bd", &routes).unwrap();
        assert_eq!(target, RouteTarget::Local);
    }

    #[test]
    fn first_matching_route_wins() {
        let routes = vec![
            RouteEntry {
                prefix: "ext".into(),
                path: "/first".into(),
            },
            RouteEntry {
                prefix: "ext".into(),
                path: "/second".into(),
            },
        ];
        let target = resolve("ext", "bd", &routes).unwrap();
        assert_eq!(target, RouteTarget::Foreign(PathBuf::from("/first")));
    }

    #[test]
    fn unmatched_prefix_is_an_error() {
        let err = resolve("nope", "bd", &[]).unwrap_err();
        assert!(matches!(err, RouterError::NoRoute { .. }));
    }

    #[test]
    fn load_routes_returns_empty_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let routes = load_routes(dir.path()).unwrap();
        assert!(routes.is_empty());
    }

    #[test]
    fn load_routes_parses_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("routes.jsonl"),
            "{\"prefix\":\"ext\",\"path\":\"/repos/ext\"}\n",
        )
        .unwrap();
        let routes = load_routes(dir.path()).unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].prefix, "ext");
    }
}
