//! Caches opened foreign-store handles so a burst of cross-repo operations
//! against the same prefix doesn't reopen the SQLite connection each time.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use beads_storage::{SqliteStore, Storage};

use crate::error::{Result, RouterError};
use crate::routes::{load_routes, resolve, RouteTarget};

/// Name of the SQLite database file inside a beads directory, matching the
/// convention used by every `bd` CLI command.
const DB_FILE_NAME: &str = "beads.db";

/// Caches one opened [`SqliteStore`] per foreign route target.
///
/// A handle is opened lazily on first use and reused for the lifetime of the
/// `RouterCache`; each call into a foreign store is still scoped to a single
/// operation via [`RouterCache::with_foreign_store`] rather than leaking a
/// long-lived borrow to the caller.
#[derive(Default)]
pub struct RouterCache {
    handles: Mutex<HashMap<PathBuf, Arc<SqliteStore>>>,
}

impl RouterCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle_for(&self, target_dir: &Path) -> Result<Arc<SqliteStore>> {
        let mut handles = self
            .handles
            .lock()
            .map_err(|_| RouterError::TargetMissing {
                prefix: String::new(),
                path: target_dir.to_path_buf(),
            })?;
        if let Some(store) = handles.get(target_dir) {
            return Ok(Arc::clone(store));
        }
        if !target_dir.is_dir() {
            return Err(RouterError::TargetMissing {
                prefix: String::new(),
                path: target_dir.to_path_buf(),
            });
        }
        let store = Arc::new(SqliteStore::open(target_dir.join(DB_FILE_NAME))?);
        handles.insert(target_dir.to_path_buf(), Arc::clone(&store));
        Ok(store)
    }

    /// Resolves `prefix` against `beads_dir`'s `routes.jsonl` and runs `f`
    /// against the resulting store -- the caller's own store if the prefix
    /// is self-referential, or a cached foreign handle otherwise.
    pub fn with_routed_store<T>(
        &self,
        prefix: &str,
        self_prefix: &str,
        beads_dir: &Path,
        local: &dyn Storage,
        f: impl FnOnce(&dyn Storage) -> Result<T>,
    ) -> Result<T> {
        let routes = load_routes(beads_dir)?;
        match resolve(prefix, self_prefix, &routes)? {
            RouteTarget::Local => f(local),
            RouteTarget::Foreign(path) => {
                let store = self.handle_for(&path)?;
                f(store.as_ref())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::issue::IssueBuilder;

    #[test]
    fn local_prefix_uses_caller_store() {
        let local = SqliteStore::open_in_memory().unwrap();
        let issue = IssueBuilder::new("Local issue").id("bd-loc1").build();
        local.create_issue(&issue, "alice").unwrap();

        let cache = RouterCache::new();
        let dir = tempfile::tempdir().unwrap();
        let title = cache
            .with_routed_store("bd", "bd", dir.path(), &local, |store| {
                Ok(store.get_issue("bd-loc1")?.title)
            })
            .unwrap();
        assert_eq!(title, "Local issue");
    }

    #[test]
    fn foreign_prefix_opens_and_reuses_handle() {
        let local = SqliteStore::open_in_memory().unwrap();
        let beads_dir = tempfile::tempdir().unwrap();
        let foreign_dir = tempfile::tempdir().unwrap();

        {
            let foreign = SqliteStore::open(foreign_dir.path().join(DB_FILE_NAME)).unwrap();
            let issue = IssueBuilder::new("Foreign issue").id("ext-f1").build();
            foreign.create_issue(&issue, "alice").unwrap();
        }

        std::fs::write(
            beads_dir.path().join("routes.jsonl"),
            format!(
                "{{\"prefix\":\"ext\",\"path\":{}}}\n",
                serde_json::to_string(&foreign_dir.path().to_path_buf()).unwrap()
            ),
        )
        .unwrap();

        let cache = RouterCache::new();
        let title = cache
            .with_routed_store("ext", "bd", beads_dir.path(), &local, |store| {
                Ok(store.get_issue("ext-f1")?.title)
            })
            .unwrap();
        assert_eq!(title, "Foreign issue");

        // Second call reuses the cached handle instead of reopening.
        let title_again = cache
            .with_routed_store("ext", "bd", beads_dir.path(), &local, |store| {
                Ok(store.get_issue("ext-f1")?.title)
            })
            .unwrap();
        assert_eq!(title_again, title);
    }
}
