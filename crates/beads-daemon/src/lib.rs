//! Long-lived per-directory coordinator serializing writes over a local
//! socket.
//!
//! One daemon instance owns a [`beads_storage::Storage`] and accepts
//! [`protocol::Request`]s over a Unix domain socket, serializing the
//! debounced JSONL mirror export and post-mutation hook dispatch around
//! whatever the Store itself already serializes internally. A caller not
//! running the daemon talks to the same Store directly ("direct mode") using
//! [`beads_lockfile::FileLock`] for the same cross-process exclusion the
//! daemon gets from owning the only connection.

pub mod dispatch;
pub mod error;
pub mod flush;
pub mod hooks;
pub mod last_touched;
pub mod lifecycle;
pub mod protocol;
pub mod server;

pub use error::{DaemonError, Result};
pub use hooks::Hook;
pub use lifecycle::{Lifecycle, StoreLifecycle};
pub use protocol::{ErrorEnvelope, Request, Response};
pub use server::Daemon;

use std::path::Path;
use std::sync::Arc;

use beads_lockfile::FileLock;
use beads_storage::Storage;

/// Serves one request against `store` without a daemon: the direct-mode
/// fallback used when no daemon is running for this directory. Acquires the
/// same `.sync.lock` the daemon holds for the duration of its freshness
/// check plus the mutation, and flushes the mirror synchronously afterward
/// instead of debouncing, since there is no background thread to coalesce
/// into.
pub fn serve_direct(
    store: &dyn Storage,
    mirror_dir: &Path,
    request: &Request,
) -> error::Result<Response> {
    let _lock = FileLock::acquire(mirror_dir)?;
    beads_mirror::import_mirror(store, mirror_dir, "direct")?;

    let response = dispatch::dispatch(store, &request.op, &request.args, &request.actor);

    if response.ok {
        beads_mirror::export_mirror(store, mirror_dir)?;
    }

    Ok(response)
}

/// Convenience constructor bundling [`Daemon::new`] with an `Arc`-wrapped
/// store, matching what `serve` expects.
pub fn spawn_daemon(
    store: Arc<dyn Storage>,
    beads_dir: &Path,
    mirror_dir: std::path::PathBuf,
    hooks: Vec<Hook>,
) -> Arc<Daemon> {
    Arc::new(Daemon::new(store, beads_dir, mirror_dir, hooks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_storage::SqliteStore;

    #[test]
    fn direct_mode_creates_and_exports_synchronously() {
        let store = SqliteStore::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let request = Request {
            op: "create_issue".to_string(),
            args: serde_json::json!({"title": "Direct mode", "id": "bd-dir1"}),
            actor: "alice".to_string(),
        };
        let response = serve_direct(&store, dir.path(), &request).unwrap();
        assert!(response.ok);
        assert!(dir.path().join(beads_mirror::MIRROR_FILE_NAME).exists());
    }

    #[test]
    fn direct_mode_does_not_export_on_a_failed_mutation() {
        let store = SqliteStore::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let request = Request {
            op: "get_issue".to_string(),
            args: serde_json::json!({"id": "bd-missing"}),
            actor: "alice".to_string(),
        };
        let response = serve_direct(&store, dir.path(), &request).unwrap();
        assert!(!response.ok);
    }

    #[test]
    fn spawn_daemon_activates_lifecycle_immediately() {
        let store: Arc<dyn Storage> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let dir = tempfile::tempdir().unwrap();
        let daemon = spawn_daemon(store, dir.path(), dir.path().join("mirror"), Vec::new());
        assert_eq!(daemon.lifecycle_state(), StoreLifecycle::Active);
    }
}
