//! Unix-domain-socket server: accept loop, freshness check, mutation hooks.
//!
//! Each connection gets its own worker thread; the Store's internal
//! `Mutex<Connection>` (see `beads-storage/src/sqlite/store.rs`) serializes
//! the writes those threads actually issue, so the daemon itself only needs
//! to own the accept loop and the ambient state (lifecycle, debounce,
//! last-touched, hooks) around each call.

use std::io::BufReader;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use beads_lockfile::FileLock;
use beads_storage::Storage;

use crate::dispatch::dispatch;
use crate::error::Result;
use crate::flush::FlushManager;
use crate::hooks::{self, Hook};
use crate::last_touched::LastTouched;
use crate::lifecycle::{Lifecycle, StoreLifecycle};
use crate::protocol::{read_message, write_message, Request, Response};

/// Mutations that advance the last-touched pointer and should trigger a
/// debounced export afterward. Reads never touch either.
const MUTATING_OPS: &[&str] = &[
    "create_issue",
    "update_issue",
    "close_issue",
    "claim_issue",
    "delete_issue",
    "add_label",
    "remove_label",
    "add_comment",
];

pub struct Daemon {
    store: Arc<dyn Storage>,
    mirror_dir: PathBuf,
    lifecycle: Lifecycle,
    last_touched: LastTouched,
    flush: FlushManager,
    hooks: Vec<Hook>,
}

impl Daemon {
    pub fn new(store: Arc<dyn Storage>, beads_dir: &Path, mirror_dir: PathBuf, hooks: Vec<Hook>) -> Self {
        let flush = FlushManager::spawn(
            Arc::clone(&store),
            mirror_dir.clone(),
            Duration::from_millis(10),
            Duration::from_millis(200),
        );
        let daemon = Self {
            store,
            mirror_dir,
            lifecycle: Lifecycle::new(),
            last_touched: LastTouched::open(beads_dir),
            flush,
            hooks,
        };
        daemon.lifecycle.activate();
        daemon
    }

    pub fn lifecycle_state(&self) -> StoreLifecycle {
        self.lifecycle.current()
    }

    /// Imports the mirror if it has changed on disk since the last time this
    /// Store consumed it. Called before serving each request so a mirror
    /// edited by another process (or restored by git) is picked up without
    /// requiring a daemon restart.
    fn ensure_fresh(&self) -> Result<()> {
        let _lock = FileLock::acquire(&self.mirror_dir)?;
        beads_mirror::import_mirror(self.store.as_ref(), &self.mirror_dir, "daemon")?;
        Ok(())
    }

    fn handle_request(&self, request: Request) -> Response {
        if !self.lifecycle.accepts_requests() {
            return Response::failure("cancelled", "daemon is shutting down");
        }
        if request.op == "shutdown" {
            self.lifecycle.begin_closing();
            return Response::success(serde_json::json!({"status": "closing"}));
        }

        if let Err(err) = self.ensure_fresh() {
            tracing::warn!(error = %err, "freshness check failed, serving from current store state");
        }

        let response = dispatch(self.store.as_ref(), &request.op, &request.args, &request.actor);

        if response.ok && MUTATING_OPS.contains(&request.op.as_str()) {
            if let Some(id) = response
                .data
                .as_ref()
                .and_then(|d| d.get("id"))
                .and_then(|v| v.as_str())
            {
                self.last_touched.set(id);
                if let Ok(issue) = self.store.get_issue(id) {
                    hooks::dispatch(&self.hooks, &issue);
                }
            }
            self.flush.mark_dirty();
        }

        response
    }

    fn handle_connection(&self, stream: UnixStream) {
        let mut reader = BufReader::new(match stream.try_clone() {
            Ok(s) => s,
            Err(err) => {
                tracing::warn!(error = %err, "failed to clone connection for reading");
                return;
            }
        });
        let mut writer = stream;
        loop {
            let request: Option<Request> = match read_message(&mut reader) {
                Ok(req) => req,
                Err(err) => {
                    tracing::warn!(error = %err, "malformed request, closing connection");
                    return;
                }
            };
            let Some(request) = request else {
                return; // client closed the connection
            };
            let response = self.handle_request(request);
            if let Err(err) = write_message(&mut writer, &response) {
                tracing::warn!(error = %err, "failed to write response, closing connection");
                return;
            }
        }
    }

    /// Binds `socket_path` and serves connections until a `shutdown` RPC is
    /// accepted. There is no signal-based shutdown path: nothing in this
    /// workspace's dependency stack provides OS signal handling, so a
    /// client-issued `shutdown` request is the only way to stop the daemon
    /// gracefully. Takes `self` behind an `Arc` so worker threads can each
    /// hold a cheap reference without a second wrapping allocation at the
    /// call site.
    pub fn serve(self: Arc<Self>, socket_path: &Path) -> Result<()> {
        if socket_path.exists() {
            std::fs::remove_file(socket_path)?;
        }
        let listener = UnixListener::bind(socket_path)?;

        for incoming in listener.incoming() {
            if self.lifecycle.current() == StoreLifecycle::Closing {
                break;
            }
            match incoming {
                Ok(stream) => {
                    let daemon = Arc::clone(&self);
                    std::thread::spawn(move || daemon.handle_connection(stream));
                }
                Err(err) => {
                    tracing::warn!(error = %err, "failed to accept connection");
                }
            }
        }

        let _ = std::fs::remove_file(socket_path);
        beads_mirror::export_mirror(self.store.as_ref(), &self.mirror_dir).ok();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::issue::IssueBuilder;
    use beads_storage::SqliteStore;

    fn test_daemon() -> (Daemon, tempfile::TempDir) {
        let store: Arc<dyn Storage> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let dir = tempfile::tempdir().unwrap();
        let daemon = Daemon::new(store, dir.path(), dir.path().join("mirror"), Vec::new());
        (daemon, dir)
    }

    #[test]
    fn create_request_marks_last_touched() {
        let (daemon, _dir) = test_daemon();
        let request = Request {
            op: "create_issue".to_string(),
            args: serde_json::json!({"title": "Server test", "id": "bd-srv1"}),
            actor: "alice".to_string(),
        };
        let response = daemon.handle_request(request);
        assert!(response.ok);
        assert_eq!(daemon.last_touched.get(), Some("bd-srv1".to_string()));
    }

    #[test]
    fn read_only_request_does_not_touch_last_touched() {
        let (daemon, _dir) = test_daemon();
        daemon.store.create_issue(&IssueBuilder::new("Seed").id("bd-srv2").build(), "alice").unwrap();
        let request = Request {
            op: "get_issue".to_string(),
            args: serde_json::json!({"id": "bd-srv2"}),
            actor: "alice".to_string(),
        };
        daemon.handle_request(request);
        assert_eq!(daemon.last_touched.get(), None);
    }

    #[test]
    fn shutdown_request_stops_accepting_new_requests() {
        let (daemon, _dir) = test_daemon();
        let shutdown = Request {
            op: "shutdown".to_string(),
            args: serde_json::Value::Null,
            actor: "alice".to_string(),
        };
        let response = daemon.handle_request(shutdown);
        assert!(response.ok);

        let follow_up = Request {
            op: "get_issue".to_string(),
            args: serde_json::json!({"id": "bd-nope"}),
            actor: "alice".to_string(),
        };
        let response = daemon.handle_request(follow_up);
        assert!(!response.ok);
        assert_eq!(response.error.unwrap().kind, "cancelled");
    }
}
