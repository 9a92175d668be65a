//! Debounced mirror export.
//!
//! A burst of mutations within the debounce window collapses into one
//! export; callers mark the store dirty after each mutation and a background
//! thread drains the mark on a timer. Shutdown always performs one last
//! synchronous flush so nothing written right before exit is lost.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use beads_lockfile::FileLock;
use beads_storage::Storage;

use crate::error::Result;

/// Coalesces export calls raised by [`FlushManager::mark_dirty`] within a
/// debounce window (10-200ms, per the mutation burst size) into one
/// `export_mirror` call guarded by the mirror's `.sync.lock`.
pub struct FlushManager {
    mirror_dir: PathBuf,
    dirty: Arc<(Mutex<bool>, Condvar)>,
    shutting_down: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl FlushManager {
    /// Spawns the background debounce thread. `min_delay`/`max_delay` bound
    /// how long a burst of `mark_dirty` calls can be coalesced before a flush
    /// is forced; 10ms/200ms is a reasonable default for interactive use.
    pub fn spawn(store: Arc<dyn Storage>, mirror_dir: PathBuf, min_delay: Duration, max_delay: Duration) -> Self {
        let dirty = Arc::new((Mutex::new(false), Condvar::new()));
        let shutting_down = Arc::new(AtomicBool::new(false));

        let worker_dirty = Arc::clone(&dirty);
        let worker_shutdown = Arc::clone(&shutting_down);
        let worker_dir = mirror_dir.clone();
        let worker = std::thread::spawn(move || {
            let (lock, cvar) = &*worker_dirty;
            loop {
                let mut is_dirty = lock.lock().expect("flush mutex poisoned");
                while !*is_dirty {
                    if worker_shutdown.load(Ordering::SeqCst) {
                        return;
                    }
                    let (guard, timed_out) =
                        cvar.wait_timeout(is_dirty, max_delay).expect("flush condvar poisoned");
                    is_dirty = guard;
                    if timed_out.timed_out() && !*is_dirty {
                        continue;
                    }
                }
                drop(is_dirty);
                std::thread::sleep(min_delay);
                *lock.lock().expect("flush mutex poisoned") = false;

                if let Err(err) = flush_once(&store, &worker_dir) {
                    tracing::warn!(error = %err, "debounced mirror export failed");
                }

                if worker_shutdown.load(Ordering::SeqCst) {
                    return;
                }
            }
        });

        Self {
            mirror_dir,
            dirty,
            shutting_down,
            worker: Some(worker),
        }
    }

    /// Marks the store dirty; the background thread will export within the
    /// debounce window.
    pub fn mark_dirty(&self) {
        let (lock, cvar) = &*self.dirty;
        *lock.lock().expect("flush mutex poisoned") = true;
        cvar.notify_one();
    }

    /// Stops the background thread after one final synchronous flush.
    pub fn shutdown(mut self, store: &dyn Storage) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let (lock, cvar) = &*self.dirty;
        *lock.lock().expect("flush mutex poisoned") = true;
        cvar.notify_one();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        if let Err(err) = flush_once(store, &self.mirror_dir) {
            tracing::warn!(error = %err, "final mirror export on shutdown failed");
        }
    }
}

fn flush_once(store: &dyn Storage, mirror_dir: &std::path::Path) -> Result<()> {
    let _lock = FileLock::acquire(mirror_dir)?;
    beads_mirror::export_mirror(store, mirror_dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::issue::IssueBuilder;
    use beads_storage::SqliteStore;

    #[test]
    fn mark_dirty_triggers_an_export_within_the_window() {
        let store: Arc<dyn Storage> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let issue = IssueBuilder::new("Debounced").id("bd-flu1").build();
        store.create_issue(&issue, "alice").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let manager = FlushManager::spawn(
            Arc::clone(&store),
            dir.path().to_path_buf(),
            Duration::from_millis(5),
            Duration::from_millis(50),
        );
        manager.mark_dirty();
        std::thread::sleep(Duration::from_millis(100));

        let mirror_file = dir.path().join(beads_mirror::MIRROR_FILE_NAME);
        assert!(mirror_file.exists());
        manager.shutdown(store.as_ref());
    }

    #[test]
    fn shutdown_performs_a_final_flush_even_without_a_pending_mark() {
        let store: Arc<dyn Storage> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let issue = IssueBuilder::new("Final").id("bd-flu2").build();
        store.create_issue(&issue, "alice").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let manager = FlushManager::spawn(
            Arc::clone(&store),
            dir.path().to_path_buf(),
            Duration::from_millis(5),
            Duration::from_millis(500),
        );
        manager.shutdown(store.as_ref());

        let mirror_file = dir.path().join(beads_mirror::MIRROR_FILE_NAME);
        assert!(mirror_file.exists());
    }
}
