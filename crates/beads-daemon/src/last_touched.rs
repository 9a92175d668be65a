//! Tracks the most recently touched issue so CLI shorthands like "the last
//! one I created" survive across both requests within a daemon's lifetime
//! and across a daemon restart.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

const LAST_TOUCHED_FILE_NAME: &str = ".last-touched";

/// In-memory cache backed by a `.last-touched` file in the beads directory.
pub struct LastTouched {
    path: PathBuf,
    current: Mutex<Option<String>>,
}

impl LastTouched {
    pub fn open(beads_dir: &Path) -> Self {
        let path = beads_dir.join(LAST_TOUCHED_FILE_NAME);
        let current = std::fs::read_to_string(&path)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Self {
            path,
            current: Mutex::new(current),
        }
    }

    pub fn get(&self) -> Option<String> {
        self.current.lock().expect("last-touched mutex poisoned").clone()
    }

    /// Records `id` as the most recently touched issue, persisting it to disk
    /// so a daemon restart doesn't lose it. Write failures are logged, not
    /// propagated: losing this convenience shouldn't fail the mutation that
    /// triggered it.
    pub fn set(&self, id: &str) {
        *self.current.lock().expect("last-touched mutex poisoned") = Some(id.to_string());
        if let Err(err) = std::fs::write(&self.path, id) {
            tracing::warn!(error = %err, id, "failed to persist last-touched issue");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty_in_a_fresh_directory() {
        let dir = tempfile::tempdir().unwrap();
        let last_touched = LastTouched::open(dir.path());
        assert_eq!(last_touched.get(), None);
    }

    #[test]
    fn set_persists_across_a_fresh_open() {
        let dir = tempfile::tempdir().unwrap();
        {
            let last_touched = LastTouched::open(dir.path());
            last_touched.set("bd-abc1");
            assert_eq!(last_touched.get(), Some("bd-abc1".to_string()));
        }
        let reopened = LastTouched::open(dir.path());
        assert_eq!(reopened.get(), Some("bd-abc1".to_string()));
    }

    #[test]
    fn blank_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(LAST_TOUCHED_FILE_NAME), "   \n").unwrap();
        let last_touched = LastTouched::open(dir.path());
        assert_eq!(last_touched.get(), None);
    }
}
