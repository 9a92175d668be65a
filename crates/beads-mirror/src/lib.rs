//! JSONL mirror: crash-safe export of the store to a plain-text sibling
//! directory, and import of that mirror back into a store.
//!
//! Callers are expected to hold a [`beads_lockfile::FileLock`] across both
//! [`export_mirror`] and [`import_mirror`]; neither function acquires the
//! lock itself so a caller doing both in sequence only pays for one
//! acquisition.

pub mod digest;
pub mod error;
pub mod export;
pub mod import;

pub use digest::{MirrorMetadata, DELETIONS_FILE_NAME, METADATA_FILE_NAME, MIRROR_FILE_NAME};
pub use error::{MirrorError, Result};
pub use export::{export_mirror, DeletionRecord};
pub use import::{import_mirror, ImportSummary};
