//! Reconciliation engine between a store and an external issue tracker.
//!
//! Backends implement [`ExternalTracker`]; [`run_sync`] drives pull, push,
//! or bidirectional reconciliation against whichever backend is configured.

pub mod engine;
pub mod error;
pub mod tracker;

pub use engine::{run_sync, SyncConflict, SyncReport};
pub use error::{Result, SyncError, TrackerError};
pub use tracker::{ExternalIssue, ExternalTracker, TrackerResult};
