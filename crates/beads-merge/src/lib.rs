//! Three-way merge driver for the JSONL mirror.
//!
//! Reconciles a common ancestor mirror with two diverging copies (a VCS
//! merge's base/ours/theirs), resolving per-field conflicts through
//! [`beads_config::config::ConflictConfig`] and falling back to inline
//! conflict markers for whatever's left irreconcilable.

pub mod engine;
pub mod error;
pub mod mirror_merge;
pub mod resolve;

pub use engine::{merge_issue, MergeOutcome};
pub use error::{MergeError, Result};
pub use mirror_merge::{merge_mirrors, MergeReport};
