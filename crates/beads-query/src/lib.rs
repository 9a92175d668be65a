//! Partial-ID resolution and label-subscription (advice) matching.
//!
//! Both concerns are pure functions over data the caller already has in hand
//! (an id list, a label list) rather than trait objects over a store, so this
//! crate stays independent of `beads-storage` and is cheap to unit test.

pub mod advice;
pub mod resolve;

pub use advice::{Subscription, advice_matches};
pub use resolve::{QueryError, Result, resolve_prefix};
