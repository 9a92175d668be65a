//! Cross-repo ID prefix routing.
//!
//! Every issue ID carries a prefix (`bd-`, `ext-`, ...) that names the store
//! which owns it. A `routes.jsonl` file maps prefixes to the directories of
//! foreign stores so operations on a foreign-prefixed ID can be dispatched
//! without the caller knowing the target repo's layout up front.

pub mod cache;
pub mod error;
pub mod routes;

pub use cache::RouterCache;
pub use error::{Result, RouterError};
pub use routes::{load_routes, resolve, RouteEntry, RouteTarget};
