//! Terminal UI components for the beads system.
//!
//! Provides Ayu-themed color styling, terminal detection, and pager support
//! for CLI output. Ported from the Go `internal/ui` package.

pub mod pager;
pub mod styles;
pub mod terminal;
