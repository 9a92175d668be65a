//! `bd diff` -- dependency diff (stub).

use anyhow::Result;

use crate::context::RuntimeContext;

/// Execute the `bd diff` command (stub).
pub fn run(_ctx: &RuntimeContext) -> Result<()> {
    println!("bd diff: not yet implemented");
    Ok(())
}
