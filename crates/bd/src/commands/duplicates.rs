//! `bd duplicates` / `bd find-duplicates` -- find duplicate issues (stub).

use anyhow::Result;

use crate::context::RuntimeContext;

/// Execute the `bd duplicates` command (stub).
pub fn run(_ctx: &RuntimeContext) -> Result<()> {
    println!("bd duplicates: not yet implemented");
    Ok(())
}
