//! `bd todo` -- shorthand for the caller's own ready work.

use anyhow::{bail, Context, Result};

use beads_core::filter::WorkFilter;
use beads_storage::{SqliteStore, Storage};

use crate::cli::TodoArgs;
use crate::context::RuntimeContext;
use crate::output::output_json;

/// Execute the `bd todo` command: ready work assigned to the caller.
pub fn run(ctx: &RuntimeContext, args: &TodoArgs) -> Result<()> {
    let beads_dir = ctx
        .resolve_db_path()
        .context("no beads database found. Run 'bd init' to create one.")?;
    let db_path = beads_dir.join("beads.db");

    if !db_path.exists() {
        bail!(
            "no beads database found at {}\nHint: run 'bd init' to create a database",
            db_path.display()
        );
    }

    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("failed to open database: {}", db_path.display()))?;

    let filter = WorkFilter {
        assignee: Some(ctx.actor.clone()),
        limit: Some(args.limit),
        ..Default::default()
    };
    let issues = store
        .get_ready_work(&filter)
        .context("failed to load ready work")?;

    if ctx.json {
        output_json(&issues);
        return Ok(());
    }

    if issues.is_empty() {
        println!("\nNothing on {}'s plate\n", ctx.actor);
        return Ok(());
    }

    println!("\n{}'s todo list ({} issues):\n", ctx.actor, issues.len());
    for (i, issue) in issues.iter().enumerate() {
        println!(
            "{}. [P{}] [{}] {}: {}",
            i + 1,
            issue.priority,
            issue.issue_type,
            issue.id,
            issue.title
        );
    }
    println!();

    Ok(())
}
