//! `bd undefer` -- clear an issue's defer-until date.

use anyhow::{bail, Context, Result};

use beads_storage::traits::IssueUpdates;
use beads_storage::{SqliteStore, Storage};

use crate::cli::UndeferArgs;
use crate::context::RuntimeContext;
use crate::output::output_json;

/// Execute the `bd undefer` command.
pub fn run(ctx: &RuntimeContext, args: &UndeferArgs) -> Result<()> {
    if ctx.readonly {
        bail!("cannot undefer issues in read-only mode");
    }

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

    store
        .get_issue(&args.id)
        .with_context(|| format!("issue {} not found", args.id))?;

    let updates = IssueUpdates {
        defer_until: Some(None),
        ..Default::default()
    };
    store
        .update_issue(&args.id, &updates, &ctx.actor)
        .with_context(|| format!("failed to undefer issue {}", args.id))?;

    let issue = store.get_issue(&args.id)?;
    if ctx.json {
        output_json(&issue);
    } else {
        println!("Undeferred {}: {}", issue.id, issue.title);
    }

    Ok(())
}
