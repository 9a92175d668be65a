//! `bd reopen` -- reopen a closed issue.

use anyhow::{bail, Context, Result};

use beads_core::enums::Status;
use beads_storage::traits::IssueUpdates;
use beads_storage::{SqliteStore, Storage};

use crate::cli::ReopenArgs;
use crate::context::RuntimeContext;
use crate::output::output_json;

/// Execute the `bd reopen` command.
pub fn run(ctx: &RuntimeContext, args: &ReopenArgs) -> Result<()> {
    if ctx.readonly {
        bail!("cannot reopen issues in read-only mode");
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

    let issue = store
        .get_issue(&args.id)
        .with_context(|| format!("issue {} not found", args.id))?;
    if issue.status != Status::Closed {
        bail!("issue {} is not closed", args.id);
    }

    let updates = IssueUpdates {
        status: Some(Status::Open),
        closed_at: Some(None),
        closed_by_session: Some(String::new()),
        close_reason: Some(String::new()),
        ..Default::default()
    };
    store
        .update_issue(&args.id, &updates, &ctx.actor)
        .with_context(|| format!("failed to reopen issue {}", args.id))?;

    let issue = store.get_issue(&args.id)?;
    if ctx.json {
        output_json(&issue);
    } else {
        println!("Reopened {}: {}", issue.id, issue.title);
    }

    Ok(())
}
