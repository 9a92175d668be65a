//! `bd create` -- create a new issue.

use anyhow::{bail, Context, Result};
use chrono::Utc;

use beads_core::enums::IssueType;
use beads_core::filter::IssueFilter;
use beads_core::issue::IssueBuilder;
use beads_storage::{SqliteStore, Storage};

use crate::cli::CreateArgs;
use crate::context::RuntimeContext;
use crate::output::output_json;

/// Execute the `bd create` command.
pub fn run(ctx: &RuntimeContext, args: &CreateArgs) -> Result<()> {
    if ctx.readonly {
        bail!("cannot create issues in read-only mode");
    }

    // Resolve title from positional arg or --title flag
    let title = match (&args.title, &args.title_flag) {
        (Some(pos), Some(flag)) if pos != flag => {
            bail!(
                "cannot specify different titles as both positional argument and --title flag\n  \
                Positional: {:?}\n  --title:    {:?}",
                pos,
                flag
            );
        }
        (Some(t), _) => t.clone(),
        (None, Some(t)) => t.clone(),
        (None, None) => bail!("title required"),
    };

    // Parse priority
    let priority = parse_priority(&args.priority)?;

    // Normalize issue type
    let issue_type = IssueType::from(args.issue_type.as_str()).normalize();

    // Resolve the database path
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

    let description = args.description.as_deref().unwrap_or("");
    let labels = normalized_labels(&args.labels);

    // Handle --dry-run before touching the Store; the id shown here is
    // illustrative only since nothing is persisted to generate a real one.
    if args.dry_run {
        let now = Utc::now();
        let issue = IssueBuilder::new(&title)
            .description(description)
            .priority(priority)
            .issue_type(issue_type)
            .assignee(args.assignee.clone().unwrap_or_default())
            .created_by(&ctx.actor)
            .created_at(now)
            .updated_at(now)
            .build();

        if ctx.json {
            output_json(&issue);
        } else {
            println!("[DRY RUN] Would create issue:");
            println!("  Title: {}", issue.title);
            println!("  Type: {}", issue.issue_type);
            println!("  Priority: P{}", issue.priority);
            println!("  Status: {}", issue.status);
            if !issue.assignee.is_empty() {
                println!("  Assignee: {}", issue.assignee);
            }
            if !issue.description.is_empty() {
                println!("  Description: {}", issue.description);
            }
            if !labels.is_empty() {
                println!("  Labels: {}", labels.join(", "));
            }
        }
        return Ok(());
    }

    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("failed to open database: {}", db_path.display()))?;

    let mut builder = IssueBuilder::new(&title)
        .description(description)
        .priority(priority)
        .issue_type(issue_type)
        .created_by(&ctx.actor)
        .assignee(args.assignee.clone().unwrap_or_default());
    if let Some(explicit_id) = &args.id {
        builder = builder.id(explicit_id);
    }
    let draft = builder.build();

    store
        .create_issue(&draft, &ctx.actor)
        .with_context(|| format!("failed to create issue '{}'", title))?;

    // `create_issue` persists the Store-allocated id but doesn't hand it
    // back; resolve it the same way the daemon's dispatcher does when the
    // caller didn't pin one explicitly.
    let issue_id = match &args.id {
        Some(explicit_id) => explicit_id.clone(),
        None => resolve_created_id(&store, &title, &ctx.actor)
            .context("issue was created but its allocated id could not be resolved")?,
    };

    for label in &labels {
        store
            .add_label(&issue_id, label, &ctx.actor)
            .with_context(|| format!("failed to add label '{}' to {}", label, issue_id))?;
    }

    let issue = store
        .get_issue(&issue_id)
        .with_context(|| format!("created issue {} but failed to read it back", issue_id))?;

    if ctx.json {
        output_json(&issue);
    } else if args.silent {
        println!("{}", issue_id);
    } else {
        println!("Created issue: {}", issue_id);
        println!("  Title: {}", issue.title);
        println!("  Priority: P{}", issue.priority);
        println!("  Status: {}", issue.status);
    }

    Ok(())
}

/// Splits each `--label` occurrence on commas and discards blanks, so
/// `--label a,b --label c` and `--label a --label b --label c` agree.
fn normalized_labels(labels: &[String]) -> Vec<String> {
    labels
        .iter()
        .flat_map(|label| label.split(','))
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(str::to_string)
        .collect()
}

/// Best-effort lookup of the id the Store picked for a just-created issue
/// with no explicit id of its own: `Storage::create_issue` resolves and
/// persists the id internally but only returns `Result<()>`, so the newest
/// matching row by title and creator stands in for the real return value.
pub(crate) fn resolve_created_id(store: &SqliteStore, title: &str, actor: &str) -> Result<String> {
    let filter = IssueFilter {
        title_search: Some(title.to_string()),
        ..Default::default()
    };
    store
        .search_issues("", &filter)
        .context("failed to search for the created issue")?
        .into_iter()
        .filter(|issue| issue.title == title && issue.created_by == actor)
        .max_by_key(|issue| issue.created_at)
        .map(|issue| issue.id)
        .context("no matching issue found after create")
}

/// Parse a priority string that can be either a bare number ("2") or prefixed ("P2"/"p2").
fn parse_priority(s: &str) -> Result<i32> {
    let s = s.trim();
    let num_str = if s.starts_with('P') || s.starts_with('p') {
        &s[1..]
    } else {
        s
    };

    let p: i32 = num_str
        .parse()
        .with_context(|| format!("invalid priority '{}': expected 0-4 or P0-P4", s))?;

    if !(0..=4).contains(&p) {
        bail!("priority must be between 0 and 4 (got {})", p);
    }

    Ok(p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_priority_bare_number() {
        assert_eq!(parse_priority("0").unwrap(), 0);
        assert_eq!(parse_priority("2").unwrap(), 2);
        assert_eq!(parse_priority("4").unwrap(), 4);
    }

    #[test]
    fn parse_priority_prefixed() {
        assert_eq!(parse_priority("P0").unwrap(), 0);
        assert_eq!(parse_priority("P3").unwrap(), 3);
        assert_eq!(parse_priority("p1").unwrap(), 1);
    }

    #[test]
    fn parse_priority_out_of_range() {
        assert!(parse_priority("5").is_err());
        assert!(parse_priority("-1").is_err());
        assert!(parse_priority("P5").is_err());
    }

    #[test]
    fn parse_priority_invalid() {
        assert!(parse_priority("high").is_err());
        assert!(parse_priority("").is_err());
    }
}
