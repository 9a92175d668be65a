//! `bd cook` -- formula execution.
//!
//! Loads a formula file, substitutes variables, evaluates conditions,
//! and either previews the cooked steps (--dry-run) or creates issues
//! in the database.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};

use beads_core::dependency::Dependency;
use beads_core::enums::{DependencyType, IssueType};
use beads_core::issue::IssueBuilder;
use beads_formula::engine;
use beads_formula::parser;
use beads_formula::types::CookedStep;
use beads_storage::{SqliteStore, Storage};

use crate::cli::CookArgs;
use crate::commands::create::resolve_created_id;
use crate::context::RuntimeContext;
use crate::output::output_json;

/// Execute the `bd cook` command.
pub fn run(ctx: &RuntimeContext, args: &CookArgs) -> Result<()> {
    let formula_name = args
        .formula
        .as_deref()
        .context("formula name or path is required")?;

    // 1. Find and load the formula
    let cwd = std::env::current_dir()?;
    let path = parser::find_formula(formula_name, &cwd)
        .map_err(|e| anyhow::anyhow!("{}", e))?;
    let formula = parser::load_formula(&path)
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    // 2. Parse --var flags into HashMap
    let vars = parse_var_flags(&args.vars)?;

    // 3. Cook the formula
    let cooked = engine::cook(&formula, &vars)
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    if cooked.is_empty() {
        println!("No steps to create (all filtered by conditions).");
        return Ok(());
    }

    // 4. Dry-run: print the cooked steps
    if args.dry_run || ctx.json {
        return print_cooked(ctx, &formula.formula, &cooked);
    }

    // 5. Create issues in the database
    create_issues(ctx, &formula.formula, &cooked, false)
}

/// Parse `--var key=value` flags into a HashMap.
pub(crate) fn parse_var_flags(vars: &[String]) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    for v in vars {
        let parts: Vec<&str> = v.splitn(2, '=').collect();
        if parts.len() != 2 {
            bail!("invalid variable format '{}': expected key=value", v);
        }
        map.insert(parts[0].to_string(), parts[1].to_string());
    }
    Ok(map)
}

/// Print cooked steps as a tree or JSON.
fn print_cooked(ctx: &RuntimeContext, formula_name: &str, steps: &[CookedStep]) -> Result<()> {
    if ctx.json {
        output_json(&serde_json::json!({
            "formula": formula_name,
            "steps": steps,
        }));
        return Ok(());
    }

    println!("Formula: {}", formula_name);
    println!("Steps ({}):", steps.len());
    for step in steps {
        let deps = if step.needs.is_empty() {
            String::new()
        } else {
            format!(" (needs: {})", step.needs.join(", "))
        };
        let gate_info = if let Some(ref g) = step.gate {
            format!(" [gate:{}]", g.r#type)
        } else {
            String::new()
        };
        let assignee_info = match &step.assignee {
            Some(a) if !a.is_empty() => format!(" @{}", a),
            _ => String::new(),
        };
        println!(
            "  {} [P{}] [{}] {}{}{}{}",
            step.id, step.priority, step.issue_type, step.title,
            deps, gate_info, assignee_info,
        );
    }
    Ok(())
}

/// Create issues in the database for each cooked step.
pub(crate) fn create_issues(
    ctx: &RuntimeContext,
    formula_name: &str,
    steps: &[CookedStep],
    ephemeral: bool,
) -> Result<()> {
    if ctx.readonly {
        bail!("cannot create issues in read-only mode");
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

    // Map step IDs to issue IDs
    let mut id_map: HashMap<String, String> = HashMap::new();
    let mut created: Vec<serde_json::Value> = Vec::new();

    for step in steps {
        let issue_type = IssueType::from(step.issue_type.as_str()).normalize();

        let mut labels: Vec<String> = step.labels.clone();
        labels.push(format!("formula:{}", formula_name));
        if ephemeral {
            labels.push("ephemeral".to_string());
        }

        let draft = IssueBuilder::new(&step.title)
            .description(&step.description)
            .priority(step.priority)
            .issue_type(issue_type)
            .assignee(step.assignee.clone().unwrap_or_default())
            .created_by(&ctx.actor)
            .build();

        store
            .create_issue(&draft, &ctx.actor)
            .with_context(|| format!("failed to create issue for step '{}'", step.id))?;

        let issue_id = resolve_created_id(&store, &step.title, &ctx.actor)
            .with_context(|| format!("step '{}' was cooked but its id could not be resolved", step.id))?;

        for label in &labels {
            store
                .add_label(&issue_id, label, &ctx.actor)
                .with_context(|| format!("failed to add label '{}' to {}", label, issue_id))?;
        }

        id_map.insert(step.id.clone(), issue_id.clone());
        created.push(serde_json::json!({
            "id": issue_id,
            "step": step.id,
            "title": step.title,
        }));
    }

    // Create dependencies (needs -> blocks)
    for step in steps {
        if let Some(issue_id) = id_map.get(&step.id) {
            for need in &step.needs {
                if let Some(dep_id) = id_map.get(need) {
                    let dependency = Dependency {
                        issue_id: issue_id.clone(),
                        depends_on_id: dep_id.clone(),
                        dep_type: DependencyType::Blocks,
                        created_at: chrono::Utc::now(),
                        created_by: ctx.actor.clone(),
                        metadata: String::new(),
                        thread_id: String::new(),
                    };
                    store
                        .add_dependency(&dependency, &ctx.actor)
                        .with_context(|| format!("failed to link {} -> {}", issue_id, dep_id))?;
                }
            }
        }
    }

    // Output
    if ctx.json {
        output_json(&serde_json::json!({
            "formula": formula_name,
            "ephemeral": ephemeral,
            "created": created,
        }));
    } else {
        let mode = if ephemeral { "wisp" } else { "pour" };
        println!(
            "Cooked formula '{}' ({} mode) -> {} issues:",
            formula_name, mode, created.len()
        );
        for entry in &created {
            println!(
                "  {} (step {}): {}",
                entry["id"].as_str().unwrap_or(""),
                entry["step"].as_str().unwrap_or(""),
                entry["title"].as_str().unwrap_or(""),
            );
        }
    }

    Ok(())
}
