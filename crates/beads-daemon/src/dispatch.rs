//! Maps an RPC [`crate::protocol::Request`] onto a [`Storage`] call.
//!
//! Every arm either returns JSON data or a [`beads_storage::StorageError`],
//! which [`to_error_envelope`] turns into the closed wire taxonomy already
//! used by the CLI's exit-code mapping.

use beads_core::filter::IssueFilter;
use beads_core::issue::{Issue, IssueBuilder};
use beads_storage::traits::IssueUpdates;
use beads_storage::{Storage, StorageError};
use serde_json::{json, Value};

use crate::protocol::{ErrorEnvelope, Response};

pub fn to_error_envelope(err: &StorageError) -> ErrorEnvelope {
    ErrorEnvelope {
        kind: err.kind().as_str().to_string(),
        message: err.to_string(),
    }
}

fn failure_response(err: StorageError) -> Response {
    let envelope = to_error_envelope(&err);
    Response::failure(envelope.kind, envelope.message)
}

fn arg_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

fn missing_arg(key: &str) -> Response {
    Response::failure("validation", format!("missing required argument `{key}`"))
}

/// Builds the issue the "create" op persists. The request args double as the
/// builder's input: only `title` is required, everything else optional.
fn issue_from_create_args(args: &Value, actor: &str) -> Result<Issue, Response> {
    let title = arg_str(args, "title").ok_or_else(|| missing_arg("title"))?;
    let mut builder = IssueBuilder::new(title).created_by(actor);
    if let Some(id) = arg_str(args, "id") {
        builder = builder.id(id);
    }
    if let Some(description) = arg_str(args, "description") {
        builder = builder.description(description);
    }
    if let Some(priority) = args.get("priority").and_then(Value::as_i64) {
        builder = builder.priority(priority as i32);
    }
    Ok(builder.build())
}

/// `create_issue` returns no persisted-issue data (the Store resolves the id
/// internally and the trait surface stops at `Result<()>`), so the freshly
/// created issue is echoed back via a best-effort title+creator lookup
/// instead of threading the allocated id through a wider trait change.
fn echo_back_created_issue(store: &dyn Storage, title: &str, actor: &str) -> Option<Issue> {
    let filter = IssueFilter {
        title_search: Some(title.to_string()),
        ..Default::default()
    };
    store
        .search_issues("", &filter)
        .ok()?
        .into_iter()
        .filter(|issue| issue.title == title && issue.created_by == actor)
        .max_by_key(|issue| issue.created_at)
}

/// Dispatches one request and produces its response. Never panics on bad
/// input; malformed args become a `validation`-kind error response rather
/// than an `UnknownOp`/protocol failure, so a client typo in an argument name
/// reads the same way a Store-side validation error would.
pub fn dispatch(store: &dyn Storage, op: &str, args: &Value, actor: &str) -> Response {
    match op {
        "get_issue" => {
            let Some(id) = arg_str(args, "id") else {
                return missing_arg("id");
            };
            match store.get_issue(id) {
                Ok(issue) => Response::success(json!(issue)),
                Err(err) => failure_response(err),
            }
        }
        "create_issue" => {
            let issue = match issue_from_create_args(args, actor) {
                Ok(issue) => issue,
                Err(response) => return response,
            };
            match store.create_issue(&issue, actor) {
                Ok(()) => match echo_back_created_issue(store, &issue.title, actor) {
                    Some(persisted) => Response::success(json!(persisted)),
                    None => Response::success(json!(issue)),
                },
                Err(err) => failure_response(err),
            }
        }
        "update_issue" => {
            let Some(id) = arg_str(args, "id") else {
                return missing_arg("id");
            };
            let updates = IssueUpdates {
                title: arg_str(args, "title").map(str::to_string),
                description: arg_str(args, "description").map(str::to_string),
                priority: args.get("priority").and_then(Value::as_i64).map(|p| p as i32),
                ..Default::default()
            };
            match store.update_issue(id, &updates, actor) {
                Ok(()) => Response::success(json!({"id": id})),
                Err(err) => failure_response(err),
            }
        }
        "close_issue" => {
            let Some(id) = arg_str(args, "id") else {
                return missing_arg("id");
            };
            let reason = arg_str(args, "reason").unwrap_or_default();
            let session = arg_str(args, "session").unwrap_or_default();
            match store.close_issue(id, reason, actor, session) {
                Ok(()) => Response::success(json!({"id": id})),
                Err(err) => failure_response(err),
            }
        }
        "claim_issue" => {
            let Some(id) = arg_str(args, "id") else {
                return missing_arg("id");
            };
            match store.claim_issue(id, actor) {
                Ok(()) => Response::success(json!({"id": id, "assignee": actor})),
                Err(err) => failure_response(err),
            }
        }
        "delete_issue" => {
            let Some(id) = arg_str(args, "id") else {
                return missing_arg("id");
            };
            match store.delete_issue(id, actor) {
                Ok(()) => Response::success(json!({"id": id, "tombstoned": true})),
                Err(err) => failure_response(err),
            }
        }
        "search_issues" => {
            let query = arg_str(args, "query").unwrap_or_default();
            match store.search_issues(query, &IssueFilter::default()) {
                Ok(issues) => Response::success(json!(issues)),
                Err(err) => failure_response(err),
            }
        }
        "add_label" => {
            let (Some(id), Some(label)) = (arg_str(args, "id"), arg_str(args, "label")) else {
                return missing_arg("id/label");
            };
            match store.add_label(id, label, actor) {
                Ok(()) => Response::success(json!({"id": id, "label": label})),
                Err(err) => failure_response(err),
            }
        }
        "remove_label" => {
            let (Some(id), Some(label)) = (arg_str(args, "id"), arg_str(args, "label")) else {
                return missing_arg("id/label");
            };
            match store.remove_label(id, label, actor) {
                Ok(()) => Response::success(json!({"id": id, "label": label})),
                Err(err) => failure_response(err),
            }
        }
        "add_comment" => {
            let (Some(id), Some(text)) = (arg_str(args, "id"), arg_str(args, "text")) else {
                return missing_arg("id/text");
            };
            match store.add_comment(id, actor, text) {
                // `id` here is the issue id, not the comment's own id, and
                // the caller needs the former to mark last-touched / run
                // hooks against the right issue.
                Ok(comment) => Response::success(json!({"id": id, "comment": comment})),
                Err(err) => failure_response(err),
            }
        }
        "get_comments" => {
            let Some(id) = arg_str(args, "id") else {
                return missing_arg("id");
            };
            match store.get_comments(id) {
                Ok(comments) => Response::success(json!(comments)),
                Err(err) => failure_response(err),
            }
        }
        "get_statistics" => match store.get_statistics() {
            Ok(stats) => Response::success(json!({
                "total_issues": stats.total_issues,
                "open_issues": stats.open_issues,
                "closed_issues": stats.closed_issues,
                "in_progress_issues": stats.in_progress_issues,
                "blocked_issues": stats.blocked_issues,
            })),
            Err(err) => failure_response(err),
        },
        other => Response::failure("validation", format!("unknown operation `{other}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_storage::SqliteStore;

    #[test]
    fn create_then_get_issue_roundtrips() {
        let store = SqliteStore::open_in_memory().unwrap();
        let create_response = dispatch(
            &store,
            "create_issue",
            &json!({"title": "Dispatched issue", "id": "bd-disp1"}),
            "alice",
        );
        assert!(create_response.ok);
        let data = create_response.data.unwrap();
        assert_eq!(data["id"], "bd-disp1");

        let get_response = dispatch(&store, "get_issue", &json!({"id": "bd-disp1"}), "alice");
        assert!(get_response.ok);
        assert_eq!(get_response.data.unwrap()["title"], "Dispatched issue");
    }

    #[test]
    fn create_without_explicit_id_echoes_the_allocated_one() {
        let store = SqliteStore::open_in_memory().unwrap();
        let response = dispatch(&store, "create_issue", &json!({"title": "Auto id"}), "alice");
        assert!(response.ok);
        let data = response.data.unwrap();
        assert_eq!(data["title"], "Auto id");
        assert!(data["id"].as_str().unwrap().starts_with("bd-"));
    }

    #[test]
    fn missing_required_argument_is_a_validation_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        let response = dispatch(&store, "get_issue", &json!({}), "alice");
        assert!(!response.ok);
        assert_eq!(response.error.unwrap().kind, "validation");
    }

    #[test]
    fn get_missing_issue_surfaces_not_found_kind() {
        let store = SqliteStore::open_in_memory().unwrap();
        let response = dispatch(&store, "get_issue", &json!({"id": "bd-nope"}), "alice");
        assert!(!response.ok);
        assert_eq!(response.error.unwrap().kind, "not_found");
    }

    #[test]
    fn unknown_op_is_a_validation_error_not_a_panic() {
        let store = SqliteStore::open_in_memory().unwrap();
        let response = dispatch(&store, "levitate_issue", &json!({}), "alice");
        assert!(!response.ok);
        assert_eq!(response.error.unwrap().kind, "validation");
    }

    #[test]
    fn update_issue_applies_only_the_supplied_fields() {
        let store = SqliteStore::open_in_memory().unwrap();
        dispatch(&store, "create_issue", &json!({"title": "Original", "id": "bd-upd1"}), "alice");
        let response = dispatch(&store, "update_issue", &json!({"id": "bd-upd1", "title": "Revised"}), "alice");
        assert!(response.ok);

        let get_response = dispatch(&store, "get_issue", &json!({"id": "bd-upd1"}), "alice");
        let data = get_response.data.unwrap();
        assert_eq!(data["title"], "Revised");
    }

    #[test]
    fn add_comment_response_carries_the_issue_id_for_hook_dispatch() {
        let store = SqliteStore::open_in_memory().unwrap();
        dispatch(&store, "create_issue", &json!({"title": "Commented", "id": "bd-cmt1"}), "alice");
        let response = dispatch(&store, "add_comment", &json!({"id": "bd-cmt1", "text": "noted"}), "alice");
        assert!(response.ok);
        let data = response.data.unwrap();
        assert_eq!(data["id"], "bd-cmt1");
        assert_eq!(data["comment"]["text"], "noted");
    }

    #[test]
    fn claim_already_claimed_issue_surfaces_conflict_kind() {
        let store = SqliteStore::open_in_memory().unwrap();
        dispatch(&store, "create_issue", &json!({"title": "Claimable", "id": "bd-clm1"}), "alice");
        dispatch(&store, "claim_issue", &json!({"id": "bd-clm1"}), "alice");
        let response = dispatch(&store, "claim_issue", &json!({"id": "bd-clm1"}), "bob");
        assert!(!response.ok);
        assert_eq!(response.error.unwrap().kind, "conflict");
    }
}
