//! Post-mutation hook dispatch.
//!
//! A hook is an external subprocess fed the mutated issue's JSON on stdin.
//! Generalizes `beads-git`'s `Command::new(...).output()` wrapper to a piped
//! stdin and a bounded wait so a slow or hung hook can never stall the
//! daemon: a hook that times out is killed and logged, never propagated as a
//! request failure.

use std::io::Write;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use beads_core::issue::Issue;

/// One configured hook: a command run after a mutation, given the affected
/// issue's JSON on stdin.
#[derive(Debug, Clone)]
pub struct Hook {
    pub command: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

/// Runs every configured hook for `issue`, logging but never failing the
/// caller on a hook error or timeout.
pub fn dispatch(hooks: &[Hook], issue: &Issue) {
    let payload = match serde_json::to_vec(issue) {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(error = %err, issue_id = %issue.id, "failed to serialize hook payload");
            return;
        }
    };
    for hook in hooks {
        if let Err(err) = run_with_timeout(hook, &payload) {
            tracing::warn!(
                error = %err,
                command = %hook.command,
                issue_id = %issue.id,
                "hook failed"
            );
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum HookError {
    #[error("failed to spawn hook: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("hook timed out after {0:?}")]
    Timeout(Duration),
    #[error("hook exited with status {0}")]
    NonZero(std::process::ExitStatus),
}

fn run_with_timeout(hook: &Hook, payload: &[u8]) -> std::result::Result<(), HookError> {
    let mut child = Command::new(&hook.command)
        .args(&hook.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.write_all(payload);
    }

    let start = Instant::now();
    let poll_interval = Duration::from_millis(10);
    loop {
        if let Some(status) = child.try_wait()? {
            return if status.success() {
                Ok(())
            } else {
                Err(HookError::NonZero(status))
            };
        }
        if start.elapsed() >= hook.timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(HookError::Timeout(hook.timeout));
        }
        std::thread::sleep(poll_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beads_core::issue::IssueBuilder;

    fn sample_issue() -> Issue {
        IssueBuilder::new("Hooked").id("bd-hk1").build()
    }

    #[test]
    fn hook_that_exits_zero_is_silent() {
        let hook = Hook {
            command: "true".to_string(),
            args: vec![],
            timeout: Duration::from_secs(1),
        };
        dispatch(&[hook], &sample_issue());
    }

    #[test]
    fn hook_timeout_is_swallowed_not_propagated() {
        let hook = Hook {
            command: "sleep".to_string(),
            args: vec!["5".to_string()],
            timeout: Duration::from_millis(50),
        };
        let started = Instant::now();
        dispatch(&[hook], &sample_issue());
        assert!(
            started.elapsed() < Duration::from_secs(2),
            "dispatch must return promptly once the hook's timeout elapses"
        );
    }

    #[test]
    fn missing_binary_is_logged_not_panicked() {
        let hook = Hook {
            command: "definitely-not-a-real-binary-xyz".to_string(),
            args: vec![],
            timeout: Duration::from_millis(100),
        };
        dispatch(&[hook], &sample_issue());
    }
}
