//! Command-line flag lookups against a process-table snapshot.
//!
//! The snapshot is `ps -eo pid=,args=` text: one process per line, pid
//! first. A line belongs to a binary when the basename of its executable
//! equals the binary name exactly, so `kubelet` never matches
//! `kube-apiserver` or a `grep kubelet` run by whoever is watching.

use std::time::Duration;

use tracing::{debug, warn};

use super::Inconclusive;
use crate::executor::{CommandSpec, ExecOutcome, GuardedExecutor};

/// Deadline for capturing the process table.
pub const CAPTURE_DEADLINE: Duration = Duration::from_secs(10);

/// The binary has no running process in the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no running process named {binary}")]
pub struct NoProcess {
    /// Binary that was looked up.
    pub binary: String,
}

/// `true` when `--flag` or `--flag=...` appears on any matching process.
///
/// # Errors
///
/// Returns [`NoProcess`] when `binary` is not running.
pub fn has_flag(snapshot: &str, binary: &str, flag: &str) -> Result<bool, NoProcess> {
    Ok(!flag_values(snapshot, binary, flag)?.is_empty())
}

/// `true` when `--flag=value` appears on any matching process.
///
/// A bare `--flag` counts as `--flag=true`.
///
/// # Errors
///
/// Returns [`NoProcess`] when `binary` is not running.
pub fn flag_equals(
    snapshot: &str,
    binary: &str,
    flag: &str,
    value: &str,
) -> Result<bool, NoProcess> {
    Ok(flag_values(snapshot, binary, flag)?
        .iter()
        .any(|v| v == value))
}

/// Every value given for `flag` across matching processes, in order.
///
/// Empty when the processes run without the flag.
///
/// # Errors
///
/// Returns [`NoProcess`] when `binary` is not running.
pub fn flag_values(snapshot: &str, binary: &str, flag: &str) -> Result<Vec<String>, NoProcess> {
    let commands = matching_commands(snapshot, binary);
    if commands.is_empty() {
        return Err(NoProcess {
            binary: binary.to_owned(),
        });
    }

    let bare = format!("--{flag}");
    let with_value = format!("--{flag}=");
    let mut values = Vec::new();
    for args in commands {
        for token in args.split_whitespace().skip(1) {
            if token == bare {
                values.push("true".to_owned());
            } else if let Some(value) = token.strip_prefix(&with_value) {
                values.push(value.trim_matches(|c| c == '"' || c == '\'').to_owned());
            }
        }
    }
    Ok(values)
}

/// `true` when at least one process for `binary` is in the snapshot.
pub fn is_running(snapshot: &str, binary: &str) -> bool {
    !matching_commands(snapshot, binary).is_empty()
}

/// Command lines (executable first) of the processes running `binary`.
///
/// Lines carrying this process's own pid are skipped.
pub fn matching_commands<'a>(snapshot: &'a str, binary: &str) -> Vec<&'a str> {
    let own_pid = std::process::id();
    snapshot
        .lines()
        .filter_map(split_pid)
        .filter(|(pid, _)| *pid != Some(own_pid))
        .map(|(_, args)| args)
        .filter(|args| {
            args.split_whitespace()
                .next()
                .is_some_and(|exe| executable_name(exe) == binary)
        })
        .collect()
}

/// Split a snapshot line into its leading pid (if any) and the command.
fn split_pid(line: &str) -> Option<(Option<u32>, &str)> {
    let trimmed = line.trim_start();
    if trimmed.is_empty() {
        return None;
    }
    let (first, rest) = trimmed.split_once(char::is_whitespace).unwrap_or((trimmed, ""));
    match first.parse::<u32>() {
        Ok(pid) => Some((Some(pid), rest.trim_start())),
        Err(_) => Some((None, trimmed)),
    }
}

fn executable_name(exe: &str) -> &str {
    exe.rsplit('/').next().unwrap_or(exe)
}

/// Process table captured once per audit run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessTable {
    /// Snapshot text.
    Captured(String),
    /// The table could not be read; every process probe reports this.
    Unavailable(Inconclusive),
}

impl ProcessTable {
    /// Capture the table by running `<ps> -eo pid=,args=` under a deadline.
    pub async fn capture(executor: &GuardedExecutor, ps_program: &str) -> Self {
        let spec = CommandSpec::new(ps_program, ["-eo", "pid=,args="]);
        let execution = executor.run(&spec, CAPTURE_DEADLINE).await;
        match execution.outcome {
            ExecOutcome::Completed {
                exit_code: Some(0),
                stdout,
            } => {
                debug!(lines = stdout.lines().count(), "process table captured");
                Self::Captured(stdout)
            }
            ExecOutcome::Completed { exit_code, .. } => {
                warn!(exit_code = ?exit_code, "process listing failed");
                Self::Unavailable(Inconclusive::SourceUnavailable(format!(
                    "{} exited with {exit_code:?}",
                    spec.display()
                )))
            }
            ExecOutcome::TimedOut => {
                warn!("process listing exceeded deadline");
                Self::Unavailable(Inconclusive::TimedOut)
            }
            ExecOutcome::LaunchFailed(e) if e.is_missing_tool() => {
                warn!(error = %e, "process lister not installed");
                Self::Unavailable(Inconclusive::ToolMissing(e.to_string()))
            }
            ExecOutcome::LaunchFailed(e) => {
                warn!(error = %e, "process listing could not start");
                Self::Unavailable(Inconclusive::LaunchFailed(e.to_string()))
            }
        }
    }
}
