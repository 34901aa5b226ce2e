//! Guarded execution against real processes.

use std::path::Path;
use std::time::Duration;

use kubeguard::executor::{CommandSpec, ExecOutcome, GuardedExecutor, LaunchError};

fn sh(script: &str) -> CommandSpec {
    CommandSpec::new("sh", ["-c", script])
}

/// `true` while a process with `pid` exists.
fn alive(pid: &str) -> bool {
    std::process::Command::new("kill")
        .args(["-0", pid])
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Give the kernel a moment to reap `pid`, then require it to be gone.
async fn assert_gone(pid: &str) {
    for _ in 0..25 {
        if !alive(pid) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("process {pid} outlived its guarded command");
}

async fn wait_for_file(path: &Path) -> String {
    for _ in 0..50 {
        if let Ok(content) = std::fs::read_to_string(path) {
            if !content.trim().is_empty() {
                return content.trim().to_owned();
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{} was never written", path.display());
}

#[tokio::test]
async fn completed_command_reports_exit_code_and_stdout() {
    let executor = GuardedExecutor::default();
    let execution = executor
        .run(&sh("echo '{\"items\":[]}'; exit 3"), Duration::from_secs(5))
        .await;
    assert_eq!(
        execution.outcome,
        ExecOutcome::Completed {
            exit_code: Some(3),
            stdout: "{\"items\":[]}\n".to_owned(),
        }
    );
    assert!(execution.elapsed < Duration::from_secs(5));
    assert!(execution.pid.is_some());
}

#[tokio::test]
async fn slow_command_times_out_within_bound() {
    let grace = Duration::from_millis(200);
    let deadline = Duration::from_millis(300);
    let executor = GuardedExecutor::new(grace);
    let execution = executor
        .run(&CommandSpec::new("sleep", ["30"]), deadline)
        .await;
    assert_eq!(execution.outcome, ExecOutcome::TimedOut);
    // deadline + two grace periods, plus scheduling slack
    assert!(
        execution.elapsed
            < deadline
                .saturating_add(grace.saturating_mul(2))
                .saturating_add(Duration::from_secs(1)),
        "took {:?}",
        execution.elapsed
    );
    let pid = execution.pid.expect("pid captured").to_string();
    assert!(!alive(&pid), "leader {pid} survived the deadline");
}

#[tokio::test]
async fn timeout_kills_the_whole_process_group() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pid_file = dir.path().join("child.pid");
    let script = format!("sleep 30 & echo $! > {}; wait", pid_file.display());

    let executor = GuardedExecutor::new(Duration::from_millis(200));
    let cmd = sh(&script);
    let run = executor.run(&cmd, Duration::from_millis(500));
    let (execution, child_pid) = tokio::join!(run, wait_for_file(&pid_file));

    assert_eq!(execution.outcome, ExecOutcome::TimedOut);
    assert_gone(&child_pid).await;
}

#[tokio::test]
async fn timeout_kills_group_after_leader_exits() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pid_file = dir.path().join("child.pid");
    // The sleeper inherits stdout, so the read outlives the leader.
    let script = format!("sleep 30 & echo $! > {}; exit 0", pid_file.display());

    let executor = GuardedExecutor::new(Duration::from_millis(200));
    let cmd = sh(&script);
    let run = executor.run(&cmd, Duration::from_millis(500));
    let (execution, child_pid) = tokio::join!(run, wait_for_file(&pid_file));

    assert_eq!(execution.outcome, ExecOutcome::TimedOut);
    assert_gone(&child_pid).await;
}

#[tokio::test]
async fn timeout_kills_members_that_ignore_sigterm() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pid_file = dir.path().join("child.pid");
    let script = format!(
        "(trap '' TERM; sleep 30) & echo $! > {}; wait",
        pid_file.display()
    );

    let grace = Duration::from_millis(200);
    let deadline = Duration::from_millis(500);
    let executor = GuardedExecutor::new(grace);
    let cmd = sh(&script);
    let run = executor.run(&cmd, deadline);
    let (execution, child_pid) = tokio::join!(run, wait_for_file(&pid_file));

    assert_eq!(execution.outcome, ExecOutcome::TimedOut);
    assert!(
        execution.elapsed
            < deadline
                .saturating_add(grace.saturating_mul(2))
                .saturating_add(Duration::from_secs(1)),
        "took {:?}",
        execution.elapsed
    );
    assert_gone(&child_pid).await;
}

#[tokio::test]
async fn completed_command_leaves_no_background_members() {
    let executor = GuardedExecutor::default();
    let execution = executor
        .run(
            &sh("sleep 30 >/dev/null 2>&1 & echo $!; exit 0"),
            Duration::from_secs(5),
        )
        .await;
    let ExecOutcome::Completed { exit_code, stdout } = execution.outcome else {
        panic!("expected completion, got {:?}", execution.outcome);
    };
    assert_eq!(exit_code, Some(0));
    assert_gone(stdout.trim()).await;
}

#[tokio::test]
async fn partial_output_is_discarded_on_timeout() {
    let executor = GuardedExecutor::new(Duration::from_millis(100));
    let execution = executor
        .run(&sh("echo partial; sleep 30"), Duration::from_millis(300))
        .await;
    assert_eq!(execution.outcome, ExecOutcome::TimedOut);
}

#[tokio::test]
async fn missing_binary_is_launch_failure() {
    let execution = GuardedExecutor::default()
        .run(
            &CommandSpec::new("kubeguard-definitely-missing", ["get", "pods"]),
            Duration::from_secs(1),
        )
        .await;
    match execution.outcome {
        ExecOutcome::LaunchFailed(err) => {
            assert!(err.is_missing_tool());
            assert_eq!(
                err,
                LaunchError::NotFound {
                    program: "kubeguard-definitely-missing".to_owned()
                }
            );
        }
        other => panic!("expected launch failure, got {other:?}"),
    }
    assert_eq!(execution.pid, None);
}
