//! Deadline-raced command execution with process-group teardown.

use std::process::Stdio;
use std::time::{Duration, Instant};

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use super::{CommandSpec, ExecOutcome, GuardedExecution, LaunchError};

/// Default wait between SIGTERM and SIGKILL once the deadline has elapsed.
pub const DEFAULT_GRACE: Duration = Duration::from_millis(500);

/// Poll interval while waiting for a signalled group to exit.
const SETTLE_POLL: Duration = Duration::from_millis(20);

/// Runs external commands under a hard wall-clock deadline.
///
/// Each command is started as the leader of a fresh process group so that a
/// timeout tears down everything it spawned, not just the direct child.
/// Group members left running after a normal exit are killed as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardedExecutor {
    grace: Duration,
}

impl Default for GuardedExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE)
    }
}

impl GuardedExecutor {
    /// Create an executor with the given SIGTERM-to-SIGKILL grace period.
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }

    /// Grace period applied after the deadline.
    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Run `spec`, racing it against `deadline`.
    ///
    /// Never returns an error: launch problems, timeouts and normal exits are
    /// all expressed in [`ExecOutcome`]. Returns within
    /// `deadline + 2 * grace` even if the command ignores SIGTERM.
    pub async fn run(&self, spec: &CommandSpec, deadline: Duration) -> GuardedExecution {
        let started = Instant::now();

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .process_group(0)
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let err = LaunchError::from_io(&spec.program, &e);
                debug!(command = %spec.display(), error = %err, "command launch failed");
                return GuardedExecution {
                    deadline,
                    outcome: ExecOutcome::LaunchFailed(err),
                    elapsed: started.elapsed(),
                    pid: None,
                };
            }
        };

        let pid = child.id();
        let Some(mut stdout) = child.stdout.take() else {
            return GuardedExecution {
                deadline,
                outcome: ExecOutcome::LaunchFailed(LaunchError::Io {
                    program: spec.program.clone(),
                    detail: "stdout was not captured".to_owned(),
                }),
                elapsed: started.elapsed(),
                pid,
            };
        };

        // The timeout future is the watchdog: it is dropped (disarmed) as soon
        // as the command finishes, and the teardown below only runs when it
        // fired. Exactly one of the two happens per execution.
        let race = tokio::time::timeout(deadline, async {
            let mut buf = Vec::new();
            let (status, read) = tokio::join!(child.wait(), stdout.read_to_end(&mut buf));
            match (status, read) {
                (Ok(status), Ok(_)) => Ok((status, buf)),
                (Err(e), _) | (_, Err(e)) => Err(e),
            }
        })
        .await;

        let outcome = match race {
            Ok(Ok((status, buf))) => {
                debug!(command = %spec.display(), exit_code = ?status.code(), "command completed");
                sweep(pid);
                ExecOutcome::Completed {
                    exit_code: status.code(),
                    stdout: String::from_utf8_lossy(&buf).into_owned(),
                }
            }
            Ok(Err(e)) => {
                sweep(pid);
                ExecOutcome::LaunchFailed(LaunchError::Io {
                    program: spec.program.clone(),
                    detail: e.to_string(),
                })
            }
            Err(_) => {
                warn!(
                    command = %spec.display(),
                    deadline_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                    "command exceeded deadline, terminating process group"
                );
                drop(stdout);
                self.terminate(&mut child, pid).await;
                ExecOutcome::TimedOut
            }
        };

        GuardedExecution {
            deadline,
            outcome,
            elapsed: started.elapsed(),
            pid,
        }
    }

    /// Terminate the process group captured at spawn.
    ///
    /// The group is signalled even when the leader has already exited: a
    /// pgid is not handed out again while any member of the group is alive.
    async fn terminate(&self, child: &mut Child, pid: Option<u32>) {
        let Some(pgid) = pid.and_then(|p| i32::try_from(p).ok()).map(Pid::from_raw) else {
            let _ = child.kill().await;
            return;
        };

        signal_group(pgid, Signal::SIGTERM);
        if self.settle(child, pgid).await {
            return;
        }

        signal_group(pgid, Signal::SIGKILL);
        if !self.settle(child, pgid).await {
            warn!(pgid = pgid.as_raw(), "process group did not exit after SIGKILL");
        }
    }

    /// Wait up to the grace period for every member of `pgid` to exit.
    /// Reaps the leader along the way so it does not linger as a zombie.
    async fn settle(&self, child: &mut Child, pgid: Pid) -> bool {
        let started = Instant::now();
        loop {
            let _ = child.try_wait();
            if !group_alive(pgid) {
                return true;
            }
            if started.elapsed() >= self.grace {
                return false;
            }
            tokio::time::sleep(SETTLE_POLL).await;
        }
    }
}

/// Kill whatever the command left behind in its group after a normal exit.
fn sweep(pid: Option<u32>) {
    if let Some(pgid) = pid.and_then(|p| i32::try_from(p).ok()).map(Pid::from_raw) {
        signal_group(pgid, Signal::SIGKILL);
    }
}

/// `true` while any process in `pgid` exists.
fn group_alive(pgid: Pid) -> bool {
    !matches!(killpg(pgid, None::<Signal>), Err(nix::errno::Errno::ESRCH))
}

fn signal_group(pgid: Pid, signal: Signal) {
    match killpg(pgid, signal) {
        Ok(()) => debug!(pgid = pgid.as_raw(), signal = ?signal, "signalled process group"),
        Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => warn!(pgid = pgid.as_raw(), signal = ?signal, error = %e, "killpg failed"),
    }
}
