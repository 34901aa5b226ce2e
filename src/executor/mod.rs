//! Bounded execution of external commands.
//!
//! Cluster queries can hang indefinitely against large or unreachable
//! clusters. Every external command the auditor launches goes through
//! [`GuardedExecutor`], which races the command against a wall-clock
//! deadline and tears down the whole process group when the deadline wins.

use std::time::Duration;

pub mod guarded;

pub use guarded::GuardedExecutor;

/// An external command: program plus literal arguments (no shell).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name or path, resolved through `PATH` by the OS.
    pub program: String,
    /// Arguments passed verbatim.
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Build a command from a program and its arguments.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Render the command for logs and error messages.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            return self.program.clone();
        }
        format!("{} {}", self.program, self.args.join(" "))
    }
}

/// Why a command could not be launched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LaunchError {
    /// The program does not exist on `PATH`.
    #[error("required tool not found: {program}")]
    NotFound {
        /// Program that was requested.
        program: String,
    },
    /// The program exists but may not be executed.
    #[error("permission denied launching {program}")]
    PermissionDenied {
        /// Program that was requested.
        program: String,
    },
    /// Any other spawn or wait failure.
    #[error("failed to run {program}: {detail}")]
    Io {
        /// Program that was requested.
        program: String,
        /// OS error text.
        detail: String,
    },
}

impl LaunchError {
    /// Classify an I/O error raised while spawning `program`.
    pub fn from_io(program: &str, err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound {
                program: program.to_owned(),
            },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                program: program.to_owned(),
            },
            _ => Self::Io {
                program: program.to_owned(),
                detail: err.to_string(),
            },
        }
    }

    /// Returns `true` when the helper binary itself is missing.
    pub fn is_missing_tool(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Terminal state of one guarded execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    /// The command exited before the deadline.
    Completed {
        /// Exit code (`None` when terminated by a signal).
        exit_code: Option<i32>,
        /// Captured stdout, lossily decoded as UTF-8.
        stdout: String,
    },
    /// The deadline elapsed first; the process group was terminated and any
    /// partial output discarded.
    TimedOut,
    /// The command never started.
    LaunchFailed(LaunchError),
}

impl ExecOutcome {
    /// Stdout of a command that exited with status zero.
    pub fn success_stdout(&self) -> Option<&str> {
        match self {
            Self::Completed {
                exit_code: Some(0),
                stdout,
            } => Some(stdout.as_str()),
            _ => None,
        }
    }
}

/// One guarded execution. Created fresh per command and never reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardedExecution {
    /// Deadline the command was raced against.
    pub deadline: Duration,
    /// How the race ended.
    pub outcome: ExecOutcome,
    /// Wall-clock time from launch to outcome, including teardown.
    pub elapsed: Duration,
    /// Pid (and process group id) captured at launch.
    pub pid: Option<u32>,
}
