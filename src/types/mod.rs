//! Verdict types shared by the resolver, runner and report.

use std::fmt;

use serde::Serialize;

/// Reason attached to every manual control.
pub const MANUAL_REVIEW: &str = "manual review required";

/// Reason used when no evidence source could be consulted.
pub const SOURCE_UNAVAILABLE: &str = "source unavailable";

/// Reason used when a guarded cluster query ran past its deadline.
pub const DEADLINE_EXCEEDED: &str = "inconclusive: query exceeded deadline";

/// Outcome of evaluating one control. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "UPPERCASE")]
pub enum Verdict {
    /// The secure setting was confirmed.
    Pass,
    /// The control is not satisfied.
    Fail(String),
    /// Findings exist that need human judgement.
    Warn(String),
    /// No security conclusion could be drawn.
    Info(String),
    /// The control could not be evaluated.
    Error(String),
}

impl Verdict {
    /// Discriminant without the payload.
    pub fn kind(&self) -> VerdictKind {
        match self {
            Self::Pass => VerdictKind::Pass,
            Self::Fail(_) => VerdictKind::Fail,
            Self::Warn(_) => VerdictKind::Warn,
            Self::Info(_) => VerdictKind::Info,
            Self::Error(_) => VerdictKind::Error,
        }
    }

    /// Reason text, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Pass => None,
            Self::Fail(r) | Self::Warn(r) | Self::Info(r) | Self::Error(r) => Some(r.as_str()),
        }
    }
}

/// Verdict discriminant, used for counting and rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerdictKind {
    /// See [`Verdict::Pass`].
    Pass,
    /// See [`Verdict::Fail`].
    Fail,
    /// See [`Verdict::Warn`].
    Warn,
    /// See [`Verdict::Info`].
    Info,
    /// See [`Verdict::Error`].
    Error,
}

impl VerdictKind {
    /// Uppercase label used in report lines.
    pub fn label(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Warn => "WARN",
            Self::Info => "INFO",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for VerdictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What an automated control yields when its evidence falls short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Shortfall {
    /// Hard requirement: shortfall is a failure.
    Fail,
    /// "Minimize ..." controls: shortfall is a warning for review.
    Warn,
}

impl Shortfall {
    /// Build the shortfall verdict carrying `reason`.
    pub fn verdict(self, reason: impl Into<String>) -> Verdict {
        match self {
            Self::Fail => Verdict::Fail(reason.into()),
            Self::Warn => Verdict::Warn(reason.into()),
        }
    }
}
