//! Evidence probes and the sources they read.
//!
//! A control's evidence plan is an ordered list of [`EvidenceProbe`]s. Each
//! probe looks at exactly one source (process table, config file, file
//! metadata, cluster API) and reports [`Evidence`]. Priority and polarity are
//! data on the probe; the [`resolver`] only applies first-match-wins.

use serde::Serialize;

use crate::config::{Binary, PathKey};

pub mod cluster;
pub mod config_field;
pub mod file_meta;
pub mod process_args;
pub mod resolver;

/// Result of evaluating a single probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evidence {
    /// The source confirms the secure setting.
    Matched,
    /// The source does not confirm it (for example the flag is simply not
    /// set). Lower-priority probes are still consulted.
    NotMatched(String),
    /// The source explicitly contradicts the secure setting. Short-circuits.
    Refuted(String),
    /// The source could not be consulted.
    Inconclusive(Inconclusive),
}

/// Why a probe could not reach a conclusion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inconclusive {
    /// File, process table or cluster not available.
    SourceUnavailable(String),
    /// The component binary is not running.
    NoProcess(String),
    /// A guarded cluster query exceeded its deadline.
    TimedOut,
    /// A required helper binary is not installed.
    ToolMissing(String),
    /// A helper could not be started.
    LaunchFailed(String),
    /// A source answered with output that could not be interpreted.
    Malformed(String),
}

impl Inconclusive {
    /// Ordering used when every probe is inconclusive: the highest rank
    /// decides the verdict.
    pub fn rank(&self) -> u8 {
        match self {
            Self::SourceUnavailable(_) | Self::NoProcess(_) => 0,
            Self::TimedOut => 1,
            Self::ToolMissing(_) | Self::LaunchFailed(_) | Self::Malformed(_) => 2,
        }
    }

    /// Human-readable detail for logs.
    pub fn detail(&self) -> String {
        match self {
            Self::SourceUnavailable(d) => d.clone(),
            Self::NoProcess(binary) => format!("{binary} is not running"),
            Self::TimedOut => "query exceeded deadline".to_owned(),
            Self::ToolMissing(d) | Self::LaunchFailed(d) | Self::Malformed(d) => d.clone(),
        }
    }
}

/// Expected state of a command-line flag on a running component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FlagExpectation {
    /// `--flag=<value>` must be present.
    Equals(&'static str),
    /// If set, the comma-separated value must not contain this token.
    Excludes(&'static str),
    /// If set, the value must start with this prefix.
    StartsWith(&'static str),
    /// The flag must be set to something.
    Present,
    /// The flag must not be set at all.
    Absent,
}

/// Expected state of a config-file field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldExpectation {
    /// The field must equal this token.
    Equals(&'static str),
    /// The field must not equal this token.
    NotEquals(&'static str),
    /// The field must carry a non-empty value.
    Present,
}

/// Security posture of a component's documented default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Posture {
    /// Leaving the setting unspecified is secure.
    Secure,
    /// Leaving the setting unspecified is insecure.
    Insecure,
}

/// Filesystem metadata requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FileCheck {
    /// Mode bits must be a subset of `max_mode` (e.g. `0o600`).
    Permissions {
        /// Most permissive acceptable mode.
        max_mode: u32,
    },
    /// Owner and group names.
    Ownership {
        /// Required owning user.
        user: &'static str,
        /// Required owning group.
        group: &'static str,
    },
}

/// Host namespace a pod can share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostNamespace {
    /// `spec.hostPID`.
    Pid,
    /// `spec.hostIPC`.
    Ipc,
    /// `spec.hostNetwork`.
    Network,
}

impl HostNamespace {
    /// Pod spec field name.
    pub fn field(self) -> &'static str {
        match self {
            Self::Pid => "hostPID",
            Self::Ipc => "hostIPC",
            Self::Network => "hostNetwork",
        }
    }
}

/// Predicate evaluated over `kubectl get ... -o json` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "namespace", rename_all = "snake_case")]
pub enum ApiPredicate {
    /// `cluster-admin` is only bound to `system:masters`.
    ClusterAdminBindingsRestricted,
    /// No non-default role grants get/list/watch on secrets.
    SecretsAccessRestricted,
    /// No non-default role uses `*` in groups, resources or verbs.
    NoWildcardRules,
    /// No non-default role grants create on pods.
    PodCreateRestricted,
    /// Every `default` service account disables token automount.
    DefaultServiceAccountsUnused,
    /// Workload pods opt out of service account token automount.
    TokenAutomountRestricted,
    /// No workload pod shares the given host namespace.
    NoPodsWithHostNamespace(HostNamespace),
    /// No workload container allows privilege escalation.
    NoPrivilegeEscalation,
}

/// One way to establish the truth of a control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "probe", rename_all = "snake_case")]
pub enum EvidenceProbe {
    /// Inspect a flag on the running component's command line.
    ProcessArgument {
        /// Component to inspect.
        binary: Binary,
        /// Flag name without leading dashes.
        flag: &'static str,
        /// Required state.
        expect: FlagExpectation,
    },
    /// Inspect a field in an indentation-structured config file.
    ConfigField {
        /// File holding the field.
        file: PathKey,
        /// Dotted path of the enclosing section; empty for the document root.
        top_level_key: &'static str,
        /// Key looked up inside the section.
        nested_key: &'static str,
        /// Required state.
        expect: FieldExpectation,
        /// Outcome when the field is not set; `None` means absence proves nothing.
        default_when_absent: Option<Posture>,
    },
    /// Inspect permissions or ownership of a file.
    FileMetadata {
        /// File to stat.
        path: PathKey,
        /// Requirement on its metadata.
        check: FileCheck,
    },
    /// Query the cluster API through kubectl.
    ApiQuery {
        /// Run under the configured deadline.
        guarded: bool,
        /// Predicate over the query output.
        predicate: ApiPredicate,
    },
    /// Rely on the component's documented default when it is running and
    /// nothing above settled the control.
    DocumentedDefault {
        /// Component whose default applies.
        binary: Binary,
        /// Whether that default is secure.
        posture: Posture,
    },
}

impl EvidenceProbe {
    /// Short description used by `explain` and debug logs.
    pub fn describe(&self) -> String {
        match self {
            Self::ProcessArgument { binary, flag, expect } => {
                format!("{binary:?} flag --{flag} {expect:?}")
            }
            Self::ConfigField {
                file,
                top_level_key,
                nested_key,
                expect,
                default_when_absent,
            } => {
                let key = if top_level_key.is_empty() {
                    (*nested_key).to_owned()
                } else {
                    format!("{top_level_key}.{nested_key}")
                };
                match default_when_absent {
                    Some(posture) => {
                        format!("{file:?} field {key} {expect:?} (unset: {posture:?})")
                    }
                    None => format!("{file:?} field {key} {expect:?}"),
                }
            }
            Self::FileMetadata { path, check } => format!("{path:?} {check:?}"),
            Self::ApiQuery { guarded, predicate } => {
                if *guarded {
                    format!("cluster {predicate:?} (guarded)")
                } else {
                    format!("cluster {predicate:?}")
                }
            }
            Self::DocumentedDefault { binary, posture } => {
                format!("{binary:?} documented default is {posture:?}")
            }
        }
    }
}
