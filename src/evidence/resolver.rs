//! First-match-wins resolution of an evidence plan into a verdict.
//!
//! Probes run in declared order. `Matched` passes immediately and `Refuted`
//! fails immediately (with the control's shortfall severity). `NotMatched`
//! and `Inconclusive` results are remembered and only decide the verdict
//! once the plan is exhausted: any soft miss means the control is not
//! satisfied, while a plan that never reached a source yields an
//! informational or error verdict, never a false pass or fail.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info_span, Instrument};

use super::cluster::{self, ClusterClient};
use super::config_field::{ConfigDocument, Tri};
use super::process_args::{self, ProcessTable};
use super::{
    file_meta, Evidence, EvidenceProbe, FieldExpectation, FlagExpectation, Inconclusive, Posture,
};
use crate::catalog::{Control, ControlKind};
use crate::config::AuditConfig;
use crate::types::{Shortfall, Verdict, DEADLINE_EXCEEDED, MANUAL_REVIEW, SOURCE_UNAVAILABLE};

/// Turns a control into a verdict.
#[async_trait]
pub trait ResolveControl: Send + Sync {
    /// Resolve one automated control.
    async fn resolve(&self, control: &Control) -> Verdict;
}

/// Resolver backed by the node and cluster sources of one audit run.
pub struct Resolver {
    config: AuditConfig,
    processes: ProcessTable,
    cluster: Arc<dyn ClusterClient>,
}

impl Resolver {
    /// Build a resolver over a captured process table and a cluster client.
    pub fn new(config: AuditConfig, processes: ProcessTable, cluster: Arc<dyn ClusterClient>) -> Self {
        Self {
            config,
            processes,
            cluster,
        }
    }

    /// Evaluate a single probe against its source.
    pub async fn probe(&self, probe: &EvidenceProbe) -> Evidence {
        match probe {
            EvidenceProbe::ProcessArgument {
                binary,
                flag,
                expect,
            } => flag_evidence(&self.processes, self.config.binary(*binary), flag, expect),
            EvidenceProbe::ConfigField {
                file,
                top_level_key,
                nested_key,
                expect,
                default_when_absent,
            } => {
                let doc = ConfigDocument::load(self.config.path(*file));
                field_evidence(&doc, top_level_key, nested_key, expect, *default_when_absent)
            }
            EvidenceProbe::FileMetadata { path, check } => {
                file_meta::check(self.config.path(*path), check)
            }
            EvidenceProbe::ApiQuery { guarded, predicate } => {
                cluster::query(self.cluster.as_ref(), *guarded, predicate).await
            }
            EvidenceProbe::DocumentedDefault { binary, posture } => {
                default_evidence(&self.processes, self.config.binary(*binary), *posture)
            }
        }
    }

    /// Run `plan` in order and reduce the results to one verdict.
    pub async fn resolve_plan(&self, plan: &[EvidenceProbe], shortfall: Shortfall) -> Verdict {
        let mut outcome = PlanOutcome::default();
        for probe in plan {
            let evidence = self.probe(probe).await;
            debug!(probe = %probe.describe(), evidence = ?evidence, "probe evaluated");
            if let Some(verdict) = outcome.record(evidence, shortfall) {
                return verdict;
            }
        }
        outcome.conclude(shortfall)
    }
}

#[async_trait]
impl ResolveControl for Resolver {
    async fn resolve(&self, control: &Control) -> Verdict {
        match &control.kind {
            ControlKind::Automated { plan, shortfall } => {
                self.resolve_plan(plan, *shortfall)
                    .instrument(info_span!("control", id = control.id))
                    .await
            }
            ControlKind::Manual => Verdict::Info(MANUAL_REVIEW.to_owned()),
        }
    }
}

/// Results remembered while a plan is still undecided.
#[derive(Debug, Default)]
pub struct PlanOutcome {
    misses: Vec<String>,
    inconclusive: Vec<Inconclusive>,
}

impl PlanOutcome {
    /// Fold one probe result in. Returns the verdict when it decides the plan.
    pub fn record(&mut self, evidence: Evidence, shortfall: Shortfall) -> Option<Verdict> {
        match evidence {
            Evidence::Matched => Some(Verdict::Pass),
            Evidence::Refuted(reason) => Some(shortfall.verdict(reason)),
            Evidence::NotMatched(note) => {
                self.misses.push(note);
                None
            }
            Evidence::Inconclusive(reason) => {
                self.inconclusive.push(reason);
                None
            }
        }
    }

    /// Verdict once every probe has been tried without a decision.
    pub fn conclude(self, shortfall: Shortfall) -> Verdict {
        if !self.misses.is_empty() {
            return shortfall.verdict(format!("evidence exhausted: {}", self.misses.join("; ")));
        }
        match self.inconclusive.into_iter().max_by_key(Inconclusive::rank) {
            Some(Inconclusive::TimedOut) => Verdict::Info(DEADLINE_EXCEEDED.to_owned()),
            Some(
                reason @ (Inconclusive::ToolMissing(_)
                | Inconclusive::LaunchFailed(_)
                | Inconclusive::Malformed(_)),
            ) => Verdict::Error(reason.detail()),
            Some(reason) => {
                debug!(detail = %reason.detail(), "no evidence source reachable");
                Verdict::Info(SOURCE_UNAVAILABLE.to_owned())
            }
            None => Verdict::Error("control has no evidence plan".to_owned()),
        }
    }
}

/// Evaluate a flag expectation against the process table.
pub fn flag_evidence(
    table: &ProcessTable,
    binary: &str,
    flag: &str,
    expect: &FlagExpectation,
) -> Evidence {
    let snapshot = match table {
        ProcessTable::Captured(s) => s,
        ProcessTable::Unavailable(reason) => return Evidence::Inconclusive(reason.clone()),
    };
    let values = match process_args::flag_values(snapshot, binary, flag) {
        Ok(v) => v,
        Err(e) => return Evidence::Inconclusive(Inconclusive::NoProcess(e.binary)),
    };
    let unset = || Evidence::NotMatched(format!("{binary} --{flag} not set"));

    match expect {
        FlagExpectation::Equals(want) => {
            if values.is_empty() {
                unset()
            } else if values.iter().any(|v| v == want) {
                Evidence::Matched
            } else {
                Evidence::Refuted(format!("{binary} --{flag}={}", values.join(",")))
            }
        }
        FlagExpectation::Excludes(token) => {
            let offending = values
                .iter()
                .find(|v| v.split(',').any(|t| t.trim() == *token));
            match offending {
                Some(v) => Evidence::Refuted(format!("{binary} --{flag}={v}")),
                None if values.is_empty() => unset(),
                None => Evidence::Matched,
            }
        }
        FlagExpectation::StartsWith(prefix) => {
            if values.is_empty() {
                unset()
            } else if values.iter().all(|v| v.starts_with(prefix)) {
                Evidence::Matched
            } else {
                Evidence::Refuted(format!("{binary} --{flag}={}", values.join(",")))
            }
        }
        FlagExpectation::Present => {
            if values.is_empty() {
                unset()
            } else {
                Evidence::Matched
            }
        }
        FlagExpectation::Absent => {
            if values.is_empty() {
                Evidence::Matched
            } else {
                Evidence::Refuted(format!("{binary} --{flag} is set"))
            }
        }
    }
}

/// Evaluate a field expectation against a config document.
///
/// A section that is present without the nested key means defaults apply.
/// A section missing from the file is defaulted the same way by the kubelet,
/// so both reach the probe's `default_when_absent` posture; only the reason
/// text differs.
pub fn field_evidence(
    doc: &ConfigDocument,
    top_level_key: &str,
    nested_key: &str,
    expect: &FieldExpectation,
    default_when_absent: Option<Posture>,
) -> Evidence {
    if !doc.is_available() {
        return Evidence::Inconclusive(Inconclusive::SourceUnavailable(format!(
            "{} not readable",
            doc.path().display()
        )));
    }
    let key = if top_level_key.is_empty() {
        nested_key.to_owned()
    } else {
        format!("{top_level_key}.{nested_key}")
    };

    let tri = match expect {
        FieldExpectation::Equals(want) => doc.field_equals(top_level_key, nested_key, want),
        FieldExpectation::NotEquals(unwanted) => {
            match doc.field_equals(top_level_key, nested_key, unwanted) {
                Tri::Yes => Tri::No,
                Tri::No => Tri::Yes,
                Tri::Unset => Tri::Unset,
            }
        }
        FieldExpectation::Present => match doc.field_value(top_level_key, nested_key) {
            Some(_) => Tri::Yes,
            None => Tri::Unset,
        },
    };

    match tri {
        Tri::Yes => Evidence::Matched,
        Tri::No => {
            let actual = doc
                .field_value(top_level_key, nested_key)
                .unwrap_or_default();
            Evidence::Refuted(format!("{key} is {actual} in {}", doc.path().display()))
        }
        Tri::Unset => {
            let defaults_apply = !top_level_key.is_empty() && doc.has_field(top_level_key);
            debug!(key = %key, defaults_apply, "config field unset");
            let note = if defaults_apply {
                format!("{key} not set, {top_level_key} uses defaults")
            } else {
                format!("{key} not set")
            };
            match default_when_absent {
                Some(Posture::Secure) => {
                    debug!(%note, "secure default applies");
                    Evidence::Matched
                }
                Some(Posture::Insecure) => {
                    Evidence::NotMatched(format!("{note}; default is insecure"))
                }
                None => Evidence::NotMatched(note),
            }
        }
    }
}

/// A running component's documented default decides when nothing else did.
pub fn default_evidence(table: &ProcessTable, binary: &str, posture: Posture) -> Evidence {
    let snapshot = match table {
        ProcessTable::Captured(s) => s,
        ProcessTable::Unavailable(reason) => return Evidence::Inconclusive(reason.clone()),
    };
    if !process_args::is_running(snapshot, binary) {
        return Evidence::Inconclusive(Inconclusive::NoProcess(binary.to_owned()));
    }
    match posture {
        Posture::Secure => Evidence::Matched,
        Posture::Insecure => Evidence::NotMatched(format!("{binary} default is insecure")),
    }
}
