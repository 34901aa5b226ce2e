//! Drives the resolver over the catalog in declaration order.
//!
//! The run is a lazy cursor: each call to [`AuditRun::next`] evaluates one
//! control. Manual controls never reach the resolver.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::catalog::{section_of, Catalog, Control, ControlKind};
use crate::config::AuditConfig;
use crate::evidence::cluster::Kubectl;
use crate::evidence::process_args::ProcessTable;
use crate::evidence::resolver::{ResolveControl, Resolver};
use crate::executor::GuardedExecutor;
use crate::types::{Verdict, VerdictKind, MANUAL_REVIEW};

/// Verdict for one control, with what the report needs to render it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlResult {
    /// Catalog position; results are always reported in this order.
    #[serde(skip)]
    pub position: usize,
    /// Dotted control id.
    pub id: &'static str,
    /// Control title.
    pub title: &'static str,
    /// `false` for manual controls.
    pub automated: bool,
    /// The verdict.
    #[serde(flatten)]
    pub verdict: Verdict,
    /// Remediation guidance.
    pub remediation: &'static str,
    /// Resolved file an operator should inspect, for manual controls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_target: Option<PathBuf>,
}

impl ControlResult {
    /// Section id of the control (`4.2.1` → `4.2`).
    pub fn section_id(&self) -> &'static str {
        section_of(self.id)
    }
}

/// Verdict counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// PASS verdicts.
    pub pass: usize,
    /// FAIL verdicts.
    pub fail: usize,
    /// WARN verdicts.
    pub warn: usize,
    /// INFO verdicts.
    pub info: usize,
    /// ERROR verdicts.
    pub error: usize,
}

impl Summary {
    /// Count one verdict.
    pub fn record(&mut self, verdict: &Verdict) {
        let slot = match verdict.kind() {
            VerdictKind::Pass => &mut self.pass,
            VerdictKind::Fail => &mut self.fail,
            VerdictKind::Warn => &mut self.warn,
            VerdictKind::Info => &mut self.info,
            VerdictKind::Error => &mut self.error,
        };
        *slot = slot.saturating_add(1);
    }

    /// Count every verdict in `results`. Order does not matter.
    pub fn of<'a>(results: impl IntoIterator<Item = &'a ControlResult>) -> Self {
        let mut summary = Self::default();
        for result in results {
            summary.record(&result.verdict);
        }
        summary
    }

    /// Total number of verdicts counted.
    pub fn total(&self) -> usize {
        self.pass
            .saturating_add(self.fail)
            .saturating_add(self.warn)
            .saturating_add(self.info)
            .saturating_add(self.error)
    }
}

/// Evaluates controls from one catalog with one resolver.
pub struct Runner<R: ResolveControl = Resolver> {
    catalog: Catalog,
    config: AuditConfig,
    resolver: R,
}

impl Runner<Resolver> {
    /// Capture node state and build a runner backed by the live sources.
    pub async fn connect(catalog: Catalog, config: AuditConfig) -> Self {
        let executor = GuardedExecutor::new(config.api.grace());
        let processes = ProcessTable::capture(&executor, &config.binaries.ps).await;
        if let ProcessTable::Unavailable(reason) = &processes {
            info!(reason = %reason.detail(), "process table unavailable");
        }
        let cluster = Kubectl::new(
            config.binaries.kubectl.as_str(),
            executor,
            config.api.deadline(),
        );
        let resolver = Resolver::new(config.clone(), processes, Arc::new(cluster));
        Self::new(catalog, config, resolver)
    }
}

impl<R: ResolveControl> Runner<R> {
    /// Runner over `catalog` delegating automated controls to `resolver`.
    pub fn new(catalog: Catalog, config: AuditConfig, resolver: R) -> Self {
        Self {
            catalog,
            config,
            resolver,
        }
    }

    /// The catalog being run.
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Start a fresh pass over the catalog.
    pub fn run_all(&self) -> AuditRun<'_, R> {
        AuditRun {
            runner: self,
            cursor: 0,
        }
    }

    /// Evaluate the control at catalog `position`.
    pub async fn evaluate(&self, position: usize) -> Option<ControlResult> {
        let control = self.catalog.controls().get(position)?;
        let verdict = match &control.kind {
            ControlKind::Manual => Verdict::Info(MANUAL_REVIEW.to_owned()),
            ControlKind::Automated { .. } => self.resolver.resolve(control).await,
        };
        debug!(id = control.id, verdict = %verdict.kind(), "control evaluated");
        Some(self.result(position, control, verdict))
    }

    fn result(&self, position: usize, control: &Control, verdict: Verdict) -> ControlResult {
        ControlResult {
            position,
            id: control.id,
            title: control.title,
            automated: control.is_automated(),
            verdict,
            remediation: control.remediation,
            audit_target: control
                .audit_target
                .map(|key| self.config.path(key).to_path_buf()),
        }
    }
}

/// One pass over the catalog. Finite and not restartable; call
/// [`Runner::run_all`] again for a fresh evaluation.
pub struct AuditRun<'a, R: ResolveControl> {
    runner: &'a Runner<R>,
    cursor: usize,
}

impl<R: ResolveControl> AuditRun<'_, R> {
    /// Evaluate and return the next control, or `None` when the catalog is done.
    pub async fn next(&mut self) -> Option<ControlResult> {
        let result = self.runner.evaluate(self.cursor).await?;
        self.cursor = self.cursor.saturating_add(1);
        Some(result)
    }

    /// Drain the remaining controls.
    pub async fn collect_all(mut self) -> Vec<ControlResult> {
        let mut results = Vec::with_capacity(self.runner.catalog.len());
        while let Some(result) = self.next().await {
            results.push(result);
        }
        results
    }
}
