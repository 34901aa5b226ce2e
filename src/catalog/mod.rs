//! The fixed control catalog: CIS Kubernetes Benchmark v1.9, chapters 4 and 5.
//!
//! Controls are plain data. An automated control carries its evidence plan
//! and shortfall severity; a manual control carries neither. The catalog
//! order is the report order.

use std::cmp::Ordering;

use serde::Serialize;

use crate::config::PathKey;
use crate::evidence::EvidenceProbe;
use crate::types::Shortfall;

mod policies;
mod worker_node;

/// Benchmark name and revision the catalog implements.
pub const BENCHMARK: &str = "CIS Kubernetes Benchmark v1.9";

/// How a control is evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlKind {
    /// Evaluated from evidence.
    Automated {
        /// Probes in priority order. Never empty in a valid catalog.
        plan: Vec<EvidenceProbe>,
        /// Verdict severity when the evidence falls short.
        shortfall: Shortfall,
    },
    /// Requires human review; never evaluated.
    Manual,
}

/// One benchmark item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Control {
    /// Dotted identifier, e.g. `4.2.1`.
    pub id: &'static str,
    /// Benchmark title.
    pub title: &'static str,
    /// Evaluation mode.
    pub kind: ControlKind,
    /// Remediation guidance.
    pub remediation: &'static str,
    /// File an operator should inspect for a manual control.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_target: Option<PathKey>,
}

impl Control {
    /// Automated control with a `Fail` shortfall.
    pub fn automated(
        id: &'static str,
        title: &'static str,
        plan: Vec<EvidenceProbe>,
        remediation: &'static str,
    ) -> Self {
        Self {
            id,
            title,
            kind: ControlKind::Automated {
                plan,
                shortfall: Shortfall::Fail,
            },
            remediation,
            audit_target: None,
        }
    }

    /// Manual control.
    pub fn manual(id: &'static str, title: &'static str, remediation: &'static str) -> Self {
        Self {
            id,
            title,
            kind: ControlKind::Manual,
            remediation,
            audit_target: None,
        }
    }

    /// Downgrade the shortfall of an automated control to `Warn`.
    #[must_use]
    pub fn warn_on_shortfall(mut self) -> Self {
        if let ControlKind::Automated { shortfall, .. } = &mut self.kind {
            *shortfall = Shortfall::Warn;
        }
        self
    }

    /// Name the file an operator should inspect.
    #[must_use]
    pub fn auditing(mut self, target: PathKey) -> Self {
        self.audit_target = Some(target);
        self
    }

    /// `true` for automated controls.
    pub fn is_automated(&self) -> bool {
        matches!(self.kind, ControlKind::Automated { .. })
    }

    /// Identifier of the section holding this control (`4.2.1` → `4.2`).
    pub fn section_id(&self) -> &'static str {
        section_of(self.id)
    }

    /// Benchmark chapter (`4.2.1` → `4`).
    pub fn chapter(&self) -> &'static str {
        self.id.split('.').next().unwrap_or(self.id)
    }
}

/// A titled benchmark section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Section {
    /// Dotted identifier, e.g. `4.2`.
    pub id: &'static str,
    /// Section title.
    pub title: &'static str,
}

/// Sections in benchmark order.
pub const SECTIONS: &[Section] = &[
    Section {
        id: "4.1",
        title: "Worker Node Configuration Files",
    },
    Section {
        id: "4.2",
        title: "Kubelet",
    },
    Section {
        id: "4.3",
        title: "kube-proxy",
    },
    Section {
        id: "5.1",
        title: "RBAC and Service Accounts",
    },
    Section {
        id: "5.2",
        title: "Pod Security Standards",
    },
    Section {
        id: "5.3",
        title: "Network Policies and CNI",
    },
    Section {
        id: "5.4",
        title: "Secrets Management",
    },
    Section {
        id: "5.5",
        title: "Extensible Admission Control",
    },
    Section {
        id: "5.7",
        title: "General Policies",
    },
];

/// Section part of a control id (`4.2.1` → `4.2`).
pub fn section_of(id: &str) -> &str {
    match id.match_indices('.').nth(1) {
        Some((pos, _)) => &id[..pos],
        None => id,
    }
}

/// Title of section `id`, if known.
pub fn section_title(id: &str) -> Option<&'static str> {
    SECTIONS.iter().find(|s| s.id == id).map(|s| s.title)
}

/// Rejected catalog construction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    /// Identifier is not a dotted list of numbers.
    #[error("control id {id:?} is not a dotted number")]
    InvalidId {
        /// Offending id.
        id: String,
    },
    /// Identifier appears twice.
    #[error("control {id} is declared twice")]
    Duplicate {
        /// Offending id.
        id: String,
    },
    /// Identifier sorts before its predecessor.
    #[error("control {id} is declared after {previous}")]
    OutOfOrder {
        /// Offending id.
        id: String,
        /// Id declared just before it.
        previous: String,
    },
    /// Automated control without probes.
    #[error("automated control {id} has an empty evidence plan")]
    EmptyPlan {
        /// Offending id.
        id: String,
    },
}

/// Ordered, validated list of controls.
#[derive(Debug, Clone)]
pub struct Catalog {
    controls: Vec<Control>,
}

impl Catalog {
    /// Validate and wrap `controls`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] for malformed or duplicate ids, ids out of
    /// dotted-numeric order, or automated controls with no probes.
    pub fn new(controls: Vec<Control>) -> Result<Self, CatalogError> {
        let mut previous: Option<(&str, Vec<u32>)> = None;
        for control in &controls {
            let key = parse_id(control.id).ok_or_else(|| CatalogError::InvalidId {
                id: control.id.to_owned(),
            })?;
            if let Some((prev_id, prev_key)) = &previous {
                match key.cmp(prev_key) {
                    Ordering::Equal => {
                        return Err(CatalogError::Duplicate {
                            id: control.id.to_owned(),
                        })
                    }
                    Ordering::Less => {
                        return Err(CatalogError::OutOfOrder {
                            id: control.id.to_owned(),
                            previous: (*prev_id).to_owned(),
                        })
                    }
                    Ordering::Greater => {}
                }
            }
            if let ControlKind::Automated { plan, .. } = &control.kind {
                if plan.is_empty() {
                    return Err(CatalogError::EmptyPlan {
                        id: control.id.to_owned(),
                    });
                }
            }
            previous = Some((control.id, key));
        }
        Ok(Self { controls })
    }

    /// The built-in benchmark catalog.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the built-in data is inconsistent.
    pub fn cis_v1_9() -> Result<Self, CatalogError> {
        let mut controls = worker_node::controls();
        controls.extend(policies::controls());
        Self::new(controls)
    }

    /// Keep only the controls of `chapter` (e.g. `"4"`).
    #[must_use]
    pub fn only_chapter(mut self, chapter: &str) -> Self {
        self.controls.retain(|c| c.chapter() == chapter);
        self
    }

    /// Controls in report order.
    pub fn controls(&self) -> &[Control] {
        &self.controls
    }

    /// Look up a control by id.
    pub fn get(&self, id: &str) -> Option<&Control> {
        self.controls.iter().find(|c| c.id == id)
    }

    /// Catalog position of `id`.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.controls.iter().position(|c| c.id == id)
    }

    /// Number of controls.
    pub fn len(&self) -> usize {
        self.controls.len()
    }

    /// `true` when no control is left (for example after a chapter filter).
    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }
}

/// `4.2.10` → `[4, 2, 10]`.
fn parse_id(id: &str) -> Option<Vec<u32>> {
    id.split('.').map(|part| part.parse().ok()).collect()
}
