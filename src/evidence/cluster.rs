//! Cluster API evidence via `kubectl get <kinds> -A -o json`.
//!
//! The client boundary is a trait so tests can substitute canned outcomes
//! for a live cluster. Predicates only ever see the parsed `items` list.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::{ApiPredicate, Evidence, Inconclusive};
use crate::executor::{CommandSpec, ExecOutcome, GuardedExecutor};

/// Ceiling for queries the catalog does not mark as guarded.
pub const UNGUARDED_CEILING: Duration = Duration::from_secs(3600);

/// Offenders listed in a refutation before the rest are counted.
const MAX_LISTED: usize = 5;

/// Label carried by RBAC objects the API server bootstraps itself.
const BOOTSTRAP_LABEL: &str = "kubernetes.io/bootstrapping";

/// Source of `kubectl get` output.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// List `kinds` (comma-separated) across all namespaces as JSON.
    async fn get(&self, kinds: &str, guarded: bool) -> ExecOutcome;
}

/// [`ClusterClient`] that shells out to kubectl under the guarded executor.
#[derive(Debug, Clone)]
pub struct Kubectl {
    program: String,
    executor: GuardedExecutor,
    deadline: Duration,
}

impl Kubectl {
    /// Client running `program`, with guarded queries bounded by `deadline`.
    pub fn new(program: impl Into<String>, executor: GuardedExecutor, deadline: Duration) -> Self {
        Self {
            program: program.into(),
            executor,
            deadline,
        }
    }
}

#[async_trait]
impl ClusterClient for Kubectl {
    async fn get(&self, kinds: &str, guarded: bool) -> ExecOutcome {
        let spec = CommandSpec::new(self.program.as_str(), ["get", kinds, "-A", "-o", "json"]);
        let deadline = if guarded {
            self.deadline
        } else {
            UNGUARDED_CEILING
        };
        let execution = self.executor.run(&spec, deadline).await;
        debug!(
            command = %spec.display(),
            elapsed_ms = u64::try_from(execution.elapsed.as_millis()).unwrap_or(u64::MAX),
            "cluster query finished"
        );
        execution.outcome
    }
}

/// Resource kinds a predicate needs listed.
pub fn kinds(predicate: &ApiPredicate) -> &'static str {
    match predicate {
        ApiPredicate::ClusterAdminBindingsRestricted => "clusterrolebindings",
        ApiPredicate::SecretsAccessRestricted
        | ApiPredicate::NoWildcardRules
        | ApiPredicate::PodCreateRestricted => "roles,clusterroles",
        ApiPredicate::DefaultServiceAccountsUnused => "serviceaccounts",
        ApiPredicate::TokenAutomountRestricted
        | ApiPredicate::NoPodsWithHostNamespace(_)
        | ApiPredicate::NoPrivilegeEscalation => "pods",
    }
}

/// Run the query for `predicate` and evaluate its output.
pub async fn query(client: &dyn ClusterClient, guarded: bool, predicate: &ApiPredicate) -> Evidence {
    let kinds = kinds(predicate);
    match client.get(kinds, guarded).await {
        ExecOutcome::Completed {
            exit_code: Some(0),
            stdout,
        } => evaluate(predicate, &stdout),
        ExecOutcome::Completed { exit_code, .. } => {
            debug!(kinds, exit_code = ?exit_code, "cluster not reachable");
            Evidence::Inconclusive(Inconclusive::SourceUnavailable(format!(
                "kubectl get {kinds} exited with {exit_code:?}"
            )))
        }
        ExecOutcome::TimedOut => {
            warn!(kinds, "cluster query exceeded deadline");
            Evidence::Inconclusive(Inconclusive::TimedOut)
        }
        ExecOutcome::LaunchFailed(e) if e.is_missing_tool() => {
            Evidence::Inconclusive(Inconclusive::ToolMissing(e.to_string()))
        }
        ExecOutcome::LaunchFailed(e) => {
            Evidence::Inconclusive(Inconclusive::LaunchFailed(e.to_string()))
        }
    }
}

/// Evaluate `predicate` over `kubectl -o json` output.
///
/// Matched when no non-exempt object offends, Refuted otherwise.
/// Unparseable output is [`Inconclusive::Malformed`].
pub fn evaluate(predicate: &ApiPredicate, stdout: &str) -> Evidence {
    let doc: Value = match serde_json::from_str(stdout) {
        Ok(v) => v,
        Err(e) => {
            return Evidence::Inconclusive(Inconclusive::Malformed(format!(
                "kubectl output is not JSON: {e}"
            )))
        }
    };
    let Some(items) = doc.get("items").and_then(Value::as_array) else {
        return Evidence::Inconclusive(Inconclusive::Malformed(
            "kubectl output has no items list".to_owned(),
        ));
    };

    let offenders: Vec<String> = items
        .iter()
        .filter(|item| !is_exempt(predicate, item))
        .filter(|item| offends(predicate, item))
        .map(object_ref)
        .collect();

    if offenders.is_empty() {
        return Evidence::Matched;
    }
    let listed = offenders
        .iter()
        .take(MAX_LISTED)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");
    let reason = match offenders.len().checked_sub(MAX_LISTED) {
        Some(more) if more > 0 => format!("{}: {listed} and {more} more", finding(predicate)),
        _ => format!("{}: {listed}", finding(predicate)),
    };
    Evidence::Refuted(reason)
}

fn finding(predicate: &ApiPredicate) -> String {
    match predicate {
        ApiPredicate::ClusterAdminBindingsRestricted => {
            "cluster-admin bound outside system:masters".to_owned()
        }
        ApiPredicate::SecretsAccessRestricted => "roles grant access to secrets".to_owned(),
        ApiPredicate::NoWildcardRules => "roles use wildcards".to_owned(),
        ApiPredicate::PodCreateRestricted => "roles grant pod creation".to_owned(),
        ApiPredicate::DefaultServiceAccountsUnused => {
            "default service accounts automount tokens".to_owned()
        }
        ApiPredicate::TokenAutomountRestricted => "pods automount service account tokens".to_owned(),
        ApiPredicate::NoPodsWithHostNamespace(ns) => format!("pods set {}", ns.field()),
        ApiPredicate::NoPrivilegeEscalation => "containers allow privilege escalation".to_owned(),
    }
}

fn offends(predicate: &ApiPredicate, item: &Value) -> bool {
    match predicate {
        ApiPredicate::ClusterAdminBindingsRestricted => {
            str_at(item, &["roleRef", "name"]) == Some("cluster-admin")
                && array_at(item, &["subjects"]).iter().any(|subject| {
                    !(subject.get("kind").and_then(Value::as_str) == Some("Group")
                        && subject.get("name").and_then(Value::as_str) == Some("system:masters"))
                })
        }
        ApiPredicate::SecretsAccessRestricted => rules(item).any(|rule| {
            grants(rule, "resources", &["secrets"])
                && grants(rule, "verbs", &["get", "list", "watch"])
        }),
        ApiPredicate::NoWildcardRules => rules(item).any(|rule| {
            ["apiGroups", "resources", "verbs"]
                .iter()
                .any(|field| strings(rule, field).any(|s| s == "*"))
        }),
        ApiPredicate::PodCreateRestricted => rules(item)
            .any(|rule| grants(rule, "resources", &["pods"]) && grants(rule, "verbs", &["create"])),
        ApiPredicate::DefaultServiceAccountsUnused => {
            str_at(item, &["metadata", "name"]) == Some("default")
                && bool_at(item, &["automountServiceAccountToken"]) != Some(false)
        }
        ApiPredicate::TokenAutomountRestricted => {
            bool_at(item, &["spec", "automountServiceAccountToken"]) != Some(false)
        }
        ApiPredicate::NoPodsWithHostNamespace(ns) => {
            bool_at(item, &["spec", ns.field()]) == Some(true)
        }
        ApiPredicate::NoPrivilegeEscalation => ["containers", "initContainers"]
            .iter()
            .flat_map(|field| array_at(item, &["spec", *field]).iter())
            .any(|container| {
                bool_at(container, &["securityContext", "allowPrivilegeEscalation"]) == Some(true)
                    || bool_at(container, &["securityContext", "privileged"]) == Some(true)
            }),
    }
}

/// Objects labelled as bootstrap RBAC defaults are never judged. Pods in
/// kube-system are exempt from the pod predicates only; names are not
/// trusted since anyone with RBAC write access can pick a `system:` name.
fn is_exempt(predicate: &ApiPredicate, item: &Value) -> bool {
    let bootstrapped = item
        .pointer("/metadata/labels")
        .and_then(|labels| labels.get(BOOTSTRAP_LABEL))
        .and_then(Value::as_str)
        == Some("rbac-defaults");
    bootstrapped || (judges_pods(predicate) && in_namespace(item, "kube-system"))
}

fn judges_pods(predicate: &ApiPredicate) -> bool {
    matches!(
        predicate,
        ApiPredicate::TokenAutomountRestricted
            | ApiPredicate::NoPodsWithHostNamespace(_)
            | ApiPredicate::NoPrivilegeEscalation
    )
}

fn in_namespace(item: &Value, namespace: &str) -> bool {
    str_at(item, &["metadata", "namespace"]) == Some(namespace)
}

/// `Kind/namespace/name`, or `Kind/name` for cluster-scoped objects.
fn object_ref(item: &Value) -> String {
    let kind = str_at(item, &["kind"]).unwrap_or("Object");
    let name = str_at(item, &["metadata", "name"]).unwrap_or("<unnamed>");
    match str_at(item, &["metadata", "namespace"]) {
        Some(ns) => format!("{kind}/{ns}/{name}"),
        None => format!("{kind}/{name}"),
    }
}

fn rules(item: &Value) -> impl Iterator<Item = &Value> {
    array_at(item, &["rules"]).iter()
}

/// `true` when the rule's `field` list names any of `wanted` or `*`.
fn grants(rule: &Value, field: &str, wanted: &[&str]) -> bool {
    strings(rule, field).any(|s| s == "*" || wanted.contains(&s))
}

fn strings<'a>(value: &'a Value, field: &str) -> impl Iterator<Item = &'a str> {
    array_at(value, &[field]).iter().filter_map(Value::as_str)
}

fn walk<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, key| v.get(key))
}

fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    walk(value, path).and_then(Value::as_str)
}

fn bool_at(value: &Value, path: &[&str]) -> Option<bool> {
    walk(value, path).and_then(Value::as_bool)
}

fn array_at<'a>(value: &'a Value, path: &[&str]) -> &'a [Value] {
    walk(value, path)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}
