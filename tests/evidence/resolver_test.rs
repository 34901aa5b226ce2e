//! Resolving catalog controls against fixture node state.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use kubeguard::catalog::Catalog;
use kubeguard::config::AuditConfig;
use kubeguard::evidence::cluster::ClusterClient;
use kubeguard::evidence::process_args::ProcessTable;
use kubeguard::evidence::resolver::{ResolveControl, Resolver};
use kubeguard::evidence::Inconclusive;
use kubeguard::executor::{ExecOutcome, LaunchError};
use kubeguard::types::{Verdict, VerdictKind, DEADLINE_EXCEEDED, SOURCE_UNAVAILABLE};

struct Cluster(ExecOutcome);

#[async_trait]
impl ClusterClient for Cluster {
    async fn get(&self, _kinds: &str, _guarded: bool) -> ExecOutcome {
        self.0.clone()
    }
}

fn unreachable_cluster() -> Arc<dyn ClusterClient> {
    Arc::new(Cluster(ExecOutcome::Completed {
        exit_code: Some(1),
        stdout: String::new(),
    }))
}

struct Node {
    _dir: tempfile::TempDir,
    config: AuditConfig,
}

/// A node whose kubelet config file holds `kubelet_config` (or is absent).
fn node(kubelet_config: Option<&str>) -> Node {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = AuditConfig::default();
    config.paths.kubelet_config = dir.path().join("config.yaml");
    config.paths.kubelet_service_file = dir.path().join("10-kubeadm.conf");
    if let Some(content) = kubelet_config {
        std::fs::write(&config.paths.kubelet_config, content).expect("write kubelet config");
    }
    Node { _dir: dir, config }
}

async fn verdict(
    node: &Node,
    processes: ProcessTable,
    cluster: Arc<dyn ClusterClient>,
    id: &str,
) -> Verdict {
    let catalog = Catalog::cis_v1_9().expect("catalog");
    let control = catalog.get(id).expect("control in catalog");
    let resolver = Resolver::new(node.config.clone(), processes, cluster);
    resolver.resolve(control).await
}

fn ps(lines: &str) -> ProcessTable {
    ProcessTable::Captured(lines.to_owned())
}

#[tokio::test]
async fn nested_false_field_passes_anonymous_auth() {
    let node = node(Some("authentication:\n  anonymous:\n    enabled: false\n"));
    let v = verdict(&node, ps(""), unreachable_cluster(), "4.2.1").await;
    assert_eq!(v, Verdict::Pass);
}

#[tokio::test]
async fn section_without_nested_key_takes_secure_default() {
    let node = node(Some("authentication:\n  anonymous:\n"));
    let v = verdict(&node, ps(""), unreachable_cluster(), "4.2.1").await;
    assert_eq!(v, Verdict::Pass);
}

#[tokio::test]
async fn omitted_section_takes_kubelet_default() {
    let node = node(Some("authentication:\n  x509:\n    clientCAFile: /etc/kubernetes/pki/ca.crt\n"));
    let v = verdict(&node, ps(""), unreachable_cluster(), "4.2.2").await;
    assert_eq!(v, Verdict::Pass);
}

#[tokio::test]
async fn process_flag_outranks_config_file() {
    let node = node(Some("authentication:\n  anonymous:\n    enabled: true\n"));
    let running = ps("42 /usr/bin/kubelet --anonymous-auth=false --config=/var/lib/kubelet/config.yaml\n");
    let v = verdict(&node, running, unreachable_cluster(), "4.2.1").await;
    assert_eq!(v, Verdict::Pass);
}

#[tokio::test]
async fn explicit_insecure_flag_fails_immediately() {
    let node = node(Some("authentication:\n  anonymous:\n    enabled: false\n"));
    let running = ps("42 /usr/bin/kubelet --anonymous-auth=true\n");
    let v = verdict(&node, running, unreachable_cluster(), "4.2.1").await;
    assert_eq!(v.kind(), VerdictKind::Fail);
}

#[tokio::test]
async fn always_allow_in_config_fails() {
    let node = node(Some("authorization:\n  mode: AlwaysAllow\n"));
    let v = verdict(&node, ps(""), unreachable_cluster(), "4.2.2").await;
    assert_eq!(v.kind(), VerdictKind::Fail);
}

#[tokio::test]
async fn unset_flag_with_unreadable_config_is_exhausted() {
    let node = node(None);
    let running = ps("42 /usr/bin/kubelet --kubeconfig=/etc/kubernetes/kubelet.conf\n");
    let v = verdict(&node, running, unreachable_cluster(), "4.2.3").await;
    match v {
        Verdict::Fail(reason) => assert!(reason.starts_with("evidence exhausted"), "{reason}"),
        other => panic!("expected fail, got {other:?}"),
    }
}

#[tokio::test]
async fn no_sources_at_all_is_info() {
    let node = node(None);
    let v = verdict(&node, ps(""), unreachable_cluster(), "4.2.1").await;
    assert_eq!(v, Verdict::Info(SOURCE_UNAVAILABLE.to_owned()));

    let unavailable = ProcessTable::Unavailable(Inconclusive::SourceUnavailable("ps".into()));
    let v = verdict(&node, unavailable, unreachable_cluster(), "4.3.1").await;
    assert_eq!(v, Verdict::Info(SOURCE_UNAVAILABLE.to_owned()));
}

#[tokio::test]
async fn kube_proxy_default_bind_passes() {
    let node = node(None);
    let running = ps("7 /usr/local/bin/kube-proxy --config=/var/lib/kube-proxy/config.conf\n");
    let v = verdict(&node, running, unreachable_cluster(), "4.3.1").await;
    assert_eq!(v, Verdict::Pass);

    let exposed = ps("7 kube-proxy --metrics-bind-address=0.0.0.0:10249\n");
    let v = verdict(&node, exposed, unreachable_cluster(), "4.3.1").await;
    assert_eq!(v.kind(), VerdictKind::Fail);
}

#[tokio::test]
async fn missing_service_file_is_info_not_fail() {
    let node = node(None);
    let v = verdict(&node, ps(""), unreachable_cluster(), "4.1.1").await;
    assert_eq!(v, Verdict::Info(SOURCE_UNAVAILABLE.to_owned()));
}

#[tokio::test]
async fn cluster_timeout_is_informational() {
    let node = node(None);
    let v = verdict(&node, ps(""), Arc::new(Cluster(ExecOutcome::TimedOut)), "5.1.2").await;
    assert_eq!(v, Verdict::Info(DEADLINE_EXCEEDED.to_owned()));
}

#[tokio::test]
async fn missing_kubectl_is_error() {
    let node = node(None);
    let missing = Cluster(ExecOutcome::LaunchFailed(LaunchError::NotFound {
        program: "kubectl".to_owned(),
    }));
    let v = verdict(&node, ps(""), Arc::new(missing), "5.1.1").await;
    assert_eq!(v.kind(), VerdictKind::Error);
}

#[tokio::test]
async fn minimize_controls_warn_on_findings() {
    let node = node(None);
    let roles = r#"{"items":[{"kind":"ClusterRole","metadata":{"name":"everything"},
        "rules":[{"apiGroups":["*"],"resources":["*"],"verbs":["*"]}]}]}"#;
    let cluster = Arc::new(Cluster(ExecOutcome::Completed {
        exit_code: Some(0),
        stdout: roles.to_owned(),
    }));
    let v = verdict(&node, ps(""), cluster, "5.1.3").await;
    assert_eq!(v.kind(), VerdictKind::Warn);
}

#[tokio::test]
async fn default_service_account_automount_fails() {
    let node = node(None);
    let accounts = r#"{"items":[{"kind":"ServiceAccount","metadata":{"name":"default","namespace":"apps"}}]}"#;
    let cluster = Arc::new(Cluster(ExecOutcome::Completed {
        exit_code: Some(0),
        stdout: accounts.to_owned(),
    }));
    let v = verdict(&node, ps(""), cluster, "5.1.5").await;
    assert_eq!(v.kind(), VerdictKind::Fail);
}

#[tokio::test]
async fn file_permissions_are_checked_through_config_paths() {
    use std::os::unix::fs::PermissionsExt;

    let node = node(None);
    let service: PathBuf = node.config.paths.kubelet_service_file.clone();
    std::fs::write(&service, "[Service]\n").expect("write service file");
    std::fs::set_permissions(&service, std::fs::Permissions::from_mode(0o600)).expect("chmod");
    assert_eq!(
        verdict(&node, ps(""), unreachable_cluster(), "4.1.1").await,
        Verdict::Pass
    );

    std::fs::set_permissions(&service, std::fs::Permissions::from_mode(0o666)).expect("chmod");
    assert_eq!(
        verdict(&node, ps(""), unreachable_cluster(), "4.1.1").await.kind(),
        VerdictKind::Fail
    );
}
