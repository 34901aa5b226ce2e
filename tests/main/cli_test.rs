//! CLI contract tests.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use assert_cmd::Command;

/// A `kubeguard` command isolated from the host's node and cluster.
fn kubeguard(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("kubeguard").expect("binary built");
    cmd.env_clear()
        .env("PATH", std::env::var("PATH").unwrap_or_default())
        .env("KUBEGUARD_CONFIG_PATH", dir.join("kubeguard.toml"))
        .env("KUBELET_SERVICE_FILE", dir.join("10-kubeadm.conf"))
        .env("KUBELET_KUBECONFIG", dir.join("kubelet.conf"))
        .env("PROXY_KUBECONFIG", dir.join("kubeconfig.conf"))
        .env("CA_FILE", dir.join("ca.crt"))
        .env("KUBELET_CONFIG", dir.join("config.yaml"))
        .env("KUBELET_BIN", "kubeguard-test-kubelet")
        .env("PROXY_BIN", "kubeguard-test-proxy")
        .env("KUBECTL_BIN", "kubeguard-test-kubectl");
    cmd
}

fn stdout_of(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn list_prints_the_catalog() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = kubeguard(dir.path()).arg("list").output().expect("run list");
    assert!(output.status.success());
    let stdout = stdout_of(&output);
    assert!(stdout.contains("4.2.1"));
    assert!(stdout.contains("5.7.4"));
    assert!(stdout.lines().any(|l| l.starts_with("5.1.7") && l.contains("manual")));
}

#[test]
fn explain_describes_the_evidence_plan() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = kubeguard(dir.path())
        .args(["explain", "4.2.1"])
        .output()
        .expect("run explain");
    assert!(output.status.success());
    let stdout = stdout_of(&output);
    assert!(stdout.contains("--anonymous-auth"));
    assert!(stdout.contains("authentication.anonymous.enabled"));
}

#[test]
fn explain_unknown_control_is_usage_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = kubeguard(dir.path())
        .args(["explain", "9.9.9"])
        .output()
        .expect("run explain");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn absent_node_sources_are_informational() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = kubeguard(dir.path())
        .args(["audit", "--section", "4"])
        .output()
        .expect("run audit");
    let stdout = stdout_of(&output);
    assert_eq!(output.status.code(), Some(0), "{stdout}");
    assert!(stdout.contains("INFO: 4.2.1 "));
    assert!(stdout.contains("[4.2] Kubelet"));
    assert!(stdout.lines().last().is_some_and(|l| l.starts_with("== Summary:")));
    assert!(!stdout.contains("5.1.1"));
}

#[test]
fn insecure_kubelet_config_exits_nonzero() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = dir.path().join("config.yaml");
    fs::write(&config, "authorization:\n  mode: AlwaysAllow\n").expect("write config");
    fs::set_permissions(&config, fs::Permissions::from_mode(0o600)).expect("chmod");

    let output = kubeguard(dir.path())
        .args(["audit", "--section", "4"])
        .output()
        .expect("run audit");
    let stdout = stdout_of(&output);
    assert_eq!(output.status.code(), Some(1), "{stdout}");
    assert!(stdout.contains("FAIL: 4.2.2 "));
}

#[test]
fn missing_kubectl_is_reported_as_error_in_json() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = kubeguard(dir.path())
        .args(["audit", "--section", "5", "--format", "json"])
        .output()
        .expect("run audit");
    assert_eq!(output.status.code(), Some(0));
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout is one JSON document");
    assert_eq!(report["benchmark"], "CIS Kubernetes Benchmark v1.9");
    let first = &report["results"][0];
    assert_eq!(first["id"], "5.1.1");
    assert_eq!(first["verdict"], "ERROR");
}

#[test]
fn unparseable_config_file_exits_with_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("kubeguard.toml"), "[api\ndeadline_secs = ").expect("write");
    let output = kubeguard(dir.path())
        .args(["audit"])
        .output()
        .expect("run audit");
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn log_dir_receives_json_log() {
    let dir = tempfile::tempdir().expect("tempdir");
    let logs = dir.path().join("logs");
    let output = kubeguard(dir.path())
        .args(["audit", "--section", "4", "--verbose", "--log-dir"])
        .arg(&logs)
        .output()
        .expect("run audit");
    assert!(output.status.code().is_some());
    assert!(logs.is_dir());
}
