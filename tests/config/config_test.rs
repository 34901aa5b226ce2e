//! Coverage for config file parsing.

use std::path::Path;
use std::time::Duration;

use kubeguard::config::{AuditConfig, Binary, PathKey};

#[test]
fn parse_full_config() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("kubeguard.toml");
    std::fs::write(
        &path,
        r#"
[paths]
kubelet_service_file = "/etc/systemd/system/kubelet.service"
kubelet_config = "/etc/kubernetes/kubelet/config.yaml"

[binaries]
kubelet = "kubelet-wrapper"
ps = "/bin/ps"

[api]
deadline_secs = 12
grace_millis = 250
"#,
    )
    .expect("write config");

    let config = AuditConfig::load_from_file(&path).expect("parse config");
    assert_eq!(
        config.path(PathKey::KubeletServiceFile),
        Path::new("/etc/systemd/system/kubelet.service")
    );
    assert_eq!(
        config.path(PathKey::KubeletKubeconfig),
        Path::new("/etc/kubernetes/kubelet.conf"),
        "unset keys keep their defaults"
    );
    assert_eq!(config.binary(Binary::Kubelet), "kubelet-wrapper");
    assert_eq!(config.binaries.ps, "/bin/ps");
    assert_eq!(config.api.deadline(), Duration::from_secs(12));
    assert_eq!(config.api.grace(), Duration::from_millis(250));
}

#[test]
fn malformed_config_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("kubeguard.toml");
    std::fs::write(&path, "[api]\ndeadline_secs = \"thirty\"\n").expect("write config");

    let err = AuditConfig::load_from_file(&path).expect_err("wrong type must fail");
    assert!(err.to_string().contains("failed to parse config"));
}
