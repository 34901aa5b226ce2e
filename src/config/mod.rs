//! Audit configuration.
//!
//! Loads the on-node file locations, helper binary names and cluster query
//! deadline from `./kubeguard.toml` (or `$KUBEGUARD_CONFIG_PATH`).
//! Environment variables override file values; file values override defaults.
//!
//! Precedence: env vars > config file > defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Env var naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "KUBEGUARD_CONFIG_PATH";

/// Config file used when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_FILE: &str = "kubeguard.toml";

// ── Keys used by the control catalog ────────────────────────────

/// On-node file a probe refers to, resolved through [`PathsConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PathKey {
    /// kubelet systemd drop-in / unit file.
    KubeletServiceFile,
    /// kubeconfig the kubelet uses to reach the API server.
    KubeletKubeconfig,
    /// kubeconfig used by kube-proxy.
    ProxyKubeconfig,
    /// Client certificate authority bundle.
    CaFile,
    /// kubelet `config.yaml`.
    KubeletConfig,
}

/// Node component a probe inspects, resolved through [`BinariesConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Binary {
    /// The kubelet.
    Kubelet,
    /// kube-proxy.
    KubeProxy,
}

// ── Top-level config ────────────────────────────────────────────

/// Top-level audit configuration, passed explicitly into the runner.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// On-node file locations (`[paths]`).
    pub paths: PathsConfig,
    /// Helper and component binary names (`[binaries]`).
    pub binaries: BinariesConfig,
    /// Cluster query limits (`[api]`).
    pub api: ApiConfig,
}

impl AuditConfig {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// If the config file does not exist, defaults are used.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load using a custom env resolver (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let path = env(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        let mut config = Self::load_from_file(&path)?;
        config.apply_overrides(env);
        Ok(config)
    }

    /// Load from a TOML file only, no env overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                toml::from_str(&contents)
                    .with_context(|| format!("failed to parse config at {}", path.display()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "failed to read config at {}: {e}",
                path.display()
            )),
        }
    }

    /// Apply environment variable overrides (env > config > defaults).
    ///
    /// Takes a resolver function so tests never touch the process environment.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        // Paths.
        if let Some(v) = env("KUBELET_SERVICE_FILE") {
            self.paths.kubelet_service_file = PathBuf::from(v);
        }
        if let Some(v) = env("KUBELET_KUBECONFIG") {
            self.paths.kubelet_kubeconfig = PathBuf::from(v);
        }
        if let Some(v) = env("PROXY_KUBECONFIG") {
            self.paths.proxy_kubeconfig = PathBuf::from(v);
        }
        if let Some(v) = env("CA_FILE") {
            self.paths.ca_file = PathBuf::from(v);
        }
        if let Some(v) = env("KUBELET_CONFIG") {
            self.paths.kubelet_config = PathBuf::from(v);
        }

        // Binaries.
        if let Some(v) = env("KUBELET_BIN") {
            self.binaries.kubelet = v;
        }
        if let Some(v) = env("PROXY_BIN") {
            self.binaries.kube_proxy = v;
        }
        if let Some(v) = env("KUBECTL_BIN") {
            self.binaries.kubectl = v;
        }

        // API.
        if let Some(v) = env("KUBEGUARD_API_DEADLINE_SECS") {
            match v.parse() {
                Ok(n) => self.api.deadline_secs = n,
                Err(_) => tracing::warn!(
                    var = "KUBEGUARD_API_DEADLINE_SECS",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
    }

    /// Resolve a catalog path key to its configured location.
    pub fn path(&self, key: PathKey) -> &Path {
        match key {
            PathKey::KubeletServiceFile => &self.paths.kubelet_service_file,
            PathKey::KubeletKubeconfig => &self.paths.kubelet_kubeconfig,
            PathKey::ProxyKubeconfig => &self.paths.proxy_kubeconfig,
            PathKey::CaFile => &self.paths.ca_file,
            PathKey::KubeletConfig => &self.paths.kubelet_config,
        }
    }

    /// Resolve a catalog binary key to its configured process name.
    pub fn binary(&self, key: Binary) -> &str {
        match key {
            Binary::Kubelet => &self.binaries.kubelet,
            Binary::KubeProxy => &self.binaries.kube_proxy,
        }
    }
}

// ── Section configs ─────────────────────────────────────────────

/// On-node file locations.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// kubelet service unit / drop-in (`KUBELET_SERVICE_FILE`).
    pub kubelet_service_file: PathBuf,
    /// kubelet kubeconfig (`KUBELET_KUBECONFIG`).
    pub kubelet_kubeconfig: PathBuf,
    /// kube-proxy kubeconfig (`PROXY_KUBECONFIG`).
    pub proxy_kubeconfig: PathBuf,
    /// Client CA bundle (`CA_FILE`).
    pub ca_file: PathBuf,
    /// kubelet config file (`KUBELET_CONFIG`).
    pub kubelet_config: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            kubelet_service_file: PathBuf::from(
                "/etc/systemd/system/kubelet.service.d/10-kubeadm.conf",
            ),
            kubelet_kubeconfig: PathBuf::from("/etc/kubernetes/kubelet.conf"),
            proxy_kubeconfig: PathBuf::from("/var/lib/kube-proxy/kubeconfig.conf"),
            ca_file: PathBuf::from("/etc/kubernetes/pki/ca.crt"),
            kubelet_config: PathBuf::from("/var/lib/kubelet/config.yaml"),
        }
    }
}

/// Process and helper binary names.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BinariesConfig {
    /// kubelet process name (`KUBELET_BIN`).
    pub kubelet: String,
    /// kube-proxy process name (`PROXY_BIN`).
    pub kube_proxy: String,
    /// kubectl used for cluster queries (`KUBECTL_BIN`).
    pub kubectl: String,
    /// Process lister used for the process-table snapshot.
    pub ps: String,
}

impl Default for BinariesConfig {
    fn default() -> Self {
        Self {
            kubelet: "kubelet".to_owned(),
            kube_proxy: "kube-proxy".to_owned(),
            kubectl: "kubectl".to_owned(),
            ps: "ps".to_owned(),
        }
    }
}

/// Cluster query limits.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Wall-clock deadline for guarded cluster queries, in seconds.
    pub deadline_secs: u64,
    /// Grace between SIGTERM and SIGKILL after a deadline, in milliseconds.
    pub grace_millis: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            deadline_secs: 30,
            grace_millis: 500,
        }
    }
}

impl ApiConfig {
    /// Guarded query deadline.
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    /// Termination grace period.
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_millis)
    }
}
