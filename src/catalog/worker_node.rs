//! Chapter 4: worker node configuration files, kubelet and kube-proxy.

use super::Control;
use crate::config::{Binary, PathKey};
use crate::evidence::{EvidenceProbe, FieldExpectation, FileCheck, FlagExpectation, Posture};

const OWNER_MODE: FileCheck = FileCheck::Permissions { max_mode: 0o600 };
const ROOT_OWNED: FileCheck = FileCheck::Ownership {
    user: "root",
    group: "root",
};

fn file(path: PathKey, check: FileCheck) -> Vec<EvidenceProbe> {
    vec![EvidenceProbe::FileMetadata { path, check }]
}

fn kubelet_flag(flag: &'static str, expect: FlagExpectation) -> EvidenceProbe {
    EvidenceProbe::ProcessArgument {
        binary: Binary::Kubelet,
        flag,
        expect,
    }
}

fn kubelet_field(
    top_level_key: &'static str,
    nested_key: &'static str,
    expect: FieldExpectation,
    default_when_absent: Option<Posture>,
) -> EvidenceProbe {
    EvidenceProbe::ConfigField {
        file: PathKey::KubeletConfig,
        top_level_key,
        nested_key,
        expect,
        default_when_absent,
    }
}

pub(super) fn controls() -> Vec<Control> {
    let mut controls = files();
    controls.extend(kubelet());
    controls.extend(kube_proxy());
    controls
}

fn files() -> Vec<Control> {
    vec![
        Control::automated(
            "4.1.1",
            "Ensure that the kubelet service file permissions are set to 600 or more restrictive",
            file(PathKey::KubeletServiceFile, OWNER_MODE),
            "Run `chmod 600` on the kubelet service file.",
        ),
        Control::automated(
            "4.1.2",
            "Ensure that the kubelet service file ownership is set to root:root",
            file(PathKey::KubeletServiceFile, ROOT_OWNED),
            "Run `chown root:root` on the kubelet service file.",
        ),
        Control::manual(
            "4.1.3",
            "If proxy kubeconfig file exists ensure permissions are set to 600 or more restrictive",
            "Run `chmod 600` on the kube-proxy kubeconfig file.",
        )
        .auditing(PathKey::ProxyKubeconfig),
        Control::manual(
            "4.1.4",
            "If proxy kubeconfig file exists ensure ownership is set to root:root",
            "Run `chown root:root` on the kube-proxy kubeconfig file.",
        )
        .auditing(PathKey::ProxyKubeconfig),
        Control::automated(
            "4.1.5",
            "Ensure that the --kubeconfig kubelet.conf file permissions are set to 600 or more restrictive",
            file(PathKey::KubeletKubeconfig, OWNER_MODE),
            "Run `chmod 600` on the kubelet kubeconfig file.",
        ),
        Control::automated(
            "4.1.6",
            "Ensure that the --kubeconfig kubelet.conf file ownership is set to root:root",
            file(PathKey::KubeletKubeconfig, ROOT_OWNED),
            "Run `chown root:root` on the kubelet kubeconfig file.",
        ),
        Control::manual(
            "4.1.7",
            "Ensure that the certificate authorities file permissions are set to 600 or more restrictive",
            "Run `chmod 600` on the file named by --client-ca-file.",
        )
        .auditing(PathKey::CaFile),
        Control::manual(
            "4.1.8",
            "Ensure that the client certificate authorities file ownership is set to root:root",
            "Run `chown root:root` on the file named by --client-ca-file.",
        )
        .auditing(PathKey::CaFile),
        Control::automated(
            "4.1.9",
            "If the kubelet config.yaml configuration file is being used validate permissions set to 600 or more restrictive",
            file(PathKey::KubeletConfig, OWNER_MODE),
            "Run `chmod 600` on the kubelet config file.",
        ),
        Control::automated(
            "4.1.10",
            "If the kubelet config.yaml configuration file is being used validate file ownership is set to root:root",
            file(PathKey::KubeletConfig, ROOT_OWNED),
            "Run `chown root:root` on the kubelet config file.",
        ),
    ]
}

fn kubelet() -> Vec<Control> {
    vec![
        Control::automated(
            "4.2.1",
            "Ensure that the --anonymous-auth argument is set to false",
            vec![
                kubelet_flag("anonymous-auth", FlagExpectation::Equals("false")),
                kubelet_field(
                    "authentication.anonymous",
                    "enabled",
                    FieldExpectation::Equals("false"),
                    Some(Posture::Secure),
                ),
            ],
            "Set authentication.anonymous.enabled: false in the kubelet config file, \
             or pass --anonymous-auth=false, then restart the kubelet.",
        ),
        Control::automated(
            "4.2.2",
            "Ensure that the --authorization-mode argument is not set to AlwaysAllow",
            vec![
                kubelet_flag("authorization-mode", FlagExpectation::Excludes("AlwaysAllow")),
                kubelet_field(
                    "authorization",
                    "mode",
                    FieldExpectation::NotEquals("AlwaysAllow"),
                    Some(Posture::Secure),
                ),
            ],
            "Set authorization.mode: Webhook in the kubelet config file, or pass \
             --authorization-mode=Webhook, then restart the kubelet.",
        ),
        Control::automated(
            "4.2.3",
            "Ensure that the --client-ca-file argument is set as appropriate",
            vec![
                kubelet_flag("client-ca-file", FlagExpectation::Present),
                kubelet_field(
                    "authentication.x509",
                    "clientCAFile",
                    FieldExpectation::Present,
                    None,
                ),
            ],
            "Set authentication.x509.clientCAFile in the kubelet config file to the \
             client CA bundle, or pass --client-ca-file, then restart the kubelet.",
        ),
        Control::manual(
            "4.2.4",
            "Verify that the --read-only-port argument is set to 0",
            "Set readOnlyPort: 0 in the kubelet config file, or pass --read-only-port=0.",
        )
        .auditing(PathKey::KubeletConfig),
        Control::manual(
            "4.2.5",
            "Ensure that the --streaming-connection-idle-timeout argument is not set to 0",
            "Set streamingConnectionIdleTimeout to a non-zero value such as 5m.",
        )
        .auditing(PathKey::KubeletConfig),
        Control::automated(
            "4.2.6",
            "Ensure that the --make-iptables-util-chains argument is set to true",
            vec![
                kubelet_flag("make-iptables-util-chains", FlagExpectation::Equals("true")),
                kubelet_field(
                    "",
                    "makeIPTablesUtilChains",
                    FieldExpectation::Equals("true"),
                    Some(Posture::Secure),
                ),
            ],
            "Set makeIPTablesUtilChains: true in the kubelet config file, or remove \
             --make-iptables-util-chains=false, then restart the kubelet.",
        ),
        Control::manual(
            "4.2.7",
            "Ensure that the --hostname-override argument is not set",
            "Remove --hostname-override from the kubelet service file.",
        )
        .auditing(PathKey::KubeletServiceFile),
        Control::manual(
            "4.2.8",
            "Ensure that the eventRecordQPS argument is set to a level which ensures appropriate event capture",
            "Set eventRecordQPS in the kubelet config file to an appropriate level.",
        )
        .auditing(PathKey::KubeletConfig),
        Control::manual(
            "4.2.9",
            "Ensure that the --tls-cert-file and --tls-private-key-file arguments are set as appropriate",
            "Set tlsCertFile and tlsPrivateKeyFile in the kubelet config file.",
        )
        .auditing(PathKey::KubeletConfig),
        Control::automated(
            "4.2.10",
            "Ensure that the --rotate-certificates argument is not set to false",
            vec![
                kubelet_flag("rotate-certificates", FlagExpectation::Excludes("false")),
                kubelet_field(
                    "",
                    "rotateCertificates",
                    FieldExpectation::NotEquals("false"),
                    Some(Posture::Secure),
                ),
            ],
            "Remove rotateCertificates: false from the kubelet config file and \
             --rotate-certificates=false from the command line.",
        ),
        Control::manual(
            "4.2.11",
            "Verify that the RotateKubeletServerCertificate argument is set to true",
            "Set featureGates.RotateKubeletServerCertificate: true in the kubelet config file.",
        )
        .auditing(PathKey::KubeletConfig),
        Control::manual(
            "4.2.12",
            "Ensure that the Kubelet only makes use of Strong Cryptographic Ciphers",
            "Set tlsCipherSuites to a list of strong ciphers only.",
        )
        .auditing(PathKey::KubeletConfig),
        Control::manual(
            "4.2.13",
            "Ensure that a limit is set on pod PIDs",
            "Set podPidsLimit in the kubelet config file.",
        )
        .auditing(PathKey::KubeletConfig),
    ]
}

fn kube_proxy() -> Vec<Control> {
    vec![Control::automated(
        "4.3.1",
        "Ensure that the kube-proxy metrics service is bound to localhost",
        vec![
            EvidenceProbe::ProcessArgument {
                binary: Binary::KubeProxy,
                flag: "metrics-bind-address",
                expect: FlagExpectation::StartsWith("127.0.0.1"),
            },
            EvidenceProbe::DocumentedDefault {
                binary: Binary::KubeProxy,
                posture: Posture::Secure,
            },
        ],
        "Remove --metrics-bind-address or set it to 127.0.0.1:10249.",
    )]
}
