//! Chapter 5: cluster policies.

use super::Control;
use crate::evidence::{ApiPredicate, EvidenceProbe, HostNamespace};

fn cluster(guarded: bool, predicate: ApiPredicate) -> Vec<EvidenceProbe> {
    vec![EvidenceProbe::ApiQuery { guarded, predicate }]
}

pub(super) fn controls() -> Vec<Control> {
    let mut controls = rbac();
    controls.extend(pod_security());
    controls.extend(manual_policies());
    controls
}

fn rbac() -> Vec<Control> {
    vec![
        Control::automated(
            "5.1.1",
            "Ensure that the cluster-admin role is only used where required",
            cluster(false, ApiPredicate::ClusterAdminBindingsRestricted),
            "Bind subjects to narrower roles and delete clusterrolebindings to \
             cluster-admin where they are not needed.",
        )
        .warn_on_shortfall(),
        Control::automated(
            "5.1.2",
            "Minimize access to secrets",
            cluster(true, ApiPredicate::SecretsAccessRestricted),
            "Remove get, list and watch access to secrets from roles where possible.",
        )
        .warn_on_shortfall(),
        Control::automated(
            "5.1.3",
            "Minimize wildcard use in Roles and ClusterRoles",
            cluster(true, ApiPredicate::NoWildcardRules),
            "Replace wildcards in roles with explicit groups, resources and verbs.",
        )
        .warn_on_shortfall(),
        Control::automated(
            "5.1.4",
            "Minimize access to create pods",
            cluster(true, ApiPredicate::PodCreateRestricted),
            "Remove create access to pods from roles where possible.",
        )
        .warn_on_shortfall(),
        Control::automated(
            "5.1.5",
            "Ensure that default service accounts are not actively used",
            cluster(false, ApiPredicate::DefaultServiceAccountsUnused),
            "Set automountServiceAccountToken: false on every default service account \
             and create explicit service accounts for workloads that need API access.",
        ),
        Control::automated(
            "5.1.6",
            "Ensure that Service Account Tokens are only mounted where necessary",
            cluster(true, ApiPredicate::TokenAutomountRestricted),
            "Set automountServiceAccountToken: false on pods that do not call the API.",
        )
        .warn_on_shortfall(),
        Control::manual(
            "5.1.7",
            "Avoid use of system:masters group",
            "Remove the system:masters group from all users in the cluster.",
        ),
        Control::manual(
            "5.1.8",
            "Limit use of the Bind, Impersonate and Escalate permissions in the Kubernetes cluster",
            "Remove the impersonate, bind and escalate rights from subjects where possible.",
        ),
        Control::manual(
            "5.1.9",
            "Minimize access to create persistent volumes",
            "Remove create access to PersistentVolume objects where possible.",
        ),
        Control::manual(
            "5.1.10",
            "Minimize access to the proxy sub-resource of nodes",
            "Remove access to the proxy sub-resource of node objects where possible.",
        ),
        Control::manual(
            "5.1.11",
            "Minimize access to the approval sub-resource of certificatesigningrequests objects",
            "Remove access to the approval sub-resource of certificatesigningrequests where possible.",
        ),
        Control::manual(
            "5.1.12",
            "Minimize access to webhook configuration objects",
            "Remove access to validating and mutating webhook configurations where possible.",
        ),
        Control::manual(
            "5.1.13",
            "Minimize access to the service account token creation",
            "Remove access to the token sub-resource of serviceaccount objects where possible.",
        ),
    ]
}

fn pod_security() -> Vec<Control> {
    vec![
        Control::manual(
            "5.2.1",
            "Ensure that the cluster has at least one active policy control mechanism in place",
            "Enforce Pod Security Admission or an external policy engine on every namespace \
             with user workloads.",
        ),
        Control::manual(
            "5.2.2",
            "Minimize the admission of privileged containers",
            "Add policies to each namespace that restrict the admission of privileged containers.",
        ),
        Control::automated(
            "5.2.3",
            "Minimize the admission of containers wishing to share the host process ID namespace",
            cluster(true, ApiPredicate::NoPodsWithHostNamespace(HostNamespace::Pid)),
            "Add policies to each namespace that restrict the admission of hostPID containers.",
        )
        .warn_on_shortfall(),
        Control::automated(
            "5.2.4",
            "Minimize the admission of containers wishing to share the host IPC namespace",
            cluster(true, ApiPredicate::NoPodsWithHostNamespace(HostNamespace::Ipc)),
            "Add policies to each namespace that restrict the admission of hostIPC containers.",
        )
        .warn_on_shortfall(),
        Control::automated(
            "5.2.5",
            "Minimize the admission of containers wishing to share the host network namespace",
            cluster(true, ApiPredicate::NoPodsWithHostNamespace(HostNamespace::Network)),
            "Add policies to each namespace that restrict the admission of hostNetwork containers.",
        )
        .warn_on_shortfall(),
        Control::automated(
            "5.2.6",
            "Minimize the admission of containers with allowPrivilegeEscalation",
            cluster(true, ApiPredicate::NoPrivilegeEscalation),
            "Add policies to each namespace that restrict the admission of containers \
             with allowPrivilegeEscalation set to true.",
        )
        .warn_on_shortfall(),
        Control::manual(
            "5.2.7",
            "Minimize the admission of root containers",
            "Require runAsNonRoot or a non-zero runAsUser in every namespace with user workloads.",
        ),
        Control::manual(
            "5.2.8",
            "Minimize the admission of containers with the NET_RAW capability",
            "Drop NET_RAW in every namespace with user workloads.",
        ),
        Control::manual(
            "5.2.9",
            "Minimize the admission of containers with added capabilities",
            "Disallow added capabilities beyond the default set.",
        ),
        Control::manual(
            "5.2.10",
            "Minimize the admission of containers with capabilities assigned",
            "Require all capabilities to be dropped where applications allow it.",
        ),
        Control::manual(
            "5.2.11",
            "Minimize the admission of Windows HostProcess Containers",
            "Restrict the admission of hostProcess containers.",
        ),
        Control::manual(
            "5.2.12",
            "Minimize the admission of HostPath volumes",
            "Restrict the admission of hostPath volumes.",
        ),
        Control::manual(
            "5.2.13",
            "Minimize the admission of containers which use HostPorts",
            "Restrict the admission of containers that use hostPort.",
        ),
    ]
}

fn manual_policies() -> Vec<Control> {
    vec![
        Control::manual(
            "5.3.1",
            "Ensure that the CNI in use supports NetworkPolicies",
            "Use a CNI plugin that enforces NetworkPolicy.",
        ),
        Control::manual(
            "5.3.2",
            "Ensure that all Namespaces have NetworkPolicies defined",
            "Create a default-deny NetworkPolicy in every namespace.",
        ),
        Control::manual(
            "5.4.1",
            "Prefer using Secrets as files over Secrets as environment variables",
            "Mount secrets as files rather than exposing them through environment variables.",
        ),
        Control::manual(
            "5.4.2",
            "Consider external secret storage",
            "Use an external secrets store for sensitive material.",
        ),
        Control::manual(
            "5.5.1",
            "Configure Image Provenance using ImagePolicyWebhook admission controller",
            "Enforce image provenance through an admission webhook.",
        ),
        Control::manual(
            "5.7.1",
            "Create administrative boundaries between resources using namespaces",
            "Separate workloads into namespaces by team and trust level.",
        ),
        Control::manual(
            "5.7.2",
            "Ensure that the seccomp profile is set to docker/default in your Pod definitions",
            "Set securityContext.seccompProfile.type: RuntimeDefault on pods.",
        ),
        Control::manual(
            "5.7.3",
            "Apply SecurityContext to your Pod Definitions",
            "Set a securityContext on every pod and container.",
        ),
        Control::manual(
            "5.7.4",
            "The default namespace should not be used",
            "Move workloads out of the default namespace.",
        ),
    ]
}
