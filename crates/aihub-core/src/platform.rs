//! Cluster platform capability set.
//!
//! The install sequence differs between plain Kubernetes and OpenShift in how
//! projects are created, cluster roles are granted, and pod security is
//! relaxed. The platform is selected once at startup; the flows ask it for
//! commands instead of branching at each call site.

use crate::runner::Cmd;

/// Cluster role binding created for the install namespace's default account.
pub const ADMIN_BINDING: &str = "add-on-cluster-admin-aihub";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformKind {
    Kubernetes,
    OpenShift,
}

pub trait ClusterPlatform {
    fn kind(&self) -> PlatformKind;

    /// Tool used to fetch and reapply cluster-generated manifests.
    fn admin_tool(&self) -> &'static str;

    /// Create the target namespace/project.
    fn new_project(&self, namespace: &str) -> Cmd;

    /// Bind cluster-admin to the default service account of `namespace`, so
    /// the operators can register and install further operators.
    fn admin_binding(&self, namespace: &str) -> Cmd;

    /// Grant a cluster role to a service account.
    fn grant_cluster_role(&self, role: &str, account: &str, namespace: Option<&str>) -> Cmd;

    /// Pod security grants required before the stack starts. SCCs are an
    /// OpenShift mechanism; plain Kubernetes has nothing to grant.
    fn scc_grants(&self) -> Vec<Cmd> {
        Vec::new()
    }
}

pub struct Kubernetes;

impl ClusterPlatform for Kubernetes {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Kubernetes
    }

    fn admin_tool(&self) -> &'static str {
        "kubectl"
    }

    fn new_project(&self, namespace: &str) -> Cmd {
        Cmd::new("kubectl").args(["create", "namespace", namespace])
    }

    fn admin_binding(&self, namespace: &str) -> Cmd {
        Cmd::new("kubectl")
            .args(["create", "clusterrolebinding", ADMIN_BINDING])
            .arg("--clusterrole=cluster-admin")
            .arg(format!("--serviceaccount={namespace}:default"))
    }

    fn grant_cluster_role(&self, role: &str, account: &str, namespace: Option<&str>) -> Cmd {
        let namespace = namespace.unwrap_or("default");
        Cmd::new("kubectl")
            .args(["create", "clusterrolebinding"])
            .arg(format!("aihub-{account}-{role}"))
            .arg(format!("--clusterrole={role}"))
            .arg(format!("--serviceaccount={namespace}:{account}"))
    }
}

pub struct OpenShift;

impl ClusterPlatform for OpenShift {
    fn kind(&self) -> PlatformKind {
        PlatformKind::OpenShift
    }

    fn admin_tool(&self) -> &'static str {
        "oc"
    }

    fn new_project(&self, namespace: &str) -> Cmd {
        Cmd::new("oc").args(["new-project", namespace])
    }

    fn admin_binding(&self, _namespace: &str) -> Cmd {
        Cmd::new("oc").args([
            "adm",
            "policy",
            "add-cluster-role-to-user",
            "cluster-admin",
            "-z",
            "default",
        ])
    }

    fn grant_cluster_role(&self, role: &str, account: &str, namespace: Option<&str>) -> Cmd {
        let mut cmd = Cmd::new("oc")
            .args(["adm", "policy", "add-cluster-role-to-user", role])
            .args(["-z", account]);
        if let Some(namespace) = namespace {
            cmd = cmd.args(["-n", namespace]);
        }
        cmd
    }

    fn scc_grants(&self) -> Vec<Cmd> {
        let user = |scc: &str, account: &str| {
            Cmd::new("oc")
                .args(["adm", "policy", "add-scc-to-user", scc])
                .args(["-z", account])
        };
        let group = |scc: &str, group: &str| {
            Cmd::new("oc")
                .args(["adm", "policy", "add-scc-to-group", scc])
                .arg(group)
        };
        vec![
            user("privileged", "default"),
            user("anyuid", "ambassador"),
            user("anyuid", "default"),
            group("anyuid", "system:authenticated"),
            group("privileged", "system:serviceaccounts:kubeflow"),
        ]
    }
}

/// Select the platform implementation once at startup.
pub fn select(openshift: bool) -> Box<dyn ClusterPlatform> {
    if openshift {
        Box::new(OpenShift)
    } else {
        Box::new(Kubernetes)
    }
}
