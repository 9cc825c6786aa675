//! The full platform install sequence.
//!
//! Assembles the ordered step list for one run — helm tiller, OLM, the aihub
//! catalog, namespace and RBAC setup, then the four stack operators with
//! their custom resources — and hands it to the sequencer. Platform branches
//! are resolved here, at assembly time; the sequencer never sees them.

use std::path::Path;

use tracing::info;

use crate::error::Result;
use crate::io;
use crate::kube;
use crate::patch;
use crate::platform::{ClusterPlatform, PlatformKind, ADMIN_BINDING};
use crate::poll::{poll, Condition, Schedule};
use crate::repo::ManifestRepo;
use crate::runner::{Cmd, CommandRunner};
use crate::step::{run_steps, Step};
use crate::subscribe::{install_config_step, OPERATOR_NAMESPACE};
use crate::template;

/// OLM release installed when the cluster has none.
const OLM_VERSION: &str = "0.11.0";
const OLM_NAMESPACE: &str = "olm";

/// Label the aihub catalog stamps onto its package manifests.
const CATALOG_LABEL: &str = "catalog=aihub-catalog";

/// Packages published by the aihub catalog.
const CATALOG_PACKAGE_COUNT: usize = 5;

/// Storage class demoted when nfs-dynamic takes over as default.
const FILE_STORAGE_CLASS: &str = "file-bronze";

/// External address placeholder left by the hub UI deployment on clusters
/// without a load balancer.
const PUBLIC_IP_ENV: &str = "PUBLIC_IP";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
    Default,
    Nfs,
}

/// Run the whole platform install sequence against the cluster.
pub fn install(
    runner: &dyn CommandRunner,
    repo: &ManifestRepo,
    platform: &dyn ClusterPlatform,
    namespace: &str,
    storage: Storage,
) -> Result<()> {
    let openshift = platform.kind() == PlatformKind::OpenShift;
    let oc = platform.admin_tool();

    let mut steps: Vec<Step> = Vec::new();

    steps.push(Step::call("Init helm tiller", {
        let manifest = repo.requirement_dir().join("helm-tiller.yaml");
        move |runner| {
            let _ = runner.run(&kube::apply("kubectl", &manifest));
            let _ = runner.run(
                &Cmd::new("helm").args(["init", "--service-account", "tiller", "--upgrade"]),
            );
            Ok(())
        }
    }));

    steps.push(Step::call("Install OLM if not installed", {
        let patch_dir = repo.patch_dir();
        let requirement_dir = repo.requirement_dir();
        let script = repo.base().join("install.sh");
        move |runner| install_olm(runner, &patch_dir, &requirement_dir, &script)
    }));

    steps.push(Step::checked(
        "Add the aihub operators catalog",
        kube::apply(
            "kubectl",
            &repo.catalog_source_dir().join("aihub.catalogsource.yaml"),
        ),
    ));
    steps.push(Step::wait(
        "Wait for the catalog packages to publish",
        Cmd::new("kubectl").args(["get", "packagemanifest", "-l", CATALOG_LABEL, "--no-headers"]),
        Condition::StdoutLineCount(CATALOG_PACKAGE_COUNT),
        Schedule::standard(),
    ));

    steps.push(Step::apply_if_missing(
        "Create the install namespace",
        kube::get("kubectl", "namespace", namespace),
        platform.new_project(namespace),
    ));
    steps.push(Step::apply_if_missing(
        "Grant cluster admin to the default service account",
        kube::get("kubectl", "clusterrolebinding", ADMIN_BINDING),
        platform.admin_binding(namespace),
    ));
    steps.push(install_config_step());

    let scc_grants = platform.scc_grants();
    if !scc_grants.is_empty() {
        steps.push(Step::call(
            "Relax the security context constraints",
            move |runner| {
                for cmd in &scc_grants {
                    let _ = runner.run(cmd);
                }
                Ok(())
            },
        ));
    }

    // JupyterLab
    steps.push(subscribe_step(repo, "jupyterlab", "Deploy the JupyterLab operator"));
    steps.push(wait_operator_step(
        "jupyterlab",
        "Wait until the JupyterLab operator is available",
    ));
    steps.push(cr_step(repo, "jupyterlab", namespace, "Create the JupyterLab deployment"));

    if !openshift && storage == Storage::Nfs {
        steps.push(Step::wait(
            "Wait for the nfs-dynamic storage class",
            Cmd::new("kubectl").args(["get", "storageclass", "nfs-dynamic", "--no-headers"]),
            Condition::Succeeds,
            Schedule::standard(),
        ));
        steps.push(Step::unchecked(
            "Demote the previous default storage class",
            default_class_patch(FILE_STORAGE_CLASS, false),
        ));
        steps.push(Step::checked(
            "Promote nfs-dynamic to the default storage class",
            default_class_patch("nfs-dynamic", true),
        ));
    }

    // Pipelines
    steps.push(subscribe_step(repo, "pipelines", "Deploy the Pipelines operator"));
    steps.push(wait_operator_step(
        "pipelines",
        "Wait until the Pipelines operator is available",
    ));
    steps.push(cr_step(repo, "pipelines", namespace, "Create the Pipelines deployment"));

    if openshift {
        steps.push(Step::wait(
            "Wait for the Argo UI to come up",
            kube::pod_phase_by_label(oc, "app=argo-ui"),
            Condition::StdoutEquals("Running".to_string()),
            Schedule::extended(),
        ));
        steps.push(Step::call("Grant pipeline runner permissions", {
            let scc = Cmd::new(oc)
                .args(["adm", "policy", "add-scc-to-user", "anyuid"])
                .args(["-z", "pipeline-runner"]);
            let role = platform.grant_cluster_role("cluster-admin", "pipeline-runner", None);
            move |runner| {
                let _ = runner.run(&scc);
                let _ = runner.run(&role);
                Ok(())
            }
        }));
        steps.push(Step::call("Patch the Argo cluster role", {
            let path = repo.patch_dir().join("argo.yaml");
            let oc = oc.to_string();
            move |runner| {
                fetch_cluster_yaml(runner, &oc, "clusterrole", "argo", &path)?;
                patch::patch_cluster_role(&path, patch::argo_metadata(), &patch::argo_rules())?;
                let _ = runner.run(&kube::apply(&oc, &path));
                Ok(())
            }
        }));
        steps.push(Step::call("Drop the Minio subpath mount", {
            let path = repo.patch_dir().join("minio.yaml");
            let oc = oc.to_string();
            move |runner| {
                fetch_cluster_yaml(runner, &oc, "deployment", "minio", &path)?;
                template::strip_lines_containing(&path, "subPath: minio")?;
                let _ = runner.run(&kube::apply(&oc, &path));
                Ok(())
            }
        }));
    }

    // The hub UI
    steps.push(subscribe_step(repo, "aihub", "Deploy the aihub operator"));
    steps.push(wait_operator_step(
        "aihub",
        "Wait until the aihub operator is available",
    ));
    steps.push(cr_step(repo, "aihub", namespace, "Create the aihub deployment"));

    if openshift {
        steps.push(Step::wait(
            "Wait for the aihub UI to come up",
            kube::pod_phase_by_label(oc, "app=aihub-ui"),
            Condition::StdoutEquals("Running".to_string()),
            Schedule::extended(),
        ));
        steps.push(Step::call("Expose the aihub UI on the public address", {
            let path = repo.patch_dir().join("aihub-ui.yaml");
            let oc = oc.to_string();
            move |runner| {
                let public_ip = std::env::var(PUBLIC_IP_ENV).unwrap_or_default();
                fetch_cluster_yaml(runner, &oc, "deployment", "aihub-ui", &path)?;
                template::render_file(&path, &[("<none>", &public_ip)])?;
                let _ = runner.run(&kube::apply(&oc, &path));
                Ok(())
            }
        }));
    }

    // Kubeflow
    steps.push(subscribe_step(repo, "kubeflow", "Deploy the Kubeflow operator"));
    steps.push(wait_operator_step(
        "kubeflow",
        "Wait until the Kubeflow operator is available",
    ));
    if openshift {
        steps.push(Step::unchecked(
            "Grant cluster admin to the kubeflow operator",
            platform.grant_cluster_role("cluster-admin", "kubeflow-operator", Some(OPERATOR_NAMESPACE)),
        ));
    }
    steps.push(cr_step(repo, "kubeflow", namespace, "Create the Kubeflow deployment"));

    if openshift {
        steps.push(Step::wait(
            "Wait for the study job controller",
            kube::pod_phase_by_label(oc, "app=studyjob-controller"),
            Condition::StdoutEquals("Running".to_string()),
            Schedule::extended(),
        ));
        steps.push(Step::call("Patch the study job cluster role", {
            let path = repo.patch_dir().join("studyjob.yaml");
            let oc = oc.to_string();
            move |runner| {
                fetch_cluster_yaml(runner, &oc, "clusterrole", "studyjob-controller", &path)?;
                patch::patch_cluster_role(
                    &path,
                    patch::studyjob_metadata(),
                    &patch::studyjob_rules(),
                )?;
                let _ = runner.run(&kube::apply(&oc, &path));
                Ok(())
            }
        }));
    }

    run_steps(runner, steps)
}

/// Bootstrap OLM when its operator and catalog deployments are absent.
fn install_olm(
    runner: &dyn CommandRunner,
    patch_dir: &Path,
    requirement_dir: &Path,
    script: &Path,
) -> Result<()> {
    let rollout_ok = |deployment: &str| {
        runner
            .run(&kube::rollout_status(deployment, OLM_NAMESPACE))
            .map(|r| r.success())
            .unwrap_or(false)
    };
    if rollout_ok("olm-operator") && rollout_ok("catalog-operator") {
        info!("OLM already exists.");
        return Ok(());
    }

    let url = format!(
        "https://github.com/operator-framework/operator-lifecycle-manager/releases/download/{OLM_VERSION}/install.sh"
    );
    runner.run_checked(
        &Cmd::new("curl")
            .args(["-sSL", "-o"])
            .arg(script.display().to_string())
            .arg(url),
    )?;
    runner.run_checked(
        &Cmd::new("bash")
            .arg(script.display().to_string())
            .arg(OLM_VERSION),
    )?;
    poll(
        runner,
        &kube::rollout_status("olm-operator", OLM_NAMESPACE),
        &Condition::Succeeds,
        Schedule::standard(),
    );
    poll(
        runner,
        &kube::rollout_status("catalog-operator", OLM_NAMESPACE),
        &Condition::Succeeds,
        Schedule::standard(),
    );

    // TODO: drop the memory caps once OLM's growth under many subscriptions
    // is resolved upstream.
    for (deployment, file) in [
        ("olm-operator", "olm-patch.yaml"),
        ("catalog-operator", "catalog-patch.yaml"),
    ] {
        let patch = std::fs::read_to_string(patch_dir.join(file))?;
        runner.run_checked(
            &Cmd::new("kubectl")
                .args(["patch", "deployment", deployment, "--patch"])
                .arg(patch)
                .args(["-n", OLM_NAMESPACE]),
        )?;
    }

    let _ = runner.run(&kube::apply("kubectl", &requirement_dir.join("olm-console.yaml")));
    Ok(())
}

fn subscribe_step(repo: &ManifestRepo, operator: &str, label: &str) -> Step {
    Step::checked(label, kube::apply("kubectl", &repo.subscription_manifest(operator)))
}

fn wait_operator_step(operator: &str, label: &str) -> Step {
    Step::wait(
        label,
        kube::rollout_status(&format!("{operator}-operator"), OPERATOR_NAMESPACE),
        Condition::Succeeds,
        Schedule::standard(),
    )
}

fn cr_step(repo: &ManifestRepo, operator: &str, namespace: &str, label: &str) -> Step {
    Step::checked(label, kube::apply_in("kubectl", &repo.cr_manifest(operator), namespace))
}

fn default_class_patch(class: &str, default: bool) -> Cmd {
    Cmd::new("kubectl")
        .args(["patch", "storageclass", class, "-p"])
        .arg(format!(
            r#"{{"metadata": {{"annotations":{{"storageclass.kubernetes.io/is-default-class":"{default}"}}}}}}"#
        ))
}

/// Fetch a cluster resource as YAML into `dest` for patching.
fn fetch_cluster_yaml(
    runner: &dyn CommandRunner,
    tool: &str,
    kind: &str,
    name: &str,
    dest: &Path,
) -> Result<()> {
    let result = runner.run(&Cmd::new(tool).args(["get", kind, name, "-o", "yaml"]))?;
    io::atomic_write(dest, result.stdout.as_bytes())
}
