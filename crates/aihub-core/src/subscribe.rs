//! Operator subscriptions: the `install-operator` flow, packagemanifest
//! lookups, and the listing behind `check-installed`.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{AihubError, Result};
use crate::io;
use crate::kube;
use crate::repo::ManifestRepo;
use crate::runner::{Cmd, CommandRunner};
use crate::step::{run_steps, Step};
use crate::template;

/// ConfigMap recording the cluster's kubectl version for the operators.
pub const INSTALL_CONFIG: &str = "aihub-install-config";

/// Namespace the stack operators are subscribed into.
pub const OPERATOR_NAMESPACE: &str = "operators";

#[derive(Debug, Deserialize)]
struct PackageManifest {
    status: PackageStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageStatus {
    channels: Vec<Channel>,
    package_name: String,
    catalog_source: String,
}

#[derive(Debug, Deserialize)]
struct Channel {
    name: String,
}

/// Subscription parameters for one registered operator, as reported by its
/// package manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDetails {
    pub channel: String,
    pub package: String,
    pub source: String,
}

pub fn package_details(runner: &dyn CommandRunner, operator: &str) -> Result<PackageDetails> {
    let cmd = Cmd::new("kubectl").args(["get", "packagemanifest", operator, "-o", "yaml"]);
    let result = runner.run_checked(&cmd)?;
    let manifest: PackageManifest =
        serde_yaml::from_str(&result.stdout).map_err(|err| AihubError::UnexpectedOutput {
            command: result.command.clone(),
            detail: err.to_string(),
        })?;
    let channel = manifest
        .status
        .channels
        .first()
        .ok_or_else(|| AihubError::UnexpectedOutput {
            command: result.command.clone(),
            detail: "package manifest declares no channels".to_string(),
        })?;
    Ok(PackageDetails {
        channel: channel.name.clone(),
        package: manifest.status.package_name,
        source: manifest.status.catalog_source,
    })
}

/// Render the subscription template for `operator` into the subscription
/// directory and return the rendered path.
pub fn render_subscription(
    subscription_dir: &Path,
    operator: &str,
    details: &PackageDetails,
) -> Result<PathBuf> {
    let template = std::fs::read_to_string(subscription_dir.join("template.yaml"))?;
    let rendered = template::render(
        &template,
        &[
            ("OPERATOR", operator),
            ("CHANNEL", &details.channel),
            ("PACKAGE", &details.package),
            ("SOURCE", &details.source),
        ],
    );
    let path = subscription_dir.join(format!("{operator}.yaml"));
    io::atomic_write(&path, rendered.as_bytes())?;
    Ok(path)
}

/// Guarded step recording the cluster's kubectl version in a ConfigMap the
/// operators read at install time.
pub fn install_config_step() -> Step {
    Step::call("Record the cluster version for the operators", |runner| {
        let probe = kube::get_in("kubectl", "configmap", INSTALL_CONFIG, OPERATOR_NAMESPACE);
        if runner.run(&probe).map(|r| r.success()).unwrap_or(false) {
            return Ok(());
        }
        let version = kube::server_version(runner)?;
        runner.run_checked(
            &Cmd::new("kubectl")
                .args(["create", "configmap", INSTALL_CONFIG])
                .arg(format!("--from-literal=KUBECTL_VERSION={version}"))
                .args(["-n", OPERATOR_NAMESPACE]),
        )?;
        Ok(())
    })
}

/// Install one registered operator, generating its subscription manifest
/// from the repo template unless one was supplied.
pub fn install_operator(
    runner: &dyn CommandRunner,
    repo: &ManifestRepo,
    operator: &str,
    subscription_file: Option<&Path>,
) -> Result<String> {
    let subscription = match subscription_file {
        Some(path) => path.to_path_buf(),
        None => repo.subscription_dir().join(format!("{operator}.yaml")),
    };

    let mut steps = Vec::new();
    steps.push(Step::checked(
        "Check the operator is registered",
        kube::get("kubectl", "packagemanifest", operator),
    ));
    if subscription_file.is_none() {
        let dir = repo.subscription_dir();
        let operator = operator.to_string();
        steps.push(Step::call("Render the subscription manifest", move |runner| {
            let details = package_details(runner, &operator)?;
            render_subscription(&dir, &operator, &details)?;
            Ok(())
        }));
    }
    steps.push(install_config_step());
    steps.push(Step::checked(
        "Install the operator",
        kube::apply("kubectl", &subscription),
    ));

    run_steps(runner, steps)?;
    Ok(operator.to_string())
}

/// Names of the ClusterServiceVersions installed in `namespace`.
pub fn list_installed(runner: &dyn CommandRunner, namespace: &str) -> Result<Vec<String>> {
    let result = runner.run_checked(
        &Cmd::new("kubectl")
            .args(["get", "clusterserviceversion", "-n", namespace])
            .args(["-o", "custom-columns=NAME:.metadata.name", "--no-headers"]),
    )?;
    Ok(result
        .stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}
