//! Operator registration: pack a local bundle into a cluster-built catalog
//! image and publish it as a catalog source.

use std::path::Path;

use tracing::info;

use crate::bundle::{self, OperatorBundle};
use crate::error::Result;
use crate::kube;
use crate::poll::{Condition, Schedule};
use crate::repo::ManifestRepo;
use crate::runner::{Cmd, CommandRunner};
use crate::step::{run_steps, Step};
use crate::template;

/// Registry organization the catalog images are tagged into.
const CATALOG_IMAGE_ORG: &str = "docker.io/aihubops";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredOperator {
    pub operator: String,
    /// Deployment name declared by the bundle's ClusterServiceVersion; this
    /// is the name the package manifest appears under.
    pub deployment: String,
}

/// Register the operator bundle at `<bundle_dir>/<operator>.tgz`.
///
/// The bundle is unpacked and validated before any cluster command runs, so
/// an invalid bundle never mutates the cluster.
pub fn register(
    runner: &dyn CommandRunner,
    repo: &ManifestRepo,
    bundle_dir: &Path,
    operator: &str,
) -> Result<RegisteredOperator> {
    let kaniko_dir = repo.kaniko_dir();
    let operator_dir = kaniko_dir.join("operators").join(operator);
    let archive = bundle_dir.join(format!("{operator}.tgz"));

    info!("Unpack the operator bundle...");
    let bundle = OperatorBundle::unpack(&archive, &operator_dir)?;
    let deployment = bundle.deployment_name()?;

    info!("Create the catalog build context...");
    let context = repo.base().join("kaniko.tgz");
    bundle::pack_build_context(&kaniko_dir, &context)?;

    let image = format!("{CATALOG_IMAGE_ORG}/{operator}-catalog:v0.0.1");
    let pod = format!("kaniko-{operator}");
    let kaniko_manifest = kaniko_dir.join("kaniko.yaml");
    let catalog_manifest = kaniko_dir.join("catalogsource.yaml");

    let mut steps = Vec::new();
    steps.push(Step::apply_if_missing(
        "Create the docker build config",
        kube::get("kubectl", "configmap", "docker-config"),
        Cmd::new("kubectl")
            .args(["create", "configmap", "docker-config"])
            .arg(format!("--from-file={}/config.json", kaniko_dir.display())),
    ));
    steps.push(Step::call("Create the kaniko build pod", {
        let manifest = kaniko_manifest.clone();
        let image = image.clone();
        let operator = operator.to_string();
        move |runner| {
            template::render_file(
                &manifest,
                &[("IMAGETAG", image.as_str()), ("OPERATOR", &operator)],
            )?;
            runner.run_checked(&kube::apply("kubectl", &manifest))?;
            Ok(())
        }
    }));
    steps.push(Step::wait(
        "Wait for the kaniko pod to start",
        kube::pod_phase_of("kubectl", &pod),
        Condition::StdoutEquals("Running".to_string()),
        Schedule::standard(),
    ));
    steps.push(Step::unchecked(
        "Copy the build context into the pod",
        Cmd::new("kubectl")
            .arg("cp")
            .arg(context.display().to_string())
            .arg(format!("{pod}:/tmp/context.tar.gz"))
            .args(["-c", "kaniko-init"]),
    ));
    steps.push(Step::unchecked(
        "Unpack the build context",
        Cmd::new("kubectl")
            .args(["exec", pod.as_str(), "-c", "kaniko-init", "--"])
            .args(["tar", "-zxf", "/tmp/context.tar.gz", "-C", "/kaniko/build-context"]),
    ));
    steps.push(Step::unchecked(
        "Signal the build context is complete",
        Cmd::new("kubectl")
            .args(["exec", pod.as_str(), "-c", "kaniko-init", "--"])
            .args(["touch", "/tmp/complete"]),
    ));
    steps.push(Step::wait(
        "Wait for the catalog image to build",
        kube::pod_phase_of("kubectl", &pod),
        Condition::StdoutEquals("Succeeded".to_string()),
        Schedule::standard(),
    ));
    steps.push(Step::unchecked(
        "Delete the kaniko pod",
        Cmd::new("kubectl")
            .args(["delete", "-f"])
            .arg(kaniko_manifest.display().to_string()),
    ));
    steps.push(Step::call("Deploy the catalog source", {
        let manifest = catalog_manifest.clone();
        let operator = operator.to_string();
        move |runner| {
            template::render_file(
                &manifest,
                &[("REPLACE_OPERATOR", operator.as_str()), ("REPLACE_IMAGE", &image)],
            )?;
            runner.run_checked(&kube::apply("kubectl", &manifest))?;
            Ok(())
        }
    }));
    steps.push(Step::wait(
        "Wait until the operator appears in the package manifest",
        kube::get("kubectl", "packagemanifest", &deployment),
        Condition::Succeeds,
        Schedule::standard(),
    ));

    run_steps(runner, steps)?;
    Ok(RegisteredOperator {
        operator: operator.to_string(),
        deployment,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AihubError;
    use crate::testing::{fake_repo, MockRunner};
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::fs::File;
    use tar::Builder;

    const CSV: &str = "\
spec:
  install:
    spec:
      deployments:
      - name: jupyterlab-operator
";

    fn seed_kaniko(repo: &ManifestRepo) {
        let kaniko = repo.kaniko_dir();
        std::fs::create_dir_all(kaniko.join("operators")).unwrap();
        std::fs::write(kaniko.join("Dockerfile"), "FROM scratch\n").unwrap();
        std::fs::write(kaniko.join("config.json"), "{}\n").unwrap();
        std::fs::write(kaniko.join("kaniko.yaml"), "image: IMAGETAG\nname: kaniko-OPERATOR\n")
            .unwrap();
        std::fs::write(
            kaniko.join("catalogsource.yaml"),
            "name: REPLACE_OPERATOR\nimage: REPLACE_IMAGE\n",
        )
        .unwrap();
    }

    fn seed_bundle(dir: &Path, operator: &str, with_csv: bool) {
        let stage = dir.join("stage");
        std::fs::create_dir_all(&stage).unwrap();
        if with_csv {
            std::fs::write(stage.join("operator.clusterserviceversion.yaml"), CSV).unwrap();
        } else {
            std::fs::write(stage.join("other.yaml"), "kind: Other\n").unwrap();
        }
        let file = File::create(dir.join(format!("{operator}.tgz"))).unwrap();
        let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
        builder.append_dir_all("manifests", &stage).unwrap();
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn invalid_bundle_fails_before_any_cluster_mutation() {
        let repo = fake_repo();
        seed_kaniko(&repo);
        let bundles = tempfile::TempDir::new().unwrap();
        seed_bundle(bundles.path(), "jupyterlab", false);

        let runner = MockRunner::ok();
        let err = register(&runner, &repo, bundles.path(), "jupyterlab").unwrap_err();
        assert!(matches!(err, AihubError::InvalidBundle { .. }));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn registers_and_skips_the_catalog_wait_on_first_success() {
        let repo = fake_repo();
        seed_kaniko(&repo);
        let bundles = tempfile::TempDir::new().unwrap();
        seed_bundle(bundles.path(), "jupyterlab", true);

        let runner = MockRunner::ok()
            .with_responses(
                "jsonpath={.status.phase}",
                vec![(0, "Running"), (0, "Succeeded")],
            )
            .with_rule("get packagemanifest jupyterlab-operator", 0, "");

        let registered = register(&runner, &repo, bundles.path(), "jupyterlab").unwrap();
        assert_eq!(registered.deployment, "jupyterlab-operator");

        let calls = runner.calls();
        // The package manifest became visible on the first poll, so the wait
        // loop ran exactly once.
        assert_eq!(
            calls
                .iter()
                .filter(|c| c.contains("get packagemanifest jupyterlab-operator"))
                .count(),
            1
        );
        // Rendered manifests were applied.
        let kaniko_yaml =
            std::fs::read_to_string(repo.kaniko_dir().join("kaniko.yaml")).unwrap();
        assert!(kaniko_yaml.contains("docker.io/aihubops/jupyterlab-catalog:v0.0.1"));
        assert!(kaniko_yaml.contains("kaniko-jupyterlab"));
        let catalog_yaml =
            std::fs::read_to_string(repo.kaniko_dir().join("catalogsource.yaml")).unwrap();
        assert!(catalog_yaml.contains("name: jupyterlab"));
        // The build context was packed into the checkout.
        assert!(repo.base().join("kaniko.tgz").exists());
        // Steps ran in order: apply before delete before catalog apply.
        let apply_pod = calls.iter().position(|c| c.contains("apply -f") && c.contains("kaniko.yaml")).unwrap();
        let delete_pod = calls.iter().position(|c| c.contains("delete -f")).unwrap();
        let apply_catalog = calls
            .iter()
            .position(|c| c.contains("apply -f") && c.contains("catalogsource.yaml"))
            .unwrap();
        assert!(apply_pod < delete_pod && delete_pod < apply_catalog);
    }
}
