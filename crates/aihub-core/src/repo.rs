//! Temporary clone of the aihub manifest repository.
//!
//! Every flow works out of a fresh shallow clone in a temp directory. The
//! directory is owned by the run and removed when the repo is dropped; a
//! killed process leaks it, which is accepted.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::{AihubError, Result};
use crate::runner::{Cmd, CommandRunner};

pub const DEFAULT_REPO_URL: &str = "https://github.com/aihub-project/manifests.git";

/// Environment override for the manifest repository URL.
pub const REPO_URL_ENV: &str = "AIHUB_MANIFEST_REPO";

#[derive(Debug)]
pub struct ManifestRepo {
    // held for its Drop
    _tempdir: TempDir,
    base: PathBuf,
}

impl ManifestRepo {
    /// Shallow-clone the manifest repository into a fresh temp directory.
    pub fn clone(runner: &dyn CommandRunner) -> Result<Self> {
        let url =
            std::env::var(REPO_URL_ENV).unwrap_or_else(|_| DEFAULT_REPO_URL.to_string());
        Self::clone_from(runner, &url)
    }

    pub fn clone_from(runner: &dyn CommandRunner, url: &str) -> Result<Self> {
        let tempdir = TempDir::new()?;
        let base = tempdir.path().join(repo_name(url));
        let result = runner.run(
            &Cmd::new("git")
                .args(["clone", "--depth", "1", url])
                .arg(base.display().to_string()),
        )?;
        if !result.success() {
            return Err(AihubError::CloneFailed {
                url: url.to_string(),
                detail: result.stderr.trim().to_string(),
            });
        }
        Ok(Self {
            _tempdir: tempdir,
            base,
        })
    }

    /// Wrap an already-populated checkout; used by tests to fabricate repos.
    #[cfg(test)]
    pub(crate) fn from_checkout(tempdir: TempDir) -> Self {
        let base = tempdir.path().to_path_buf();
        Self {
            _tempdir: tempdir,
            base,
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Cluster prerequisites (helm tiller, OLM console).
    pub fn requirement_dir(&self) -> PathBuf {
        self.base.join("src/requirement")
    }

    pub fn catalog_source_dir(&self) -> PathBuf {
        self.base.join("src/registry/catalog_source")
    }

    pub fn subscription_dir(&self) -> PathBuf {
        self.base.join("src/registry/subscription")
    }

    pub fn cr_dir(&self) -> PathBuf {
        self.base.join("src/registry/cr_samples")
    }

    pub fn patch_dir(&self) -> PathBuf {
        self.base.join("src/patch")
    }

    pub fn kaniko_dir(&self) -> PathBuf {
        self.base.join("src/registry/kaniko")
    }

    /// Subscription manifest shipped for one of the stack operators.
    pub fn subscription_manifest(&self, operator: &str) -> PathBuf {
        self.subscription_dir().join(format!("{operator}-operator.yaml"))
    }

    /// Custom-resource sample deploying one of the stack operators.
    pub fn cr_manifest(&self, operator: &str) -> PathBuf {
        self.cr_dir()
            .join(format!("aihub_v1alpha1_{operator}_cr.yaml"))
    }
}

fn repo_name(url: &str) -> &str {
    let name = url.rsplit('/').next().unwrap_or(url);
    name.strip_suffix(".git").unwrap_or(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockRunner;

    #[test]
    fn repo_name_strips_the_git_suffix() {
        assert_eq!(repo_name("https://github.com/a/manifests.git"), "manifests");
        assert_eq!(repo_name("https://github.com/a/manifests"), "manifests");
    }

    #[test]
    fn clone_runs_a_shallow_git_clone() {
        let runner = MockRunner::ok();
        let repo = ManifestRepo::clone_from(&runner, "https://example.com/manifests.git").unwrap();
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("git clone --depth 1 https://example.com/manifests.git"));
        assert!(repo.base().ends_with("manifests"));
    }

    #[test]
    fn clone_failure_is_reported_with_stderr() {
        let runner = MockRunner::ok().with_failure("git clone", 128, "fatal: repository not found");
        let err =
            ManifestRepo::clone_from(&runner, "https://example.com/missing.git").unwrap_err();
        match err {
            AihubError::CloneFailed { detail, .. } => {
                assert!(detail.contains("repository not found"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn well_known_paths_hang_off_the_checkout() {
        let runner = MockRunner::ok();
        let repo = ManifestRepo::clone_from(&runner, "https://example.com/manifests.git").unwrap();
        assert!(repo
            .subscription_manifest("jupyterlab")
            .ends_with("src/registry/subscription/jupyterlab-operator.yaml"));
        assert!(repo
            .cr_manifest("pipelines")
            .ends_with("src/registry/cr_samples/aihub_v1alpha1_pipelines_cr.yaml"));
    }
}
