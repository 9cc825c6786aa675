//! Builders for the kubectl/oc command lines the installer issues.

use std::path::Path;

use serde_json::Value;

use crate::error::{AihubError, Result};
use crate::runner::{Cmd, CommandRunner};

pub fn apply(tool: &str, manifest: &Path) -> Cmd {
    Cmd::new(tool)
        .args(["apply", "-f"])
        .arg(manifest.display().to_string())
}

pub fn apply_in(tool: &str, manifest: &Path, namespace: &str) -> Cmd {
    apply(tool, manifest).args(["-n", namespace])
}

pub fn get(tool: &str, kind: &str, name: &str) -> Cmd {
    Cmd::new(tool).args(["get", kind, name])
}

pub fn get_in(tool: &str, kind: &str, name: &str, namespace: &str) -> Cmd {
    get(tool, kind, name).args(["-n", namespace])
}

pub fn rollout_status(deployment: &str, namespace: &str) -> Cmd {
    Cmd::new("kubectl")
        .args(["rollout", "status"])
        .arg(format!("deployment/{deployment}"))
        .args(["-n", namespace])
}

/// Phase of the single pod selected by a label, e.g. `app=argo-ui`.
pub fn pod_phase_by_label(tool: &str, selector: &str) -> Cmd {
    Cmd::new(tool)
        .args(["get", "pods", "-l", selector])
        .args(["-o", "jsonpath={.items[0].status.phase}"])
}

/// Phase of a pod addressed by name.
pub fn pod_phase_of(tool: &str, pod: &str) -> Cmd {
    Cmd::new(tool)
        .args(["get", "pod", pod])
        .args(["-o", "jsonpath={.status.phase}"])
}

/// The cluster's server version, with any build-metadata suffix stripped
/// (`v1.16.2+abc` reports as `v1.16.2`).
pub fn server_version(runner: &dyn CommandRunner) -> Result<String> {
    let result = runner.run_checked(&Cmd::new("kubectl").args(["version", "-o", "json"]))?;
    let parsed: Value = serde_json::from_str(&result.stdout)?;
    let git_version = parsed
        .pointer("/serverVersion/gitVersion")
        .and_then(Value::as_str)
        .ok_or_else(|| AihubError::UnexpectedOutput {
            command: result.command.clone(),
            detail: "missing serverVersion.gitVersion".to_string(),
        })?;
    Ok(git_version
        .split('+')
        .next()
        .unwrap_or(git_version)
        .to_string())
}
