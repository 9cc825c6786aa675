use anyhow::Context;
use tracing::info;

use aihub_core::install::{self, Storage};
use aihub_core::platform;
use aihub_core::repo::ManifestRepo;
use aihub_core::runner::{require_tools, SystemRunner};

pub fn run(namespace: &str, storage: Storage, openshift: bool) -> anyhow::Result<()> {
    let mut tools = vec!["git", "kubectl", "helm"];
    if openshift {
        tools.push("oc");
    }
    require_tools(&tools)?;

    let runner = SystemRunner;
    let platform = platform::select(openshift);
    let repo = ManifestRepo::clone(&runner).context("failed to clone the manifest repository")?;
    install::install(&runner, &repo, platform.as_ref(), namespace, storage)?;
    info!("Done.");
    Ok(())
}
