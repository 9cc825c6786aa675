use std::path::Path;

use anyhow::Context;
use tracing::info;

use aihub_core::register;
use aihub_core::repo::ManifestRepo;
use aihub_core::runner::{require_tools, SystemRunner};

pub fn run(path: &Path, operator: &str) -> anyhow::Result<()> {
    require_tools(&["git", "kubectl"])?;
    let runner = SystemRunner;
    let repo = ManifestRepo::clone(&runner).context("failed to clone the manifest repository")?;
    let registered = register::register(&runner, &repo, path, operator)?;
    info!("Registered {} as {}.", registered.operator, registered.deployment);
    info!("Done.");
    Ok(())
}
