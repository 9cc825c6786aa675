use std::path::Path;

use anyhow::Context;
use tracing::info;

use aihub_core::repo::ManifestRepo;
use aihub_core::runner::{require_tools, SystemRunner};
use aihub_core::subscribe;

pub fn run(operator: &str, subscription_file: Option<&Path>) -> anyhow::Result<()> {
    require_tools(&["git", "kubectl"])?;
    let runner = SystemRunner;
    let repo = ManifestRepo::clone(&runner).context("failed to clone the manifest repository")?;
    subscribe::install_operator(&runner, &repo, operator, subscription_file)?;
    info!("Done.");
    Ok(())
}
