use aihub_core::runner::{require_tools, SystemRunner};
use aihub_core::subscribe;

pub fn run(namespace: &str) -> anyhow::Result<()> {
    require_tools(&["kubectl"])?;
    let names = subscribe::list_installed(&SystemRunner, namespace)?;
    for name in names {
        println!("{name}");
    }
    Ok(())
}
