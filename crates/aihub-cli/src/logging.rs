//! Per-invocation logging setup.
//!
//! The subscriber is built once in `main` from the parsed CLI: a stdout
//! writer always, plus an optional per-operator file sink for the commands
//! that take a log path. No logger state is mutated after init.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub struct LogConfig<'a> {
    pub level: tracing::Level,
    /// Directory the per-operator log file lands in, when one applies.
    pub file: Option<&'a Path>,
}

/// Path of the log file written for one operator under `dir`.
pub fn operator_log_path(dir: &Path, operator: &str) -> std::path::PathBuf {
    dir.join(format!("aihub-{operator}.log"))
}

pub fn init(config: &LogConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(config.level.into());
    let stdout_layer = fmt::layer().with_target(false);
    let file_layer = match config.file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false)
                    .with_target(false),
            )
        }
        None => None,
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_log_path_uses_the_fixed_pattern() {
        let path = operator_log_path(Path::new("/var/log"), "jupyterlab");
        assert_eq!(path, Path::new("/var/log/aihub-jupyterlab.log"));
    }
}
