use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AihubError {
    #[error("command `{command}` failed with exit code {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("required tool not found on PATH: {0}")]
    ToolMissing(&'static str),

    #[error("failed to clone manifest repository {url}: {detail}")]
    CloneFailed { url: String, detail: String },

    #[error("invalid operator bundle {path}: {detail}")]
    InvalidBundle { path: PathBuf, detail: String },

    #[error("malformed manifest {path}: {detail}")]
    MalformedManifest { path: PathBuf, detail: String },

    #[error("unexpected output from `{command}`: {detail}")]
    UnexpectedOutput { command: String, detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AihubError {
    /// Exit code the process should terminate with for this error.
    ///
    /// A fatal command failure carries the failing command's own exit code;
    /// everything else is a plain failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            AihubError::CommandFailed { code, .. } if *code > 0 => *code,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, AihubError>;
