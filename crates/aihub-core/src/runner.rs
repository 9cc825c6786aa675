//! External command execution.
//!
//! Every cluster interaction goes through [`CommandRunner`]: a structured
//! program-plus-arguments command, run synchronously with captured output.
//! Non-zero exits are not errors at this layer — the caller decides whether
//! a failure is fatal (`run_checked`) or a normal negative signal (existence
//! probes, polls).

use std::fmt;
use std::process::{Command, Stdio};

use tracing::{error, info};

use crate::error::{AihubError, Result};

/// A structured command line: program name plus argument list.
///
/// Built at call sites instead of interpolating strings, so arguments never
/// pass through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
}

impl Cmd {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arg_list(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.chars().any(char::is_whitespace) {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Outcome of a single external command execution. Immutable; used only for
/// logging and branching.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub command: String,
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// The seam between flows and the outside world. Implemented by
/// [`SystemRunner`] in production and by scripted mocks in tests.
pub trait CommandRunner {
    /// Run the command and capture its outcome. A non-zero exit is a normal
    /// `Ok`; only spawn/IO failures are `Err`.
    fn run(&self, cmd: &Cmd) -> Result<CommandResult>;

    /// Run the command and treat a non-zero exit as fatal for the whole
    /// sequence: the error carries the command line, its exit code, and the
    /// decoded stderr.
    fn run_checked(&self, cmd: &Cmd) -> Result<CommandResult> {
        let result = self.run(cmd)?;
        if !result.success() {
            error!(
                "Command {} failed with Error: {}",
                result.command,
                result.stderr.trim()
            );
            return Err(AihubError::CommandFailed {
                command: result.command.clone(),
                code: result.code,
                stderr: result.stderr,
            });
        }
        Ok(result)
    }
}

/// Runs commands as subordinate processes with piped stdout/stderr.
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &Cmd) -> Result<CommandResult> {
        let output = Command::new(cmd.program())
            .args(cmd.arg_list())
            .stdin(Stdio::null())
            .output()?;
        let result = CommandResult {
            command: cmd.to_string(),
            // -1 marks termination by signal
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        info!("Command: {}, Returncode: {}", result.command, result.code);
        Ok(result)
    }
}

/// Verify that every named tool resolves on PATH before a flow starts.
pub fn require_tools(tools: &[&'static str]) -> Result<()> {
    for tool in tools {
        if which::which(tool).is_err() {
            return Err(AihubError::ToolMissing(tool));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_program_and_args() {
        let cmd = Cmd::new("kubectl").args(["get", "namespace", "operators"]);
        assert_eq!(cmd.to_string(), "kubectl get namespace operators");
    }

    #[test]
    fn display_quotes_whitespace_args() {
        let cmd = Cmd::new("kubectl")
            .args(["patch", "deployment", "olm-operator", "--patch"])
            .arg("spec:\n  template: {}");
        assert!(cmd.to_string().contains("'spec:\n  template: {}'"));
    }

    #[cfg(unix)]
    #[test]
    fn run_captures_exit_code_and_stdout() {
        let result = SystemRunner
            .run(&Cmd::new("sh").args(["-c", "echo ready"]))
            .unwrap();
        assert!(result.success());
        assert_eq!(result.stdout.trim(), "ready");
    }

    #[cfg(unix)]
    #[test]
    fn run_does_not_error_on_nonzero_exit() {
        let result = SystemRunner
            .run(&Cmd::new("sh").args(["-c", "exit 3"]))
            .unwrap();
        assert_eq!(result.code, 3);
    }

    #[cfg(unix)]
    #[test]
    fn run_checked_carries_exit_code_and_stderr() {
        let err = SystemRunner
            .run_checked(&Cmd::new("sh").args(["-c", "echo broken >&2; exit 7"]))
            .unwrap_err();
        match err {
            AihubError::CommandFailed {
                code, ref stderr, ..
            } => {
                assert_eq!(code, 7);
                assert_eq!(stderr.trim(), "broken");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            AihubError::CommandFailed {
                command: String::new(),
                code: 7,
                stderr: String::new()
            }
            .exit_code(),
            7
        );
    }

    #[cfg(unix)]
    #[test]
    fn run_checked_passes_through_success() {
        let result = SystemRunner
            .run_checked(&Cmd::new("sh").args(["-c", "exit 0"]))
            .unwrap();
        assert!(result.success());
    }

    #[test]
    fn require_tools_reports_missing_tool() {
        let err = require_tools(&["definitely-not-a-real-tool-aihub"]).unwrap_err();
        assert!(matches!(err, AihubError::ToolMissing(_)));
    }
}
