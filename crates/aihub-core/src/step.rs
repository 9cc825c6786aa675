//! Ordered step execution.
//!
//! A flow is a fixed list of steps run strictly in order, each logged with
//! its index and the total count before execution. The first checked failure
//! aborts the whole sequence; nothing applied so far is rolled back —
//! re-running the installer is idempotent for already-applied resources.

use tracing::{debug, info};

use crate::error::Result;
use crate::poll::{poll, Condition, Schedule};
use crate::runner::{Cmd, CommandRunner};

type StepFn = Box<dyn FnOnce(&dyn CommandRunner) -> Result<()>>;

pub enum Action {
    /// Abort the sequence if the command exits non-zero.
    Checked(Cmd),
    /// Run and carry on regardless of the exit code.
    Unchecked(Cmd),
    /// Probe for the resource first; apply only when the probe fails.
    ApplyIfMissing { probe: Cmd, apply: Cmd },
    /// Poll a condition; fall through when the budget runs out.
    Wait {
        cmd: Cmd,
        condition: Condition,
        schedule: Schedule,
    },
    /// In-process work between cluster commands (manifest fetch-patch-reapply
    /// and similar).
    Call(StepFn),
}

pub struct Step {
    label: String,
    action: Action,
}

impl Step {
    pub fn new(label: impl Into<String>, action: Action) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }

    pub fn checked(label: impl Into<String>, cmd: Cmd) -> Self {
        Self::new(label, Action::Checked(cmd))
    }

    pub fn unchecked(label: impl Into<String>, cmd: Cmd) -> Self {
        Self::new(label, Action::Unchecked(cmd))
    }

    pub fn apply_if_missing(label: impl Into<String>, probe: Cmd, apply: Cmd) -> Self {
        Self::new(label, Action::ApplyIfMissing { probe, apply })
    }

    pub fn wait(
        label: impl Into<String>,
        cmd: Cmd,
        condition: Condition,
        schedule: Schedule,
    ) -> Self {
        Self::new(
            label,
            Action::Wait {
                cmd,
                condition,
                schedule,
            },
        )
    }

    pub fn call(
        label: impl Into<String>,
        f: impl FnOnce(&dyn CommandRunner) -> Result<()> + 'static,
    ) -> Self {
        Self::new(label, Action::Call(Box::new(f)))
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Execute `steps` in declared order, stopping at the first fatal failure.
pub fn run_steps(runner: &dyn CommandRunner, steps: Vec<Step>) -> Result<()> {
    let total = steps.len();
    for (index, step) in steps.into_iter().enumerate() {
        info!("### {}/{} ### {}", index + 1, total, step.label);
        match step.action {
            Action::Checked(cmd) => {
                runner.run_checked(&cmd)?;
            }
            Action::Unchecked(cmd) => {
                if let Err(err) = runner.run(&cmd) {
                    debug!("ignoring failure of `{cmd}`: {err}");
                }
            }
            Action::ApplyIfMissing { probe, apply } => {
                let exists = runner.run(&probe).map(|r| r.success()).unwrap_or(false);
                if !exists {
                    runner.run_checked(&apply)?;
                }
            }
            Action::Wait {
                cmd,
                condition,
                schedule,
            } => {
                poll(runner, &cmd, &condition, schedule);
            }
            Action::Call(f) => f(runner)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AihubError;
    use crate::testing::MockRunner;
    use std::time::Duration;

    fn apply(name: &str) -> Cmd {
        Cmd::new("kubectl").args(["apply", "-f", name])
    }

    #[test]
    fn executes_steps_in_declared_order() {
        let runner = MockRunner::ok();
        let steps = vec![
            Step::checked("first", apply("a.yaml")),
            Step::checked("second", apply("b.yaml")),
            Step::checked("third", apply("c.yaml")),
        ];
        run_steps(&runner, steps).unwrap();
        let calls = runner.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[0].contains("a.yaml"));
        assert!(calls[1].contains("b.yaml"));
        assert!(calls[2].contains("c.yaml"));
    }

    #[test]
    fn stops_at_first_fatal_failure() {
        let runner = MockRunner::ok().with_rule("b.yaml", 7, "");
        let steps = vec![
            Step::checked("first", apply("a.yaml")),
            Step::checked("second", apply("b.yaml")),
            Step::checked("third", apply("c.yaml")),
        ];
        let err = run_steps(&runner, steps).unwrap_err();
        match err {
            AihubError::CommandFailed { code, .. } => assert_eq!(code, 7),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!runner.calls().iter().any(|c| c.contains("c.yaml")));
    }

    #[test]
    fn unchecked_failure_does_not_abort() {
        let runner = MockRunner::ok().with_rule("helm", 1, "");
        let steps = vec![
            Step::unchecked("tiller", Cmd::new("helm").args(["init"])),
            Step::checked("catalog", apply("catalog.yaml")),
        ];
        run_steps(&runner, steps).unwrap();
        assert!(runner.calls().iter().any(|c| c.contains("catalog.yaml")));
    }

    #[test]
    fn guarded_apply_skips_when_probe_succeeds() {
        let runner = MockRunner::ok();
        let steps = vec![Step::apply_if_missing(
            "namespace",
            Cmd::new("kubectl").args(["get", "namespace", "operators"]),
            Cmd::new("kubectl").args(["create", "namespace", "operators"]),
        )];
        run_steps(&runner, steps).unwrap();
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].contains("get namespace"));
    }

    #[test]
    fn guarded_apply_runs_when_probe_fails() {
        let runner = MockRunner::ok().with_rule("get namespace", 1, "");
        let steps = vec![Step::apply_if_missing(
            "namespace",
            Cmd::new("kubectl").args(["get", "namespace", "operators"]),
            Cmd::new("kubectl").args(["create", "namespace", "operators"]),
        )];
        run_steps(&runner, steps).unwrap();
        assert!(runner.calls().iter().any(|c| c.contains("create namespace")));
    }

    #[test]
    fn exhausted_wait_falls_through_to_next_step() {
        let runner = MockRunner::ok().with_rule("rollout", 1, "");
        let steps = vec![
            Step::wait(
                "operator ready",
                Cmd::new("kubectl").args(["rollout", "status", "deployment/x"]),
                Condition::Succeeds,
                Schedule::new(Duration::ZERO, 3),
            ),
            Step::checked("next", apply("next.yaml")),
        ];
        run_steps(&runner, steps).unwrap();
        assert!(runner.calls().iter().any(|c| c.contains("next.yaml")));
    }

    #[test]
    fn call_error_aborts_the_sequence() {
        let runner = MockRunner::ok();
        let steps = vec![
            Step::call("patch", |_| {
                Err(AihubError::MalformedManifest {
                    path: "argo.yaml".into(),
                    detail: "missing `rules`".into(),
                })
            }),
            Step::checked("never", apply("never.yaml")),
        ];
        let err = run_steps(&runner, steps).unwrap_err();
        assert!(matches!(err, AihubError::MalformedManifest { .. }));
        assert!(runner.calls().is_empty());
    }
}
