//! Fixed-interval condition polling.
//!
//! A condition is a command plus a typed expectation over its result. Polling
//! stops as soon as the expectation holds; an exhausted budget is NOT an
//! error — control falls through and the sequence carries on. Cluster
//! readiness is best-effort by design; only checked-run failures abort a run.

use std::time::Duration;

use tracing::debug;

use crate::runner::{Cmd, CommandResult, CommandRunner};

/// Typed completion predicate over a [`CommandResult`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// The command exits with code 0.
    Succeeds,
    /// Trimmed stdout equals the literal.
    StdoutEquals(String),
    /// The number of non-empty stdout lines equals the count.
    StdoutLineCount(usize),
}

impl Condition {
    pub fn holds(&self, result: &CommandResult) -> bool {
        match self {
            Condition::Succeeds => result.success(),
            Condition::StdoutEquals(expected) => result.stdout.trim() == expected,
            Condition::StdoutLineCount(expected) => {
                let lines = result
                    .stdout
                    .lines()
                    .filter(|line| !line.trim().is_empty())
                    .count();
                lines == *expected
            }
        }
    }
}

/// Poll cadence: fixed interval, bounded attempt count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub interval: Duration,
    pub attempts: u32,
}

impl Schedule {
    pub const fn new(interval: Duration, attempts: u32) -> Self {
        Self { interval, attempts }
    }

    /// 15s x 40 — the budget for operator rollouts and catalog visibility.
    pub const fn standard() -> Self {
        Self::new(Duration::from_secs(15), 40)
    }

    /// 15s x 80 — pod readiness on slower clusters.
    pub const fn extended() -> Self {
        Self::new(Duration::from_secs(15), 80)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// The condition held on the given 1-based attempt.
    Satisfied { attempts: u32 },
    /// The attempt budget ran out without the condition holding.
    Exhausted,
}

impl PollOutcome {
    pub fn satisfied(&self) -> bool {
        matches!(self, PollOutcome::Satisfied { .. })
    }
}

/// Evaluate `condition` against `cmd` once per attempt, sleeping between
/// attempts, until it holds or the budget runs out.
pub fn poll(
    runner: &dyn CommandRunner,
    cmd: &Cmd,
    condition: &Condition,
    schedule: Schedule,
) -> PollOutcome {
    poll_with(runner, cmd, condition, schedule, std::thread::sleep)
}

/// [`poll`] with the sleep injected, so tests never block.
pub fn poll_with(
    runner: &dyn CommandRunner,
    cmd: &Cmd,
    condition: &Condition,
    schedule: Schedule,
    mut sleep: impl FnMut(Duration),
) -> PollOutcome {
    for attempt in 1..=schedule.attempts {
        // A spawn failure is a transient negative signal, same as an unmet
        // condition.
        if let Ok(result) = runner.run(cmd) {
            if condition.holds(&result) {
                return PollOutcome::Satisfied { attempts: attempt };
            }
        }
        if attempt < schedule.attempts {
            sleep(schedule.interval);
        }
    }
    debug!("poll budget exhausted for `{cmd}`, proceeding");
    PollOutcome::Exhausted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SequenceRunner;

    fn probe() -> Cmd {
        Cmd::new("kubectl").args(["get", "packagemanifest", "jupyterlab"])
    }

    #[test]
    fn satisfied_on_kth_attempt_sleeps_k_minus_one_times() {
        let runner = SequenceRunner::new([(1, ""), (1, ""), (0, "")]);
        let mut sleeps = 0;
        let outcome = poll_with(
            &runner,
            &probe(),
            &Condition::Succeeds,
            Schedule::new(Duration::from_secs(15), 40),
            |_| sleeps += 1,
        );
        assert_eq!(outcome, PollOutcome::Satisfied { attempts: 3 });
        assert_eq!(runner.call_count(), 3);
        assert_eq!(sleeps, 2);
    }

    #[test]
    fn first_attempt_success_never_sleeps() {
        let runner = SequenceRunner::new([(0, "")]);
        let mut sleeps = 0;
        let outcome = poll_with(
            &runner,
            &probe(),
            &Condition::Succeeds,
            Schedule::standard(),
            |_| sleeps += 1,
        );
        assert!(outcome.satisfied());
        assert_eq!(sleeps, 0);
    }

    #[test]
    fn exhaustion_evaluates_exactly_max_attempts_and_does_not_error() {
        let runner = SequenceRunner::new([(1, "")]);
        let mut sleeps = 0;
        let outcome = poll_with(
            &runner,
            &probe(),
            &Condition::Succeeds,
            Schedule::new(Duration::from_secs(15), 5),
            |_| sleeps += 1,
        );
        assert_eq!(outcome, PollOutcome::Exhausted);
        assert_eq!(runner.call_count(), 5);
        assert_eq!(sleeps, 4);
    }

    #[test]
    fn stdout_equals_trims_before_comparing() {
        let runner = SequenceRunner::new([(0, "Running\n")]);
        let outcome = poll_with(
            &runner,
            &probe(),
            &Condition::StdoutEquals("Running".into()),
            Schedule::standard(),
            |_| {},
        );
        assert!(outcome.satisfied());
    }

    #[test]
    fn line_count_ignores_blank_lines() {
        let result = CommandResult {
            command: String::new(),
            code: 0,
            stdout: "a\n\nb\nc\n".into(),
            stderr: String::new(),
        };
        assert!(Condition::StdoutLineCount(3).holds(&result));
        assert!(!Condition::StdoutLineCount(4).holds(&result));
    }
}
