//! Scripted command runners shared across the crate's tests.

use std::cell::RefCell;
use std::collections::VecDeque;

use crate::error::Result;
use crate::repo::ManifestRepo;
use crate::runner::{Cmd, CommandResult, CommandRunner};

#[derive(Debug, Clone)]
struct Response {
    code: i32,
    stdout: String,
    stderr: String,
}

struct Rule {
    needle: String,
    responses: RefCell<VecDeque<Response>>,
    last: RefCell<Option<Response>>,
}

/// A runner that matches commands against substring rules and replies with
/// scripted results. Rules are tried in registration order; each rule's
/// responses are consumed front to back, repeating the last one when the
/// queue runs dry. Unmatched commands succeed with empty output.
pub(crate) struct MockRunner {
    calls: RefCell<Vec<String>>,
    rules: Vec<Rule>,
}

impl MockRunner {
    pub(crate) fn ok() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            rules: Vec::new(),
        }
    }

    pub(crate) fn with_rule(self, needle: &str, code: i32, stdout: &str) -> Self {
        self.push_rule(
            needle,
            vec![Response {
                code,
                stdout: stdout.to_string(),
                stderr: String::new(),
            }],
        )
    }

    pub(crate) fn with_failure(self, needle: &str, code: i32, stderr: &str) -> Self {
        self.push_rule(
            needle,
            vec![Response {
                code,
                stdout: String::new(),
                stderr: stderr.to_string(),
            }],
        )
    }

    pub(crate) fn with_responses(self, needle: &str, responses: Vec<(i32, &str)>) -> Self {
        let responses = responses
            .into_iter()
            .map(|(code, stdout)| Response {
                code,
                stdout: stdout.to_string(),
                stderr: String::new(),
            })
            .collect();
        self.push_rule(needle, responses)
    }

    fn push_rule(mut self, needle: &str, responses: Vec<Response>) -> Self {
        self.rules.push(Rule {
            needle: needle.to_string(),
            responses: RefCell::new(responses.into()),
            last: RefCell::new(None),
        });
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl CommandRunner for MockRunner {
    fn run(&self, cmd: &Cmd) -> Result<CommandResult> {
        let rendered = cmd.to_string();
        self.calls.borrow_mut().push(rendered.clone());
        for rule in &self.rules {
            if !rendered.contains(&rule.needle) {
                continue;
            }
            let response = rule
                .responses
                .borrow_mut()
                .pop_front()
                .or_else(|| rule.last.borrow().clone())
                .unwrap_or(Response {
                    code: 0,
                    stdout: String::new(),
                    stderr: String::new(),
                });
            *rule.last.borrow_mut() = Some(response.clone());
            return Ok(CommandResult {
                command: rendered,
                code: response.code,
                stdout: response.stdout,
                stderr: response.stderr,
            });
        }
        Ok(CommandResult {
            command: rendered,
            code: 0,
            stdout: String::new(),
            stderr: String::new(),
        })
    }
}

/// A runner that replies with a fixed sequence of `(code, stdout)` results
/// regardless of the command, repeating the last one when exhausted.
pub(crate) struct SequenceRunner {
    results: RefCell<VecDeque<(i32, String)>>,
    count: RefCell<u32>,
}

impl SequenceRunner {
    pub(crate) fn new<const N: usize>(results: [(i32, &str); N]) -> Self {
        Self {
            results: RefCell::new(
                results
                    .into_iter()
                    .map(|(code, out)| (code, out.to_string()))
                    .collect(),
            ),
            count: RefCell::new(0),
        }
    }

    pub(crate) fn call_count(&self) -> u32 {
        *self.count.borrow()
    }
}

impl CommandRunner for SequenceRunner {
    fn run(&self, cmd: &Cmd) -> Result<CommandResult> {
        *self.count.borrow_mut() += 1;
        let mut results = self.results.borrow_mut();
        let (code, stdout) = if results.len() > 1 {
            results.pop_front().unwrap_or((0, String::new()))
        } else {
            results.front().cloned().unwrap_or((0, String::new()))
        };
        Ok(CommandResult {
            command: cmd.to_string(),
            code,
            stdout,
            stderr: String::new(),
        })
    }
}

/// A manifest repo backed by an empty temp directory, for flow tests.
pub(crate) fn fake_repo() -> ManifestRepo {
    let tempdir = tempfile::TempDir::new().expect("tempdir");
    let repo = ManifestRepo::from_checkout(tempdir);
    std::fs::create_dir_all(repo.kaniko_dir()).expect("kaniko dir");
    repo
}
