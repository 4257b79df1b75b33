//! Arbitrary commands run once per worker

use super::Framework;
use crate::models::WorkerIdentity;
use crate::results::ResultSyntax;

/// Runs the same shell command in every worker, ignoring test files.
///
/// Useful for per-worker setup such as creating one database per
/// `TEST_ENV_NUMBER`.
#[derive(Clone, Debug)]
pub struct Exec {
    command: String,
}

impl Exec {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl ResultSyntax for Exec {
    fn is_result_line(&self, _line: &str) -> bool {
        false
    }

    fn families(&self) -> &[&'static str] {
        &[]
    }

    fn precedence(&self) -> &[&'static str] {
        &[]
    }

    fn empty_lines(&self) -> Vec<String> {
        Vec::new()
    }
}

impl Framework for Exec {
    fn name(&self) -> &'static str {
        "exec"
    }

    fn unit_name(&self) -> &'static str {
        "command"
    }

    fn test_suffix(&self) -> &'static str {
        ""
    }

    fn default_dir(&self) -> &'static str {
        "."
    }

    fn build_command(&self, _files: &[&str], _identity: WorkerIdentity) -> String {
        self.command.clone()
    }

    fn syntax(&self) -> &dyn ResultSyntax {
        self
    }
}
