//! Test::Unit / minitest files run through plain `ruby`

use regex::Regex;
use std::sync::OnceLock;

use super::{CommandOptions, Framework};
use crate::models::WorkerIdentity;
use crate::results::ResultSyntax;

/// Runs `*_test.rb` files by requiring them into one ruby process
#[derive(Clone, Debug, Default)]
pub struct TestUnit {
    options: CommandOptions,
}

impl TestUnit {
    pub fn new(options: CommandOptions) -> Self {
        Self { options }
    }
}

impl ResultSyntax for TestUnit {
    fn is_result_line(&self, line: &str) -> bool {
        static RESULT: OnceLock<Regex> = OnceLock::new();
        RESULT
            .get_or_init(|| {
                Regex::new(r"^\s*\d+ tests?, \d+ assertions?, \d+ failures?, \d+ errors?")
                    .expect("valid regex")
            })
            .is_match(line)
    }

    fn families(&self) -> &[&'static str] {
        &["test"]
    }

    fn precedence(&self) -> &[&'static str] {
        &[
            "assertion",
            "failure",
            "error",
            "pending",
            "skip",
            "omission",
            "notification",
        ]
    }

    fn pluralizes(&self, _family: &str, _category: &str) -> bool {
        true
    }

    fn empty_lines(&self) -> Vec<String> {
        vec!["0 tests, 0 assertions, 0 failures, 0 errors".to_string()]
    }
}

impl Framework for TestUnit {
    fn name(&self) -> &'static str {
        "test"
    }

    fn unit_name(&self) -> &'static str {
        "test"
    }

    fn test_suffix(&self) -> &'static str {
        "_test.rb"
    }

    fn default_dir(&self) -> &'static str {
        "test"
    }

    fn build_command(&self, files: &[&str], _identity: WorkerIdentity) -> String {
        let exe = self.options.executable.as_deref().unwrap_or("ruby");
        let requires = files
            .iter()
            .map(|f| format!("%{{./{}}}", f.trim_start_matches("./")))
            .collect::<Vec<_>>()
            .join(",");
        let mut command = format!("{exe} -Itest -e '[{requires}].each {{ |f| require f }}'");
        if let Some(options) = self.options.test_options.as_deref().map(str::trim) {
            if !options.is_empty() {
                command.push_str(" -- ");
                command.push_str(options);
            }
        }
        command
    }

    fn syntax(&self) -> &dyn ResultSyntax {
        self
    }
}
