//! RSpec

use regex::Regex;
use std::sync::OnceLock;

use super::{bundler_enabled, join_command, CommandOptions, Framework};
use crate::models::WorkerIdentity;
use crate::results::ResultSyntax;

/// `rspec` runner for `*_spec.rb` files
#[derive(Clone, Debug, Default)]
pub struct RSpec {
    options: CommandOptions,
}

impl RSpec {
    pub fn new(options: CommandOptions) -> Self {
        Self { options }
    }

    fn executable(&self) -> String {
        if let Some(exe) = &self.options.executable {
            exe.clone()
        } else if bundler_enabled() {
            "bundle exec rspec".to_string()
        } else {
            "rspec".to_string()
        }
    }
}

impl ResultSyntax for RSpec {
    fn is_result_line(&self, line: &str) -> bool {
        static RESULT: OnceLock<Regex> = OnceLock::new();
        RESULT
            .get_or_init(|| Regex::new(r"^\s*\d+ examples?, \d+ failures?").expect("valid regex"))
            .is_match(line)
    }

    fn families(&self) -> &[&'static str] {
        &["example"]
    }

    fn precedence(&self) -> &[&'static str] {
        &["failure", "pending"]
    }

    fn empty_lines(&self) -> Vec<String> {
        vec!["0 examples, 0 failures".to_string()]
    }
}

impl Framework for RSpec {
    fn name(&self) -> &'static str {
        "rspec"
    }

    fn unit_name(&self) -> &'static str {
        "spec"
    }

    fn test_suffix(&self) -> &'static str {
        "_spec.rb"
    }

    fn default_dir(&self) -> &'static str {
        "spec"
    }

    fn build_command(&self, files: &[&str], _identity: WorkerIdentity) -> String {
        let exe = self.executable();
        join_command(
            &[Some(exe.as_str()), self.options.test_options.as_deref()],
            files,
        )
    }

    fn syntax(&self) -> &dyn ResultSyntax {
        self
    }
}
