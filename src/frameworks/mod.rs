//! Supported test frameworks
//!
//! Each framework knows how to build the shell command for a group of files
//! and how to read the summary lines it prints. The rest of the engine only
//! talks to the [`Framework`] trait.

mod cucumber;
mod discovery;
mod exec;
mod rspec;
mod test_unit;

pub use cucumber::Cucumber;
pub use discovery::discover;
pub use exec::Exec;
pub use rspec::RSpec;
pub use test_unit::TestUnit;

use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::models::{RunError, WorkerIdentity};
use crate::results::ResultSyntax;

/// Capabilities of one test framework
pub trait Framework: ResultSyntax {
    /// Short name, e.g. `rspec`
    fn name(&self) -> &'static str;

    /// What a test file is called in messages (`spec`, `feature`, `test`)
    fn unit_name(&self) -> &'static str;

    /// File name suffix used when discovering tests in a directory
    fn test_suffix(&self) -> &'static str;

    /// Directory searched when no paths are given
    fn default_dir(&self) -> &'static str;

    /// Shell command that runs `files` for the worker with `identity`
    fn build_command(&self, files: &[&str], identity: WorkerIdentity) -> String;

    /// Where observed runtimes are kept between runs
    fn runtime_log(&self) -> PathBuf {
        PathBuf::from(format!("tmp/parallel_runtime_{}.log", self.name()))
    }

    /// Directory the workers write failure logs into, if the framework has one
    fn failure_log_dir(&self) -> Option<PathBuf> {
        None
    }

    /// Static cost of a file for weight-based grouping; file size by default
    fn weigh(&self, path: &Path) -> Option<f64> {
        std::fs::metadata(path).ok().map(|m| m.len() as f64)
    }

    /// Set up anything the workers expect to exist before they start
    fn prepare(&self) -> io::Result<()> {
        Ok(())
    }

    fn syntax(&self) -> &dyn ResultSyntax;
}

/// Framework selection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameworkKind {
    RSpec,
    Cucumber,
    TestUnit,
}

impl FromStr for FrameworkKind {
    type Err = RunError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rspec" | "spec" => Ok(FrameworkKind::RSpec),
            "cucumber" | "features" => Ok(FrameworkKind::Cucumber),
            "test" | "test-unit" | "testunit" => Ok(FrameworkKind::TestUnit),
            _ => Err(RunError::UnknownFramework(s.to_string())),
        }
    }
}

/// Options shared by all framework commands
#[derive(Clone, Debug, Default)]
pub struct CommandOptions {
    /// Overrides the detected executable
    pub executable: Option<String>,
    /// Extra arguments passed through to the framework
    pub test_options: Option<String>,
}

impl FrameworkKind {
    pub fn build(self, options: CommandOptions) -> Box<dyn Framework> {
        match self {
            FrameworkKind::RSpec => Box::new(RSpec::new(options)),
            FrameworkKind::Cucumber => Box::new(Cucumber::new(options)),
            FrameworkKind::TestUnit => Box::new(TestUnit::new(options)),
        }
    }
}

/// True when a Gemfile in the working directory asks for `bundle exec`
fn bundler_enabled() -> bool {
    Path::new("Gemfile").is_file()
}

/// Join non-empty command parts with spaces, quoting file names
fn join_command(parts: &[Option<&str>], files: &[&str]) -> String {
    parts
        .iter()
        .flatten()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .chain(files.iter().map(|f| shell_words::quote(f).into_owned()))
        .collect::<Vec<_>>()
        .join(" ")
}
