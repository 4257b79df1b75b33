//! Configuration module
//!
//! Settings come from defaults, a config file, the environment and the
//! command line, in increasing order of precedence.

mod env;
mod file;

pub use env::{print_env_help, EnvConfig};
pub use file::ConfigFile;

use serde::{Deserialize, Serialize};

use crate::frameworks::FrameworkKind;
use crate::grouping::GroupBy;
use crate::models::RunError;
use crate::output::OutputFormat;
use crate::platform;
use crate::utils::logger::LogLevel;

/// Application configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Number of worker processes; the CPU count when unset
    pub processes: Option<usize>,

    /// Test framework (rspec, cucumber, test)
    pub framework: String,

    /// Grouping strategy (count, runtime, weight)
    pub group_by: String,

    /// Runtime log location; the framework's default when unset
    pub runtime_log: Option<String>,

    /// Record observed runtimes even when not grouping by runtime
    pub record_runtime: bool,

    /// Run workers one after another
    pub non_parallel: bool,

    /// Give the first worker the identity "1" instead of ""
    pub first_is_one: bool,

    /// Extra options passed to the framework
    pub test_options: Option<String>,

    /// Framework executable, overriding detection
    pub executable: Option<String>,

    pub log_level: LogLevel,

    /// Output format (text, json, json-pretty)
    pub format: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            processes: None,
            framework: "rspec".to_string(),
            group_by: GroupBy::default().to_string(),
            runtime_log: None,
            record_runtime: false,
            non_parallel: false,
            first_is_one: false,
            test_options: None,
            executable: None,
            log_level: LogLevel::default(),
            format: OutputFormat::default().to_string(),
        }
    }
}

impl AppConfig {
    /// Configured process count, falling back to the number of CPUs
    pub fn processes(&self) -> usize {
        self.processes.unwrap_or_else(platform::processor_count)
    }

    pub fn framework_kind(&self) -> Result<FrameworkKind, RunError> {
        self.framework.parse()
    }

    pub fn grouping(&self) -> Result<GroupBy, RunError> {
        self.group_by.parse()
    }

    pub fn output_format(&self) -> Option<OutputFormat> {
        OutputFormat::from_str(&self.format)
    }

    /// Check every setting that would otherwise fail only once a run starts
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.processes == Some(0) {
            return Err(RunError::ZeroWorkers.into());
        }
        self.framework_kind()?;
        self.grouping()?;
        if self.output_format().is_none() {
            anyhow::bail!(
                "Unknown output format: {} (expected text, json or json-pretty)",
                self.format
            );
        }
        Ok(())
    }
}
