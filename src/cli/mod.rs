//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::AppConfig;

/// Run test suites in parallel worker processes
#[derive(Parser, Debug)]
#[command(name = "parallel-tests")]
#[command(version)]
#[command(about = "Split a test suite across worker processes and merge the results")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (default: ./parallel-tests.yaml and friends)
    #[arg(short, long, global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run test files in parallel
    Run(RunArgs),

    /// Run a shell command once per worker
    Exec(ExecArgs),

    /// Show how files would be grouped without running them
    Groups(RunArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for run and groups
#[derive(ClapArgs, Debug, Default)]
pub struct RunArgs {
    /// Test files or directories (default: the framework's test directory)
    pub paths: Vec<PathBuf>,

    /// Number of worker processes
    #[arg(short = 'n', long)]
    pub processes: Option<usize>,

    /// Test framework (rspec, cucumber, test)
    #[arg(short = 't', long = "type")]
    pub framework: Option<String>,

    /// Grouping strategy (count, runtime, weight)
    #[arg(short, long)]
    pub group_by: Option<String>,

    /// Only run files matching this regular expression
    #[arg(short, long)]
    pub pattern: Option<String>,

    /// Options passed through to the test framework
    #[arg(short = 'o', long, allow_hyphen_values = true)]
    pub test_options: Option<String>,

    /// Framework executable, e.g. "bin/rspec"
    #[arg(long)]
    pub executable: Option<String>,

    /// Runtime log location
    #[arg(long)]
    pub runtime_log: Option<String>,

    /// Record runtimes even when not grouping by runtime
    #[arg(long)]
    pub record_runtime: bool,

    /// Run workers one after another
    #[arg(long)]
    pub non_parallel: bool,

    /// Use TEST_ENV_NUMBER=1 for the first worker
    #[arg(long = "first-is-1")]
    pub first_is_one: bool,

    /// Output format (text, json, json-pretty)
    #[arg(short, long)]
    pub format: Option<String>,
}

impl RunArgs {
    /// Override `config` with everything given on the command line
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(processes) = self.processes {
            config.processes = Some(processes);
        }
        if let Some(framework) = &self.framework {
            config.framework = framework.clone();
        }
        if let Some(group_by) = &self.group_by {
            config.group_by = group_by.clone();
        }
        if let Some(test_options) = &self.test_options {
            config.test_options = Some(test_options.clone());
        }
        if let Some(executable) = &self.executable {
            config.executable = Some(executable.clone());
        }
        if let Some(runtime_log) = &self.runtime_log {
            config.runtime_log = Some(runtime_log.clone());
        }
        if let Some(format) = &self.format {
            config.format = format.clone();
        }
        config.record_runtime |= self.record_runtime;
        config.non_parallel |= self.non_parallel;
        config.first_is_one |= self.first_is_one;
    }
}

/// Arguments for exec
#[derive(ClapArgs, Debug)]
pub struct ExecArgs {
    /// Number of worker processes
    #[arg(short = 'n', long)]
    pub processes: Option<usize>,

    /// Run workers one after another
    #[arg(long)]
    pub non_parallel: bool,

    /// Use TEST_ENV_NUMBER=1 for the first worker
    #[arg(long = "first-is-1")]
    pub first_is_one: bool,

    /// Command to run, e.g. `-- rake db:create`
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl ExecArgs {
    /// The command as one shell line, arguments quoted as given
    pub fn command_line(&self) -> String {
        shell_words::join(&self.command)
    }

    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(processes) = self.processes {
            config.processes = Some(processes);
        }
        config.non_parallel |= self.non_parallel;
        config.first_is_one |= self.first_is_one;
    }
}

/// Arguments for configuration management
#[derive(ClapArgs, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration
    Show {
        /// Show environment variables instead
        #[arg(long)]
        env: bool,

        /// Output format (yaml, json)
        #[arg(short, long, default_value = "yaml")]
        format: String,
    },

    /// Write an example configuration file
    Init {
        /// Where to write it
        #[arg(short, long, default_value = "parallel-tests.yaml")]
        output: String,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Check a configuration file
    Validate {
        /// File to check (default: the file that would be loaded)
        file: Option<String>,
    },

    /// List recognised environment variables
    Env,
}
