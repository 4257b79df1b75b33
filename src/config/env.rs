//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::env;

use super::AppConfig;
use crate::utils::logger::LogLevel;

/// Environment variable prefix
const ENV_PREFIX: &str = "PARALLEL_TESTS";

/// Default process count, shared with other parallel test tools
const PROCESSORS_VAR: &str = "PARALLEL_TEST_PROCESSORS";

/// Makes the first worker's identity "1"
const FIRST_IS_ONE_VAR: &str = "PARALLEL_TEST_FIRST_IS_1";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// From PARALLEL_TEST_PROCESSORS
    pub processes: Option<usize>,
    /// From PARALLEL_TEST_FIRST_IS_1
    pub first_is_one: Option<bool>,
    /// From PARALLEL_TESTS_FRAMEWORK
    pub framework: Option<String>,
    /// From PARALLEL_TESTS_GROUP_BY
    pub group_by: Option<String>,
    /// From PARALLEL_TESTS_RUNTIME_LOG
    pub runtime_log: Option<String>,
    /// From PARALLEL_TESTS_NON_PARALLEL
    pub non_parallel: Option<bool>,
    /// From PARALLEL_TESTS_TEST_OPTIONS
    pub test_options: Option<String>,
    /// From PARALLEL_TESTS_EXECUTABLE
    pub executable: Option<String>,
    /// From PARALLEL_TESTS_LOG
    pub log_level: Option<LogLevel>,
    /// From PARALLEL_TESTS_FORMAT
    pub format: Option<String>,
    /// From PARALLEL_TESTS_CONFIG
    pub config_file: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            processes: env::var(PROCESSORS_VAR).ok().and_then(|v| v.trim().parse().ok()),
            first_is_one: env::var(FIRST_IS_ONE_VAR).ok().map(|v| parse_bool(&v)),
            framework: get_env("FRAMEWORK"),
            group_by: get_env("GROUP_BY"),
            runtime_log: get_env("RUNTIME_LOG"),
            non_parallel: get_env_bool("NON_PARALLEL"),
            test_options: get_env("TEST_OPTIONS"),
            executable: get_env("EXECUTABLE"),
            log_level: get_env("LOG").and_then(|v| LogLevel::from_str(&v)),
            format: get_env("FORMAT"),
            config_file: get_env("CONFIG"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.processes.is_some()
            || self.first_is_one.is_some()
            || self.framework.is_some()
            || self.group_by.is_some()
            || self.runtime_log.is_some()
            || self.non_parallel.is_some()
            || self.test_options.is_some()
            || self.executable.is_some()
            || self.log_level.is_some()
            || self.format.is_some()
            || self.config_file.is_some()
    }

    /// Override `config` with every variable that is set
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(processes) = self.processes {
            config.processes = Some(processes);
        }
        if let Some(first_is_one) = self.first_is_one {
            config.first_is_one = first_is_one;
        }
        if let Some(framework) = &self.framework {
            config.framework = framework.clone();
        }
        if let Some(group_by) = &self.group_by {
            config.group_by = group_by.clone();
        }
        if let Some(runtime_log) = &self.runtime_log {
            config.runtime_log = Some(runtime_log.clone());
        }
        if let Some(non_parallel) = self.non_parallel {
            config.non_parallel = non_parallel;
        }
        if let Some(test_options) = &self.test_options {
            config.test_options = Some(test_options.clone());
        }
        if let Some(executable) = &self.executable {
            config.executable = Some(executable.clone());
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(format) = &self.format {
            config.format = format.clone();
        }
    }

    /// Print current environment configuration
    pub fn print_summary(&self) {
        println!("Environment Configuration:");
        println!("  {PROCESSORS_VAR}:      {:?}", self.processes);
        println!("  {FIRST_IS_ONE_VAR}:      {:?}", self.first_is_one);
        println!("  {ENV_PREFIX}_FRAMEWORK:     {:?}", self.framework);
        println!("  {ENV_PREFIX}_GROUP_BY:      {:?}", self.group_by);
        println!("  {ENV_PREFIX}_RUNTIME_LOG:   {:?}", self.runtime_log);
        println!("  {ENV_PREFIX}_NON_PARALLEL:  {:?}", self.non_parallel);
        println!("  {ENV_PREFIX}_TEST_OPTIONS:  {:?}", self.test_options);
        println!("  {ENV_PREFIX}_EXECUTABLE:    {:?}", self.executable);
        println!("  {ENV_PREFIX}_LOG:           {:?}", self.log_level);
        println!("  {ENV_PREFIX}_FORMAT:        {:?}", self.format);
        println!("  {ENV_PREFIX}_CONFIG:        {:?}", self.config_file);
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| parse_bool(&v))
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on" | "enabled"
    )
}

/// Print all recognised environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {PROCESSORS_VAR}       Number of worker processes");
    println!("  {FIRST_IS_ONE_VAR}       Use TEST_ENV_NUMBER=1 for the first worker (true/false)");
    println!("  {ENV_PREFIX}_FRAMEWORK      Test framework (rspec, cucumber, test)");
    println!("  {ENV_PREFIX}_GROUP_BY       Grouping strategy (count, runtime, weight)");
    println!("  {ENV_PREFIX}_RUNTIME_LOG    Path of the runtime log");
    println!("  {ENV_PREFIX}_NON_PARALLEL   Run workers one after another (true/false)");
    println!("  {ENV_PREFIX}_TEST_OPTIONS   Extra options passed to the framework");
    println!("  {ENV_PREFIX}_EXECUTABLE     Framework executable");
    println!("  {ENV_PREFIX}_LOG            Log level (trace, debug, info, warn, error)");
    println!("  {ENV_PREFIX}_FORMAT         Output format (text, json, json-pretty)");
    println!("  {ENV_PREFIX}_CONFIG         Path to configuration file");
    println!();
    println!("Workers receive:");
    println!("  TEST_ENV_NUMBER             \"\" for the first worker, then 2, 3, ...");
    println!("  PARALLEL_TEST_GROUPS        Total number of workers");
    println!();
    println!("Example:");
    println!("  export {PROCESSORS_VAR}=8");
    println!("  parallel-tests run spec");
}
