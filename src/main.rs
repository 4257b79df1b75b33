//! parallel-tests - run a test suite across worker processes
//!
//! Splits the test files of a suite into one group per worker, runs every
//! group in its own process with a distinct `TEST_ENV_NUMBER`, and merges the
//! summary lines the workers print into one report.
//!
//! ## Features
//!
//! - RSpec, Cucumber and Test::Unit suites
//! - Grouping by file count, recorded runtime or static weight
//! - Output of each worker printed as one block, in worker order
//! - Runtime log that improves grouping on the next run
//! - Arbitrary per-worker commands (`exec`)
//!
//! ## Usage
//!
//! ```bash
//! # Run the spec directory on every CPU
//! parallel-tests run spec
//!
//! # Four cucumber workers, balanced by scenario steps
//! parallel-tests run -t cucumber -n 4 --group-by steps features
//!
//! # Balance by the runtimes recorded in previous runs
//! parallel-tests run --group-by runtime
//!
//! # Create one database per worker
//! parallel-tests exec -n 4 -- rake db:create
//!
//! # Preview the groups
//! parallel-tests groups -n 3 spec/models
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use regex::Regex;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

mod cli;
mod config;
mod executor;
mod frameworks;
mod grouping;
mod models;
mod orchestrator;
mod output;
mod platform;
mod results;
mod runtime_log;
mod utils;

use cli::Args;
use config::{AppConfig, ConfigFile, EnvConfig};
use frameworks::{discover, CommandOptions, Exec, Framework};
use grouping::GroupBy;
use models::TestFile;
use orchestrator::{Orchestrator, RunOptions};
use output::ResultFormatter;
use utils::logger::{init_logger, LogLevel};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let command = match args.command {
        cli::Command::Config(config_args) => {
            init_logger(if args.verbose {
                LogLevel::Debug
            } else {
                LogLevel::default()
            });
            manage_config(config_args, args.config.as_deref())?;
            return Ok(ExitCode::SUCCESS);
        }
        command => command,
    };

    let config = load_config(args.config.as_deref())?;
    init_logger(if args.verbose {
        LogLevel::Debug
    } else {
        config.log_level
    });

    match command {
        cli::Command::Run(run_args) => run_tests(run_args, config).await,
        cli::Command::Exec(exec_args) => exec_command(exec_args, config).await,
        cli::Command::Groups(run_args) => show_groups(run_args, config),
        cli::Command::Config(_) => Ok(ExitCode::SUCCESS),
    }
}

/// Defaults, then the config file, then the environment
fn load_config(path: Option<&str>) -> Result<AppConfig> {
    let env = EnvConfig::load();
    let file = match path.or(env.config_file.as_deref()) {
        Some(path) => ConfigFile::load(path)?,
        None => ConfigFile::load_default()?,
    };

    let mut config = file.app;
    env.apply(&mut config);
    Ok(config)
}

fn run_options(config: &AppConfig) -> Result<RunOptions> {
    Ok(RunOptions {
        processes: config.processes(),
        group_by: config.grouping()?,
        runtime_log: config.runtime_log.as_ref().map(PathBuf::from),
        record_runtime: config.record_runtime,
        non_parallel: config.non_parallel,
        first_is_one: config.first_is_one,
        run_empty_groups: false,
        announce: true,
    })
}

fn formatter(config: &AppConfig) -> ResultFormatter {
    ResultFormatter::new(config.output_format().unwrap_or_default())
        .with_color(io::stdout().is_terminal())
}

/// Framework and discovered files for `run` and `groups`
fn prepare_suite(args: &cli::RunArgs, config: &AppConfig) -> Result<(Box<dyn Framework>, Vec<TestFile>)> {
    let framework = config.framework_kind()?.build(CommandOptions {
        executable: config.executable.clone(),
        test_options: config.test_options.clone(),
    });

    let pattern = args
        .pattern
        .as_deref()
        .map(Regex::new)
        .transpose()
        .context("Invalid --pattern")?;

    let files = discover(&args.paths, framework.as_ref(), pattern.as_ref())?;
    info!(
        "Found {} {} files for {}",
        files.len(),
        framework.unit_name(),
        framework.name()
    );
    Ok((framework, files))
}

async fn run_tests(args: cli::RunArgs, mut config: AppConfig) -> Result<ExitCode> {
    args.apply(&mut config);
    config.validate()?;

    let (framework, files) = prepare_suite(&args, &config)?;
    let mut orchestrator = Orchestrator::new(framework, run_options(&config)?, io::stdout())
        .with_formatter(formatter(&config));

    let summary = orchestrator.run(files).await?;
    if !summary.success {
        eprintln!("Tests failed");
    }
    Ok(ExitCode::from(summary.exit_code()))
}

async fn exec_command(args: cli::ExecArgs, mut config: AppConfig) -> Result<ExitCode> {
    args.apply(&mut config);
    config.validate()?;

    let options = RunOptions {
        group_by: GroupBy::Count,
        record_runtime: false,
        run_empty_groups: true,
        announce: false,
        ..run_options(&config)?
    };
    info!(
        "Running `{}` in {} workers",
        args.command_line(),
        options.processes
    );

    let mut orchestrator = Orchestrator::new(
        Box::new(Exec::new(args.command_line())),
        options,
        io::stdout(),
    )
    .with_formatter(formatter(&config));

    let summary = orchestrator.run(Vec::new()).await?;
    Ok(ExitCode::from(summary.exit_code()))
}

fn show_groups(args: cli::RunArgs, mut config: AppConfig) -> Result<ExitCode> {
    args.apply(&mut config);
    config.validate()?;

    let (framework, files) = prepare_suite(&args, &config)?;
    let formatter = formatter(&config);
    let orchestrator = Orchestrator::new(framework, run_options(&config)?, io::sink());

    let plan = orchestrator.plan(&files)?;
    print!("{}", formatter.format_groups(&plan));
    Ok(ExitCode::SUCCESS)
}

fn manage_config(args: cli::ConfigArgs, path: Option<&str>) -> Result<()> {
    match args.action {
        cli::ConfigAction::Init { output, force } => {
            let path = Path::new(&output);
            if path.exists() && !force {
                anyhow::bail!(
                    "Configuration file already exists: {output}. Use --force to overwrite."
                );
            }

            ConfigFile::example().save(path)?;
            println!("✓ Configuration file created: {output}");
            println!("\nEdit the file to customize your settings.");
        }

        cli::ConfigAction::Show { env, format } => {
            if env {
                EnvConfig::load().print_summary();
            } else {
                let effective = ConfigFile {
                    app: load_config(path)?,
                    ..ConfigFile::default()
                };
                let output = if format == "json" {
                    serde_json::to_string_pretty(&effective)?
                } else {
                    serde_yaml::to_string(&effective)?
                };
                println!("{output}");
            }
        }

        cli::ConfigAction::Validate { file } => {
            let file = file.or_else(|| path.map(str::to_string)).unwrap_or_else(|| {
                ConfigFile::find()
                    .map(|p| p.to_string_lossy().to_string())
                    .unwrap_or_else(|| "./parallel-tests.yaml".to_string())
            });

            match ConfigFile::load(&file) {
                Ok(_) => {
                    println!("✓ Configuration file is valid: {file}");
                }
                Err(e) => {
                    println!("✗ Configuration file is invalid: {file}");
                    println!("  Error: {e:#}");
                    return Err(e);
                }
            }
        }

        cli::ConfigAction::Env => config::print_env_help(),
    }

    Ok(())
}
