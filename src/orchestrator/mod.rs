//! Running a whole suite
//!
//! Ties the pieces together: estimates from the runtime log, grouping, worker
//! execution, aggregation and the final report.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::executor::{Execution, ParallelExecutor, SpawnRequest, WorkerRunner};
use crate::frameworks::Framework;
use crate::grouping::{self, GroupBy};
use crate::models::{Group, RunError, TestFile, WorkerIdentity, WorkerOutcome};
use crate::output::ResultFormatter;
use crate::platform;
use crate::results::{aggregate, collect_failure_logs, AggregateReport};
use crate::runtime_log::{apportion, RuntimeLog};
use crate::utils::timer::{Stopwatch, Timer};

/// Phase of a run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Grouping,
    Executing,
    Aggregating,
    Reporting,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Grouping => "grouping",
            RunState::Executing => "executing",
            RunState::Aggregating => "aggregating",
            RunState::Reporting => "reporting",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// How a run is carried out
#[derive(Clone, Debug)]
pub struct RunOptions {
    pub processes: usize,
    pub group_by: GroupBy,
    /// Overrides the framework's runtime log location
    pub runtime_log: Option<PathBuf>,
    /// Record runtimes even when not grouping by runtime
    pub record_runtime: bool,
    pub non_parallel: bool,
    pub first_is_one: bool,
    /// Start a process for workers without files
    pub run_empty_groups: bool,
    /// Print the banner and the elapsed time
    pub announce: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            processes: platform::processor_count(),
            group_by: GroupBy::default(),
            runtime_log: None,
            record_runtime: false,
            non_parallel: false,
            first_is_one: false,
            run_empty_groups: false,
            announce: true,
        }
    }
}

/// Everything known about a finished run
#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub timestamp: DateTime<Utc>,
    pub framework: String,
    pub group_by: GroupBy,
    pub processes: usize,
    pub files: usize,
    pub report: AggregateReport,
    pub workers: Vec<WorkerOutcome>,
    /// Entries from the framework's failure logs
    pub failures: Vec<String>,
    /// Workers skipped after a spawn failure
    pub not_started: Vec<WorkerIdentity>,
    pub duration_secs: f64,
    pub success: bool,
}

impl RunSummary {
    pub fn exit_code(&self) -> u8 {
        if self.success {
            0
        } else {
            1
        }
    }
}

/// Runs one suite from grouping to the final report, writing worker output
/// and the report to `out`
pub struct Orchestrator<W: Write> {
    framework: Box<dyn Framework>,
    options: RunOptions,
    formatter: ResultFormatter,
    runner: WorkerRunner,
    out: W,
    state: RunState,
}

impl<W: Write> Orchestrator<W> {
    pub fn new(framework: Box<dyn Framework>, options: RunOptions, out: W) -> Self {
        Self {
            framework,
            options,
            formatter: ResultFormatter::default(),
            runner: WorkerRunner::default(),
            out,
            state: RunState::Idle,
        }
    }

    pub fn with_formatter(mut self, formatter: ResultFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    #[cfg(test)]
    pub fn with_runner(mut self, runner: WorkerRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn into_output(self) -> W {
        self.out
    }

    pub fn runtime_log(&self) -> RuntimeLog {
        RuntimeLog::new(
            self.options
                .runtime_log
                .clone()
                .unwrap_or_else(|| self.framework.runtime_log()),
        )
    }

    /// Groups the run would use, with their estimated cost
    pub fn plan(&self, files: &[TestFile]) -> Result<Vec<(Group, f64)>, RunError> {
        let estimates = self.estimates();
        let groups = grouping::group(files, self.options.processes, self.options.group_by, &estimates)?;
        let costs = grouping::group_costs(&groups, self.options.group_by, &estimates);
        Ok(groups.into_iter().zip(costs).collect())
    }

    /// Run `files` and report the result.
    ///
    /// Failing workers make the summary unsuccessful; only configuration
    /// problems, a worker that could not be started and interruption are
    /// errors. After a spawn failure the workers that did run are still
    /// reported before the error is returned.
    pub async fn run(&mut self, files: Vec<TestFile>) -> Result<RunSummary, RunError> {
        self.run_until(files, interrupted()).await
    }

    /// Like [`Orchestrator::run`], but stops the workers as soon as `shutdown`
    /// resolves
    pub async fn run_until(
        &mut self,
        files: Vec<TestFile>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<RunSummary, RunError> {
        let timer = Timer::start("run");
        let mut stopwatch = Stopwatch::new();

        self.transition(RunState::Grouping);
        let estimates = self.estimates();
        let groups = match grouping::group(
            &files,
            self.options.processes,
            self.options.group_by,
            &estimates,
        ) {
            Ok(groups) => groups,
            Err(e) => {
                self.transition(RunState::Failed);
                return Err(e);
            }
        };
        stopwatch.lap(RunState::Grouping.to_string());

        if let Err(e) = self.framework.prepare() {
            warn!("Failed to prepare {}: {}", self.framework.name(), e);
        }
        if self.options.announce && !files.is_empty() {
            let banner = self.formatter.format_banner(
                groups.len(),
                files.len(),
                self.framework.unit_name(),
            );
            self.write(&banner);
        }

        self.transition(RunState::Executing);
        let requests = self.requests(groups);
        let execution = match self.execute(requests, shutdown).await {
            Ok(execution) => execution,
            Err(e) => {
                self.transition(RunState::Failed);
                return Err(e);
            }
        };
        stopwatch.lap(RunState::Executing.to_string());

        self.transition(RunState::Aggregating);
        let report = aggregate(&execution.outcomes, self.framework.syntax());
        let failures = self
            .framework
            .failure_log_dir()
            .map(|dir| collect_failure_logs(&dir))
            .unwrap_or_default();
        stopwatch.lap(RunState::Aggregating.to_string());

        self.transition(RunState::Reporting);
        if self.options.group_by == GroupBy::Runtime || self.options.record_runtime {
            self.record_runtimes(&execution.outcomes, &estimates);
        }

        let Execution {
            outcomes,
            spawn_error,
            not_started,
        } = execution;
        let summary = RunSummary {
            timestamp: Utc::now(),
            framework: self.framework.name().to_string(),
            group_by: self.options.group_by,
            processes: self.options.processes,
            files: files.len(),
            success: report.success && spawn_error.is_none(),
            report,
            workers: outcomes,
            failures,
            not_started,
            duration_secs: timer.elapsed_secs(),
        };

        let rendered = self.formatter.format_report(&summary, self.options.announce);
        self.write(&rendered);
        stopwatch.lap(RunState::Reporting.to_string());
        debug!("Run phases: {}", stopwatch.format());
        timer.stop();

        if let Some(e) = spawn_error {
            self.transition(RunState::Failed);
            return Err(e);
        }
        self.transition(RunState::Done);
        Ok(summary)
    }

    fn transition(&mut self, next: RunState) {
        debug!("Run state {} -> {}", self.state, next);
        self.state = next;
    }

    fn estimates(&self) -> HashMap<String, f64> {
        if self.options.group_by == GroupBy::Runtime || self.options.record_runtime {
            self.runtime_log().read_estimates()
        } else {
            HashMap::new()
        }
    }

    fn requests(&self, groups: Vec<Group>) -> Vec<SpawnRequest> {
        let total = groups.len();
        groups
            .into_iter()
            .enumerate()
            .map(|(index, group)| {
                let identity = WorkerIdentity::for_index(index);
                let command = self.framework.build_command(&group.paths(), identity);
                SpawnRequest::new(identity, group, command, total, self.options.first_is_one)
            })
            .collect()
    }

    async fn execute(
        &mut self,
        requests: Vec<SpawnRequest>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<Execution, RunError> {
        let mut executor = ParallelExecutor::new()
            .with_runner(self.runner.clone())
            .run_empty_groups(self.options.run_empty_groups);
        if self.options.non_parallel {
            executor = executor.sequential();
        }

        let formatter = &self.formatter;
        let out = &mut self.out;
        let execution = executor.execute(requests, |outcome| {
            let block = formatter.format_block(outcome);
            if let Err(e) = out.write_all(block.as_bytes()).and_then(|_| out.flush()) {
                warn!("Failed to write output of {}: {}", outcome.identity, e);
            }
        });

        tokio::select! {
            execution = execution => Ok(execution),
            _ = shutdown => {
                warn!("Interrupted, stopping workers");
                Err(RunError::Interrupted)
            }
        }
    }

    /// Append one batch per worker. A worker that ran a single file owns its
    /// whole wall-clock time.
    fn record_runtimes(&self, outcomes: &[WorkerOutcome], estimates: &HashMap<String, f64>) {
        let log = self.runtime_log();
        let mut recorded = 0;

        for outcome in outcomes.iter().filter(|o| o.spawned && !o.files.is_empty()) {
            let result = match outcome.files.as_slice() {
                [file] => log.record(file, outcome.elapsed_secs).map(|()| 1),
                files => {
                    let files: Vec<TestFile> = files.iter().map(TestFile::new).collect();
                    let samples = apportion(&files, outcome.elapsed_secs, estimates);
                    log.record_all(&samples).map(|()| samples.len())
                }
            };
            match result {
                Ok(count) => recorded += count,
                Err(e) => {
                    warn!("{}", e);
                    return;
                }
            }
        }

        if recorded > 0 {
            info!("Recorded {} runtimes in {}", recorded, log.path().display());
        }
    }

    fn write(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Err(e) = self.out.write_all(text.as_bytes()).and_then(|_| self.out.flush()) {
            warn!("Failed to write output: {}", e);
        }
    }
}

/// Resolves on Ctrl-C or, on unix, SIGTERM
async fn interrupted() {
    tokio::select! {
        _ = ctrl_c() => {}
        _ = terminated() => {}
    }
}

/// Never resolves if the handler cannot be installed
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn terminated() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            if term.recv().await.is_some() {
                return;
            }
        }
        Err(e) => warn!("Cannot listen for SIGTERM: {}", e),
    }
    std::future::pending::<()>().await;
}

#[cfg(not(unix))]
async fn terminated() {
    std::future::pending::<()>().await;
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::frameworks::{CommandOptions, Exec, FrameworkKind};
    use tempfile::tempdir;

    /// rspec stand-in that reports one example per file it is given
    fn rspec(script: &str) -> Box<dyn Framework> {
        FrameworkKind::RSpec.build(CommandOptions {
            executable: Some(format!("sh -c '{script}' rspec")),
            test_options: None,
        })
    }

    fn options(processes: usize, log: PathBuf) -> RunOptions {
        RunOptions {
            processes,
            runtime_log: Some(log),
            ..RunOptions::default()
        }
    }

    fn files(names: &[&str]) -> Vec<TestFile> {
        names.iter().map(|n| TestFile::new(*n)).collect()
    }

    fn text(orchestrator: Orchestrator<Vec<u8>>) -> String {
        String::from_utf8(orchestrator.into_output()).unwrap()
    }

    #[tokio::test]
    async fn test_run_aggregates_workers() {
        let dir = tempdir().unwrap();
        let mut orchestrator = Orchestrator::new(
            rspec(r#"echo "$# examples, 0 failures""#),
            options(2, dir.path().join("runtime.log")),
            Vec::new(),
        );

        let summary = orchestrator
            .run(files(&["a_spec.rb", "b_spec.rb", "c_spec.rb"]))
            .await
            .unwrap();

        assert!(summary.success);
        assert_eq!(summary.exit_code(), 0);
        assert_eq!(summary.report.summary(), "3 examples, 0 failures");
        assert_eq!(summary.workers.len(), 2);
        assert_eq!(orchestrator.state(), RunState::Done);

        let output = text(orchestrator);
        assert!(output.starts_with("2 processes for 3 specs, ~ 1 spec per process\n"));
        assert!(output.contains("2 examples, 0 failures\n1 examples, 0 failures\n"));
        assert!(output.contains("\n3 examples, 0 failures\n"));
        assert!(output.contains("Took "));
    }

    #[tokio::test]
    async fn test_failing_worker_fails_run_but_reports_all() {
        let dir = tempdir().unwrap();
        let mut orchestrator = Orchestrator::new(
            rspec(r#"case "$1" in bad*) echo "1 example, 1 failure"; exit 1;; *) echo "1 example, 0 failures";; esac"#),
            options(2, dir.path().join("runtime.log")),
            Vec::new(),
        );

        let summary = orchestrator
            .run(files(&["bad_spec.rb", "good_spec.rb"]))
            .await
            .unwrap();

        assert!(!summary.success);
        assert_eq!(summary.exit_code(), 1);
        assert_eq!(summary.report.summary(), "2 examples, 1 failure");
        assert_eq!(summary.report.failed_workers, vec![WorkerIdentity::Numbered(1)]);
    }

    #[tokio::test]
    async fn test_more_workers_than_files() {
        let dir = tempdir().unwrap();
        let mut orchestrator = Orchestrator::new(
            rspec(r#"echo "$# examples, 0 failures""#),
            options(4, dir.path().join("runtime.log")),
            Vec::new(),
        );

        let summary = orchestrator.run(files(&["a_spec.rb"])).await.unwrap();
        assert!(summary.success);
        assert_eq!(summary.workers.len(), 4);
        assert_eq!(summary.workers.iter().filter(|w| w.spawned).count(), 1);
        assert_eq!(summary.report.summary(), "1 example, 0 failures");
    }

    #[tokio::test]
    async fn test_no_files_reports_zero() {
        let dir = tempdir().unwrap();
        let mut orchestrator = Orchestrator::new(
            rspec("exit 1"),
            options(3, dir.path().join("runtime.log")),
            Vec::new(),
        );

        let summary = orchestrator.run(Vec::new()).await.unwrap();
        assert!(summary.success);
        assert_eq!(summary.report.summary(), "0 examples, 0 failures");
    }

    #[tokio::test]
    async fn test_zero_processes_fails_before_spawning() {
        let dir = tempdir().unwrap();
        let mut orchestrator = Orchestrator::new(
            rspec("exit 0"),
            options(0, dir.path().join("runtime.log")),
            Vec::new(),
        );

        let result = orchestrator.run(files(&["a_spec.rb"])).await;
        assert!(matches!(result, Err(RunError::ZeroWorkers)));
        assert_eq!(orchestrator.state(), RunState::Failed);
        assert!(text(orchestrator).is_empty());
    }

    #[tokio::test]
    async fn test_runtime_grouping_records_samples() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("tmp").join("runtime.log");
        std::fs::create_dir_all(log_path.parent().unwrap()).unwrap();
        std::fs::write(&log_path, "slow_spec.rb:10\nfast_spec.rb:1\n").unwrap();

        let mut orchestrator = Orchestrator::new(
            rspec(r#"echo "$# examples, 0 failures""#),
            RunOptions {
                group_by: GroupBy::Runtime,
                ..options(2, log_path.clone())
            },
            Vec::new(),
        );

        let plan = orchestrator
            .plan(&files(&["fast_spec.rb", "slow_spec.rb", "other_spec.rb"]))
            .unwrap();
        assert_eq!(plan[0].0.paths(), vec!["slow_spec.rb"]);

        let summary = orchestrator
            .run(files(&["fast_spec.rb", "slow_spec.rb", "other_spec.rb"]))
            .await
            .unwrap();
        assert!(summary.success);

        let estimates = RuntimeLog::new(&log_path).read_estimates();
        assert_eq!(estimates.len(), 3);
        assert!(estimates.contains_key("other_spec.rb"));
    }

    #[tokio::test]
    async fn test_count_grouping_does_not_touch_log() {
        let dir = tempdir().unwrap();
        let log_path = dir.path().join("runtime.log");
        let mut orchestrator = Orchestrator::new(
            rspec(r#"echo "$# examples, 0 failures""#),
            options(2, log_path.clone()),
            Vec::new(),
        );

        orchestrator.run(files(&["a_spec.rb"])).await.unwrap();
        assert!(!log_path.exists());
    }

    #[tokio::test]
    async fn test_exec_mode_runs_every_worker() {
        let dir = tempdir().unwrap();
        let mut orchestrator = Orchestrator::new(
            Box::new(Exec::new(r#"echo "db$TEST_ENV_NUMBER""#)),
            RunOptions {
                run_empty_groups: true,
                non_parallel: true,
                announce: false,
                ..options(3, dir.path().join("runtime.log"))
            },
            Vec::new(),
        );

        let summary = orchestrator.run(Vec::new()).await.unwrap();
        assert!(summary.success);
        assert_eq!(text(orchestrator), "db\ndb2\ndb3\n");
    }

    #[tokio::test]
    async fn test_exec_mode_keeps_quoted_command() {
        let dir = tempdir().unwrap();
        let command = shell_words::join(["sh", "-c", "echo db$TEST_ENV_NUMBER"]);
        let mut orchestrator = Orchestrator::new(
            Box::new(Exec::new(command)),
            RunOptions {
                run_empty_groups: true,
                non_parallel: true,
                announce: false,
                ..options(2, dir.path().join("runtime.log"))
            },
            Vec::new(),
        );

        orchestrator.run(Vec::new()).await.unwrap();
        assert_eq!(text(orchestrator), "db\ndb2\n");
    }

    #[tokio::test]
    async fn test_spawn_failure_reports_finished_workers() {
        let dir = tempdir().unwrap();
        let shell = dir.path().join("sh");
        std::os::unix::fs::symlink("/bin/sh", &shell).unwrap();

        // The first worker removes the shell every later worker needs
        let script = format!(r#"rm -f {}; echo "$# examples, 0 failures""#, shell.display());
        let mut orchestrator = Orchestrator::new(
            rspec(&script),
            RunOptions {
                non_parallel: true,
                ..options(3, dir.path().join("runtime.log"))
            },
            Vec::new(),
        )
        .with_runner(WorkerRunner::with_shell(shell.display().to_string(), "-c"));

        let result = orchestrator
            .run(files(&["a_spec.rb", "b_spec.rb", "c_spec.rb"]))
            .await;

        assert!(matches!(result, Err(RunError::Spawn { .. })));
        assert_eq!(orchestrator.state(), RunState::Failed);

        let output = text(orchestrator);
        assert!(output.contains("1 examples, 0 failures\n"));
        assert!(output.contains("\n1 example, 0 failures\n"));
        assert!(output.contains("Not started: worker 3\n"));
    }

    #[tokio::test]
    async fn test_shutdown_stops_running_workers() {
        let dir = tempdir().unwrap();
        let mut orchestrator = Orchestrator::new(
            Box::new(Exec::new("sleep 30")),
            RunOptions {
                run_empty_groups: true,
                announce: false,
                ..options(2, dir.path().join("runtime.log"))
            },
            Vec::new(),
        );

        let started = std::time::Instant::now();
        let result = orchestrator
            .run_until(
                Vec::new(),
                tokio::time::sleep(std::time::Duration::from_millis(200)),
            )
            .await;

        assert!(matches!(result, Err(RunError::Interrupted)));
        assert_eq!(orchestrator.state(), RunState::Failed);
        assert!(started.elapsed() < std::time::Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_exec_mode_failure() {
        let dir = tempdir().unwrap();
        let mut orchestrator = Orchestrator::new(
            Box::new(Exec::new(r#"test "$TEST_ENV_NUMBER" != 2"#)),
            RunOptions {
                run_empty_groups: true,
                announce: false,
                ..options(3, dir.path().join("runtime.log"))
            },
            Vec::new(),
        );

        let summary = orchestrator.run(Vec::new()).await.unwrap();
        assert!(!summary.success);
        assert_eq!(summary.report.failed_workers, vec![WorkerIdentity::Numbered(2)]);
    }
}
