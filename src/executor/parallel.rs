//! Parallel worker execution
//!
//! Runs one process per group, bounded by a semaphore, and hands each
//! worker's output to the caller as one block in identity order.

use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use super::runner::{SpawnRequest, WorkerRunner};
use crate::models::{RunError, WorkerIdentity, WorkerOutcome};
use crate::utils::timer::Timer;

/// What became of one request
enum Step {
    Finished(WorkerOutcome),
    SpawnFailed(RunError),
    NotStarted(WorkerIdentity),
}

/// Result of executing a set of workers
#[derive(Debug, Default)]
pub struct Execution {
    /// Outcomes in identity order
    pub outcomes: Vec<WorkerOutcome>,
    /// First spawn failure, if any; later work was not started
    pub spawn_error: Option<RunError>,
    /// Workers skipped because of a spawn failure
    pub not_started: Vec<WorkerIdentity>,
}

impl Execution {
    pub fn is_success(&self) -> bool {
        self.spawn_error.is_none() && self.outcomes.iter().all(WorkerOutcome::is_success)
    }
}

/// Runs worker processes in parallel or one after another
pub struct ParallelExecutor {
    max_concurrent: Option<usize>,
    parallel: bool,
    run_empty_groups: bool,
    runner: WorkerRunner,
}

impl ParallelExecutor {
    pub fn new() -> Self {
        Self {
            max_concurrent: None,
            parallel: true,
            run_empty_groups: false,
            runner: WorkerRunner::new(),
        }
    }

    /// Limit the number of simultaneous processes. Defaults to the number of
    /// workers that have something to run.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = Some(max_concurrent.max(1));
        self
    }

    /// Run workers strictly one after another
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Start a process even for workers without files
    pub fn run_empty_groups(mut self, run: bool) -> Self {
        self.run_empty_groups = run;
        self
    }

    pub fn with_runner(mut self, runner: WorkerRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Run every request and wait for all of them.
    ///
    /// `on_release` is called once per worker with its finished outcome, in
    /// request order, as soon as every earlier worker has been released. A
    /// failing worker never stops its siblings; a spawn failure stops workers
    /// that have not started yet.
    pub async fn execute<F>(&self, requests: Vec<SpawnRequest>, on_release: F) -> Execution
    where
        F: FnMut(&WorkerOutcome),
    {
        let timer = Timer::start("execution");
        let workers = requests.len();

        let execution = if self.parallel {
            self.execute_parallel(requests, on_release).await
        } else {
            self.execute_sequential(requests, on_release).await
        };

        info!(
            "Executed {} workers in {:.2}s ({} failed, {} not started)",
            workers,
            timer.elapsed_secs(),
            execution.outcomes.iter().filter(|o| !o.is_success()).count(),
            execution.not_started.len()
        );
        execution
    }

    async fn execute_parallel<F>(&self, requests: Vec<SpawnRequest>, mut on_release: F) -> Execution
    where
        F: FnMut(&WorkerOutcome),
    {
        let runnable = requests
            .iter()
            .filter(|r| self.run_empty_groups || !r.group.is_empty())
            .count();
        let limit = self.max_concurrent.unwrap_or(runnable).max(1);
        info!(
            "Running {} workers, at most {} at a time",
            requests.len(),
            limit
        );

        let semaphore = Semaphore::new(limit);
        let aborted = AtomicBool::new(false);
        let total = requests.len();

        let mut pending: FuturesUnordered<_> = requests
            .into_iter()
            .enumerate()
            .map(|(index, request)| {
                let semaphore = &semaphore;
                let aborted = &aborted;
                async move {
                    let step = self.run_one(request, semaphore, aborted).await;
                    (index, step)
                }
            })
            .collect();

        let mut execution = Execution::default();
        let mut finished: Vec<Option<Step>> = (0..total).map(|_| None).collect();
        let mut next = 0;

        while let Some((index, step)) = pending.next().await {
            finished[index] = Some(step);
            while let Some(step) = finished.get_mut(next).and_then(Option::take) {
                record(&mut execution, step, &mut on_release);
                next += 1;
            }
        }

        execution
    }

    async fn run_one(
        &self,
        request: SpawnRequest,
        semaphore: &Semaphore,
        aborted: &AtomicBool,
    ) -> Step {
        if request.group.is_empty() && !self.run_empty_groups {
            return Step::Finished(WorkerOutcome::empty(request.identity));
        }

        let Ok(_permit) = semaphore.acquire().await else {
            return Step::NotStarted(request.identity);
        };
        if aborted.load(Ordering::SeqCst) {
            return Step::NotStarted(request.identity);
        }

        match self.runner.run(&request).await {
            Ok(outcome) => Step::Finished(outcome),
            Err(e) => {
                aborted.store(true, Ordering::SeqCst);
                error!("{}", e);
                Step::SpawnFailed(e)
            }
        }
    }

    async fn execute_sequential<F>(
        &self,
        requests: Vec<SpawnRequest>,
        mut on_release: F,
    ) -> Execution
    where
        F: FnMut(&WorkerOutcome),
    {
        info!("Running {} workers sequentially", requests.len());

        let semaphore = Semaphore::new(1);
        let aborted = AtomicBool::new(false);
        let mut execution = Execution::default();

        for request in requests {
            let step = self.run_one(request, &semaphore, &aborted).await;
            record(&mut execution, step, &mut on_release);
        }

        execution
    }
}

impl Default for ParallelExecutor {
    fn default() -> Self {
        Self::new()
    }
}

fn record<F>(execution: &mut Execution, step: Step, on_release: &mut F)
where
    F: FnMut(&WorkerOutcome),
{
    match step {
        Step::Finished(outcome) => {
            on_release(&outcome);
            execution.outcomes.push(outcome);
        }
        Step::SpawnFailed(e) => {
            if execution.spawn_error.is_none() {
                execution.spawn_error = Some(e);
            } else {
                warn!("Additional spawn failure: {}", e);
            }
        }
        Step::NotStarted(identity) => execution.not_started.push(identity),
    }
}

#[cfg(all(test, unix))]
mod unit_tests {
    use super::*;
    use crate::models::{Group, TestFile, IDENTITY_ENV_VAR};
    use std::time::{Duration, Instant};

    fn request(n: u32, command: &str) -> SpawnRequest {
        SpawnRequest::new(
            WorkerIdentity::Numbered(n),
            Group::new(vec![TestFile::new(format!("file{n}"))]),
            command,
            4,
            false,
        )
    }

    fn empty_request(n: u32) -> SpawnRequest {
        SpawnRequest::new(WorkerIdentity::Numbered(n), Group::default(), "exit 1", 4, false)
    }

    #[tokio::test]
    async fn test_release_in_identity_order() {
        let requests = vec![
            request(1, "sleep 0.6; echo one"),
            request(2, "sleep 0.4; echo two"),
            request(3, "echo three"),
            request(4, "sleep 0.2; echo four"),
        ];

        let mut released = Vec::new();
        let execution = ParallelExecutor::new()
            .execute(requests, |o| released.push((o.identity, o.stdout.clone())))
            .await;

        assert_eq!(
            released,
            vec![
                (WorkerIdentity::Numbered(1), "one\n".to_string()),
                (WorkerIdentity::Numbered(2), "two\n".to_string()),
                (WorkerIdentity::Numbered(3), "three\n".to_string()),
                (WorkerIdentity::Numbered(4), "four\n".to_string()),
            ]
        );
        assert_eq!(execution.outcomes.len(), 4);
        assert!(execution.is_success());
    }

    #[tokio::test]
    async fn test_workers_run_concurrently() {
        let requests = (1..=4).map(|n| request(n, "sleep 0.5")).collect();
        let start = Instant::now();
        let execution = ParallelExecutor::new().execute(requests, |_| {}).await;
        assert!(execution.is_success());
        assert!(start.elapsed() < Duration::from_millis(1800));
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_siblings() {
        let requests = vec![
            request(1, "exit 1"),
            request(2, "sleep 0.2; echo done"),
            request(3, "echo done"),
        ];
        let execution = ParallelExecutor::new().execute(requests, |_| {}).await;
        assert_eq!(execution.outcomes.len(), 3);
        assert!(!execution.outcomes[0].is_success());
        assert!(execution.outcomes[1].is_success());
        assert!(execution.outcomes[2].is_success());
        assert!(!execution.is_success());
    }

    #[tokio::test]
    async fn test_empty_groups_are_not_spawned() {
        let requests = vec![request(1, "exit 0"), empty_request(2), empty_request(3)];
        let execution = ParallelExecutor::new().execute(requests, |_| {}).await;
        assert_eq!(execution.outcomes.len(), 3);
        assert!(execution.is_success());
        assert!(!execution.outcomes[1].spawned);
        assert!(!execution.outcomes[2].spawned);
    }

    #[tokio::test]
    async fn test_run_empty_groups_when_asked() {
        let requests = vec![empty_request(1), empty_request(2)];
        let execution = ParallelExecutor::new()
            .run_empty_groups(true)
            .execute(requests, |_| {})
            .await;
        assert!(execution.outcomes.iter().all(|o| o.spawned));
        assert!(!execution.is_success());
    }

    #[tokio::test]
    async fn test_sequential_identities() {
        let command = format!("echo \"[${IDENTITY_ENV_VAR}]\"");
        let requests = (1..=4).map(|n| request(n, &command)).collect();
        let mut seen = Vec::new();
        let execution = ParallelExecutor::new()
            .sequential()
            .execute(requests, |o| seen.push(o.stdout.trim().to_string()))
            .await;
        assert!(execution.is_success());
        assert_eq!(seen, vec!["[]", "[2]", "[3]", "[4]"]);
    }

    #[tokio::test]
    async fn test_sequential_lifetimes_do_not_overlap() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join("lock");
        let lock = lock.display();
        // Each worker fails if it finds another worker's lock file
        let command = format!("test ! -e {lock} && touch {lock} && sleep 0.1 && rm {lock}");
        let requests = (1..=3).map(|n| request(n, &command)).collect();
        let execution = ParallelExecutor::new()
            .sequential()
            .execute(requests, |_| {})
            .await;
        assert!(execution.is_success());
    }

    #[tokio::test]
    async fn test_spawn_failure_stops_unstarted_work() {
        let requests = (1..=3).map(|n| request(n, "true")).collect();
        let execution = ParallelExecutor::new()
            .with_max_concurrent(1)
            .with_runner(WorkerRunner::with_shell("/nonexistent/shell", "-c"))
            .execute(requests, |_| {})
            .await;
        assert!(matches!(execution.spawn_error, Some(RunError::Spawn { .. })));
        assert!(execution.outcomes.is_empty());
        assert_eq!(execution.not_started.len(), 2);
        assert!(!execution.is_success());
    }

    #[test]
    fn test_execute_from_sync_context() {
        let execution = tokio_test::block_on(
            ParallelExecutor::new().execute(vec![request(1, "true")], |_| {}),
        );
        assert!(execution.is_success());
    }
}
