//! Running a single worker process
//!
//! A worker is described by an immutable [`SpawnRequest`]; its identity is
//! part of the request rather than ambient process state.

use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::models::{Group, RunError, WorkerIdentity, WorkerOutcome, GROUPS_ENV_VAR, IDENTITY_ENV_VAR};
use crate::platform;
use crate::utils::timer::Timer;

/// Everything needed to start one worker
#[derive(Clone, Debug)]
pub struct SpawnRequest {
    pub identity: WorkerIdentity,
    pub group: Group,
    pub command: String,
    env: Vec<(String, String)>,
}

impl SpawnRequest {
    /// Request for worker `identity` out of `total_groups`.
    ///
    /// The identity is exported as [`IDENTITY_ENV_VAR`], the group count as
    /// [`GROUPS_ENV_VAR`].
    pub fn new(
        identity: WorkerIdentity,
        group: Group,
        command: impl Into<String>,
        total_groups: usize,
        first_is_one: bool,
    ) -> Self {
        Self {
            identity,
            group,
            command: command.into(),
            env: vec![
                (IDENTITY_ENV_VAR.to_string(), identity.env_value(first_is_one)),
                (GROUPS_ENV_VAR.to_string(), total_groups.to_string()),
            ],
        }
    }

    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    /// The command as a shell line with its environment exported first
    pub fn describe(&self) -> String {
        self.env
            .iter()
            .map(|(k, v)| platform::export_environment_variable(k, &shell_words::quote(v)))
            .chain(std::iter::once(self.command.clone()))
            .collect::<Vec<_>>()
            .join(";")
    }
}

/// Starts worker processes through a shell and waits for them
#[derive(Clone, Debug)]
pub struct WorkerRunner {
    shell: String,
    shell_flag: String,
}

impl WorkerRunner {
    /// Runner using the platform shell
    pub fn new() -> Self {
        let (shell, flag) = platform::shell();
        Self::with_shell(shell, flag)
    }

    /// Runner using a specific shell, e.g. `bash -c`
    pub fn with_shell(shell: impl Into<String>, flag: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            shell_flag: flag.into(),
        }
    }

    /// Run the request to completion, capturing its output.
    ///
    /// A non-zero exit is reported in the outcome. Only a failure to start
    /// the process at all is an error.
    pub async fn run(&self, request: &SpawnRequest) -> Result<WorkerOutcome, RunError> {
        info!(
            "Starting {} with {} files",
            request.identity,
            request.group.len()
        );
        debug!("{}: {}", request.identity, request.describe());

        let timer = Timer::start(request.identity.to_string());
        let child = Command::new(&self.shell)
            .arg(&self.shell_flag)
            .arg(&request.command)
            .envs(request.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunError::Spawn {
                identity: request.identity,
                command: request.command.clone(),
                source,
            })?;

        let files: Vec<String> = request.group.files.iter().map(|f| f.path.clone()).collect();

        let outcome = match child.wait_with_output().await {
            Ok(output) => WorkerOutcome::finished(
                request.identity,
                files,
                output.status.code(),
                String::from_utf8_lossy(&output.stdout).into_owned(),
                String::from_utf8_lossy(&output.stderr).into_owned(),
                timer.elapsed_secs(),
            ),
            Err(e) => {
                error!("Lost track of {}: {}", request.identity, e);
                WorkerOutcome::finished(
                    request.identity,
                    files,
                    None,
                    String::new(),
                    format!("failed to wait for worker: {e}\n"),
                    timer.elapsed_secs(),
                )
            }
        };

        timer.stop();
        info!("  {}", outcome);
        Ok(outcome)
    }
}

impl Default for WorkerRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use crate::models::TestFile;

    fn request(n: u32, command: &str) -> SpawnRequest {
        SpawnRequest::new(
            WorkerIdentity::Numbered(n),
            Group::new(vec![TestFile::new("a_spec.rb")]),
            command,
            4,
            false,
        )
    }

    fn env_var<'a>(request: &'a SpawnRequest, key: &str) -> Option<&'a str> {
        request
            .env()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_request_env() {
        let first = request(1, "true");
        assert_eq!(env_var(&first, IDENTITY_ENV_VAR), Some(""));
        assert_eq!(env_var(&first, GROUPS_ENV_VAR), Some("4"));

        let third = request(3, "true");
        assert_eq!(env_var(&third, IDENTITY_ENV_VAR), Some("3"));
        assert_eq!(third.env().len(), 2);
    }

    #[cfg(unix)]
    #[test]
    fn test_describe_exports_env() {
        assert_eq!(
            request(2, "rspec a_spec.rb").describe(),
            "export TEST_ENV_NUMBER=2;export PARALLEL_TEST_GROUPS=4;rspec a_spec.rb"
        );
        assert_eq!(
            request(1, "rspec").describe(),
            "export TEST_ENV_NUMBER='';export PARALLEL_TEST_GROUPS=4;rspec"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_captures_output_and_identity() {
        let runner = WorkerRunner::new();
        let outcome = runner
            .run(&request(2, "echo \"env-$TEST_ENV_NUMBER-$PARALLEL_TEST_GROUPS\"; echo oops >&2"))
            .await
            .unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.stdout, "env-2-4\n");
        assert_eq!(outcome.stderr, "oops\n");
        assert_eq!(outcome.files, vec!["a_spec.rb"]);
        assert!(outcome.spawned);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_outcome_not_error() {
        let runner = WorkerRunner::new();
        let outcome = runner.run(&request(1, "exit 3")).await.unwrap();
        assert!(!outcome.is_success());
        assert_eq!(outcome.status, crate::models::WorkerStatus::Failed { code: Some(3) });
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_command_fails_inside_shell() {
        let runner = WorkerRunner::new();
        let outcome = runner
            .run(&request(1, "definitely-not-a-real-command-xyz"))
            .await
            .unwrap();
        assert_eq!(
            outcome.status,
            crate::models::WorkerStatus::Failed { code: Some(127) }
        );
    }

    #[tokio::test]
    async fn test_missing_shell_is_spawn_error() {
        let runner = WorkerRunner::with_shell("/nonexistent/shell", "-c");
        let result = runner.run(&request(1, "true")).await;
        assert!(matches!(result, Err(RunError::Spawn { .. })));
    }
}
