//! Per-worker outcomes
//!
//! Created once a worker process terminates and never modified afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::WorkerIdentity;

/// Exit status of a worker process
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum WorkerStatus {
    /// Exited with status zero, or had nothing to run
    Passed,
    /// Exited non-zero; `code` is `None` when the process was killed by a signal
    Failed { code: Option<i32> },
}

impl WorkerStatus {
    pub fn from_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => WorkerStatus::Passed,
            code => WorkerStatus::Failed { code },
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            WorkerStatus::Passed => "✓",
            WorkerStatus::Failed { .. } => "✗",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, WorkerStatus::Passed)
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerStatus::Passed => write!(f, "PASS"),
            WorkerStatus::Failed { code: Some(code) } => write!(f, "FAIL (exit {code})"),
            WorkerStatus::Failed { code: None } => write!(f, "FAIL (signal)"),
        }
    }
}

/// Result of one worker process
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerOutcome {
    pub identity: WorkerIdentity,
    pub status: WorkerStatus,
    /// Files the worker was given
    pub files: Vec<String>,
    #[serde(skip_serializing)]
    pub stdout: String,
    #[serde(skip_serializing)]
    pub stderr: String,
    pub elapsed_secs: f64,
    /// False when the group was empty and no process was started
    pub spawned: bool,
}

impl WorkerOutcome {
    /// Outcome for a finished process
    pub fn finished(
        identity: WorkerIdentity,
        files: Vec<String>,
        code: Option<i32>,
        stdout: String,
        stderr: String,
        elapsed_secs: f64,
    ) -> Self {
        Self {
            identity,
            status: WorkerStatus::from_code(code),
            files,
            stdout,
            stderr,
            elapsed_secs,
            spawned: true,
        }
    }

    /// Outcome for a worker whose group had no files
    pub fn empty(identity: WorkerIdentity) -> Self {
        Self {
            identity,
            status: WorkerStatus::Passed,
            files: Vec::new(),
            stdout: String::new(),
            stderr: String::new(),
            elapsed_secs: 0.0,
            spawned: false,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Captured stdout followed by captured stderr
    pub fn output(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => {
                let mut combined = self.stdout.clone();
                if !combined.ends_with('\n') {
                    combined.push('\n');
                }
                combined.push_str(&self.stderr);
                combined
            }
        }
    }
}

impl fmt::Display for WorkerOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{} files, {:.2}s] {}",
            self.status.symbol(),
            self.identity,
            self.files.len(),
            self.elapsed_secs,
            self.status
        )
    }
}
