//! Test files, groups, and worker identities

use serde::{Deserialize, Serialize};
use std::fmt;

/// Environment variable that carries the worker identity into each subprocess
pub const IDENTITY_ENV_VAR: &str = "TEST_ENV_NUMBER";

/// Environment variable that carries the total number of groups
pub const GROUPS_ENV_VAR: &str = "PARALLEL_TEST_GROUPS";

/// A single discovered test file
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestFile {
    /// Path of the file, as passed to the test framework
    pub path: String,

    /// Static cost hint (scenario steps, file size, ...)
    pub weight: Option<f64>,
}

impl TestFile {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            weight: None,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }
}

impl fmt::Display for TestFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

/// Ordered set of files assigned to exactly one worker
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub files: Vec<TestFile>,
}

impl Group {
    pub fn new(files: Vec<TestFile>) -> Self {
        Self { files }
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn paths(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.path.as_str()).collect()
    }
}

/// Identity handed to a worker process for resource partitioning
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerIdentity {
    /// No parallel identity; rendered as an empty value
    Sequential,
    /// Worker number in `[1, N]`
    Numbered(u32),
}

impl WorkerIdentity {
    /// Identity for the zero-based group index
    pub fn for_index(index: usize) -> Self {
        WorkerIdentity::Numbered(index as u32 + 1)
    }

    /// Worker number, if any
    pub fn number(&self) -> Option<u32> {
        match self {
            WorkerIdentity::Sequential => None,
            WorkerIdentity::Numbered(n) => Some(*n),
        }
    }

    /// Value exported through [`IDENTITY_ENV_VAR`].
    ///
    /// Worker 1 uses the empty string unless `first_is_one` is set, so that a
    /// suite's default resources (e.g. `app_test` database) belong to it.
    pub fn env_value(&self, first_is_one: bool) -> String {
        match self {
            WorkerIdentity::Sequential => String::new(),
            WorkerIdentity::Numbered(1) if !first_is_one => String::new(),
            WorkerIdentity::Numbered(n) => n.to_string(),
        }
    }
}

impl fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerIdentity::Sequential => write!(f, "sequential"),
            WorkerIdentity::Numbered(n) => write!(f, "worker {n}"),
        }
    }
}
