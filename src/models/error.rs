//! Engine errors

use thiserror::Error;

use super::WorkerIdentity;

/// Fatal errors of a parallel run.
///
/// Worker processes exiting non-zero are not errors; they are recorded in the
/// worker's outcome and only affect the final exit code.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Number of processes must be at least 1")]
    ZeroWorkers,

    #[error("Unknown grouping strategy: {0} (expected count, runtime or weight)")]
    UnknownStrategy(String),

    #[error("Unknown test framework: {0} (expected rspec, cucumber or test)")]
    UnknownFramework(String),

    #[error("Failed to spawn {identity} (`{command}`): {source}")]
    Spawn {
        identity: WorkerIdentity,
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Run interrupted")]
    Interrupted,
}
