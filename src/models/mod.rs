//! Data models for parallel test runs
//!
//! Test files, groups, worker identities, and per-worker outcomes.

mod error;
mod outcome;
mod test_file;

pub use error::RunError;
pub use outcome::{WorkerOutcome, WorkerStatus};
pub use test_file::{Group, TestFile, WorkerIdentity, GROUPS_ENV_VAR, IDENTITY_ENV_VAR};
