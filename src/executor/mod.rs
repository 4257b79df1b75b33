//! Worker execution engine
//!
//! Spawns one process per group, sequentially or in parallel.

mod parallel;
mod runner;

pub use parallel::{Execution, ParallelExecutor};
pub use runner::{SpawnRequest, WorkerRunner};
