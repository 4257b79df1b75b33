//! Result aggregation
//!
//! Parses the summary lines each worker printed and merges them into one
//! report.

mod aggregate;
mod failures;
mod syntax;

pub use aggregate::{aggregate, AggregateReport};
pub use failures::collect_failure_logs;
pub use syntax::{Layout, ResultSyntax};
