//! Output formatting module
//!
//! Renders the run banner, worker blocks and the final report.

mod formatter;

pub use formatter::{OutputFormat, ResultFormatter};
