//! Output formatters for run results
//!
//! Worker output is always passed through verbatim; the format only affects
//! the report printed after it.

use serde::Serialize;
use std::fmt;

use crate::models::{Group, WorkerOutcome};
use crate::orchestrator::RunSummary;
use crate::utils::timer::format_seconds;

/// Output format options
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    JsonPretty,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" => Some(OutputFormat::Text),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            _ => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::JsonPretty => write!(f, "json-pretty"),
        }
    }
}

/// Result formatter
pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: false,
        }
    }

    /// Color the summary lines green or red
    pub fn with_color(mut self, colorize: bool) -> Self {
        self.colorize = colorize;
        self
    }

    /// Line announcing how the files are split up
    pub fn format_banner(&self, processes: usize, files: usize, unit: &str) -> String {
        let per_process = files / processes.max(1);
        format!(
            "{} for {}, ~ {} per process\n",
            pluralize(processes, "process"),
            pluralize(files, unit),
            pluralize(per_process, unit)
        )
    }

    /// One worker's captured output, stdout then stderr
    pub fn format_block(&self, outcome: &WorkerOutcome) -> String {
        let mut block = outcome.output();
        if !block.is_empty() && !block.ends_with('\n') {
            block.push('\n');
        }
        block
    }

    /// Report printed after all worker output
    pub fn format_report(&self, summary: &RunSummary, show_timing: bool) -> String {
        match self.format {
            OutputFormat::Text => self.format_report_text(summary, show_timing),
            OutputFormat::Json => to_json(summary, false),
            OutputFormat::JsonPretty => to_json(summary, true),
        }
    }

    fn format_report_text(&self, summary: &RunSummary, show_timing: bool) -> String {
        let mut output = String::new();

        let lines = summary.report.summary();
        if !lines.is_empty() {
            output.push('\n');
            output.push_str(&self.paint(&lines, summary.success));
            output.push('\n');
        }

        if !summary.failures.is_empty() {
            output.push_str("\nFailing scenarios:\n");
            for failure in &summary.failures {
                output.push_str(failure);
                output.push('\n');
            }
        }

        if !summary.not_started.is_empty() {
            let names: Vec<String> = summary.not_started.iter().map(|i| i.to_string()).collect();
            output.push_str(&format!("\nNot started: {}\n", names.join(", ")));
        }

        if show_timing {
            output.push_str(&format!(
                "\nTook {} seconds\n",
                format_seconds(std::time::Duration::from_secs_f64(summary.duration_secs))
            ));
        }

        output
    }

    /// Group preview for `groups`
    pub fn format_groups(&self, groups: &[(Group, f64)]) -> String {
        match self.format {
            OutputFormat::Text => {
                let mut output = String::new();
                for (index, (group, cost)) in groups.iter().enumerate() {
                    output.push_str(&format!(
                        "Group {} ({}, cost {:.2}):\n",
                        index + 1,
                        pluralize(group.len(), "file"),
                        cost
                    ));
                    for file in &group.files {
                        output.push_str(&format!("  {file}\n"));
                    }
                }
                output
            }
            OutputFormat::Json | OutputFormat::JsonPretty => {
                #[derive(Serialize)]
                struct GroupJson<'a> {
                    worker: usize,
                    cost: f64,
                    files: Vec<&'a str>,
                }

                let json: Vec<GroupJson> = groups
                    .iter()
                    .enumerate()
                    .map(|(index, (group, cost))| GroupJson {
                        worker: index + 1,
                        cost: *cost,
                        files: group.paths(),
                    })
                    .collect();
                to_json(&json, self.format == OutputFormat::JsonPretty)
            }
        }
    }

    fn paint(&self, text: &str, success: bool) -> String {
        if !self.colorize {
            return text.to_string();
        }
        let color = if success { "32" } else { "31" };
        format!("\x1b[{color}m{text}\x1b[0m")
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Text)
    }
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> String {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    match json {
        Ok(mut json) => {
            json.push('\n');
            json
        }
        Err(e) => {
            tracing::error!("Failed to serialize report: {}", e);
            String::new()
        }
    }
}

/// `1 spec`, `2 specs`, `3 processes`
fn pluralize(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else if noun.ends_with('s') {
        format!("{count} {noun}es")
    } else {
        format!("{count} {noun}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouping::GroupBy;
    use crate::models::{TestFile, WorkerIdentity};
    use crate::results::AggregateReport;
    use chrono::Utc;

    fn summary(success: bool) -> RunSummary {
        RunSummary {
            timestamp: Utc::now(),
            framework: "cucumber".to_string(),
            group_by: GroupBy::Count,
            processes: 2,
            files: 3,
            report: AggregateReport {
                success,
                ..AggregateReport::default()
            },
            workers: vec![WorkerOutcome::empty(WorkerIdentity::Numbered(2))],
            failures: vec!["features/a.feature:3".to_string()],
            not_started: Vec::new(),
            duration_secs: 1.5,
            success,
        }
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::from_str("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_str("TEXT"), Some(OutputFormat::Text));
        assert_eq!(OutputFormat::from_str("table"), None);
        assert_eq!(OutputFormat::JsonPretty.to_string(), "json-pretty");
    }

    #[test]
    fn test_banner() {
        let formatter = ResultFormatter::default();
        assert_eq!(
            formatter.format_banner(4, 10, "feature"),
            "4 processes for 10 features, ~ 2 features per process\n"
        );
        assert_eq!(
            formatter.format_banner(1, 1, "spec"),
            "1 process for 1 spec, ~ 1 spec per process\n"
        );
    }

    #[test]
    fn test_block_ends_with_newline() {
        let outcome = WorkerOutcome::finished(
            WorkerIdentity::Numbered(1),
            Vec::new(),
            Some(0),
            "no newline".to_string(),
            String::new(),
            0.1,
        );
        let formatter = ResultFormatter::default();
        assert_eq!(formatter.format_block(&outcome), "no newline\n");
        assert_eq!(
            formatter.format_block(&WorkerOutcome::empty(WorkerIdentity::Numbered(2))),
            ""
        );
    }

    #[test]
    fn test_text_report() {
        let report = ResultFormatter::default().format_report(&summary(false), true);
        assert!(report.contains("\nFailing scenarios:\nfeatures/a.feature:3\n"));
        assert!(report.ends_with("\nTook 1.50 seconds\n"));

        let quiet = ResultFormatter::default().format_report(&summary(true), false);
        assert!(!quiet.contains("Took"));
    }

    #[test]
    fn test_colored_summary() {
        let mut run = summary(false);
        run.report = crate::results::aggregate(
            &[WorkerOutcome::finished(
                WorkerIdentity::Numbered(1),
                Vec::new(),
                Some(1),
                "1 example, 1 failure\n".to_string(),
                String::new(),
                0.1,
            )],
            &crate::frameworks::RSpec::default(),
        );
        let report = ResultFormatter::default()
            .with_color(true)
            .format_report(&run, false);
        assert!(report.contains("\x1b[31m1 example, 1 failure\x1b[0m"));
    }

    #[test]
    fn test_json_report() {
        let report = ResultFormatter::new(OutputFormat::Json).format_report(&summary(true), true);
        let value: serde_json::Value = serde_json::from_str(&report).unwrap();
        assert_eq!(value["framework"], "cucumber");
        assert_eq!(value["success"], true);
        assert_eq!(value["failures"][0], "features/a.feature:3");
        assert!(value["timestamp"].is_string());
        assert!(value["workers"][0].get("stdout").is_none());
    }

    #[test]
    fn test_format_groups() {
        let groups = vec![
            (Group::new(vec![TestFile::new("a_spec.rb")]), 1.0),
            (Group::default(), 0.0),
        ];
        let text = ResultFormatter::default().format_groups(&groups);
        assert_eq!(
            text,
            "Group 1 (1 file, cost 1.00):\n  a_spec.rb\nGroup 2 (0 files, cost 0.00):\n"
        );

        let json = ResultFormatter::new(OutputFormat::Json).format_groups(&groups);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["files"][0], "a_spec.rb");
        assert_eq!(value[1]["worker"], 2);
    }
}
