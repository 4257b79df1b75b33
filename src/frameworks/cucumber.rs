//! Cucumber
//!
//! Prints two independent summary lines per run (scenarios and steps) and
//! writes failing scenarios to a rerun log per worker.

use regex::Regex;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use super::{bundler_enabled, join_command, CommandOptions, Framework};
use crate::models::WorkerIdentity;
use crate::platform;
use crate::results::{Layout, ResultSyntax};

const FAILURE_LOG_DIR: &str = "log_files";

/// Config files that may define a `parallel` profile
const PROFILE_LOCATIONS: &[&str] = &[
    "cucumber.yml",
    "cucumber.yaml",
    ".config/cucumber.yml",
    ".config/cucumber.yaml",
    "config/cucumber.yml",
    "config/cucumber.yaml",
];

/// `cucumber` runner for `*.feature` files
#[derive(Clone, Debug, Default)]
pub struct Cucumber {
    options: CommandOptions,
}

impl Cucumber {
    pub fn new(options: CommandOptions) -> Self {
        Self { options }
    }

    fn executable(&self) -> String {
        if let Some(exe) = &self.options.executable {
            exe.clone()
        } else if bundler_enabled() {
            "bundle exec cucumber".to_string()
        } else if Path::new("script/cucumber").is_file() {
            "script/cucumber".to_string()
        } else {
            "cucumber".to_string()
        }
    }

    /// Test options, plus `--profile parallel` when the user did not pick a
    /// profile and the cucumber config defines one
    fn cucumber_options(&self) -> Option<String> {
        static PROFILE_FLAG: OnceLock<Regex> = OnceLock::new();
        let given = self.options.test_options.clone().unwrap_or_default();
        let picks_profile = PROFILE_FLAG
            .get_or_init(|| Regex::new(r"(^|\s)(--profile|-p)(\s|=|$)").expect("valid regex"))
            .is_match(&given);
        if picks_profile {
            return Some(given);
        }

        let profile = parallel_profile_configured().then_some("--profile parallel");
        let joined = [Some(given.as_str()), profile]
            .iter()
            .flatten()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        (!joined.is_empty()).then_some(joined)
    }

    fn rerun_log(identity: WorkerIdentity) -> String {
        let number = identity.number().unwrap_or(0);
        format!("{FAILURE_LOG_DIR}/rerun{number}.txt")
    }
}

fn parallel_profile_configured() -> bool {
    PROFILE_LOCATIONS
        .iter()
        .find(|p| Path::new(p).is_file())
        .and_then(|p| std::fs::read_to_string(p).ok())
        .map(|content| content.lines().any(|l| l.starts_with("parallel:")))
        .unwrap_or(false)
}

impl ResultSyntax for Cucumber {
    fn is_result_line(&self, line: &str) -> bool {
        static RESULT: OnceLock<Regex> = OnceLock::new();
        RESULT
            .get_or_init(|| Regex::new(r"^\d+ (steps?|scenarios?)").expect("valid regex"))
            .is_match(line.trim_start())
    }

    fn families(&self) -> &[&'static str] {
        &["scenario", "step"]
    }

    fn precedence(&self) -> &[&'static str] {
        &[
            "scenario",
            "step",
            "failed",
            "undefined",
            "skipped",
            "pending",
            "passed",
        ]
    }

    fn layout(&self) -> Layout {
        Layout::Parenthesized
    }

    fn pluralizes(&self, family: &str, category: &str) -> bool {
        family == category
    }

    fn empty_lines(&self) -> Vec<String> {
        vec!["0 scenarios".to_string(), "0 steps".to_string()]
    }
}

impl Framework for Cucumber {
    fn name(&self) -> &'static str {
        "cucumber"
    }

    fn unit_name(&self) -> &'static str {
        "feature"
    }

    fn test_suffix(&self) -> &'static str {
        ".feature"
    }

    fn default_dir(&self) -> &'static str {
        "features"
    }

    fn build_command(&self, files: &[&str], identity: WorkerIdentity) -> String {
        let exe = self.executable();
        let options = self.cucumber_options();
        let failure_log = format!("--format rerun --out {}", Self::rerun_log(identity));
        join_command(
            &[
                Some(exe.as_str()),
                options.as_deref(),
                Some(failure_log.as_str()),
            ],
            files,
        )
    }

    fn failure_log_dir(&self) -> Option<PathBuf> {
        Some(PathBuf::from(FAILURE_LOG_DIR))
    }

    /// Number of steps the feature will execute
    fn weigh(&self, path: &Path) -> Option<f64> {
        std::fs::read_to_string(path)
            .ok()
            .map(|content| count_steps(&content) as f64)
    }

    fn prepare(&self) -> io::Result<()> {
        platform::mkdir_p(&[FAILURE_LOG_DIR])
    }

    fn syntax(&self) -> &dyn ResultSyntax {
        self
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Background,
    Scenario,
    Outline,
    Examples,
}

/// Count the steps a feature file executes.
///
/// Background steps run once per scenario and outline steps once per example
/// row.
pub fn count_steps(content: &str) -> usize {
    let mut total = 0;
    let mut background = 0;
    let mut section = Section::Preamble;
    let mut outline_steps = 0;
    let mut outline_rows = 0;
    let mut header_seen = false;

    for line in content.lines().map(str::trim) {
        if line.starts_with("Background:") {
            section = Section::Background;
        } else if line.starts_with("Scenario Outline:") || line.starts_with("Scenario Template:") {
            flush_outline(&mut outline_steps, &mut outline_rows, &mut total, background);
            section = Section::Outline;
        } else if line.starts_with("Scenario:") || line.starts_with("Example:") {
            flush_outline(&mut outline_steps, &mut outline_rows, &mut total, background);
            total += background;
            section = Section::Scenario;
        } else if line.starts_with("Examples:") || line.starts_with("Scenarios:") {
            section = Section::Examples;
            header_seen = false;
        } else if line.starts_with('|') {
            if section == Section::Examples {
                if header_seen {
                    outline_rows += 1;
                } else {
                    header_seen = true;
                }
            }
        } else if is_step(line) {
            match section {
                Section::Background => background += 1,
                Section::Scenario => total += 1,
                Section::Outline => outline_steps += 1,
                Section::Preamble | Section::Examples => {}
            }
        }
    }
    flush_outline(&mut outline_steps, &mut outline_rows, &mut total, background);

    total
}

fn flush_outline(steps: &mut usize, rows: &mut usize, total: &mut usize, background: usize) {
    *total += (*steps + background) * *rows;
    *steps = 0;
    *rows = 0;
}

fn is_step(line: &str) -> bool {
    ["Given ", "When ", "Then ", "And ", "But ", "* "]
        .iter()
        .any(|keyword| line.starts_with(keyword))
}
