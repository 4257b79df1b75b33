//! Framework-specific summary line syntax

use regex::Regex;
use std::sync::OnceLock;

/// How the categories of one family are joined into a summary line
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    /// `2 examples, 0 failures`
    CommaList,
    /// `2 scenarios (1 failed, 1 passed)`
    Parenthesized,
}

/// Recognises and parses the count lines a test framework prints at the end
/// of a run.
pub trait ResultSyntax: Send + Sync {
    /// True if `line` is a summary line
    fn is_result_line(&self, line: &str) -> bool;

    /// `(category, count)` pairs of a summary line, categories singular.
    /// The first pair names the line's family.
    fn parse_line(&self, line: &str) -> Vec<(String, u64)> {
        let known: Vec<&str> = self
            .families()
            .iter()
            .chain(self.precedence())
            .copied()
            .collect();
        scan_counts(line, &known)
    }

    /// Families in display order
    fn families(&self) -> &[&'static str];

    /// Secondary categories in display order
    fn precedence(&self) -> &[&'static str];

    fn layout(&self) -> Layout {
        Layout::CommaList
    }

    /// Whether `category` is one of the syntax's own words
    fn knows(&self, category: &str) -> bool {
        self.families()
            .iter()
            .chain(self.precedence())
            .any(|known| *known == category)
    }

    /// Whether `category` takes a plural `s` when its count is not 1
    fn pluralizes(&self, family: &str, category: &str) -> bool {
        let _ = family;
        category != "pending"
    }

    /// Lines standing in for a worker that had no files to run
    fn empty_lines(&self) -> Vec<String>;
}

/// Generic `<count> <word>` scanner shared by the built-in syntaxes.
/// Plurals of `known` words are singularized, anything else is kept as printed.
pub fn scan_counts(line: &str, known: &[&str]) -> Vec<(String, u64)> {
    static COUNT: OnceLock<Regex> = OnceLock::new();
    let re = COUNT.get_or_init(|| Regex::new(r"(\d+) ([a-z]+)").expect("valid regex"));

    re.captures_iter(line)
        .filter_map(|caps| {
            let count = caps[1].parse().ok()?;
            Some((singularize(&caps[2], known), count))
        })
        .collect()
}

/// Remove terminal escape sequences from captured output
pub fn strip_ansi(line: &str) -> std::borrow::Cow<'_, str> {
    static ANSI: OnceLock<Regex> = OnceLock::new();
    let re = ANSI.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").expect("valid regex"));
    re.replace_all(line, "")
}

/// `examples` -> `example` when `example` is a known word
pub fn singularize(word: &str, known: &[&str]) -> String {
    match word.strip_suffix('s') {
        Some(stem) if !known.contains(&word) && known.contains(&stem) => stem.to_string(),
        _ => word.to_string(),
    }
}
