//! Merging per-worker summary lines into one report

use serde::Serialize;
use tracing::debug;

use super::syntax::{strip_ansi, Layout, ResultSyntax};
use crate::models::{WorkerIdentity, WorkerOutcome};

/// Summed counts of one family, in display order
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FamilySummary {
    pub family: String,
    pub counts: Vec<(String, u64)>,
    /// Display line, e.g. `2 examples, 0 failures`
    pub line: String,
}

impl FamilySummary {
    pub fn count(&self, category: &str) -> Option<u64> {
        self.counts
            .iter()
            .find(|(c, _)| c == category)
            .map(|(_, n)| *n)
    }
}

/// Combined result of all workers
#[derive(Clone, Debug, Default, Serialize)]
pub struct AggregateReport {
    pub families: Vec<FamilySummary>,
    pub failed_workers: Vec<WorkerIdentity>,
    pub success: bool,
}

impl AggregateReport {
    pub fn family(&self, family: &str) -> Option<&FamilySummary> {
        self.families.iter().find(|f| f.family == family)
    }

    /// One line per family
    pub fn summary(&self) -> String {
        self.families
            .iter()
            .map(|f| f.line.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Sum the summary lines of every worker.
///
/// Lines are grouped into families by their first category and families are
/// never added together. Workers that ran nothing contribute the syntax's
/// zero lines. Families without any matching line are left out.
pub fn aggregate(outcomes: &[WorkerOutcome], syntax: &dyn ResultSyntax) -> AggregateReport {
    let mut raw: Vec<(String, Vec<(String, u64)>)> = Vec::new();

    for outcome in outcomes {
        let text = if outcome.spawned {
            outcome.output()
        } else {
            syntax.empty_lines().join("\n")
        };

        for line in text.lines() {
            let line = strip_ansi(line);
            if !syntax.is_result_line(&line) {
                continue;
            }
            let pairs = syntax.parse_line(&line);
            let Some((family, _)) = pairs.first() else {
                continue;
            };
            debug!("{}: summary line {:?}", outcome.identity, line.trim());
            let family = family.clone();

            let slot = match raw.iter().position(|(f, _)| *f == family) {
                Some(i) => i,
                None => {
                    raw.push((family, Vec::new()));
                    raw.len() - 1
                }
            };
            add_counts(&mut raw[slot].1, pairs);
        }
    }

    let declared = syntax.families();
    raw.sort_by_key(|(family, _)| rank(declared, family));

    let families = raw
        .into_iter()
        .map(|(family, counts)| {
            let counts = order_categories(&family, counts, syntax.precedence());
            let line = format_family(&family, &counts, syntax);
            FamilySummary {
                family,
                counts,
                line,
            }
        })
        .collect();

    let failed_workers: Vec<WorkerIdentity> = outcomes
        .iter()
        .filter(|o| !o.is_success())
        .map(|o| o.identity)
        .collect();

    AggregateReport {
        families,
        success: failed_workers.is_empty(),
        failed_workers,
    }
}

fn add_counts(totals: &mut Vec<(String, u64)>, pairs: Vec<(String, u64)>) {
    for (category, count) in pairs {
        match totals.iter_mut().find(|(c, _)| *c == category) {
            Some((_, total)) => *total += count,
            None => totals.push((category, count)),
        }
    }
}

/// Position in `order`, unknown entries after all known ones. Sorting by this
/// key is stable, so unknown entries keep their first-seen order.
fn rank(order: &[&str], word: &str) -> usize {
    order.iter().position(|w| *w == word).unwrap_or(usize::MAX)
}

fn order_categories(
    family: &str,
    mut counts: Vec<(String, u64)>,
    precedence: &[&str],
) -> Vec<(String, u64)> {
    counts.sort_by_key(|(category, _)| {
        if category == family {
            (0, 0)
        } else {
            (1, rank(precedence, category))
        }
    });
    counts
}

fn format_family(family: &str, counts: &[(String, u64)], syntax: &dyn ResultSyntax) -> String {
    let words: Vec<String> = counts
        .iter()
        .map(|(category, count)| {
            let suffix = if *count != 1
                && syntax.knows(category)
                && syntax.pluralizes(family, category)
            {
                "s"
            } else {
                ""
            };
            format!("{count} {category}{suffix}")
        })
        .collect();

    match (syntax.layout(), words.split_first()) {
        (_, None) => String::new(),
        (Layout::CommaList, _) => words.join(", "),
        (Layout::Parenthesized, Some((first, rest))) if rest.is_empty() => first.clone(),
        (Layout::Parenthesized, Some((first, rest))) => {
            format!("{} ({})", first, rest.join(", "))
        }
    }
}
