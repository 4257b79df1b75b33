//! Splitting test files into balanced groups
//!
//! One group per worker. `count` deals files out round-robin; `runtime` and
//! `weight` pack them greedily by estimated cost so that the slowest group
//! finishes as early as possible.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use crate::models::{Group, RunError, TestFile};

/// Grouping strategy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    /// Equal file counts, ignoring cost
    #[default]
    Count,
    /// Previously observed runtimes
    Runtime,
    /// Static per-file weight (scenario steps, file size)
    Weight,
}

impl FromStr for GroupBy {
    type Err = RunError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "count" | "found" => Ok(GroupBy::Count),
            "runtime" => Ok(GroupBy::Runtime),
            "weight" | "steps" | "filesize" => Ok(GroupBy::Weight),
            _ => Err(RunError::UnknownStrategy(s.to_string())),
        }
    }
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupBy::Count => write!(f, "count"),
            GroupBy::Runtime => write!(f, "runtime"),
            GroupBy::Weight => write!(f, "weight"),
        }
    }
}

/// Split `files` into exactly `n` groups.
///
/// Every file lands in exactly one group; groups beyond the number of files
/// are empty. `costs` is only consulted by [`GroupBy::Runtime`].
pub fn group(
    files: &[TestFile],
    n: usize,
    strategy: GroupBy,
    costs: &HashMap<String, f64>,
) -> Result<Vec<Group>, RunError> {
    if n == 0 {
        return Err(RunError::ZeroWorkers);
    }

    let groups = match strategy {
        GroupBy::Count => round_robin(files, n),
        GroupBy::Runtime => match runtime_costs(files, costs) {
            Some(file_costs) => pack(files, &file_costs, n),
            None => {
                info!("No runtime history for these files, grouping by count");
                round_robin(files, n)
            }
        },
        GroupBy::Weight => {
            let file_costs: Vec<f64> = files.iter().map(|f| f.weight.unwrap_or(1.0)).collect();
            pack(files, &file_costs, n)
        }
    };

    debug!(
        "Grouped {} files into {} groups by {}: {:?}",
        files.len(),
        n,
        strategy,
        groups.iter().map(Group::len).collect::<Vec<_>>()
    );
    Ok(groups)
}

/// Estimated cost of each group under the given strategy, using the same
/// per-file costs as [`group`]
pub fn group_costs(groups: &[Group], strategy: GroupBy, costs: &HashMap<String, f64>) -> Vec<f64> {
    let runtime: Option<HashMap<&str, f64>> = match strategy {
        GroupBy::Runtime => {
            let files: Vec<TestFile> = groups.iter().flat_map(|g| g.files.iter().cloned()).collect();
            runtime_costs(&files, costs).map(|file_costs| {
                groups
                    .iter()
                    .flat_map(|g| g.files.iter().map(|f| f.path.as_str()))
                    .zip(file_costs)
                    .collect()
            })
        }
        _ => None,
    };

    groups
        .iter()
        .map(|g| {
            g.files
                .iter()
                .map(|f| match strategy {
                    GroupBy::Count => 1.0,
                    GroupBy::Runtime => runtime
                        .as_ref()
                        .and_then(|r| r.get(f.path.as_str()).copied())
                        .unwrap_or(1.0),
                    GroupBy::Weight => f.weight.unwrap_or(1.0),
                })
                .sum()
        })
        .collect()
}

fn round_robin(files: &[TestFile], n: usize) -> Vec<Group> {
    let mut groups = vec![Group::default(); n];
    for (i, file) in files.iter().enumerate() {
        groups[i % n].files.push(file.clone());
    }
    groups
}

/// Cost per file from runtime history; unknown files get the mean of the
/// known ones. `None` when no file has any history.
fn runtime_costs(files: &[TestFile], costs: &HashMap<String, f64>) -> Option<Vec<f64>> {
    let known: Vec<f64> = files
        .iter()
        .filter_map(|f| costs.get(&f.path).copied())
        .collect();
    if known.is_empty() {
        return None;
    }

    let average = known.iter().sum::<f64>() / known.len() as f64;
    Some(
        files
            .iter()
            .map(|f| costs.get(&f.path).copied().unwrap_or(average))
            .collect(),
    )
}

/// Greedy packing: most expensive file first, always into the cheapest
/// group. Bucket ties go to the group with fewer files, then the lower index.
fn pack(files: &[TestFile], file_costs: &[f64], n: usize) -> Vec<Group> {
    let mut order: Vec<usize> = (0..files.len()).collect();
    // Stable, so equal costs keep their input order
    order.sort_by(|&a, &b| file_costs[b].total_cmp(&file_costs[a]));

    let mut groups = vec![Group::default(); n];
    let mut totals = vec![0.0f64; n];

    for index in order {
        let target = (0..n)
            .min_by(|&x, &y| {
                totals[x]
                    .total_cmp(&totals[y])
                    .then(groups[x].len().cmp(&groups[y].len()))
            })
            .unwrap_or(0);
        totals[target] += file_costs[index];
        groups[target].files.push(files[index].clone());
    }

    groups
}
