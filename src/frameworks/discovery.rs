//! Finding test files on disk

use anyhow::{Context, Result};
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use super::Framework;
use crate::models::TestFile;

/// Collect the test files named by `paths`.
///
/// Directories are searched recursively for files ending in the framework's
/// suffix; files named explicitly are taken as they are. Duplicates are
/// dropped, keeping the first occurrence. With no paths the framework's
/// default directory is searched.
pub fn discover(
    paths: &[PathBuf],
    framework: &dyn Framework,
    pattern: Option<&Regex>,
) -> Result<Vec<TestFile>> {
    let default_dir = [PathBuf::from(framework.default_dir())];
    let roots = if paths.is_empty() {
        &default_dir[..]
    } else {
        paths
    };

    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for root in roots {
        let found = if root.is_dir() {
            walk(root, framework.test_suffix())
                .with_context(|| format!("Failed to read test directory: {}", root.display()))?
        } else if root.exists() {
            vec![root.clone()]
        } else if paths.is_empty() {
            Vec::new()
        } else {
            anyhow::bail!("No such test file or directory: {}", root.display());
        };

        for path in found {
            let name = path.to_string_lossy().into_owned();
            if pattern.map(|re| !re.is_match(&name)).unwrap_or(false) {
                continue;
            }
            if seen.insert(name.clone()) {
                let mut file = TestFile::new(name);
                file.weight = framework.weigh(&path);
                files.push(file);
            }
        }
    }

    debug!("Discovered {} {} files", files.len(), framework.unit_name());
    Ok(files)
}

/// Files under `dir` ending in `suffix`, sorted. Symlinked directories are
/// not descended into.
fn walk(dir: &Path, suffix: &str) -> Result<Vec<PathBuf>, walkdir::Error> {
    let mut found = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let path = entry?.into_path();
        if path.is_file() && path.to_string_lossy().ends_with(suffix) {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}
