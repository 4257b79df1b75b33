//! Side-channel failure logs
//!
//! Some frameworks write the failing tests of each worker to a file (cucumber's
//! rerun format). These are merged after the run and removed.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::platform;

/// Read every `*.txt` log in `dir`, returning one entry per whitespace
/// separated token, then delete the logs.
pub fn collect_failure_logs(dir: &Path) -> Vec<String> {
    let logs = match log_files(dir) {
        Ok(logs) => logs,
        Err(e) => {
            debug!("No failure logs in {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut entries = Vec::new();
    for log in &logs {
        match std::fs::read_to_string(log) {
            Ok(text) => entries.extend(text.split_whitespace().map(str::to_string)),
            Err(e) => warn!("Failed to read failure log {}: {}", log.display(), e),
        }
    }

    if let Err(e) = platform::rm_f(&logs) {
        warn!("Failed to delete failure logs in {}: {}", dir.display(), e);
    }
    entries
}

fn log_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut logs: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().map(|e| e == "txt").unwrap_or(false))
        .collect();
    logs.sort();
    Ok(logs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_collects_and_deletes_logs() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("rerun1.txt"), "features/a.feature:3").unwrap();
        std::fs::write(
            dir.path().join("rerun2.txt"),
            "features/b.feature:7 features/c.feature:1\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.md"), "keep me").unwrap();

        let entries = collect_failure_logs(dir.path());
        assert_eq!(
            entries,
            vec![
                "features/a.feature:3",
                "features/b.feature:7",
                "features/c.feature:1"
            ]
        );
        assert!(!dir.path().join("rerun1.txt").exists());
        assert!(dir.path().join("notes.md").exists());
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let dir = tempdir().unwrap();
        assert!(collect_failure_logs(&dir.path().join("log_files")).is_empty());
    }
}
