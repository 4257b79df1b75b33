//! Persistent per-file runtime log
//!
//! Plain-text, append-only file with one `<file>:<seconds>` sample per line.
//! Later samples for the same file override earlier ones when read, so
//! estimates follow the suite as it changes.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::TestFile;
use crate::platform;

/// Runtime log errors
#[derive(Error, Debug)]
pub enum RuntimeLogError {
    #[error("Failed to create runtime log directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("Failed to write runtime log {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// Observed execution time of one file
#[derive(Clone, Debug, PartialEq)]
pub struct RuntimeSample {
    pub file: String,
    pub elapsed_secs: f64,
}

impl RuntimeSample {
    pub fn new(file: impl Into<String>, elapsed_secs: f64) -> Self {
        Self {
            file: file.into(),
            elapsed_secs,
        }
    }

    /// Parse a `<file>:<seconds>` line; the file is split at the last colon
    pub fn parse(line: &str) -> Option<Self> {
        let (file, secs) = line.trim().rsplit_once(':')?;
        let elapsed_secs: f64 = secs.trim().parse().ok()?;
        if file.is_empty() || !elapsed_secs.is_finite() || elapsed_secs < 0.0 {
            return None;
        }
        Some(Self::new(file, elapsed_secs))
    }

    fn to_line(&self) -> String {
        format!("{}:{:.4}", self.file, self.elapsed_secs)
    }
}

/// Append-only runtime log
#[derive(Clone, Debug)]
pub struct RuntimeLog {
    path: PathBuf,
}

impl RuntimeLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a single sample
    pub fn record(&self, file: &str, elapsed_secs: f64) -> Result<(), RuntimeLogError> {
        self.record_all(&[RuntimeSample::new(file, elapsed_secs)])
    }

    /// Append a batch of samples
    pub fn record_all(&self, samples: &[RuntimeSample]) -> Result<(), RuntimeLogError> {
        if samples.is_empty() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            platform::mkdir_p(&[parent]).map_err(|source| RuntimeLogError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        self.append(samples).map_err(|source| RuntimeLogError::Write {
            path: self.path.clone(),
            source,
        })?;

        debug!(
            "Recorded {} runtime samples to {}",
            samples.len(),
            self.path.display()
        );
        Ok(())
    }

    fn append(&self, samples: &[RuntimeSample]) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)?;

        let needs_newline = !ends_with_newline(&mut file)?;
        let mut writer = BufWriter::new(file);
        if needs_newline {
            writeln!(writer)?;
        }
        for sample in samples {
            writeln!(writer, "{}", sample.to_line())?;
        }
        writer.flush()
    }

    /// Per-file cost estimates; the most recent sample for a file wins.
    ///
    /// A missing or unreadable log yields an empty map, and malformed lines
    /// are skipped.
    pub fn read_estimates(&self) -> HashMap<String, f64> {
        let content = match std::fs::read(&self.path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return HashMap::new(),
            Err(e) => {
                warn!(
                    "Ignoring unreadable runtime log {}: {}",
                    self.path.display(),
                    e
                );
                return HashMap::new();
            }
        };

        let mut estimates = HashMap::new();
        let mut skipped = 0usize;
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match RuntimeSample::parse(line) {
                Some(sample) => {
                    estimates.insert(sample.file, sample.elapsed_secs);
                }
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            debug!(
                "Skipped {} malformed lines in {}",
                skipped,
                self.path.display()
            );
        }
        estimates
    }
}

fn ends_with_newline(file: &mut File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Split a worker's wall-clock time across the files it ran.
///
/// Shares are proportional to the previous estimates; files without one get
/// the mean of the known estimates, and the split is even when nothing is
/// known.
pub fn apportion(
    files: &[TestFile],
    elapsed_secs: f64,
    estimates: &HashMap<String, f64>,
) -> Vec<RuntimeSample> {
    if files.is_empty() {
        return Vec::new();
    }

    let known: Vec<f64> = files
        .iter()
        .filter_map(|f| estimates.get(&f.path).copied())
        .collect();
    let fallback = if known.is_empty() {
        0.0
    } else {
        known.iter().sum::<f64>() / known.len() as f64
    };

    let weights: Vec<f64> = files
        .iter()
        .map(|f| estimates.get(&f.path).copied().unwrap_or(fallback))
        .collect();
    let total: f64 = weights.iter().sum();

    files
        .iter()
        .zip(weights)
        .map(|(file, weight)| {
            let share = if total > 0.0 {
                weight / total
            } else {
                1.0 / files.len() as f64
            };
            RuntimeSample::new(file.path.clone(), elapsed_secs * share)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_sample() {
        let sample = RuntimeSample::parse("features/a.feature:1.5").unwrap();
        assert_eq!(sample.file, "features/a.feature");
        assert_eq!(sample.elapsed_secs, 1.5);

        let windows = RuntimeSample::parse("C:\\specs\\a_spec.rb:2").unwrap();
        assert_eq!(windows.file, "C:\\specs\\a_spec.rb");

        assert!(RuntimeSample::parse("x").is_none());
        assert!(RuntimeSample::parse(":1.0").is_none());
        assert!(RuntimeSample::parse("a.rb:-1").is_none());
        assert!(RuntimeSample::parse("a.rb:NaN").is_none());
    }

    #[test]
    fn test_missing_log_is_empty() {
        let dir = tempdir().unwrap();
        let log = RuntimeLog::new(dir.path().join("missing.log"));
        assert!(log.read_estimates().is_empty());
    }

    #[test]
    fn test_later_sample_wins() {
        let dir = tempdir().unwrap();
        let log = RuntimeLog::new(dir.path().join("runtime.log"));
        log.record("spec/a_spec.rb", 4.0).unwrap();
        log.record("spec/b_spec.rb", 1.0).unwrap();
        log.record("spec/a_spec.rb", 2.5).unwrap();

        let estimates = log.read_estimates();
        assert_eq!(estimates.len(), 2);
        assert_eq!(estimates["spec/a_spec.rb"], 2.5);
        assert_eq!(estimates["spec/b_spec.rb"], 1.0);
    }

    #[test]
    fn test_corrupt_lines_are_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tmp/runtime.log");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "x").unwrap();

        let log = RuntimeLog::new(&path);
        assert!(log.read_estimates().is_empty());

        log.record("features/good0.feature", 0.2).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "x\nfeatures/good0.feature:0.2000\n");
        assert_eq!(log.read_estimates()["features/good0.feature"], 0.2);
    }

    #[test]
    fn test_record_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let log = RuntimeLog::new(dir.path().join("a/b/runtime.log"));
        log.record_all(&[
            RuntimeSample::new("x_spec.rb", 1.0),
            RuntimeSample::new("y_spec.rb", 2.0),
        ])
        .unwrap();
        assert_eq!(log.read_estimates().len(), 2);
    }

    #[test]
    fn test_apportion_even_without_history() {
        let files = vec![TestFile::new("a"), TestFile::new("b")];
        let samples = apportion(&files, 4.0, &HashMap::new());
        assert_eq!(samples[0].elapsed_secs, 2.0);
        assert_eq!(samples[1].elapsed_secs, 2.0);
    }

    #[test]
    fn test_apportion_by_previous_estimates() {
        let files = vec![TestFile::new("a"), TestFile::new("b"), TestFile::new("c")];
        let estimates = HashMap::from([("a".to_string(), 3.0), ("b".to_string(), 1.0)]);
        // c falls back to the mean (2.0): weights 3, 1, 2
        let samples = apportion(&files, 12.0, &estimates);
        let secs: Vec<f64> = samples.iter().map(|s| s.elapsed_secs).collect();
        for (actual, expected) in secs.iter().zip([6.0, 2.0, 4.0]) {
            assert!((actual - expected).abs() < 1e-9, "{actual} != {expected}");
        }
    }
}
