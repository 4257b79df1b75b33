//! Platform helpers
//!
//! Small OS-portability shim: filesystem housekeeping, shell invocation and
//! environment export syntax.

use std::io;
use std::path::Path;

/// Shell program and the flag that makes it run a command string
pub fn shell() -> (&'static str, &'static str) {
    if cfg!(windows) {
        ("cmd", "/C")
    } else {
        ("sh", "-c")
    }
}

/// Shell snippet that exports `name=value` for the commands following it
pub fn export_environment_variable(name: &str, value: &str) -> String {
    if cfg!(windows) {
        format!("SET {name}={value}")
    } else {
        format!("export {name}={value}")
    }
}

/// Number of CPUs available to this process
pub fn processor_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Remove files, ignoring paths that do not exist
pub fn rm_f<P: AsRef<Path>>(paths: &[P]) -> io::Result<()> {
    for path in paths {
        ignore_not_found(std::fs::remove_file(path.as_ref()))?;
    }
    Ok(())
}

/// Create directories and their parents
pub fn mkdir_p<P: AsRef<Path>>(paths: &[P]) -> io::Result<()> {
    for path in paths {
        std::fs::create_dir_all(path.as_ref())?;
    }
    Ok(())
}

fn ignore_not_found(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
