//! Process table enumeration.
//!
//! This module lists the numeric entries of a `/proc`-style directory once per
//! collection cycle and hands out a `ProcessHandle` for each of them.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default location of the process table.
pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// Process entry representing a directory in the process table.
///
/// Handles are created fresh every cycle; only `pid` outlives a cycle as a
/// delta cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
    id: String,
    pub proc_path: PathBuf,
}

impl ProcessHandle {
    /// Builds a handle for `pid` below `root`.
    pub fn new(root: &Path, pid: u32) -> Self {
        let id = pid.to_string();
        let proc_path = root.join(&id);
        Self { pid, id, proc_path }
    }

    /// Identifier in the textual form the process table uses.
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// A process table rooted at a directory (normally `/proc`).
#[derive(Debug, Clone)]
pub struct ProcessTable {
    root: PathBuf,
}

impl Default for ProcessTable {
    fn default() -> Self {
        Self::new(DEFAULT_PROC_ROOT)
    }
}

impl ProcessTable {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lazily enumerates all numeric directory entries of the table.
    ///
    /// The order is whatever the directory listing yields. Fails only when the
    /// root itself cannot be listed.
    pub fn processes(&self) -> io::Result<impl Iterator<Item = ProcessHandle>> {
        let entries = fs::read_dir(&self.root)?;

        Ok(entries.flatten().filter_map(|entry| {
            let name = entry.file_name();
            let name = name.to_str()?;
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            // file_type() does not follow symlinks, which matches /proc/self
            // being skipped by the digit check anyway.
            match entry.file_type() {
                Ok(ft) if ft.is_dir() => {}
                Ok(_) => return None,
                Err(e) => {
                    debug!("Skipping {}: {}", name, e);
                    return None;
                }
            }
            let pid: u32 = name.parse().ok()?;
            if pid == 0 {
                return None;
            }
            Some(ProcessHandle {
                pid,
                id: name.to_string(),
                proc_path: entry.path(),
            })
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    // -------------------------------------------------------------------------
    // Tests for ProcessTable::processes
    // -------------------------------------------------------------------------

    #[test]
    fn test_processes_only_numeric_directories() {
        let dir = tempdir().expect("Failed to create temp dir");
        for name in ["1", "42", "self", "sys", "4a2"] {
            fs::create_dir(dir.path().join(name)).expect("Failed to create dir");
        }
        // Numeric name but a regular file, not a process directory
        fs::write(dir.path().join("77"), "").expect("Failed to write file");
        fs::write(dir.path().join("stat"), "cpu 1 2 3").expect("Failed to write file");

        let table = ProcessTable::new(dir.path());
        let mut pids: Vec<u32> = table
            .processes()
            .expect("Failed to list process table")
            .map(|h| h.pid)
            .collect();
        pids.sort_unstable();

        assert_eq!(pids, vec![1, 42]);
    }

    #[test]
    fn test_process_handle_paths() {
        let dir = tempdir().expect("Failed to create temp dir");
        fs::create_dir(dir.path().join("314")).expect("Failed to create dir");

        let table = ProcessTable::new(dir.path());
        let handle = table
            .processes()
            .expect("Failed to list process table")
            .next()
            .expect("Expected one process");

        assert_eq!(handle.id(), "314");
        assert_eq!(handle.proc_path, dir.path().join("314"));
        assert_eq!(handle, ProcessHandle::new(dir.path(), 314));
    }

    #[test]
    fn test_processes_missing_root() {
        let dir = tempdir().expect("Failed to create temp dir");
        let table = ProcessTable::new(dir.path().join("does-not-exist"));
        assert!(table.processes().is_err());
    }
}
