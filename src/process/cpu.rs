//! CPU time sampling for processes and the whole system.
//!
//! This module parses accumulated CPU ticks from `/proc/<pid>/stat` and the
//! aggregate `cpu` line of `/proc/stat`, converting them to seconds.

use once_cell::sync::Lazy;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::process::scanner::DEFAULT_PROC_ROOT;

/// Get system clock ticks per second (usually 100, but can vary).
fn get_clk_tck() -> f64 {
    #[cfg(unix)]
    {
        // SAFETY: sysconf is safe to call with _SC_CLK_TCK
        // Returns -1 on error, 0 if undefined - both are handled by the > 0 check
        unsafe {
            let tck = libc::sysconf(libc::_SC_CLK_TCK);
            if tck > 0 {
                return tck as f64;
            }
        }
    }
    // Fallback to common default for error cases or non-Unix platforms
    100.0
}

/// Get the number of online logical processors.
fn get_online_cpus() -> usize {
    #[cfg(unix)]
    {
        // SAFETY: sysconf is safe to call with _SC_NPROCESSORS_ONLN
        unsafe {
            let n = libc::sysconf(libc::_SC_NPROCESSORS_ONLN);
            if n > 0 {
                return n as usize;
            }
        }
    }
    1
}

/// System clock ticks per second (for CPU time calculation).
pub static CLK_TCK: Lazy<f64> = Lazy::new(get_clk_tck);

/// Number of online logical processors.
pub static NUM_CPUS: Lazy<usize> = Lazy::new(get_online_cpus);

/// Number of leading tick fields of the aggregate `cpu` line that are summed:
/// user, nice, system, idle, iowait, irq, softirq.
const SYSTEM_TICK_FIELDS: usize = 7;

/// Offsets of utime and stime among the fields following the `)` that closes
/// the process name (fields 14 and 15 of proc(5)).
const UTIME_AFTER_COMM: usize = 11;
const STIME_AFTER_COMM: usize = 12;

/// Errors raised while sampling CPU time.
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("process {pid} vanished: {source}")]
    Vanished { pid: u32, source: io::Error },

    #[error("malformed stat data in {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("cannot read system cpu time from {path}: {source}")]
    SystemStat { path: PathBuf, source: io::Error },

    #[error("malformed system cpu time in {path}: {reason}")]
    MalformedSystemStat { path: PathBuf, reason: String },
}

impl SampleError {
    /// True when the process is gone (or hidden from us); callers skip it.
    pub fn is_vanished(&self) -> bool {
        matches!(self, SampleError::Vanished { .. })
    }

    /// True when the system-wide reading failed; no process can be measured.
    pub fn is_system(&self) -> bool {
        matches!(
            self,
            SampleError::SystemStat { .. } | SampleError::MalformedSystemStat { .. }
        )
    }
}

/// Source of accumulated CPU time, in seconds.
///
/// The process and system readings are taken back to back so that the pair
/// describes the same instant.
pub trait CpuTimeSource {
    /// Accumulated user + system time of one process.
    fn process_cputime(&self, pid: u32) -> Result<f64, SampleError>;

    /// Accumulated time of all CPUs, idle included.
    fn system_cputime(&self) -> Result<f64, SampleError>;
}

/// `CpuTimeSource` backed by a procfs mount.
#[derive(Debug, Clone)]
pub struct ProcFs {
    root: PathBuf,
    clk_tck: f64,
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new(DEFAULT_PROC_ROOT)
    }
}

impl ProcFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_clock_rate(root, *CLK_TCK)
    }

    /// Uses an explicit tick rate instead of the one reported by sysconf.
    pub fn with_clock_rate(root: impl Into<PathBuf>, clk_tck: f64) -> Self {
        Self {
            root: root.into(),
            clk_tck,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl CpuTimeSource for ProcFs {
    fn process_cputime(&self, pid: u32) -> Result<f64, SampleError> {
        let stat_path = self.root.join(pid.to_string()).join("stat");
        let content =
            fs::read_to_string(&stat_path).map_err(|source| SampleError::Vanished { pid, source })?;
        let ticks = parse_process_ticks(&content).map_err(|reason| SampleError::Malformed {
            path: stat_path,
            reason,
        })?;
        Ok(ticks / self.clk_tck)
    }

    fn system_cputime(&self) -> Result<f64, SampleError> {
        let stat_path = self.root.join("stat");
        let content = fs::read_to_string(&stat_path).map_err(|source| SampleError::SystemStat {
            path: stat_path.clone(),
            source,
        })?;
        let ticks =
            parse_system_ticks(&content).map_err(|reason| SampleError::MalformedSystemStat {
                path: stat_path,
                reason,
            })?;
        Ok(ticks / self.clk_tck)
    }
}

/// Extracts utime + stime ticks from a `/proc/<pid>/stat` line.
///
/// The process name may contain spaces and parentheses, so fields are counted
/// from the last `)` of the line.
pub fn parse_process_ticks(content: &str) -> Result<f64, String> {
    let close = content
        .rfind(')')
        .ok_or_else(|| "missing ')' after process name".to_string())?;
    let fields: Vec<&str> = content[close + 1..].split_whitespace().collect();
    if fields.len() <= STIME_AFTER_COMM {
        return Err(format!(
            "expected at least {} fields after process name, got {}",
            STIME_AFTER_COMM + 1,
            fields.len()
        ));
    }

    let utime: f64 = fields[UTIME_AFTER_COMM]
        .parse()
        .map_err(|e| format!("invalid utime '{}': {}", fields[UTIME_AFTER_COMM], e))?;
    let stime: f64 = fields[STIME_AFTER_COMM]
        .parse()
        .map_err(|e| format!("invalid stime '{}': {}", fields[STIME_AFTER_COMM], e))?;

    Ok(utime + stime)
}

/// Sums the first seven tick fields of the aggregate `cpu` line of `/proc/stat`.
pub fn parse_system_ticks(content: &str) -> Result<f64, String> {
    let line = content
        .lines()
        .next()
        .ok_or_else(|| "empty stat file".to_string())?;
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some("cpu") => {}
        other => return Err(format!("expected aggregate 'cpu' line, got {:?}", other)),
    }

    let mut total = 0.0;
    let mut seen = 0;
    for field in parts.take(SYSTEM_TICK_FIELDS) {
        let ticks: f64 = field
            .parse()
            .map_err(|e| format!("invalid tick field '{}': {}", field, e))?;
        total += ticks;
        seen += 1;
    }
    if seen < SYSTEM_TICK_FIELDS {
        return Err(format!(
            "expected {} tick fields, got {}",
            SYSTEM_TICK_FIELDS, seen
        ));
    }

    Ok(total)
}
