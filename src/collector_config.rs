//! Configuration types consumed by the collectors.
//!
//! These are embedded in the host configuration under `collectors:` and can be
//! built directly when the library is used without the bundled host.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::process::ProcessGroupsConfig;

pub const DEFAULT_PROCESSCPU_PATH: &str = "processcpu";
pub const DEFAULT_NUMASTAT_PATH: &str = "numastat";
pub const DEFAULT_NODE_ROOT: &str = "/sys/devices/system/node";
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 100;

/// Settings of the process CPU collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessCpuConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metric path prefix (default: "processcpu")
    #[serde(default = "default_processcpu_path")]
    pub path: String,

    /// Process table root (default: /proc)
    #[serde(default = "default_proc_root", alias = "proc-root")]
    pub proc_root: PathBuf,

    /// Pause after the first sample of a new pid, in milliseconds (default: 100)
    #[serde(default = "default_settle_delay_ms", alias = "settle-delay-ms")]
    pub settle_delay_ms: u64,

    /// Override of the online CPU count used to scale utilization
    #[serde(default, alias = "cpu-count")]
    pub cpu_count: Option<usize>,

    /// Logical groups: name -> { pidfile | exe | cmdline: filter }
    #[serde(default)]
    pub process: ProcessGroupsConfig,
}

fn default_true() -> bool {
    true
}
fn default_processcpu_path() -> String {
    DEFAULT_PROCESSCPU_PATH.to_string()
}
fn default_proc_root() -> PathBuf {
    PathBuf::from(crate::process::DEFAULT_PROC_ROOT)
}
fn default_settle_delay_ms() -> u64 {
    DEFAULT_SETTLE_DELAY_MS
}

impl Default for ProcessCpuConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_processcpu_path(),
            proc_root: default_proc_root(),
            settle_delay_ms: default_settle_delay_ms(),
            cpu_count: None,
            process: ProcessGroupsConfig::new(),
        }
    }
}

/// Settings of the NUMA statistics collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumastatConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Metric path prefix (default: "numastat")
    #[serde(default = "default_numastat_path")]
    pub path: String,

    /// Directory holding the node*/numastat files
    #[serde(default = "default_node_root", alias = "node-root")]
    pub node_root: PathBuf,
}

fn default_numastat_path() -> String {
    DEFAULT_NUMASTAT_PATH.to_string()
}
fn default_node_root() -> PathBuf {
    PathBuf::from(DEFAULT_NODE_ROOT)
}

impl Default for NumastatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_numastat_path(),
            node_root: default_node_root(),
        }
    }
}

/// All collector sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectorsConfig {
    #[serde(default)]
    pub processcpu: ProcessCpuConfig,
    #[serde(default)]
    pub numastat: NumastatConfig,
}
