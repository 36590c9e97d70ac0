//! Process-related modules for CPU attribution of logical process groups.
//!
//! This module provides:
//! - `scanner`: Process table enumeration
//! - `matcher`: pidfile / exe / cmdline matchers
//! - `groups`: Resolution of configured groups into matchers
//! - `cpu`: Process and system CPU time sampling
//! - `delta`: Per-pid delta cache and per-group utilization sums

pub mod cpu;
pub mod delta;
pub mod groups;
pub mod matcher;
pub mod scanner;

// Re-export commonly used types
pub use cpu::{CpuTimeSource, ProcFs, SampleError, CLK_TCK, NUM_CPUS};
pub use delta::{CpuDelta, CpuSample, DeltaCache, UtilizationAccumulator, DEFAULT_SETTLE_DELAY};
pub use groups::{FilterDecision, FilterResolution, GroupSpec, ProcessGroup, ProcessGroupsConfig};
pub use matcher::{Matcher, MatcherError, MatcherKind, ProcessMatcher};
pub use scanner::{ProcessHandle, ProcessTable, DEFAULT_PROC_ROOT};
