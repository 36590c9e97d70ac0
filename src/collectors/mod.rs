//! Collectors module.
//!
//! A collector is polled once per tick by the host and publishes its samples
//! into a `MetricSink`:
//! - `processcpu`: CPU utilization of configured logical process groups
//! - `numastat`: NUMA allocation counters from sysfs

pub mod numastat;
pub mod processcpu;

use std::io;
use std::path::PathBuf;

use crate::sink::MetricSink;

pub use numastat::NumastatCollector;
pub use processcpu::ProcessCpuCollector;

/// Failures that abort a whole collection cycle.
///
/// Anything local to one process, group or node is handled inside the
/// collector and never surfaces here.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("cannot list {path}: {source}")]
    Unreadable { path: PathBuf, source: io::Error },

    #[error("cannot read system cpu time: {0}")]
    SystemCpu(#[from] crate::process::SampleError),
}

/// A periodically polled metrics source.
pub trait Collector: Send {
    /// Metric path prefix, also used as the collector's identity.
    fn name(&self) -> &str;

    /// Runs one collection cycle.
    fn collect(&mut self, sink: &mut dyn MetricSink) -> Result<(), CollectorError>;
}
