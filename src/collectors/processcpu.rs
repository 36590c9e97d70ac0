//! Process CPU collector.
//!
//! Publishes, per configured logical group, the summed CPU utilization of all
//! matching processes in percent of one core. Groups without a matching
//! process in a cycle are not published.

use ahash::AHashSet;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::collector_config::ProcessCpuConfig;
use crate::collectors::{Collector, CollectorError};
use crate::process::{
    CpuTimeSource, DeltaCache, GroupSpec, ProcFs, ProcessTable,
    UtilizationAccumulator, NUM_CPUS,
};
use crate::sink::MetricSink;

/// Collector attributing CPU time to logical process groups.
///
/// Owns the delta cache, the only state kept between cycles. The host must
/// not run two cycles of the same instance concurrently.
pub struct ProcessCpuCollector<S = ProcFs> {
    config: ProcessCpuConfig,
    table: ProcessTable,
    source: S,
    cache: DeltaCache,
    cores: usize,
}

impl ProcessCpuCollector<ProcFs> {
    /// Builds a collector reading from the configured procfs root.
    pub fn from_config(config: ProcessCpuConfig) -> Self {
        let source = ProcFs::new(&config.proc_root);
        Self::with_source(config, source)
    }
}

impl<S: CpuTimeSource> ProcessCpuCollector<S> {
    /// Builds a collector with an explicit CPU time source.
    pub fn with_source(config: ProcessCpuConfig, source: S) -> Self {
        let table = ProcessTable::new(&config.proc_root);
        let cache = DeltaCache::new(Duration::from_millis(config.settle_delay_ms));
        let cores = config.cpu_count.filter(|&n| n > 0).unwrap_or(*NUM_CPUS);
        Self {
            config,
            table,
            source,
            cache,
            cores,
        }
    }

    pub fn cores(&self) -> usize {
        self.cores
    }

    pub fn cache(&self) -> &DeltaCache {
        &self.cache
    }

    pub fn config(&self) -> &ProcessCpuConfig {
        &self.config
    }

    fn run_cycle(&mut self, sink: &mut dyn MetricSink) -> Result<(), CollectorError> {
        let start = Instant::now();

        // Resolved every cycle so pid files and config edits are picked up.
        let mut spec = GroupSpec::resolve(&self.config.process);
        if !spec.has_matchers() {
            debug!("No usable process groups configured, skipping cycle");
            return Ok(());
        }

        let processes = self
            .table
            .processes()
            .map_err(|source| CollectorError::Unreadable {
                path: self.table.root().to_path_buf(),
                source,
            })?;

        let mut sums = UtilizationAccumulator::new();
        let mut alive = AHashSet::new();
        let mut measured = 0usize;
        let mut matching: Vec<usize> = Vec::new();

        for handle in processes {
            alive.insert(handle.pid);

            matching.clear();
            for (idx, group) in spec.groups_mut().iter_mut().enumerate() {
                if group.matches(&handle) {
                    matching.push(idx);
                }
            }
            if matching.is_empty() {
                continue;
            }

            let delta = match self.cache.measure(handle.pid, &self.source) {
                Ok(d) => d,
                Err(e) if e.is_vanished() => {
                    debug!("Skipping pid {}: {}", handle.pid, e);
                    continue;
                }
                Err(e) if e.is_system() => {
                    return Err(CollectorError::SystemCpu(e));
                }
                Err(e) => {
                    warn!("Skipping pid {}: {}", handle.pid, e);
                    continue;
                }
            };

            let percent = delta.utilization(self.cores);
            measured += 1;
            for &idx in &matching {
                sums.add(&spec.groups()[idx].name, percent);
            }
        }

        self.cache.retain_alive(&alive);

        debug!(
            "processcpu cycle: {} processes scanned, {} measured, {} groups published in {:.2}ms",
            alive.len(),
            measured,
            sums.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );

        for (group, percent) in sums.into_sums() {
            sink.publish(&group, percent);
        }

        Ok(())
    }
}

impl<S: CpuTimeSource + Send> Collector for ProcessCpuCollector<S> {
    fn name(&self) -> &str {
        &self.config.path
    }

    fn collect(&mut self, sink: &mut dyn MetricSink) -> Result<(), CollectorError> {
        self.run_cycle(sink)
    }
}
