//! Delta-based CPU utilization for matched processes.
//!
//! `DeltaCache` remembers the last (process, system) CPU time pair per pid and
//! turns consecutive readings into deltas. A negative process delta means the
//! pid now belongs to another process; the entry is dropped and the
//! measurement is redone once from a fresh baseline.

use ahash::{AHashMap as HashMap, AHashSet};
use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;
use tracing::debug;

use crate::process::cpu::{CpuTimeSource, SampleError};

/// Pause between a first-observation baseline and its comparison sample.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Re-measurements allowed after a pid reuse was detected.
const MAX_REUSE_RETRIES: usize = 1;

/// A consistent pair of CPU time readings, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuSample {
    pub process: f64,
    pub system: f64,
}

impl CpuSample {
    /// Reads process time, then system time, back to back.
    pub fn read<S: CpuTimeSource + ?Sized>(source: &S, pid: u32) -> Result<Self, SampleError> {
        let process = source.process_cputime(pid)?;
        let system = source.system_cputime()?;
        Ok(Self { process, system })
    }
}

/// Difference between two `CpuSample`s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuDelta {
    pub process: f64,
    pub system: f64,
}

impl CpuDelta {
    pub fn between(previous: CpuSample, current: CpuSample) -> Self {
        Self {
            process: current.process - previous.process,
            system: current.system - previous.system,
        }
    }

    /// Utilization in percent of one core.
    ///
    /// A process saturating 2 cores of an 8-core machine reports 200. Zero or
    /// negative deltas yield 0 instead of a division error or a negative value.
    pub fn utilization(&self, cores: usize) -> f64 {
        if self.system <= 0.0 || self.process <= 0.0 {
            return 0.0;
        }
        (self.process / self.system) * 100.0 * cores as f64
    }
}

/// Per-pid CPU time baselines surviving across collection cycles.
#[derive(Debug)]
pub struct DeltaCache {
    entries: HashMap<u32, CpuSample>,
    settle_delay: Duration,
}

impl Default for DeltaCache {
    fn default() -> Self {
        Self::new(DEFAULT_SETTLE_DELAY)
    }
}

impl DeltaCache {
    pub fn new(settle_delay: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            settle_delay,
        }
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, pid: u32) -> Option<CpuSample> {
        self.entries.get(&pid).copied()
    }

    /// Seeds a baseline; mainly useful to restore or script state.
    pub fn insert(&mut self, pid: u32, sample: CpuSample) {
        self.entries.insert(pid, sample);
    }

    pub fn remove(&mut self, pid: u32) -> Option<CpuSample> {
        self.entries.remove(&pid)
    }

    /// Drops every entry whose pid is not in `alive`.
    pub fn retain_alive(&mut self, alive: &AHashSet<u32>) {
        let before = self.entries.len();
        self.entries.retain(|pid, _| alive.contains(pid));
        let dropped = before - self.entries.len();
        if dropped > 0 {
            debug!("Dropped {} cpu baselines of exited processes", dropped);
        }
    }

    /// Measures the CPU delta of `pid` since its previous measurement.
    ///
    /// Without a baseline, one is taken now followed by the settle delay. The
    /// current reading always replaces the baseline. On a negative process
    /// delta the entry is discarded and the measurement repeated once.
    pub fn measure<S: CpuTimeSource + ?Sized>(
        &mut self,
        pid: u32,
        source: &S,
    ) -> Result<CpuDelta, SampleError> {
        let mut attempt = 0;
        loop {
            let baseline = match self.entries.get(&pid) {
                Some(sample) => *sample,
                None => {
                    let sample = CpuSample::read(source, pid)?;
                    self.entries.insert(pid, sample);
                    if !self.settle_delay.is_zero() {
                        thread::sleep(self.settle_delay);
                    }
                    sample
                }
            };

            let current = CpuSample::read(source, pid)?;
            self.entries.insert(pid, current);
            let delta = CpuDelta::between(baseline, current);

            if delta.process < 0.0 && attempt < MAX_REUSE_RETRIES {
                debug!(
                    "pid {} cpu time went backwards ({:.3}s), assuming pid reuse",
                    pid, delta.process
                );
                self.entries.remove(&pid);
                attempt += 1;
                continue;
            }

            return Ok(delta);
        }
    }
}

/// Per-cycle running sums of utilization per group.
#[derive(Debug, Default)]
pub struct UtilizationAccumulator {
    sums: BTreeMap<String, f64>,
}

impl UtilizationAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one process contribution to a group.
    pub fn add(&mut self, group: &str, percent: f64) {
        match self.sums.get_mut(group) {
            Some(sum) => *sum += percent,
            None => {
                self.sums.insert(group.to_string(), percent);
            }
        }
    }

    pub fn get(&self, group: &str) -> Option<f64> {
        self.sums.get(group).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.sums.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sums.len()
    }

    /// Group sums in group-name order. Groups without contributions are absent.
    pub fn into_sums(self) -> impl Iterator<Item = (String, f64)> {
        self.sums.into_iter()
    }
}
