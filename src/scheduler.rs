//! Collector host: one tokio task per enabled collector.
//!
//! Each task ticks on its own interval and runs the collector's cycle on the
//! blocking pool, so a slow cycle (e.g. the settle delay after new pids) only
//! delays its own collector.

use herakles_proc_cpu_collector::{
    Collector, CollectorError, CollectorsConfig, NumastatCollector, ProcessCpuCollector, Sample,
    Samples,
};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::state::SharedState;

pub type BoxedCollector = Box<dyn Collector>;

/// Result of a single collection cycle.
pub struct CycleOutcome {
    pub samples: Samples,
    pub duration_seconds: f64,
    pub result: Result<(), CollectorError>,
}

/// Instantiates every enabled collector, processcpu first.
pub fn build_collectors(config: &CollectorsConfig) -> Vec<BoxedCollector> {
    let mut collectors: Vec<BoxedCollector> = Vec::new();
    if config.processcpu.enabled {
        collectors.push(Box::new(ProcessCpuCollector::from_config(
            config.processcpu.clone(),
        )));
    }
    if config.numastat.enabled {
        collectors.push(Box::new(NumastatCollector::from_config(&config.numastat)));
    }
    collectors
}

/// Runs one cycle of `collector` into a fresh sample buffer.
#[instrument(skip_all, fields(collector = %collector.name()))]
pub fn run_cycle(collector: &mut dyn Collector) -> CycleOutcome {
    let start = Instant::now();
    let mut samples = Samples::new();
    let result = collector.collect(&mut samples);
    let duration_seconds = start.elapsed().as_secs_f64();

    match &result {
        Ok(()) => debug!(
            "Cycle finished: {} samples in {:.3}s",
            samples.len(),
            duration_seconds
        ),
        Err(e) => warn!("Cycle failed after {:.3}s: {}", duration_seconds, e),
    }

    CycleOutcome {
        samples,
        duration_seconds,
        result,
    }
}

/// Formats a sample as a graphite plaintext line.
pub fn graphite_line(path: &str, sample: &Sample, timestamp: u64) -> String {
    format!("{}.{} {} {}", path, sample.name, sample.value, timestamp)
}

/// Pushes one cycle's outcome into the prometheus metrics and health stats.
pub fn record_outcome(state: &SharedState, name: &str, outcome: &CycleOutcome, stdout: bool) {
    let success = outcome.result.is_ok();
    let samples: Vec<Sample> = outcome.samples.iter().cloned().collect();

    state.metrics.record_samples(name, &samples);
    state
        .metrics
        .record_cycle(name, outcome.duration_seconds, success);
    state.health_stats.record_cycle(
        name,
        outcome.duration_seconds,
        samples.len() as u64,
        success,
    );

    if stdout {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        for sample in &samples {
            println!("{}", graphite_line(name, sample, timestamp));
        }
    }
}

/// Spawns one periodic task per collector.
pub fn spawn_collectors(
    state: SharedState,
    collectors: Vec<BoxedCollector>,
    period: Duration,
    stdout: bool,
) -> Vec<JoinHandle<()>> {
    collectors
        .into_iter()
        .map(|collector| {
            state.health_stats.register_collector(collector.name());
            info!(
                "Starting collector '{}' every {}s",
                collector.name(),
                period.as_secs()
            );
            tokio::spawn(collector_loop(state.clone(), collector, period, stdout))
        })
        .collect()
}

async fn collector_loop(
    state: SharedState,
    mut collector: BoxedCollector,
    period: Duration,
    stdout: bool,
) {
    let name = collector.name().to_string();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let joined = tokio::task::spawn_blocking(move || {
            let outcome = run_cycle(collector.as_mut());
            (collector, outcome)
        })
        .await;

        match joined {
            Ok((returned, outcome)) => {
                collector = returned;
                record_outcome(&state, &name, &outcome, stdout);
            }
            Err(e) => {
                error!("Collector '{}' worker aborted: {} - collector stopped", name, e);
                state.health_stats.record_cycle(&name, 0.0, 0, false);
                state.metrics.record_cycle(&name, 0.0, false);
                return;
            }
        }
    }
}
