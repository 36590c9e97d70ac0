//! Health statistics for the collector host.
//!
//! Tracks per-collector cycle counts, failures and durations plus scrape
//! counters, and renders them as the plain text table served by `/health`.

use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock as StdRwLock};
use std::time::{Instant, SystemTime};

/// Running statistics for a single metric.
#[derive(Clone, Copy, Default)]
pub struct RunningStat {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    last: f64,
}

impl RunningStat {
    pub fn add(&mut self, value: f64) {
        if self.count == 0 {
            *self = Self {
                count: 1,
                sum: value,
                min: value,
                max: value,
                last: value,
            };
            return;
        }
        self.count += 1;
        self.sum += value;
        self.last = value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / (self.count as f64)
        }
    }
}

/// Cycle bookkeeping for one collector.
#[derive(Clone, Default)]
pub struct CollectorStats {
    pub cycles: u64,
    pub failures: u64,
    pub consecutive_failures: u64,
    pub samples: u64,
    pub duration_seconds: RunningStat,
    pub last_cycle: Option<SystemTime>,
}

/// Health statistics shared by the scheduler and the HTTP handlers.
pub struct HealthStats {
    collectors: Mutex<BTreeMap<String, CollectorStats>>,
    pub metrics_endpoint_calls: AtomicU64,
    pub request_duration_ms: Mutex<RunningStat>,
    pub start_time: Instant,
    pub last_cycle_time: StdRwLock<Option<Instant>>,
}

impl Default for HealthStats {
    fn default() -> Self {
        Self {
            collectors: Mutex::new(BTreeMap::new()),
            metrics_endpoint_calls: AtomicU64::new(0),
            request_duration_ms: Mutex::new(RunningStat::default()),
            start_time: Instant::now(),
            last_cycle_time: StdRwLock::new(None),
        }
    }
}

impl HealthStats {
    pub fn new() -> Self {
        Default::default()
    }

    /// Registers a collector so it shows up before its first cycle completes.
    pub fn register_collector(&self, name: &str) {
        if let Ok(mut collectors) = self.collectors.lock() {
            collectors.entry(name.to_string()).or_default();
        }
    }

    pub fn record_cycle(&self, name: &str, duration_seconds: f64, samples: u64, success: bool) {
        if let Ok(mut collectors) = self.collectors.lock() {
            let stats = collectors.entry(name.to_string()).or_default();
            stats.cycles += 1;
            stats.duration_seconds.add(duration_seconds);
            stats.last_cycle = Some(SystemTime::now());
            if success {
                stats.samples = samples;
                stats.consecutive_failures = 0;
            } else {
                stats.failures += 1;
                stats.consecutive_failures += 1;
            }
        }
        if let Ok(mut guard) = self.last_cycle_time.write() {
            *guard = Some(Instant::now());
        }
    }

    pub fn record_metrics_endpoint_call(&self, duration_ms: f64) {
        self.metrics_endpoint_calls.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut stat) = self.request_duration_ms.lock() {
            stat.add(duration_ms);
        }
    }

    #[cfg(test)]
    pub fn collector(&self, name: &str) -> Option<CollectorStats> {
        self.collectors
            .lock()
            .ok()
            .and_then(|collectors| collectors.get(name).cloned())
    }

    /// Healthy unless some collector failed its latest cycle.
    pub fn is_healthy(&self) -> bool {
        self.collectors
            .lock()
            .map(|collectors| collectors.values().all(|s| s.consecutive_failures == 0))
            .unwrap_or(false)
    }

    pub fn get_uptime_hours(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64() / 3600.0
    }

    fn format_clock(time: SystemTime) -> String {
        const SECS_PER_DAY: u64 = 86400;
        const SECS_PER_HOUR: u64 = 3600;
        const SECS_PER_MINUTE: u64 = 60;

        match time.duration_since(SystemTime::UNIX_EPOCH) {
            Ok(duration) => {
                let secs = duration.as_secs();
                format!(
                    "{:02}:{:02}:{:02}",
                    (secs % SECS_PER_DAY) / SECS_PER_HOUR,
                    (secs % SECS_PER_HOUR) / SECS_PER_MINUTE,
                    secs % SECS_PER_MINUTE
                )
            }
            Err(_) => "N/A".to_string(),
        }
    }

    pub fn render_table(&self) -> String {
        let collectors = self
            .collectors
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default();
        let request = self
            .request_duration_ms
            .lock()
            .map(|s| *s)
            .unwrap_or_default();

        let left_col = 26usize;
        let col_w = 12usize;

        let mut out = String::new();

        writeln!(out, "HEALTH ENDPOINT - COLLECTOR INTERNAL STATS").ok();
        writeln!(out, "==========================================").ok();
        writeln!(out).ok();

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "",
            "current",
            "average",
            "max",
            "min",
            left = left_col,
            col = col_w
        )
        .ok();

        for (name, stats) in &collectors {
            let title = format!("COLLECTOR {}", name.to_uppercase());
            writeln!(out).ok();
            writeln!(out, "{}", title).ok();
            writeln!(out, "{}", "-".repeat(title.len())).ok();

            let d = &stats.duration_seconds;
            writeln!(
                out,
                "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
                "cycle_duration (s)",
                format!("{:.3}", d.last),
                format!("{:.3}", d.avg()),
                format!("{:.3}", d.max),
                format!("{:.3}", d.min),
                left = left_col,
                col = col_w
            )
            .ok();

            for (label, value) in [
                ("cycles", stats.cycles),
                ("failures", stats.failures),
                ("samples", stats.samples),
            ] {
                writeln!(
                    out,
                    "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
                    label,
                    value.to_string(),
                    "N/A",
                    "N/A",
                    "N/A",
                    left = left_col,
                    col = col_w
                )
                .ok();
            }

            writeln!(
                out,
                "{:left$} | {:^col$}",
                "last_cycle",
                stats
                    .last_cycle
                    .map(Self::format_clock)
                    .unwrap_or_else(|| "N/A".to_string()),
                left = left_col,
                col = col_w
            )
            .ok();
        }

        writeln!(out).ok();
        writeln!(out, "HTTP SERVER").ok();
        writeln!(out, "-----------").ok();

        writeln!(
            out,
            "{:left$} | {:^col$} | {:^col$} | {:^col$} | {:^col$}",
            "metrics_request (ms)",
            format!("{:.1}", request.last),
            format!("{:.1}", request.avg()),
            format!("{:.1}", request.max),
            format!("{:.1}", request.min),
            left = left_col,
            col = col_w
        )
        .ok();

        writeln!(out).ok();
        writeln!(
            out,
            "metrics endpoint calls: {} | status: {} | uptime: {:.1}h",
            self.metrics_endpoint_calls.load(Ordering::Relaxed),
            if self.is_healthy() { "OK" } else { "DEGRADED" },
            self.get_uptime_hours()
        )
        .ok();

        out
    }
}
