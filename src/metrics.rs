//! Prometheus metrics definitions for herakles-proc-cpu-collector.
//!
//! Every published sample becomes one `herakles_collector_value` series labeled
//! with its collector and metric name. Series not republished by the latest
//! cycle of their collector are removed.

use ahash::{AHashMap as HashMap, AHashSet};
use herakles_proc_cpu_collector::Sample;
use prometheus::{GaugeVec, Opts, Registry};
use std::sync::Mutex;
use tracing::debug;

/// Collector samples and cycle telemetry.
pub struct CollectorMetrics {
    pub value: GaugeVec,            // labels: collector, metric
    pub cycle_duration: GaugeVec,   // labels: collector
    pub cycle_success: GaugeVec,    // labels: collector
    pub samples: GaugeVec,          // labels: collector
    published: Mutex<HashMap<String, AHashSet<String>>>,
}

impl CollectorMetrics {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let value = GaugeVec::new(
            Opts::new(
                "herakles_collector_value",
                "Latest value published by a collector (processcpu: percent of one core)",
            ),
            &["collector", "metric"],
        )?;
        let cycle_duration = GaugeVec::new(
            Opts::new(
                "herakles_collector_cycle_duration_seconds",
                "Duration of the latest collection cycle",
            ),
            &["collector"],
        )?;
        let cycle_success = GaugeVec::new(
            Opts::new(
                "herakles_collector_cycle_success",
                "Whether the latest collection cycle succeeded (1) or failed (0)",
            ),
            &["collector"],
        )?;
        let samples = GaugeVec::new(
            Opts::new(
                "herakles_collector_samples",
                "Number of samples published by the latest collection cycle",
            ),
            &["collector"],
        )?;

        registry.register(Box::new(value.clone()))?;
        registry.register(Box::new(cycle_duration.clone()))?;
        registry.register(Box::new(cycle_success.clone()))?;
        registry.register(Box::new(samples.clone()))?;

        Ok(Self {
            value,
            cycle_duration,
            cycle_success,
            samples,
            published: Mutex::new(HashMap::new()),
        })
    }

    /// Replaces the series of `collector` with the samples of its latest cycle.
    pub fn record_samples(&self, collector: &str, samples: &[Sample]) {
        let current: AHashSet<String> = samples.iter().map(|s| s.name.clone()).collect();

        for sample in samples {
            self.value
                .with_label_values(&[collector, sample.name.as_str()])
                .set(sample.value);
        }

        if let Ok(mut published) = self.published.lock() {
            let previous = published.insert(collector.to_string(), current.clone());
            for stale in previous.iter().flatten().filter(|m| !current.contains(*m)) {
                debug!("Removing stale series {}.{}", collector, stale);
                let _ = self.value.remove_label_values(&[collector, stale.as_str()]);
            }
        }

        self.samples
            .with_label_values(&[collector])
            .set(samples.len() as f64);
    }

    /// Records the outcome of one cycle.
    pub fn record_cycle(&self, collector: &str, duration_seconds: f64, success: bool) {
        self.cycle_duration
            .with_label_values(&[collector])
            .set(duration_seconds);
        self.cycle_success
            .with_label_values(&[collector])
            .set(if success { 1.0 } else { 0.0 });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{Encoder, TextEncoder};

    fn sample(name: &str, value: f64) -> Sample {
        Sample {
            name: name.to_string(),
            value,
        }
    }

    fn render(registry: &Registry) -> String {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buf)
            .expect("encode");
        String::from_utf8(buf).expect("utf8")
    }

    #[test]
    fn test_stale_series_are_removed() {
        let registry = Registry::new();
        let metrics = CollectorMetrics::new(&registry).expect("metrics");

        metrics.record_samples("processcpu", &[sample("web", 120.0), sample("db", 5.0)]);
        let text = render(&registry);
        assert!(text.contains(r#"herakles_collector_value{collector="processcpu",metric="web"} 120"#));
        assert!(text.contains(r#"metric="db""#));

        metrics.record_samples("processcpu", &[sample("web", 80.0)]);
        let text = render(&registry);
        assert!(text.contains(r#"herakles_collector_value{collector="processcpu",metric="web"} 80"#));
        assert!(!text.contains(r#"metric="db""#));
    }

    #[test]
    fn test_collectors_do_not_clobber_each_other() {
        let registry = Registry::new();
        let metrics = CollectorMetrics::new(&registry).expect("metrics");

        metrics.record_samples("processcpu", &[sample("web", 1.0)]);
        metrics.record_samples("numastat", &[sample("node0.numa_hit", 10.0)]);
        metrics.record_cycle("numastat", 0.01, true);

        let text = render(&registry);
        assert!(text.contains(r#"collector="processcpu",metric="web""#));
        assert!(text.contains(r#"collector="numastat",metric="node0.numa_hit""#));
        assert!(text.contains(r#"herakles_collector_cycle_success{collector="numastat"} 1"#));
    }
}
