//! Herakles Process CPU Collector Library
//!
//! This library attributes CPU time to user-defined logical process groups.
//! Processes are resolved into groups through pluggable matchers, sampled
//! across collection cycles and reported as one utilization value per group.
//!
//! # Features
//!
//! - **Pluggable Matching**: pid files, executable globs and command line regexes
//! - **Delta Sampling**: Per-pid CPU time baselines with PID reuse detection
//! - **Multi-core Aware**: Utilization in percent of one core (2 busy cores = 200%)
//! - **Host Agnostic**: Collectors publish into any `MetricSink`
//!
//! # Usage
//!
//! ```rust,no_run
//! use herakles_proc_cpu_collector::collector_config::ProcessCpuConfig;
//! use herakles_proc_cpu_collector::collectors::{Collector, ProcessCpuCollector};
//! use herakles_proc_cpu_collector::sink::Samples;
//!
//! let yaml = r#"
//! process:
//!   haproxy:
//!     pidfile: /var/run/haproxy.pid
//!   nginx:
//!     exe: /usr/sbin/nginx
//! "#;
//! let config: ProcessCpuConfig = serde_yaml::from_str(yaml).unwrap();
//! let mut collector = ProcessCpuCollector::from_config(config);
//!
//! // Call once per tick; the first cycle establishes baselines
//! let mut samples = Samples::new();
//! collector.collect(&mut samples).unwrap();
//!
//! for sample in samples.iter() {
//!     println!("{}.{} = {:.1}%", collector.name(), sample.name, sample.value);
//! }
//! ```

pub mod collector_config;
pub mod collectors;
pub mod process;
pub mod sink;

// Re-export main types for convenience
pub use collector_config::{CollectorsConfig, NumastatConfig, ProcessCpuConfig};
pub use collectors::{Collector, CollectorError, NumastatCollector, ProcessCpuCollector};
pub use sink::{MetricSink, Sample, Samples};
