//! Integration tests for the process CPU collector over a synthetic
//! process table.

use herakles_proc_cpu_collector::collector_config::ProcessCpuConfig;
use herakles_proc_cpu_collector::collectors::{Collector, ProcessCpuCollector};
use herakles_proc_cpu_collector::process::{CpuSample, CpuTimeSource, ProcFs, SampleError};
use herakles_proc_cpu_collector::sink::Samples;
use serde_json::json;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::{tempdir, TempDir};

const EPSILON: f64 = 1e-9;

fn assert_close(actual: Option<f64>, expected: f64) {
    let actual = actual.expect("group was not published");
    assert!(
        (actual - expected).abs() < EPSILON,
        "expected {}, got {}",
        expected,
        actual
    );
}

fn write_process(root: &Path, pid: u32, args: &[&str], utime: u64, stime: u64) {
    let dir = root.join(pid.to_string());
    fs::create_dir_all(&dir).expect("Failed to create pid dir");
    let mut cmdline = args.join("\0");
    cmdline.push('\0');
    fs::write(dir.join("cmdline"), cmdline).expect("Failed to write cmdline");
    fs::write(
        dir.join("stat"),
        format!(
            "{} ({}) S 1 {} {} 0 -1 4194560 120 0 0 0 {} {} 0 0 20 0 1 0 5000 1000000 200\n",
            pid,
            args.first().copied().unwrap_or("x"),
            pid,
            pid,
            utime,
            stime
        ),
    )
    .expect("Failed to write stat");
}

fn write_system(root: &Path, total_ticks: u64) {
    // Only the first seven fields count; the trailing ones must be ignored.
    fs::write(
        root.join("stat"),
        format!(
            "cpu  {} 0 0 0 0 0 0 999 999 999\ncpu0 1 2 3 4 5 6 7 0 0 0\n",
            total_ticks
        ),
    )
    .expect("Failed to write /proc/stat");
}

fn config(root: &TempDir, groups: serde_json::Value) -> ProcessCpuConfig {
    ProcessCpuConfig {
        proc_root: root.path().to_path_buf(),
        settle_delay_ms: 0,
        cpu_count: Some(4),
        process: serde_json::from_value(groups).expect("valid groups"),
        ..ProcessCpuConfig::default()
    }
}

fn collect<S: CpuTimeSource + Send>(collector: &mut ProcessCpuCollector<S>) -> Samples {
    let mut samples = Samples::new();
    collector.collect(&mut samples).expect("collect");
    samples
}

#[test]
fn test_utilization_sums_processes_of_a_group() {
    let root = tempdir().expect("Failed to create temp dir");
    write_system(root.path(), 1000);
    write_process(root.path(), 100, &["nginx", "-g", "daemon off;"], 60, 40);
    write_process(root.path(), 101, &["nginx: worker process"], 10, 0);
    write_process(root.path(), 200, &["sshd"], 5, 5);

    let mut collector = ProcessCpuCollector::with_source(
        config(&root, json!({"web": {"cmdline": "nginx.*"}})),
        ProcFs::with_clock_rate(root.path(), 1.0),
    );

    // First cycle: nothing moved between baseline and comparison reading.
    let first = collect(&mut collector);
    assert_close(first.get("web"), 0.0);
    assert_eq!(collector.cache().len(), 2);

    write_system(root.path(), 1800);
    write_process(root.path(), 100, &["nginx", "-g", "daemon off;"], 120, 80);
    write_process(root.path(), 101, &["nginx: worker process"], 110, 0);

    // (100 / 800) * 100 * 4 + (100 / 800) * 100 * 4
    let second = collect(&mut collector);
    assert_eq!(second.len(), 1);
    assert_close(second.get("web"), 100.0);
}

#[test]
fn test_group_without_match_is_not_published() {
    let root = tempdir().expect("Failed to create temp dir");
    write_system(root.path(), 1000);
    write_process(root.path(), 300, &["postgres", "-D", "/var/lib/pg"], 10, 10);

    let mut collector = ProcessCpuCollector::with_source(
        config(
            &root,
            json!({
                "db": {"cmdline": "postgres .*"},
                "cache": {"cmdline": "redis-server.*"},
            }),
        ),
        ProcFs::with_clock_rate(root.path(), 1.0),
    );

    let samples = collect(&mut collector);
    assert!(samples.get("db").is_some());
    assert_eq!(samples.get("cache"), None);
}

#[test]
fn test_process_in_two_groups_counts_for_both() {
    let root = tempdir().expect("Failed to create temp dir");
    write_system(root.path(), 1000);
    write_process(root.path(), 400, &["java", "-jar", "app.jar"], 0, 0);
    fs::write(root.path().join("app.pid"), "400\n").expect("Failed to write pid file");

    let pidfile = root.path().join("app.pid");
    let mut collector = ProcessCpuCollector::with_source(
        config(
            &root,
            json!({
                "app": {"pidfile": pidfile.to_str().expect("utf8 path")},
                "jvm": {"cmdline": "java .*", "pidfile": pidfile.to_str().expect("utf8 path")},
            }),
        ),
        ProcFs::with_clock_rate(root.path(), 1.0),
    );
    collect(&mut collector);

    write_system(root.path(), 1400);
    write_process(root.path(), 400, &["java", "-jar", "app.jar"], 50, 50);

    // Measured once, contributed to every matching group.
    let samples = collect(&mut collector);
    assert_close(samples.get("app"), 100.0);
    assert_close(samples.get("jvm"), 100.0);
}

#[test]
fn test_pid_reuse_resets_baseline() {
    let root = tempdir().expect("Failed to create temp dir");
    write_system(root.path(), 1000);
    write_process(root.path(), 500, &["worker"], 400, 100);

    let mut collector = ProcessCpuCollector::with_source(
        config(&root, json!({"workers": {"cmdline": "worker"}})),
        ProcFs::with_clock_rate(root.path(), 1.0),
    );
    collect(&mut collector);

    // Same pid, much lower CPU time: a new process took it over.
    write_system(root.path(), 2000);
    write_process(root.path(), 500, &["worker"], 15, 5);

    let samples = collect(&mut collector);
    assert_close(samples.get("workers"), 0.0);
    assert_eq!(
        collector.cache().get(500),
        Some(CpuSample {
            process: 20.0,
            system: 2000.0
        })
    );
}

#[test]
fn test_exited_processes_leave_the_cache() {
    let root = tempdir().expect("Failed to create temp dir");
    write_system(root.path(), 1000);
    write_process(root.path(), 600, &["batch"], 1, 1);
    write_process(root.path(), 601, &["batch"], 1, 1);

    let mut collector = ProcessCpuCollector::with_source(
        config(&root, json!({"batch": {"cmdline": "batch"}})),
        ProcFs::with_clock_rate(root.path(), 1.0),
    );
    collect(&mut collector);
    assert_eq!(collector.cache().len(), 2);

    fs::remove_dir_all(root.path().join("601")).expect("Failed to remove pid dir");
    collect(&mut collector);
    assert_eq!(collector.cache().len(), 1);
    assert!(collector.cache().get(601).is_none());
}

#[test]
fn test_incompatible_filters_are_ignored() {
    let root = tempdir().expect("Failed to create temp dir");
    write_system(root.path(), 1000);
    write_process(root.path(), 700, &["haproxy"], 1, 1);

    let mut collector = ProcessCpuCollector::with_source(
        config(
            &root,
            json!({
                "lb": {
                    "pidfile": root.path().join("missing.pid").to_str().expect("utf8 path"),
                    "exe": 42,
                    "cmdline": "haproxy",
                    "port": 80,
                },
            }),
        ),
        ProcFs::with_clock_rate(root.path(), 1.0),
    );

    let samples = collect(&mut collector);
    assert!(samples.get("lb").is_some());
}

/// CPU time readings shared with the test body, keyed by pid.
#[derive(Default)]
struct Readings {
    process: Mutex<HashMap<u32, f64>>,
    system: Mutex<f64>,
}

struct Scripted(Arc<Readings>);

impl CpuTimeSource for Scripted {
    fn process_cputime(&self, pid: u32) -> Result<f64, SampleError> {
        self.0
            .process
            .lock()
            .expect("lock")
            .get(&pid)
            .copied()
            .ok_or_else(|| SampleError::Vanished {
                pid,
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
    }

    fn system_cputime(&self) -> Result<f64, SampleError> {
        Ok(*self.0.system.lock().expect("lock"))
    }
}

#[test]
fn test_multi_core_utilization_exceeds_100_percent() {
    let root = tempdir().expect("Failed to create temp dir");
    write_process(root.path(), 800, &["encoder", "--threads=4"], 0, 0);
    write_process(root.path(), 801, &["encoder", "--threads=4"], 0, 0);

    let readings = Arc::new(Readings::default());
    readings.process.lock().expect("lock").insert(800, 10.0);
    *readings.system.lock().expect("lock") = 100.0;

    let mut collector = ProcessCpuCollector::with_source(
        ProcessCpuConfig {
            cpu_count: Some(8),
            ..config(&root, json!({"encode": {"cmdline": "encoder .*"}}))
        },
        Scripted(readings.clone()),
    );

    // Pid 801 has no readings and is skipped as vanished.
    let first = collect(&mut collector);
    assert_close(first.get("encode"), 0.0);
    assert_eq!(collector.cache().len(), 1);

    // Four of eight cores busy for the whole interval.
    readings.process.lock().expect("lock").insert(800, 12.0);
    *readings.system.lock().expect("lock") = 104.0;

    let second = collect(&mut collector);
    assert_close(second.get("encode"), 400.0);
}
