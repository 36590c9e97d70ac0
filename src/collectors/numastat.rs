//! NUMA statistics collector.
//!
//! Reads `node*/numastat` below the sysfs node directory and publishes every
//! counter as `<node>.<counter>`, e.g. `node0.numa_hit`.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

use crate::collector_config::NumastatConfig;
use crate::collectors::{Collector, CollectorError};
use crate::sink::MetricSink;

pub struct NumastatCollector {
    path: String,
    node_root: PathBuf,
}

impl NumastatCollector {
    pub fn from_config(config: &NumastatConfig) -> Self {
        Self {
            path: config.path.clone(),
            node_root: config.node_root.clone(),
        }
    }

    /// Lists readable `numastat` files, ordered by node name.
    fn find_nodes(&self) -> Result<Vec<(String, PathBuf)>, CollectorError> {
        let entries = fs::read_dir(&self.node_root).map_err(|source| {
            error!("Unable to read: {}", self.node_root.display());
            CollectorError::Unreadable {
                path: self.node_root.clone(),
                source,
            }
        })?;

        let mut nodes: Vec<(String, PathBuf)> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().to_str()?.to_string();
                if !name.starts_with("node") {
                    return None;
                }
                let stat = entry.path().join("numastat");
                stat.is_file().then_some((name, stat))
            })
            .collect();
        nodes.sort();
        Ok(nodes)
    }
}

/// Parses `key value` lines; malformed lines are skipped.
fn parse_numastat(path: &Path, content: &str) -> Vec<(String, u64)> {
    content
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let key = parts.next()?;
            let value = match parts.next().map(str::parse::<u64>) {
                Some(Ok(v)) => v,
                _ => {
                    debug!("Skipping malformed line in {}: {:?}", path.display(), line);
                    return None;
                }
            };
            Some((key.to_string(), value))
        })
        .collect()
}

impl Collector for NumastatCollector {
    fn name(&self) -> &str {
        &self.path
    }

    fn collect(&mut self, sink: &mut dyn MetricSink) -> Result<(), CollectorError> {
        for (node, stat) in self.find_nodes()? {
            let content = match fs::read_to_string(&stat) {
                Ok(c) => c,
                Err(e) => {
                    debug!("Cannot read {}: {}", stat.display(), e);
                    continue;
                }
            };
            for (key, value) in parse_numastat(&stat, &content) {
                sink.publish(&format!("{}.{}", node, key), value as f64);
            }
        }
        Ok(())
    }
}
