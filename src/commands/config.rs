//! Config command implementation.
//!
//! Generates configuration files in various formats.

use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::{render_config, Config};

/// Generates configuration files.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::default();
    let output = output.unwrap_or_else(|| PathBuf::from("herakles-proc-cpu-collector.yaml"));

    let mut content = render_config(&config, &format)?;
    if commented && matches!(format, ConfigFormat::Yaml) {
        content = add_config_comments(content);
    }

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Adds comments to YAML configuration.
fn add_config_comments(yaml: String) -> String {
    let comments = r#"# Herakles Process CPU Collector Configuration
# ============================================
#
# Server Configuration
# --------------------
# bind: "0.0.0.0"              # Bind IP (0.0.0.0 = all interfaces)
# port: 9216                   # HTTP port
# interval_seconds: 30         # Collection tick of every collector
#
# Feature Flags
# -------------
# enable_health: true          # Enable /health endpoint
# enable_stdout: false         # Print "path.metric value timestamp" lines
#
# Logging
# -------
# log_level: "info"            # off, error, warn, info, debug, trace
#
# Process CPU Collector
# ---------------------
# collectors:
#   processcpu:
#     enabled: true
#     path: processcpu           # Metric path prefix
#     proc_root: /proc
#     settle_delay_ms: 100       # Pause after the first sample of new pids
#     cpu_count: null            # Override of the online CPU count
#     process:                   # Group name -> matchers (any match wins)
#       haproxy:
#         pidfile: /var/run/haproxy.pid
#       nginx:
#         exe: /usr/sbin/nginx   # Glob on the resolved executable path
#       postgres:
#         cmdline: "postgres: .*"  # Regex on the space-joined command line
#
# NUMA Statistics Collector
# -------------------------
#   numastat:
#     enabled: false
#     path: numastat
#     node_root: /sys/devices/system/node
"#;

    format!("{comments}\n{yaml}")
}
