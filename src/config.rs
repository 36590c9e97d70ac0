//! Configuration management for herakles-proc-cpu-collector.
//!
//! This module handles loading, merging, and validating configuration from files
//! and CLI arguments. It supports YAML, JSON, and TOML formats.

use herakles_proc_cpu_collector::CollectorsConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::cli::{Args, ConfigFormat};

// Default configuration constants
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9216;
pub const DEFAULT_INTERVAL_SECONDS: u64 = 30;

/// Upper bound for the first-observation settle delay.
const MAX_SETTLE_DELAY_MS: u64 = 10_000;

/// Host configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Server configuration
    pub port: Option<u16>,
    pub bind: Option<String>,

    // Scheduling
    #[serde(alias = "interval-seconds")]
    pub interval_seconds: Option<u64>,

    // Feature flags
    #[serde(alias = "enable-health")]
    pub enable_health: Option<bool>,
    #[serde(alias = "enable-stdout")]
    pub enable_stdout: Option<bool>,

    // Logging
    #[serde(alias = "log-level")]
    pub log_level: Option<String>,

    // Collectors
    #[serde(default)]
    pub collectors: CollectorsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: Some(DEFAULT_BIND_ADDR.to_string()),
            port: Some(DEFAULT_PORT),
            interval_seconds: Some(DEFAULT_INTERVAL_SECONDS),
            enable_health: Some(true),
            enable_stdout: Some(false),
            log_level: Some("info".into()),
            collectors: CollectorsConfig::default(),
        }
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    if cfg.interval_seconds == Some(0) {
        return Err("interval_seconds must be greater than 0".into());
    }

    let processcpu = &cfg.collectors.processcpu;
    let numastat = &cfg.collectors.numastat;

    if !(processcpu.enabled || numastat.enabled) {
        return Err("At least one collector (processcpu/numastat) must be enabled".into());
    }

    if processcpu.settle_delay_ms > MAX_SETTLE_DELAY_MS {
        return Err(format!(
            "collectors.processcpu.settle_delay_ms is {}, maximum is {}",
            processcpu.settle_delay_ms, MAX_SETTLE_DELAY_MS
        )
        .into());
    }

    for (section, path) in [("processcpu", &processcpu.path), ("numastat", &numastat.path)] {
        if path.is_empty() || path.contains(char::is_whitespace) {
            return Err(format!(
                "collectors.{}.path '{}' must be non-empty and contain no whitespace",
                section, path
            )
            .into());
        }
    }

    if processcpu.enabled && numastat.enabled && processcpu.path == numastat.path {
        return Err(format!("collector path '{}' is used twice", processcpu.path).into());
    }

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    // Override with CLI args
    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }

    // Only override port if the user supplied it on the CLI.
    if let Some(cli_port) = args.port {
        config.port = Some(cli_port);
    }

    if let Some(interval) = args.interval {
        config.interval_seconds = Some(interval);
    }

    // Feature flags
    if args.disable_health {
        config.enable_health = Some(false);
    }
    if args.stdout {
        config.enable_stdout = Some(true);
    }

    Ok(config)
}

/// Configuration loading with multiple format support
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = if let Some(p) = path {
        if !p.exists() {
            return Err(format!("Config file not found: {}", p.display()).into());
        }
        p.to_path_buf()
    } else {
        // Try default locations
        let defaults = [
            "/etc/herakles/proc-cpu-collector.yaml",
            "/etc/herakles/proc-cpu-collector.yml",
            "/etc/herakles/proc-cpu-collector.json",
            "./herakles-proc-cpu-collector.yaml",
            "./herakles-proc-cpu-collector.yml",
            "./herakles-proc-cpu-collector.json",
        ];

        match defaults.iter().find(|p| Path::new(p).exists()) {
            Some(p) => PathBuf::from(p),
            None => return Ok(Config::default()),
        }
    };

    let content = fs::read_to_string(&path)?;
    let config = parse_config(&path, &content)?;
    info!("Loaded configuration from: {}", path.display());
    Ok(config)
}

/// Parses configuration content, choosing the format by file extension.
fn parse_config(path: &Path, content: &str) -> Result<Config, Box<dyn std::error::Error>> {
    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => Ok(serde_json::from_str(content)?),
        Some("toml") => Ok(toml::from_str(content)?),
        // Default to YAML
        _ => Ok(serde_yaml::from_str(content)?),
    }
}

/// Renders configuration in the requested format.
pub fn render_config(
    config: &Config,
    format: &ConfigFormat,
) -> Result<String, Box<dyn std::error::Error>> {
    Ok(match format {
        ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        ConfigFormat::Toml => toml::to_string_pretty(config)?,
        ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    })
}

/// Shows configuration in requested format
pub fn show_config(config: &Config, format: &ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", render_config(config, format)?);
    Ok(())
}
