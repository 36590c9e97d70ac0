//! Application state shared by the HTTP handlers and the collector tasks.

use prometheus::Registry;
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::health_stats::HealthStats;
use crate::metrics::CollectorMetrics;

/// Type alias for shared application state.
pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub registry: Registry,
    pub metrics: CollectorMetrics,
    pub config: Arc<Config>,
    pub health_stats: Arc<HealthStats>,
    /// Names of the collectors spawned by the scheduler.
    pub collectors: Vec<String>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}
