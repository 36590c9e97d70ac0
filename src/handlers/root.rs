//! Root endpoint handler listing the available endpoints.

use axum::{extract::State, response::IntoResponse};
use std::fmt::Write as FmtWrite;
use tracing::{debug, instrument};

use crate::handlers::health::FOOTER_TEXT;
use crate::state::SharedState;

/// Handler for the root `/` endpoint.
#[instrument(skip(state))]
pub async fn root_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing / request");

    let uptime_secs = state.start_time.elapsed().as_secs();
    let interval = state
        .config
        .interval_seconds
        .unwrap_or(crate::config::DEFAULT_INTERVAL_SECONDS);

    let mut out = String::new();
    writeln!(out, "herakles-proc-cpu-collector {}", env!("CARGO_PKG_VERSION")).ok();
    writeln!(
        out,
        "uptime: {}h {}m {}s | interval: {}s",
        uptime_secs / 3600,
        (uptime_secs % 3600) / 60,
        uptime_secs % 60,
        interval
    )
    .ok();
    writeln!(out).ok();
    writeln!(out, "ENDPOINTS").ok();
    writeln!(out, "  /metrics   Prometheus metrics").ok();
    if state.config.enable_health.unwrap_or(true) {
        writeln!(out, "  /health    Collector health table").ok();
    }
    writeln!(out).ok();
    writeln!(out, "COLLECTORS").ok();
    for name in &state.collectors {
        writeln!(out, "  {}", name).ok();
    }
    writeln!(out).ok();
    writeln!(out, "{}", FOOTER_TEXT).ok();

    ([("Content-Type", "text/plain; charset=utf-8")], out)
}
