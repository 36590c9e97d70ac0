//! HTTP endpoint handlers for the collector host.
//!
//! - `/`: Landing page listing the endpoints and collectors
//! - `/metrics`: Prometheus metrics endpoint
//! - `/health`: Health check endpoint

pub mod health;
pub mod metrics;
pub mod root;

pub use health::health_handler;
pub use metrics::metrics_handler;
pub use root::root_handler;
