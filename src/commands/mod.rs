//! CLI command implementations for herakles-proc-cpu-collector.
//!
//! - `check`: System and configuration validation
//! - `config`: Configuration file generation
//! - `test`: Foreground collection cycles

pub mod check;
pub mod config;

pub use check::command_check;
pub use config::command_config;
pub use test::command_test;
