//! Monitoring module for memfuse
//!
//! Provides:
//! - Structured logging with tracing
//! - Prometheus metrics collection

pub mod config;
pub mod metrics;
pub mod tracing_config;

pub use config::{LogFormat, MonitoringConfig};
pub use metrics::{export_prometheus, observe_search_latency_ms, REGISTRY};
pub use tracing_config::init_tracing;
