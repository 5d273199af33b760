//! Infrastructure - configuration, metrics, and broker
//!
//! - `config` - Bridge configuration (TOML loading, env overrides, defaults)
//! - `metrics` - Lock-free counters with periodic reporting
//! - `broker` - Optional embedded MQTT broker (rumqttd)
//! - `logging` - tracing subscriber setup

pub mod broker;
pub mod config;
pub mod logging;
pub mod metrics;

// Re-export commonly used types
pub use config::Config;
pub use metrics::{Metrics, MetricsSummary};
