//! Infrastructure - configuration and metrics
//!
//! - `config` - Application configuration (TOML loading, defaults)
//! - `metrics` - Lock-free pipeline metrics

pub mod config;
pub mod metrics;

pub use config::{Config, LogMode};
pub use metrics::{PipelineMetrics, PipelineSummary};
