//! IO modules - persistence and input
//!
//! - `measurement_logger` - CSV measurement store with snapshot export
//! - `alert_log` - Text export of the alert history
//! - `replay` - JSONL detection replay source

pub mod alert_log;
pub mod measurement_logger;
pub mod replay;

pub use measurement_logger::{LogRecord, MeasurementLogger, SummaryStats};
pub use replay::{ReplayDetector, ReplayFrame, ReplaySource};
