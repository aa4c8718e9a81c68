//! Domain models - detections, counter snapshots and alerts
//!
//! This module contains the canonical data types used throughout the system:
//! - `Detection` - one detector result for a frame (consumed only)
//! - `Stats` - point-in-time snapshot of the rolling counter
//! - `Severity` - alert tier derived from the excess over the limit
//! - `AlertRecord` / `AlertEvent` - alerts produced by the alert engine

pub mod alert;
pub mod types;

pub use alert::{AlertEvent, AlertRecord, AlertStats};
pub use types::{Detection, Severity, Stats};
