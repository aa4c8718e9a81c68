//! Shared types for the occupancy pipeline

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Datetime format used in the measurement store and alert log
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a wall-clock time as `YYYY-MM-DD HH:MM:SS`
#[inline]
pub fn format_datetime(at: &DateTime<Local>) -> String {
    at.format(DATETIME_FORMAT).to_string()
}

/// Seconds since the Unix epoch with sub-second precision
#[inline]
pub fn epoch_secs(at: &DateTime<Local>) -> f64 {
    at.timestamp_micros() as f64 / 1_000_000.0
}

/// Round to a fixed number of decimal places
#[inline]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Pixel-space bounding box `[x1, y1, x2, y2]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl From<[i32; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [i32; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BoundingBox> for [i32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

/// One detector result for a single frame
///
/// Only the number of detections in a frame is meaningful to the pipeline;
/// bbox and class are carried through unvalidated.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default)]
    pub bbox: BoundingBox,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default, alias = "classId")]
    pub class_id: i32,
}

impl Detection {
    pub fn new(bbox: [i32; 4], confidence: f32, class_id: i32) -> Self {
        Self { bbox: bbox.into(), confidence, class_id }
    }
}

/// Point-in-time snapshot of the rolling counter
///
/// Every field defaults to zero, so partial snapshots (e.g. deserialized
/// from a JSON object with missing keys) are always loggable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Stats {
    pub current_count: u32,
    pub max_count: u32,
    pub average_count: f64,
    pub total_detections: u64,
    pub total_frames: u64,
    pub frames_with_persons: u64,
    pub detection_rate: f64,
    pub fps: f64,
    /// Seconds since the counter was created or last reset
    pub running_time: f64,
}

/// Alert tier derived from how far occupancy exceeds the limit
///
/// `Info` is only used for transient normalization events and is never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
    Emergency,
}

impl Severity {
    /// Severity for a positive excess: 1-2 warning, 3-5 critical, >5 emergency
    pub fn from_excess(excess: u32) -> Self {
        match excess {
            0..=2 => Severity::Warning,
            3..=5 => Severity::Critical,
            _ => Severity::Emergency,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
            Severity::Emergency => "emergency",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_severity_from_excess() {
        assert_eq!(Severity::from_excess(1), Severity::Warning);
        assert_eq!(Severity::from_excess(2), Severity::Warning);
        assert_eq!(Severity::from_excess(3), Severity::Critical);
        assert_eq!(Severity::from_excess(5), Severity::Critical);
        assert_eq!(Severity::from_excess(6), Severity::Emergency);
        assert_eq!(Severity::from_excess(40), Severity::Emergency);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Critical);
        assert!(Severity::Critical < Severity::Emergency);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(3.14159, 2), 3.14);
        assert_eq!(round_to(0.66666, 3), 0.667);
        assert_eq!(round_to(5.0, 2), 5.0);
    }

    #[test]
    fn test_format_datetime() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(format_datetime(&at), "2024-03-09 07:05:01");
    }

    #[test]
    fn test_detection_deserializes_bbox_array() {
        let d: Detection =
            serde_json::from_str(r#"{"bbox": [1, 2, 30, 40], "confidence": 0.9, "class_id": 0}"#)
                .unwrap();
        assert_eq!(d.bbox, BoundingBox { x1: 1, y1: 2, x2: 30, y2: 40 });
        assert_eq!(d.class_id, 0);
    }

    #[test]
    fn test_stats_missing_fields_default_to_zero() {
        let stats: Stats = serde_json::from_str(r#"{"current_count": 4}"#).unwrap();
        assert_eq!(stats.current_count, 4);
        assert_eq!(stats.max_count, 0);
        assert_eq!(stats.fps, 0.0);
        assert_eq!(stats.running_time, 0.0);
    }
}
