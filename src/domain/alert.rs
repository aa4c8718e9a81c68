//! Alert records and events produced by the alert engine

use crate::domain::types::Severity;
use serde::Serialize;
use std::collections::BTreeMap;

/// A single alert as produced by the engine
///
/// The same shape is used for stored alerts and for the transient
/// cooldown and normalization events; see [`AlertEvent`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRecord {
    pub severity: Severity,
    pub message: String,
    pub person_count: u32,
    pub max_allowed: u32,
    /// `person_count - max_allowed`, zero when not over the limit
    pub excess_count: u32,
    /// Epoch seconds
    pub timestamp: f64,
    /// `YYYY-MM-DD HH:MM:SS`
    pub datetime: String,
    pub is_active: bool,
}

/// Result of a single `AlertEngine::check` call
#[derive(Debug, Clone, PartialEq)]
pub enum AlertEvent {
    /// New alert, appended to the history
    Raised(AlertRecord),
    /// Still over the limit but inside the cooldown window; not stored
    Ongoing(AlertRecord),
    /// Occupancy returned to the limit after an active alert; not stored
    Normalized(AlertRecord),
}

impl AlertEvent {
    pub fn record(&self) -> &AlertRecord {
        match self {
            AlertEvent::Raised(r) | AlertEvent::Ongoing(r) | AlertEvent::Normalized(r) => r,
        }
    }

    pub fn into_record(self) -> AlertRecord {
        match self {
            AlertEvent::Raised(r) | AlertEvent::Ongoing(r) | AlertEvent::Normalized(r) => r,
        }
    }

    pub fn severity(&self) -> Severity {
        self.record().severity
    }

    pub fn message(&self) -> &str {
        &self.record().message
    }

    pub fn is_raised(&self) -> bool {
        matches!(self, AlertEvent::Raised(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AlertEvent::Raised(_) => "raised",
            AlertEvent::Ongoing(_) => "ongoing",
            AlertEvent::Normalized(_) => "normalized",
        }
    }
}

/// Aggregate view over the alert history
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AlertStats {
    pub total_alerts: usize,
    /// Records whose `is_active` flag was set when they were stored
    pub active_alerts: usize,
    pub max_person_count_seen: u32,
    /// Datetime of the most recent stored alert
    pub last_alert_time: Option<String>,
    pub severity_counts: BTreeMap<Severity, usize>,
    pub is_active: bool,
}

impl AlertStats {
    pub fn count_for(&self, severity: Severity) -> usize {
        self.severity_counts.get(&severity).copied().unwrap_or(0)
    }
}
