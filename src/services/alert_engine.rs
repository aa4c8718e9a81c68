//! Occupancy alert state machine
//!
//! Two states, `Normal` and `Alerting`. A breach (`count > max_allowed`)
//! outside the cooldown window raises a new alert and appends it to the
//! history. Breaches inside the cooldown window produce a transient
//! "ongoing" event that is not stored. Dropping back to or below the limit
//! while alerting produces a transient `info` normalization event.
//!
//! Config setters take effect on the next `check()` call.

use crate::domain::alert::{AlertEvent, AlertRecord, AlertStats};
use crate::domain::types::{epoch_secs, format_datetime, Severity};
use chrono::Local;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default occupancy limit
pub const DEFAULT_MAX_ALLOWED: u32 = 10;

/// Default minimum time between two recorded alerts
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(5);

pub struct AlertEngine {
    max_allowed: u32,
    enabled: bool,
    cooldown: Duration,
    /// When the last alert was recorded (None = never)
    last_alert_at: Option<Instant>,
    is_active: bool,
    history: Vec<AlertRecord>,
}

impl AlertEngine {
    pub fn new(max_allowed: u32, enabled: bool) -> Self {
        Self {
            max_allowed,
            enabled,
            cooldown: DEFAULT_COOLDOWN,
            last_alert_at: None,
            is_active: false,
            history: Vec::new(),
        }
    }

    /// Builder to set the cooldown at construction
    pub fn with_cooldown_secs(mut self, seconds: f64) -> Self {
        self.cooldown = clamp_cooldown(seconds);
        self
    }

    /// Evaluate the current occupancy against the limit
    pub fn check(&mut self, person_count: u32) -> Option<AlertEvent> {
        self.check_at(person_count, Instant::now())
    }

    /// Same as `check`, with an explicit monotonic clock reading
    pub fn check_at(&mut self, person_count: u32, now: Instant) -> Option<AlertEvent> {
        if !self.enabled {
            return None;
        }

        if person_count > self.max_allowed {
            if self.cooldown_elapsed(now) {
                let record = self.build_alert(person_count);
                self.history.push(record.clone());
                self.last_alert_at = Some(now);
                self.is_active = true;

                info!(
                    severity = %record.severity,
                    person_count = person_count,
                    max_allowed = self.max_allowed,
                    excess = record.excess_count,
                    "alert_raised"
                );
                return Some(AlertEvent::Raised(record));
            }

            debug!(person_count = person_count, "alert_suppressed_by_cooldown");
            return Some(AlertEvent::Ongoing(self.build_ongoing(person_count)));
        }

        if self.is_active {
            self.is_active = false;
            info!(person_count = person_count, max_allowed = self.max_allowed, "alert_normalized");
            return Some(AlertEvent::Normalized(self.build_normalized(person_count)));
        }

        None
    }

    fn cooldown_elapsed(&self, now: Instant) -> bool {
        match self.last_alert_at {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.cooldown,
        }
    }

    fn build_alert(&self, person_count: u32) -> AlertRecord {
        let excess = person_count - self.max_allowed;
        let severity = Severity::from_excess(excess);
        let message = match severity {
            Severity::Critical => format!(
                "Critical: {} people ({} over the limit of {})",
                person_count, excess, self.max_allowed
            ),
            Severity::Emergency => format!(
                "Emergency: {} people ({} over the limit of {})",
                person_count, excess, self.max_allowed
            ),
            _ => format!(
                "Warning: detected {} people ({} over the limit of {})",
                person_count, excess, self.max_allowed
            ),
        };
        self.record(severity, message, person_count, true)
    }

    /// Cooldown events carry the current excess and its severity
    fn build_ongoing(&self, person_count: u32) -> AlertRecord {
        let excess = person_count - self.max_allowed;
        let message = format!(
            "Warning: {} people (over the limit of {})",
            person_count, self.max_allowed
        );
        self.record(Severity::from_excess(excess), message, person_count, true)
    }

    fn build_normalized(&self, person_count: u32) -> AlertRecord {
        let message = format!("Occupancy back to normal: {} people", person_count);
        self.record(Severity::Info, message, person_count, false)
    }

    fn record(
        &self,
        severity: Severity,
        message: String,
        person_count: u32,
        is_active: bool,
    ) -> AlertRecord {
        let now = Local::now();
        AlertRecord {
            severity,
            message,
            person_count,
            max_allowed: self.max_allowed,
            excess_count: person_count.saturating_sub(self.max_allowed),
            timestamp: epoch_secs(&now),
            datetime: format_datetime(&now),
            is_active,
        }
    }

    /// Copy of the stored alerts, optionally only the most recent `limit`
    pub fn history(&self, limit: Option<usize>) -> Vec<AlertRecord> {
        match limit {
            Some(n) => {
                let start = self.history.len().saturating_sub(n);
                self.history[start..].to_vec()
            }
            None => self.history.clone(),
        }
    }

    /// Aggregate statistics computed from the stored alerts
    pub fn stats(&self) -> AlertStats {
        let mut severity_counts = BTreeMap::new();
        for record in &self.history {
            *severity_counts.entry(record.severity).or_insert(0) += 1;
        }

        AlertStats {
            total_alerts: self.history.len(),
            active_alerts: self.history.iter().filter(|r| r.is_active).count(),
            max_person_count_seen: self.history.iter().map(|r| r.person_count).max().unwrap_or(0),
            last_alert_time: self.history.last().map(|r| r.datetime.clone()),
            severity_counts,
            is_active: self.is_active,
        }
    }

    pub fn set_max_allowed(&mut self, max_allowed: u32) {
        self.max_allowed = max_allowed;
        info!(max_allowed = max_allowed, "alert_max_allowed_changed");
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        info!(enabled = enabled, "alert_enabled_changed");
    }

    /// Negative or NaN values clamp to zero, oversized ones to `Duration::MAX`
    pub fn set_cooldown(&mut self, seconds: f64) {
        self.cooldown = clamp_cooldown(seconds);
        info!(cooldown_secs = self.cooldown.as_secs_f64(), "alert_cooldown_changed");
    }

    /// Drop the stored alerts and leave the alerting state
    ///
    /// The last alert time is kept, so the cooldown still applies.
    pub fn clear_history(&mut self) {
        let cleared = self.history.len();
        self.history.clear();
        self.is_active = false;
        info!(cleared = cleared, "alert_history_cleared");
    }

    #[inline]
    pub fn max_allowed(&self) -> u32 {
        self.max_allowed
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[inline]
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.is_active
    }
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ALLOWED, true)
    }
}

fn clamp_cooldown(seconds: f64) -> Duration {
    match Duration::try_from_secs_f64(seconds) {
        Ok(d) => d,
        Err(_) => {
            warn!(cooldown_secs = seconds, "invalid_alert_cooldown_clamped");
            if seconds.is_nan() || seconds < 0.0 {
                Duration::ZERO
            } else {
                Duration::MAX
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(max_allowed: u32, cooldown_secs: f64) -> AlertEngine {
        AlertEngine::new(max_allowed, true).with_cooldown_secs(cooldown_secs)
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_boundary_does_not_alert() {
        let mut engine = engine(10, 0.0);
        assert!(engine.check(10).is_none());
        assert!(engine.history(None).is_empty());
        assert!(!engine.is_active());
    }

    #[test]
    fn test_severity_boundaries() {
        let cases = [(11, Severity::Warning, 1), (13, Severity::Critical, 3), (16, Severity::Emergency, 6)];

        for (count, severity, excess) in cases {
            let mut engine = engine(10, 0.0);
            let event = engine.check(count).unwrap();
            assert!(event.is_raised());
            assert_eq!(event.severity(), severity);
            assert_eq!(event.record().excess_count, excess);
            assert_eq!(event.record().max_allowed, 10);
            assert!(event.message().contains(&excess.to_string()));
        }
    }

    #[test]
    fn test_cooldown_suppresses_second_record() {
        let mut engine = engine(5, 5.0);
        let t0 = Instant::now();

        assert!(engine.check_at(6, t0).unwrap().is_raised());

        let second = engine.check_at(8, t0 + secs(2)).unwrap();
        assert!(matches!(second, AlertEvent::Ongoing(_)));
        assert_eq!(second.record().person_count, 8);
        assert_eq!(second.record().excess_count, 3);
        assert_eq!(second.severity(), Severity::Critical);
        assert_eq!(engine.history(None).len(), 1);

        let third = engine.check_at(6, t0 + secs(5)).unwrap();
        assert!(third.is_raised());
        assert_eq!(engine.history(None).len(), 2);
    }

    #[test]
    fn test_ongoing_does_not_extend_cooldown() {
        let mut engine = engine(5, 5.0);
        let t0 = Instant::now();

        engine.check_at(6, t0);
        engine.check_at(6, t0 + secs(4));
        // measured from the recorded alert at t0, not the suppressed one at t0+4
        assert!(engine.check_at(6, t0 + secs(5)).unwrap().is_raised());
    }

    #[test]
    fn test_retrigger_same_severity_creates_new_entry() {
        let mut engine = engine(10, 1.0);
        let t0 = Instant::now();

        engine.check_at(11, t0);
        engine.check_at(11, t0 + secs(1));

        let history = engine.history(None);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].severity, Severity::Warning);
        assert_eq!(history[1].severity, Severity::Warning);
    }

    #[test]
    fn test_normalization_event() {
        let mut engine = engine(10, 0.0);
        engine.check(12);
        assert!(engine.is_active());

        let event = engine.check(9).unwrap();
        assert!(matches!(event, AlertEvent::Normalized(_)));
        assert_eq!(event.severity(), Severity::Info);
        assert!(!event.record().is_active);
        assert!(!engine.is_active());
        assert_eq!(engine.history(None).len(), 1);

        // already normal: nothing more
        assert!(engine.check(9).is_none());
    }

    #[test]
    fn test_sequence_scenario() {
        let mut engine = engine(10, 0.0);
        let t0 = Instant::now();

        assert!(engine.check_at(8, t0).is_none());
        assert!(engine.check_at(11, t0).unwrap().is_raised());
        engine.check_at(12, t0);
        let last = engine.check_at(10, t0).unwrap();
        assert!(matches!(last, AlertEvent::Normalized(_)));

        let history = engine.history(None);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].person_count, 11);
        assert_eq!(history[0].severity, Severity::Warning);
        assert!(!engine.is_active());
    }

    #[test]
    fn test_sequence_scenario_with_cooldown() {
        let mut engine = engine(10, 5.0);
        let t0 = Instant::now();

        engine.check_at(8, t0);
        engine.check_at(11, t0);
        engine.check_at(12, t0);
        engine.check_at(10, t0);

        let history = engine.history(None);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].person_count, 11);
        assert_eq!(history[0].severity, Severity::Warning);
        assert!(!engine.is_active());
    }

    #[test]
    fn test_disabled_engine_is_inert() {
        let mut engine = engine(10, 0.0);
        engine.set_enabled(false);

        assert!(engine.check(50).is_none());
        assert!(engine.history(None).is_empty());
        assert!(!engine.is_active());

        engine.set_enabled(true);
        assert!(engine.check(50).unwrap().is_raised());
    }

    #[test]
    fn test_set_max_allowed_applies_on_next_check() {
        let mut engine = engine(10, 0.0);
        assert!(engine.check(12).is_some());
        engine.set_max_allowed(20);
        let event = engine.check(12).unwrap();
        assert!(matches!(event, AlertEvent::Normalized(_)));
    }

    #[test]
    fn test_history_limit_returns_most_recent_in_order() {
        let mut engine = engine(0, 0.0);
        for count in 1..=5 {
            engine.check(count);
        }

        let recent: Vec<u32> =
            engine.history(Some(2)).iter().map(|r| r.person_count).collect();
        assert_eq!(recent, vec![4, 5]);
        assert_eq!(engine.history(Some(10)).len(), 5);
        assert!(engine.history(Some(0)).is_empty());
    }

    #[test]
    fn test_history_is_a_copy() {
        let mut engine = engine(0, 0.0);
        engine.check(3);

        let mut copy = engine.history(None);
        copy[0].person_count = 999;
        copy.clear();

        assert_eq!(engine.history(None).len(), 1);
        assert_eq!(engine.history(None)[0].person_count, 3);
    }

    #[test]
    fn test_stats() {
        let mut engine = engine(10, 0.0);
        assert_eq!(engine.stats(), AlertStats::default());

        engine.check(11);
        engine.check(14);
        engine.check(20);
        engine.check(12);

        let stats = engine.stats();
        assert_eq!(stats.total_alerts, 4);
        assert_eq!(stats.active_alerts, 4);
        assert_eq!(stats.max_person_count_seen, 20);
        assert_eq!(stats.count_for(Severity::Warning), 2);
        assert_eq!(stats.count_for(Severity::Critical), 1);
        assert_eq!(stats.count_for(Severity::Emergency), 1);
        assert_eq!(stats.count_for(Severity::Info), 0);
        assert!(stats.last_alert_time.is_some());
        assert!(stats.is_active);
    }

    #[test]
    fn test_clear_history_keeps_cooldown() {
        let mut engine = engine(10, 60.0);
        let t0 = Instant::now();

        engine.check_at(11, t0);
        engine.clear_history();
        assert!(engine.history(None).is_empty());
        assert!(!engine.is_active());

        // still inside the cooldown from the cleared alert
        let event = engine.check_at(11, t0 + secs(1)).unwrap();
        assert!(matches!(event, AlertEvent::Ongoing(_)));
        assert!(engine.history(None).is_empty());
    }

    #[test]
    fn test_invalid_cooldown_is_clamped() {
        let mut engine = AlertEngine::default();
        engine.set_cooldown(-3.0);
        assert_eq!(engine.cooldown(), Duration::ZERO);
        engine.set_cooldown(f64::NAN);
        assert_eq!(engine.cooldown(), Duration::ZERO);
        engine.set_cooldown(2.5);
        assert_eq!(engine.cooldown(), Duration::from_millis(2500));
    }

    #[test]
    fn test_default_engine() {
        let engine = AlertEngine::default();
        assert_eq!(engine.max_allowed(), 10);
        assert!(engine.is_enabled());
        assert_eq!(engine.cooldown(), Duration::from_secs(5));
    }
}
