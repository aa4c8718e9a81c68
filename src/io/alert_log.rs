//! Alert log export - text dump of the alert history, or JSON when the
//! destination ends in `.json`

use crate::domain::alert::{AlertRecord, AlertStats};
use crate::services::alert_engine::AlertEngine;
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;
use tracing::{info, warn};

/// Render the alert history and its summary block
///
/// An empty history is stated explicitly, so the output is never empty.
pub fn render_alert_log(history: &[AlertRecord], stats: &AlertStats) -> String {
    let mut out = String::from("=== ALERT HISTORY ===\n\n");

    if history.is_empty() {
        out.push_str("No alerts recorded.\n");
    } else {
        for (i, alert) in history.iter().enumerate() {
            let status = if alert.is_active { "active" } else { "ended" };
            // writing into a String cannot fail
            let _ = write!(
                out,
                "Alert #{}:\n  Time: {}\n  Severity: {}\n  Message: {}\n  Person count: {}\n  Status: {}\n\n",
                i + 1,
                alert.datetime,
                alert.severity,
                alert.message,
                alert.person_count,
                status
            );
        }
    }

    out.push_str("=== SUMMARY ===\n");
    let _ = writeln!(out, "Total alerts: {}", stats.total_alerts);
    let _ = writeln!(out, "Max person count: {}", stats.max_person_count_seen);
    let _ = writeln!(out, "Last alert: {}", stats.last_alert_time.as_deref().unwrap_or("none"));
    out
}

#[derive(Serialize)]
struct AlertLogJson<'a> {
    alerts: &'a [AlertRecord],
    summary: &'a AlertStats,
}

/// Render the alert history and its summary as a JSON document
pub fn render_alert_log_json(
    history: &[AlertRecord],
    stats: &AlertStats,
) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&AlertLogJson { alerts: history, summary: stats })
}

impl AlertEngine {
    /// Write the alert history to a file, replacing any previous content
    ///
    /// JSON when `path` ends in `.json`, text otherwise. Returns true if the
    /// file was written.
    pub fn export_log(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let history = self.history(None);
        let stats = self.stats();

        let content = if path.extension().is_some_and(|ext| ext == "json") {
            render_alert_log_json(&history, &stats).map_err(std::io::Error::from)
        } else {
            Ok(render_alert_log(&history, &stats))
        };

        let result = content.and_then(|content| {
            path.parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map_or(Ok(()), std::fs::create_dir_all)?;
            std::fs::write(path, content)
        });

        match result {
            Ok(()) => {
                info!(path = %path.display(), alerts = self.stats().total_alerts, "alert_log_exported");
                true
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "alert_log_export_failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_empty_history_is_explicit() {
        let engine = AlertEngine::default();
        let text = render_alert_log(&engine.history(None), &engine.stats());

        assert!(text.contains("No alerts recorded."));
        assert!(text.contains("Total alerts: 0"));
        assert!(text.contains("Last alert: none"));
    }

    #[test]
    fn test_entries_are_numbered() {
        let mut engine = AlertEngine::new(2, true).with_cooldown_secs(0.0);
        engine.check(3);
        engine.check(9);

        let text = render_alert_log(&engine.history(None), &engine.stats());
        assert!(text.contains("Alert #1:"));
        assert!(text.contains("Alert #2:"));
        assert!(text.contains("Severity: warning"));
        assert!(text.contains("Severity: emergency"));
        assert!(text.contains("Person count: 9"));
        assert!(text.contains("Status: active"));
        assert!(text.contains("Max person count: 9"));
        assert!(!text.contains("No alerts recorded."));
    }

    #[test]
    fn test_export_log_writes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reports").join("alert_log.txt");

        let mut engine = AlertEngine::new(1, true);
        engine.check(4);

        assert!(engine.export_log(&path));
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("=== ALERT HISTORY ==="));
        assert!(content.contains("Total alerts: 1"));
    }

    #[test]
    fn test_export_log_empty_history_not_empty_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("alert_log.txt");

        assert!(AlertEngine::default().export_log(&path));
        assert!(fs::read_to_string(&path).unwrap().contains("No alerts recorded."));
    }

    #[test]
    fn test_export_log_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("alerts.json");

        let mut engine = AlertEngine::new(2, true).with_cooldown_secs(0.0);
        engine.check(3);
        engine.check(8);

        assert!(engine.export_log(&path));
        let doc: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();

        let alerts = doc["alerts"].as_array().unwrap();
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0]["severity"], "warning");
        assert_eq!(alerts[1]["severity"], "emergency");
        assert_eq!(alerts[1]["excess_count"], 6);
        assert_eq!(doc["summary"]["total_alerts"], 2);
        assert_eq!(doc["summary"]["max_person_count_seen"], 8);
        assert_eq!(doc["summary"]["severity_counts"]["warning"], 1);
    }

    #[test]
    fn test_export_log_json_empty_history() {
        let engine = AlertEngine::default();
        let json = render_alert_log_json(&engine.history(None), &engine.stats()).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert!(doc["alerts"].as_array().unwrap().is_empty());
        assert!(doc["summary"]["last_alert_time"].is_null());
    }

    #[test]
    fn test_export_log_failure_returns_false() {
        let dir = tempdir().unwrap();
        // target is an existing directory
        assert!(!AlertEngine::default().export_log(dir.path()));
    }
}
