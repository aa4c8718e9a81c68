//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml
//!
//! Every section and key is optional; missing values take the defaults below.

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// How the monitor writes snapshots to the measurement store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogMode {
    /// One append per save
    Immediate,
    /// Buffer in memory, flush every `flush_every` records
    Buffered,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertConfig {
    #[serde(default = "default_max_person_count")]
    pub max_person_count: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: f64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            max_person_count: default_max_person_count(),
            enabled: true,
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

fn default_max_person_count() -> u32 {
    10
}

fn default_cooldown_secs() -> f64 {
    5.0
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct CounterConfig {
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self { history_capacity: default_history_capacity() }
    }
}

fn default_history_capacity() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectorConfig {
    /// Keep only detections of this class (negative keeps all)
    #[serde(default = "default_person_class_id")]
    pub class_id: i32,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            class_id: default_person_class_id(),
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

fn default_person_class_id() -> i32 {
    0 // "person" in COCO
}

fn default_confidence_threshold() -> f32 {
    0.5
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_csv_file")]
    pub csv_file: String,
    #[serde(default = "default_save_interval_secs")]
    pub save_interval_secs: f64,
    #[serde(default = "default_log_mode")]
    pub mode: LogMode,
    #[serde(default = "default_flush_every")]
    pub flush_every: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            csv_file: default_csv_file(),
            save_interval_secs: default_save_interval_secs(),
            mode: default_log_mode(),
            flush_every: default_flush_every(),
        }
    }
}

fn default_csv_file() -> String {
    "data/processed/person_count_data.csv".to_string()
}

fn default_save_interval_secs() -> f64 {
    1.0
}

fn default_log_mode() -> LogMode {
    LogMode::Immediate
}

fn default_flush_every() -> usize {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_alert_log")]
    pub alert_log: String,
    /// Measurement snapshot destination (default: next to the store)
    #[serde(default)]
    pub snapshot: Option<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self { alert_log: default_alert_log(), snapshot: None }
    }
}

fn default_alert_log() -> String {
    "alert_log.txt".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs() }
    }
}

fn default_metrics_interval_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub alert: AlertConfig,
    #[serde(default)]
    pub counter: CounterConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    max_person_count: u32,
    alert_enabled: bool,
    alert_cooldown_secs: f64,
    history_capacity: usize,
    detector_class_id: Option<i32>,
    confidence_threshold: f32,
    logging_enabled: bool,
    csv_file: String,
    save_interval: Duration,
    log_mode: LogMode,
    flush_every: usize,
    alert_log_file: String,
    snapshot_file: Option<String>,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_person_count: 10,
            alert_enabled: true,
            alert_cooldown_secs: 5.0,
            history_capacity: 100,
            detector_class_id: Some(0),
            confidence_threshold: 0.5,
            logging_enabled: true,
            csv_file: default_csv_file(),
            save_interval: Duration::from_secs(1),
            log_mode: LogMode::Immediate,
            flush_every: 30,
            alert_log_file: default_alert_log(),
            snapshot_file: None,
            metrics_interval_secs: 10,
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        let save_interval = Duration::try_from_secs_f64(toml_config.logging.save_interval_secs)
            .unwrap_or_else(|_| {
                warn!(
                    save_interval_secs = toml_config.logging.save_interval_secs,
                    "invalid_save_interval_using_default"
                );
                Duration::from_secs(1)
            });

        Self {
            max_person_count: toml_config.alert.max_person_count,
            alert_enabled: toml_config.alert.enabled,
            alert_cooldown_secs: toml_config.alert.cooldown_secs,
            history_capacity: toml_config.counter.history_capacity.max(1),
            detector_class_id: Some(toml_config.detector.class_id).filter(|id| *id >= 0),
            confidence_threshold: toml_config.detector.confidence_threshold.clamp(0.0, 1.0),
            logging_enabled: toml_config.logging.enabled,
            csv_file: toml_config.logging.csv_file,
            save_interval,
            log_mode: toml_config.logging.mode,
            flush_every: toml_config.logging.flush_every.max(1),
            alert_log_file: toml_config.export.alert_log,
            snapshot_file: toml_config.export.snapshot,
            metrics_interval_secs: toml_config.metrics.interval_secs.max(1),
            config_file,
        }
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(args: &[String]) -> Self {
        Self::load_from_path(&Self::resolve_config_path(args))
    }

    /// Load from an explicit path, falling back to defaults on any error
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    pub fn max_person_count(&self) -> u32 {
        self.max_person_count
    }

    pub fn alert_enabled(&self) -> bool {
        self.alert_enabled
    }

    pub fn alert_cooldown_secs(&self) -> f64 {
        self.alert_cooldown_secs
    }

    pub fn history_capacity(&self) -> usize {
        self.history_capacity
    }

    pub fn detector_class_id(&self) -> Option<i32> {
        self.detector_class_id
    }

    pub fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    pub fn logging_enabled(&self) -> bool {
        self.logging_enabled
    }

    pub fn csv_file(&self) -> &str {
        &self.csv_file
    }

    pub fn save_interval(&self) -> Duration {
        self.save_interval
    }

    pub fn log_mode(&self) -> LogMode {
        self.log_mode
    }

    pub fn flush_every(&self) -> usize {
        self.flush_every
    }

    pub fn alert_log_file(&self) -> &str {
        &self.alert_log_file
    }

    pub fn snapshot_file(&self) -> Option<&str> {
        self.snapshot_file.as_deref()
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Override the occupancy limit (CLI)
    pub fn with_max_person_count(mut self, max_person_count: u32) -> Self {
        self.max_person_count = max_person_count;
        self
    }

    pub fn with_alert_enabled(mut self, enabled: bool) -> Self {
        self.alert_enabled = enabled;
        self
    }

    pub fn with_logging_enabled(mut self, enabled: bool) -> Self {
        self.logging_enabled = enabled;
        self
    }

    pub fn with_csv_file(mut self, csv_file: impl Into<String>) -> Self {
        self.csv_file = csv_file.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.max_person_count(), 10);
        assert!(config.alert_enabled());
        assert_eq!(config.alert_cooldown_secs(), 5.0);
        assert_eq!(config.history_capacity(), 100);
        assert_eq!(config.csv_file(), "data/processed/person_count_data.csv");
        assert_eq!(config.save_interval(), Duration::from_secs(1));
        assert_eq!(config.log_mode(), LogMode::Immediate);
        assert_eq!(config.detector_class_id(), Some(0));
    }

    #[test]
    fn test_empty_toml_matches_defaults() {
        let toml_config: TomlConfig = toml::from_str("").unwrap();
        let config = Config::from_toml(toml_config, "inline".to_string());
        let defaults = Config::default();

        assert_eq!(config.max_person_count(), defaults.max_person_count());
        assert_eq!(config.alert_cooldown_secs(), defaults.alert_cooldown_secs());
        assert_eq!(config.history_capacity(), defaults.history_capacity());
        assert_eq!(config.csv_file(), defaults.csv_file());
        assert_eq!(config.save_interval(), defaults.save_interval());
        assert_eq!(config.flush_every(), defaults.flush_every());
        assert_eq!(config.alert_log_file(), defaults.alert_log_file());
        assert_eq!(config.confidence_threshold(), defaults.confidence_threshold());
    }

    #[test]
    fn test_invalid_values_are_clamped() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
[counter]
history_capacity = 0

[logging]
save_interval_secs = -2.0
flush_every = 0

[detector]
class_id = -1
confidence_threshold = 3.0
"#,
        )
        .unwrap();
        let config = Config::from_toml(toml_config, "inline".to_string());

        assert_eq!(config.history_capacity(), 1);
        assert_eq!(config.save_interval(), Duration::from_secs(1));
        assert_eq!(config.flush_every(), 1);
        assert_eq!(config.confidence_threshold(), 1.0);
        assert_eq!(config.detector_class_id(), None);
    }

    #[test]
    fn test_resolve_config_path_default() {
        let args: Vec<String> = vec!["occupancy-monitor".to_string()];
        if env::var("CONFIG_FILE").is_err() {
            assert_eq!(Config::resolve_config_path(&args), "config/dev.toml");
        }
    }

    #[test]
    fn test_resolve_config_path_from_arg() {
        let args: Vec<String> = vec![
            "occupancy-monitor".to_string(),
            "--config".to_string(),
            "config/lobby.toml".to_string(),
        ];
        assert_eq!(Config::resolve_config_path(&args), "config/lobby.toml");
    }

    #[test]
    fn test_resolve_config_path_from_arg_equals() {
        let args: Vec<String> =
            vec!["occupancy-monitor".to_string(), "--config=config/hall.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/hall.toml");
    }

    #[test]
    fn test_cli_overrides() {
        let config = Config::default()
            .with_max_person_count(3)
            .with_alert_enabled(false)
            .with_logging_enabled(false)
            .with_csv_file("out.csv");
        assert_eq!(config.max_person_count(), 3);
        assert!(!config.alert_enabled());
        assert!(!config.logging_enabled());
        assert_eq!(config.csv_file(), "out.csv");
    }
}
