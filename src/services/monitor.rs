//! Occupancy monitor - per-frame orchestration of counter, alerts and logging
//!
//! Wires the three independent components together the way the capture
//! loop needs them: `update → snapshot → check`, then a time-based save
//! cadence into the measurement store.

use crate::domain::alert::AlertEvent;
use crate::domain::types::{Detection, Stats};
use crate::infra::config::{Config, LogMode};
use crate::io::measurement_logger::MeasurementLogger;
use crate::services::alert_engine::AlertEngine;
use crate::services::rolling_counter::RollingCounter;
use std::time::{Duration, Instant};
use tracing::info;

/// Outcome of one processed frame
#[derive(Debug, Clone)]
pub struct FrameResult {
    pub stats: Stats,
    pub alert: Option<AlertEvent>,
}

pub struct OccupancyMonitor {
    counter: RollingCounter,
    alerts: AlertEngine,
    /// None when the monitor was built without a store
    logger: Option<MeasurementLogger>,
    log_mode: LogMode,
    /// Buffered mode flushes once this many records are pending
    flush_every: usize,
    save_interval: Duration,
    /// None until the first save, so the first frame is always recorded
    last_save: Option<Instant>,
}

impl OccupancyMonitor {
    pub fn new(counter: RollingCounter, alerts: AlertEngine) -> Self {
        Self {
            counter,
            alerts,
            logger: None,
            log_mode: LogMode::Immediate,
            flush_every: 1,
            save_interval: Duration::from_secs(1),
            last_save: None,
        }
    }

    /// Monitor without a measurement store
    pub fn in_memory(max_allowed: u32) -> Self {
        Self::new(RollingCounter::new(), AlertEngine::new(max_allowed, true))
    }

    /// Attach a measurement store with its save cadence
    pub fn with_logger(
        mut self,
        logger: MeasurementLogger,
        log_mode: LogMode,
        save_interval: Duration,
    ) -> Self {
        self.logger = Some(logger);
        self.log_mode = log_mode;
        self.save_interval = save_interval;
        self
    }

    /// Buffered mode flush threshold (at least 1)
    pub fn with_flush_every(mut self, flush_every: usize) -> Self {
        self.flush_every = flush_every.max(1);
        self
    }

    pub fn from_config(config: &Config) -> Self {
        let counter = RollingCounter::with_capacity(config.history_capacity());
        let alerts = AlertEngine::new(config.max_person_count(), config.alert_enabled())
            .with_cooldown_secs(config.alert_cooldown_secs());
        let logger = MeasurementLogger::new(config.csv_file(), config.logging_enabled());

        info!(
            max_person_count = config.max_person_count(),
            cooldown_secs = config.alert_cooldown_secs(),
            log_mode = ?config.log_mode(),
            "occupancy_monitor_initialized"
        );

        Self::new(counter, alerts)
            .with_logger(logger, config.log_mode(), config.save_interval())
            .with_flush_every(config.flush_every())
    }

    /// Process one frame's detections
    pub fn process(&mut self, detections: &[Detection]) -> FrameResult {
        self.process_at(detections, Instant::now())
    }

    pub fn process_at(&mut self, detections: &[Detection], now: Instant) -> FrameResult {
        let count = self.counter.update(detections);
        let stats = self.counter.snapshot_at(now);
        let alert = self.alerts.check_at(count, now);

        if self.save_due(now) {
            self.save(&stats);
            self.last_save = Some(now);
        }

        FrameResult { stats, alert }
    }

    fn save_due(&self, now: Instant) -> bool {
        match self.last_save {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.save_interval,
        }
    }

    fn save(&mut self, stats: &Stats) {
        let Some(logger) = self.logger.as_mut() else {
            return;
        };

        match self.log_mode {
            LogMode::Immediate => {
                logger.log_immediate(stats);
            }
            LogMode::Buffered => {
                logger.log(stats);
                if logger.buffered().len() >= self.flush_every {
                    logger.flush();
                }
            }
        }
    }

    /// Write a final record and flush anything still buffered
    pub fn finish(&mut self) -> Stats {
        let stats = self.counter.snapshot();

        if let Some(logger) = self.logger.as_mut() {
            match self.log_mode {
                LogMode::Immediate => {
                    logger.log_immediate(&stats);
                }
                LogMode::Buffered => logger.log(&stats),
            }
            logger.flush();
        }

        info!(
            total_frames = stats.total_frames,
            max_count = stats.max_count,
            average_count = format!("{:.2}", stats.average_count),
            fps = format!("{:.2}", stats.fps),
            "occupancy_monitor_finished"
        );
        stats
    }

    /// Reset counters and clear the alert history
    pub fn reset(&mut self) {
        self.counter.reset();
        self.alerts.clear_history();
        info!("occupancy_monitor_reset");
    }

    pub fn toggle_alerts(&mut self) -> bool {
        let enabled = !self.alerts.is_enabled();
        self.alerts.set_enabled(enabled);
        enabled
    }

    /// Returns the new state, false when no store is attached
    pub fn toggle_logging(&mut self) -> bool {
        match self.logger.as_mut() {
            Some(logger) => {
                let enabled = !logger.is_enabled();
                logger.set_enabled(enabled);
                enabled
            }
            None => false,
        }
    }

    pub fn counter(&self) -> &RollingCounter {
        &self.counter
    }

    pub fn alerts(&self) -> &AlertEngine {
        &self.alerts
    }

    pub fn alerts_mut(&mut self) -> &mut AlertEngine {
        &mut self.alerts
    }

    pub fn logger(&self) -> Option<&MeasurementLogger> {
        self.logger.as_ref()
    }

    pub fn logger_mut(&mut self) -> Option<&mut MeasurementLogger> {
        self.logger.as_mut()
    }
}
