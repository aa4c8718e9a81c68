//! Occupancy monitor - person counting with over-capacity alerts
//!
//! Replays per-frame person detections through the capture pipeline,
//! records periodic measurements and raises alerts when the configured
//! occupancy limit is exceeded.
//!
//! Module structure:
//! - `domain/` - Core types (Detection, Stats, Severity, AlertRecord)
//! - `services/` - Counter, alert engine, monitor, capture worker
//! - `io/` - Measurement store, alert log export, replay input
//! - `infra/` - Config and metrics

use anyhow::Context;
use clap::Parser;
use occupancy_monitor::domain::AlertEvent;
use occupancy_monitor::infra::{Config, PipelineMetrics};
use occupancy_monitor::io::{ReplayDetector, ReplayFrame, ReplaySource};
use occupancy_monitor::services::mailbox::{mailbox, Subscriber};
use occupancy_monitor::services::{CaptureWorker, FrameUpdate, OccupancyMonitor};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Occupancy monitor - counts people per frame and alerts on overcrowding
#[derive(Parser, Debug)]
#[command(name = "occupancy-monitor", version, about)]
struct Args {
    /// Path to TOML configuration file (default: $CONFIG_FILE or config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// JSONL file with one frame of detections per line
    #[arg(short, long)]
    input: PathBuf,

    /// Override the occupancy limit
    #[arg(long)]
    max_persons: Option<u32>,

    /// Disable the measurement store
    #[arg(long)]
    no_log: bool,

    /// Disable alerting
    #[arg(long)]
    no_alerts: bool,

    /// Replay rate in frames per second (0 = as fast as possible)
    #[arg(long, default_value_t = 0.0)]
    fps: f64,
}

const RECV_TIMEOUT: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default INFO level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!("occupancy-monitor starting");

    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(|| Config::resolve_config_path(&[]));
    let mut config = Config::load_from_path(&config_path);
    if let Some(max_persons) = args.max_persons {
        config = config.with_max_person_count(max_persons);
    }
    if args.no_log {
        config = config.with_logging_enabled(false);
    }
    if args.no_alerts {
        config = config.with_alert_enabled(false);
    }

    info!(
        config_file = %config.config_file(),
        input = %args.input.display(),
        max_person_count = %config.max_person_count(),
        alert_enabled = %config.alert_enabled(),
        cooldown_secs = %config.alert_cooldown_secs(),
        logging_enabled = %config.logging_enabled(),
        csv_file = %config.csv_file(),
        log_mode = ?config.log_mode(),
        "config_loaded"
    );

    let source = ReplaySource::open(&args.input)?.with_fps(args.fps);
    let detector = ReplayDetector::from_config(&config);
    let monitor = OccupancyMonitor::from_config(&config);

    let (publisher, mut subscriber) = mailbox::<FrameUpdate<ReplayFrame>>();
    let metrics = Arc::new(PipelineMetrics::new());

    let worker = CaptureWorker::spawn(source, detector, monitor, publisher, metrics.clone())
        .context("Failed to spawn capture worker")?;

    // Ctrl+C requests a cooperative stop; the worker closes the mailbox on exit
    let stop = worker.stop_flag();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        stop.store(true, Ordering::Relaxed);
    });

    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    let reporter = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        interval.tick().await;
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    let consumed = consume(&mut subscriber, &worker).await;

    let mut monitor = worker.join()?;
    reporter.abort();

    let stats = monitor.finish();
    monitor.alerts().export_log(config.alert_log_file());

    if let Some(logger) = monitor.logger().filter(|l| l.is_enabled()) {
        let destination = config
            .snapshot_file()
            .map(PathBuf::from)
            .unwrap_or_else(|| logger.default_snapshot_path());
        logger.export_snapshot(&destination);

        if let Some(summary) = logger.summary() {
            info!(
                total_records = summary.total_records,
                max_person_count = summary.max_person_count,
                avg_person_count = summary.avg_person_count,
                avg_fps = summary.avg_fps,
                first_record = %summary.first_record_datetime,
                last_record = %summary.last_record_datetime,
                "measurement_summary"
            );
        }
    }

    let alert_stats = monitor.alerts().stats();
    info!(
        frames = stats.total_frames,
        frames_consumed = consumed,
        max_count = stats.max_count,
        average_count = format!("{:.2}", stats.average_count),
        detection_rate = format!("{:.1}", stats.detection_rate),
        running_time = format!("{:.1}", stats.running_time),
        total_alerts = alert_stats.total_alerts,
        max_person_count_seen = alert_stats.max_person_count_seen,
        "final_stats"
    );
    metrics.report().log();

    info!("occupancy-monitor shutdown complete");
    Ok(())
}

/// Drain updates until the worker closes the mailbox or exits
///
/// Returns the number of updates consumed.
async fn consume(
    subscriber: &mut Subscriber<FrameUpdate<ReplayFrame>>,
    worker: &CaptureWorker,
) -> u64 {
    let mut consumed = 0u64;

    loop {
        let update = match tokio::time::timeout(RECV_TIMEOUT, subscriber.recv()).await {
            Ok(Some(update)) => update,
            Ok(None) => break,
            Err(_) if worker.is_finished() => {
                warn!("capture_worker_finished_without_closing");
                break;
            }
            Err(_) => continue,
        };
        consumed += 1;

        debug!(
            frame = update.frame.seq,
            count = update.stats.current_count,
            fps = format!("{:.1}", update.stats.fps),
            "frame_update"
        );

        match &update.alert {
            Some(AlertEvent::Raised(alert)) => warn!(
                severity = %alert.severity,
                person_count = alert.person_count,
                max_allowed = alert.max_allowed,
                message = %alert.message,
                "occupancy_alert_raised"
            ),
            Some(AlertEvent::Ongoing(alert)) => debug!(
                person_count = alert.person_count,
                message = %alert.message,
                "occupancy_alert_ongoing"
            ),
            Some(AlertEvent::Normalized(alert)) => info!(
                person_count = alert.person_count,
                message = %alert.message,
                "occupancy_normalized"
            ),
            None => {}
        }
    }

    consumed
}
