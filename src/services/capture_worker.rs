//! Capture worker - runs acquisition and detection off the consumer thread
//!
//! The worker owns the frame source, the detector and the occupancy monitor.
//! Each iteration it checks the stop flag, reads a frame, runs detection,
//! feeds the monitor and publishes the result into a single-slot mailbox.
//! The source is released before the worker thread returns. The mailbox is
//! closed when the publisher drops, so a panicking source or detector still
//! ends the consumer and surfaces through `join()`.

use crate::domain::alert::AlertEvent;
use crate::domain::types::{Detection, Stats};
use crate::infra::metrics::PipelineMetrics;
use crate::services::mailbox::Publisher;
use crate::services::monitor::OccupancyMonitor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Produces frames for the worker (camera, video file, replay log)
pub trait FrameSource: Send {
    type Frame: Send + Sync + 'static;

    /// Next frame, or None at end of stream
    fn read_frame(&mut self) -> anyhow::Result<Option<Self::Frame>>;

    /// Release the underlying capture resource
    fn release(&mut self) {}
}

/// Turns a frame into detections of the tracked subject
pub trait Detector<F>: Send {
    fn detect(&mut self, frame: &F) -> anyhow::Result<Vec<Detection>>;
}

/// One processed frame as seen by the consumer
#[derive(Debug)]
pub struct FrameUpdate<F> {
    pub frame: F,
    pub stats: Stats,
    pub alert: Option<AlertEvent>,
}

/// Handle to a running capture worker
pub struct CaptureWorker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<OccupancyMonitor>,
}

impl CaptureWorker {
    /// Spawn the worker thread
    pub fn spawn<S, D>(
        mut source: S,
        mut detector: D,
        mut monitor: OccupancyMonitor,
        publisher: Publisher<FrameUpdate<S::Frame>>,
        metrics: Arc<PipelineMetrics>,
    ) -> std::io::Result<Self>
    where
        S: FrameSource + 'static,
        D: Detector<S::Frame> + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let worker_stop = stop.clone();

        let handle = thread::Builder::new().name("capture-worker".to_string()).spawn(move || {
            info!("capture_worker_started");

            while !worker_stop.load(Ordering::Relaxed) {
                let frame = match source.read_frame() {
                    Ok(Some(frame)) => frame,
                    Ok(None) => {
                        info!("capture_source_exhausted");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "capture_read_failed");
                        break;
                    }
                };

                let started = Instant::now();
                let detections = match detector.detect(&frame) {
                    Ok(detections) => detections,
                    Err(e) => {
                        metrics.record_detector_error();
                        warn!(error = %e, "detector_failed_frame_skipped");
                        continue;
                    }
                };

                let result = monitor.process(&detections);
                metrics.record_frame(started.elapsed().as_micros() as u64);
                if result.alert.as_ref().is_some_and(AlertEvent::is_raised) {
                    metrics.record_alert();
                }

                let update = FrameUpdate { frame, stats: result.stats, alert: result.alert };
                if publisher.publish(update) {
                    metrics.record_dropped_update();
                    debug!("unconsumed_update_overwritten");
                }
            }

            source.release();
            publisher.close();
            info!("capture_worker_stopped");
            monitor
        })?;

        Ok(Self { stop, handle })
    }

    /// Shared stop flag, observed once per iteration
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Request a cooperative stop
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the worker and take back the monitor
    pub fn join(self) -> anyhow::Result<OccupancyMonitor> {
        self.handle.join().map_err(|_| anyhow::anyhow!("capture worker panicked"))
    }
}
