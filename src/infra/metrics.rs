//! Lock-free pipeline metrics and periodic reporting
//!
//! The capture worker records into atomics on the hot path; the consumer
//! calls `report()` which swaps the periodic counters to zero.
//!
//! NOTE: All atomics use Relaxed ordering. These are statistical counters
//! only and must not be used for coordination.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Frame processing latency bucket bounds (microseconds)
/// Buckets: ≤500, ≤1000, ≤2000, ≤5000, ≤10000, ≤20000, ≤50000, ≤100000, >100000
const BUCKET_BOUNDS: [u64; 8] = [500, 1_000, 2_000, 5_000, 10_000, 20_000, 50_000, 100_000];
const NUM_BUCKETS: usize = 9;

#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [500, 1_000, 2_000, 5_000, 10_000, 20_000, 50_000, 100_000, 200_000];

    let target = ((total as f64 * percentile).ceil() as u64).max(1);
    let mut cumulative = 0u64;
    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

pub struct PipelineMetrics {
    /// Monotonic totals
    frames_total: AtomicU64,
    detector_errors_total: AtomicU64,
    alerts_raised_total: AtomicU64,
    updates_dropped_total: AtomicU64,

    /// Reset on every report
    frames_since_report: AtomicU64,
    latency_sum_us: AtomicU64,
    latency_max_us: AtomicU64,
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    last_report_time: Mutex<Instant>,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            frames_total: AtomicU64::new(0),
            detector_errors_total: AtomicU64::new(0),
            alerts_raised_total: AtomicU64::new(0),
            updates_dropped_total: AtomicU64::new(0),
            frames_since_report: AtomicU64::new(0),
            latency_sum_us: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            last_report_time: Mutex::new(Instant::now()),
        }
    }

    /// Record one processed frame and its detect+process latency
    #[inline]
    pub fn record_frame(&self, latency_us: u64) {
        self.frames_total.fetch_add(1, Ordering::Relaxed);
        self.frames_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        update_atomic_max(&self.latency_max_us, latency_us);
        self.latency_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_detector_error(&self) {
        self.detector_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_alert(&self) {
        self.alerts_raised_total.fetch_add(1, Ordering::Relaxed);
    }

    /// An unconsumed update was overwritten in the mailbox
    #[inline]
    pub fn record_dropped_update(&self) {
        self.updates_dropped_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_total(&self) -> u64 {
        self.frames_total.load(Ordering::Relaxed)
    }

    /// Snapshot totals and swap the periodic counters to zero
    pub fn report(&self) -> PipelineSummary {
        let frames_count = self.frames_since_report.swap(0, Ordering::Relaxed);
        let latency_sum = self.latency_sum_us.swap(0, Ordering::Relaxed);
        let max_latency = self.latency_max_us.swap(0, Ordering::Relaxed);

        let mut buckets = [0u64; NUM_BUCKETS];
        for (slot, bucket) in buckets.iter_mut().zip(&self.latency_buckets) {
            *slot = bucket.swap(0, Ordering::Relaxed);
        }

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let frames_per_sec = if elapsed.as_secs_f64() > 0.0 {
            frames_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        PipelineSummary {
            frames_processed: self.frames_total.load(Ordering::Relaxed),
            detector_errors: self.detector_errors_total.load(Ordering::Relaxed),
            alerts_raised: self.alerts_raised_total.load(Ordering::Relaxed),
            updates_dropped: self.updates_dropped_total.load(Ordering::Relaxed),
            frames_per_sec,
            avg_latency_us: if frames_count > 0 { latency_sum / frames_count } else { 0 },
            max_latency_us: max_latency,
            lat_p50_us: percentile_from_buckets(&buckets, 0.50),
            lat_p99_us: percentile_from_buckets(&buckets, 0.99),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct PipelineSummary {
    pub frames_processed: u64,
    pub detector_errors: u64,
    pub alerts_raised: u64,
    pub updates_dropped: u64,
    /// Frames per second since the previous report
    pub frames_per_sec: f64,
    pub avg_latency_us: u64,
    pub max_latency_us: u64,
    pub lat_p50_us: u64,
    pub lat_p99_us: u64,
}

impl PipelineSummary {
    pub fn log(&self) {
        info!(
            frames_total = %self.frames_processed,
            frames_per_sec = format!("{:.1}", self.frames_per_sec),
            avg_latency_us = %self.avg_latency_us,
            max_latency_us = %self.max_latency_us,
            p50_us = %self.lat_p50_us,
            p99_us = %self.lat_p99_us,
            detector_errors = %self.detector_errors,
            alerts_raised = %self.alerts_raised,
            updates_dropped = %self.updates_dropped,
            "pipeline_metrics"
        );
    }
}
