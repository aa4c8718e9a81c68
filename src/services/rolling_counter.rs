//! Rolling occupancy counter
//!
//! Tracks the current and maximum number of detections per frame, a bounded
//! FIFO of recent counts, and aggregate rates derived from them.
//!
//! Key behaviors:
//! - `max_count` only grows until `reset()`
//! - history holds at most `capacity` counts, oldest evicted first
//! - `average_count` is the mean of the history window, 0 when empty
//! - no I/O and no error conditions

use crate::domain::types::{Detection, Stats};
use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::time::Instant;

/// Default number of recent counts kept in the history window
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// One entry of the history window
#[derive(Debug, Clone, Copy)]
struct CountSample {
    count: u32,
    at: DateTime<Local>,
}

pub struct RollingCounter {
    current_count: u32,
    max_count: u32,
    /// Sum of every count observed since the last reset
    total_detections: u64,
    frame_count: u64,
    frames_with_persons: u64,
    average_count: f64,
    start_time: Instant,
    history: VecDeque<CountSample>,
    capacity: usize,
}

impl RollingCounter {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Create a counter with a custom history window (at least 1)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            current_count: 0,
            max_count: 0,
            total_detections: 0,
            frame_count: 0,
            frames_with_persons: 0,
            average_count: 0.0,
            start_time: Instant::now(),
            history: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record the detections of one frame and return the current count
    pub fn update(&mut self, detections: &[Detection]) -> u32 {
        self.record_count(saturating_count(detections.len()))
    }

    /// Record a raw count for one frame
    pub fn record_count(&mut self, count: u32) -> u32 {
        self.current_count = count;
        self.total_detections += u64::from(count);
        self.frame_count += 1;

        if count > self.max_count {
            self.max_count = count;
        }

        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(CountSample { count, at: Local::now() });

        let sum: u64 = self.history.iter().map(|s| u64::from(s.count)).sum();
        self.average_count = sum as f64 / self.history.len() as f64;

        if count > 0 {
            self.frames_with_persons += 1;
        }

        count
    }

    #[inline]
    pub fn current_count(&self) -> u32 {
        self.current_count
    }

    #[inline]
    pub fn max_count(&self) -> u32 {
        self.max_count
    }

    #[inline]
    pub fn average_count(&self) -> f64 {
        self.average_count
    }

    #[inline]
    pub fn total_detections(&self) -> u64 {
        self.total_detections
    }

    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    #[inline]
    pub fn frames_with_persons(&self) -> u64 {
        self.frames_with_persons
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Seconds since construction or the last reset
    pub fn running_time(&self) -> f64 {
        self.running_time_at(Instant::now())
    }

    pub fn running_time_at(&self, now: Instant) -> f64 {
        now.saturating_duration_since(self.start_time).as_secs_f64()
    }

    /// Frames per second over the whole running time
    pub fn fps(&self) -> f64 {
        self.fps_at(Instant::now())
    }

    pub fn fps_at(&self, now: Instant) -> f64 {
        let elapsed = self.running_time_at(now);
        if elapsed > 0.0 {
            self.frame_count as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Fraction of frames with at least one detection (0-1)
    pub fn detection_rate(&self) -> f64 {
        if self.frame_count > 0 {
            self.frames_with_persons as f64 / self.frame_count as f64
        } else {
            0.0
        }
    }

    /// Counts in the history window, oldest first
    pub fn history(&self) -> Vec<u32> {
        self.history.iter().map(|s| s.count).collect()
    }

    /// Counts in the history window with the wall-clock time each was recorded
    pub fn count_history(&self) -> (Vec<u32>, Vec<DateTime<Local>>) {
        self.history.iter().map(|s| (s.count, s.at)).unzip()
    }

    /// All derived values read at a single instant
    pub fn snapshot(&self) -> Stats {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&self, now: Instant) -> Stats {
        Stats {
            current_count: self.current_count,
            max_count: self.max_count,
            average_count: self.average_count,
            total_detections: self.total_detections,
            total_frames: self.frame_count,
            frames_with_persons: self.frames_with_persons,
            detection_rate: self.detection_rate(),
            fps: self.fps_at(now),
            running_time: self.running_time_at(now),
        }
    }

    /// Zero every counter, empty the history and restart the clock
    pub fn reset(&mut self) {
        self.current_count = 0;
        self.max_count = 0;
        self.total_detections = 0;
        self.frame_count = 0;
        self.frames_with_persons = 0;
        self.average_count = 0.0;
        self.start_time = Instant::now();
        self.history.clear();
    }
}

impl Default for RollingCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Frame sizes beyond `u32::MAX` saturate
fn saturating_count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}
