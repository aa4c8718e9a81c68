//! Detection replay - JSONL frame source and a filtering detector
//!
//! Each non-empty line is one frame, either a bare array of detections or
//! an object with a `detections` array:
//!
//! ```text
//! [{"bbox":[10,20,50,120],"confidence":0.91,"class_id":0}]
//! {"detections":[]}
//! ```
//!
//! Malformed lines are skipped with a warning.

use crate::domain::types::Detection;
use crate::infra::config::Config;
use crate::services::capture_worker::{Detector, FrameSource};
use anyhow::Context;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayFrame {
    /// Zero-based index among successfully parsed frames
    pub seq: u64,
    pub detections: Vec<Detection>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FrameLine {
    Bare(Vec<Detection>),
    Wrapped { detections: Vec<Detection> },
}

impl FrameLine {
    fn into_detections(self) -> Vec<Detection> {
        match self {
            FrameLine::Bare(detections) | FrameLine::Wrapped { detections } => detections,
        }
    }
}

pub struct ReplaySource {
    /// None once released
    reader: Option<Box<dyn BufRead + Send>>,
    frame_interval: Option<Duration>,
    next_seq: u64,
    line_no: usize,
    skipped_lines: usize,
    line: String,
}

impl ReplaySource {
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open replay file {}", path.display()))?;
        Ok(Self::from_reader(BufReader::new(file)))
    }

    pub fn from_reader<R: BufRead + Send + 'static>(reader: R) -> Self {
        Self {
            reader: Some(Box::new(reader)),
            frame_interval: None,
            next_seq: 0,
            line_no: 0,
            skipped_lines: 0,
            line: String::new(),
        }
    }

    /// Pace frames at the given rate (<= 0 disables pacing)
    pub fn with_fps(mut self, fps: f64) -> Self {
        self.frame_interval =
            if fps > 0.0 { Duration::try_from_secs_f64(1.0 / fps).ok() } else { None };
        self
    }

    pub fn frame_interval(&self) -> Option<Duration> {
        self.frame_interval
    }

    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }

    pub fn is_released(&self) -> bool {
        self.reader.is_none()
    }
}

impl FrameSource for ReplaySource {
    type Frame = ReplayFrame;

    fn read_frame(&mut self) -> anyhow::Result<Option<ReplayFrame>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        loop {
            self.line.clear();
            let read = reader.read_line(&mut self.line).context("Failed to read replay line")?;
            if read == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            let trimmed = self.line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<FrameLine>(trimmed) {
                Ok(frame) => {
                    if let Some(interval) = self.frame_interval {
                        thread::sleep(interval);
                    }
                    let seq = self.next_seq;
                    self.next_seq += 1;
                    return Ok(Some(ReplayFrame { seq, detections: frame.into_detections() }));
                }
                Err(e) => {
                    self.skipped_lines += 1;
                    warn!(line = self.line_no, error = %e, "replay_line_malformed_skipped");
                }
            }
        }
    }

    fn release(&mut self) {
        if self.reader.take().is_some() {
            debug!(frames = self.next_seq, skipped = self.skipped_lines, "replay_source_released");
        }
    }
}

/// Keeps detections of one class above a confidence threshold
#[derive(Debug, Clone)]
pub struct ReplayDetector {
    class_id: Option<i32>,
    min_confidence: f32,
}

impl ReplayDetector {
    pub fn new(class_id: Option<i32>, min_confidence: f32) -> Self {
        Self { class_id, min_confidence }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.detector_class_id(), config.confidence_threshold())
    }

    fn keeps(&self, detection: &Detection) -> bool {
        self.class_id.map_or(true, |id| detection.class_id == id)
            && detection.confidence >= self.min_confidence
    }
}

impl Default for ReplayDetector {
    fn default() -> Self {
        Self::new(None, 0.0)
    }
}

impl Detector<ReplayFrame> for ReplayDetector {
    fn detect(&mut self, frame: &ReplayFrame) -> anyhow::Result<Vec<Detection>> {
        Ok(frame.detections.iter().filter(|d| self.keeps(d)).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"[{"bbox":[0,0,10,20],"confidence":0.9,"class_id":0}]

{"detections":[{"bbox":[1,1,5,5],"confidence":0.3,"class_id":0},{"bbox":[2,2,6,6],"confidence":0.8,"classId":2}]}
not json
[]
"#;

    fn source(text: &'static str) -> ReplaySource {
        ReplaySource::from_reader(Cursor::new(text.as_bytes()))
    }

    #[test]
    fn test_reads_both_line_shapes() {
        let mut src = source(SAMPLE);

        let first = src.read_frame().unwrap().unwrap();
        assert_eq!(first.seq, 0);
        assert_eq!(first.detections.len(), 1);
        assert_eq!(first.detections[0].confidence, 0.9);

        let second = src.read_frame().unwrap().unwrap();
        assert_eq!(second.seq, 1);
        assert_eq!(second.detections.len(), 2);
        assert_eq!(second.detections[1].class_id, 2);

        let third = src.read_frame().unwrap().unwrap();
        assert_eq!(third.seq, 2);
        assert!(third.detections.is_empty());

        assert!(src.read_frame().unwrap().is_none());
        assert_eq!(src.skipped_lines(), 1);
    }

    #[test]
    fn test_release_ends_stream() {
        let mut src = source(SAMPLE);
        src.release();
        assert!(src.is_released());
        assert!(src.read_frame().unwrap().is_none());
    }

    #[test]
    fn test_open_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[]").unwrap();
        writeln!(file, "[]").unwrap();

        let mut src = ReplaySource::open(file.path()).unwrap();
        assert!(src.read_frame().unwrap().is_some());
        assert!(src.read_frame().unwrap().is_some());
        assert!(src.read_frame().unwrap().is_none());
    }

    #[test]
    fn test_open_missing_file_errors() {
        let err = ReplaySource::open("/nonexistent/frames.jsonl").err().unwrap();
        assert!(format!("{:#}", err).contains("Failed to open replay file"));
    }

    #[test]
    fn test_fps_pacing() {
        assert_eq!(source("").with_fps(0.0).frame_interval(), None);
        assert_eq!(source("").with_fps(4.0).frame_interval(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_detector_filters_class_and_confidence() {
        let frame = ReplayFrame {
            seq: 0,
            detections: vec![
                Detection::new([0, 0, 1, 1], 0.9, 0),
                Detection::new([0, 0, 1, 1], 0.2, 0),
                Detection::new([0, 0, 1, 1], 0.9, 3),
            ],
        };

        let mut people = ReplayDetector::new(Some(0), 0.5);
        assert_eq!(people.detect(&frame).unwrap().len(), 1);

        let mut any = ReplayDetector::default();
        assert_eq!(any.detect(&frame).unwrap().len(), 3);
    }
}
