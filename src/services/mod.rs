//! Services - counting, alerting and the capture pipeline
//!
//! - `rolling_counter` - Per-frame counts, extremes and rolling history
//! - `alert_engine` - Over-capacity state machine with cooldown
//! - `monitor` - Per-frame orchestration and save cadence
//! - `mailbox` - Single-slot drop-oldest hand-off
//! - `capture_worker` - Acquisition and detection thread

pub mod alert_engine;
pub mod capture_worker;
pub mod mailbox;
pub mod monitor;
pub mod rolling_counter;

pub use alert_engine::AlertEngine;
pub use capture_worker::{CaptureWorker, Detector, FrameSource, FrameUpdate};
pub use mailbox::{mailbox, Publisher, Subscriber};
pub use monitor::{FrameResult, OccupancyMonitor};
pub use rolling_counter::RollingCounter;
