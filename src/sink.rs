//! Seams to external consumers: frame publication, parameter feedback,
//! and settings pushed into the control loop.
//!
//! Transport of frames and parameters to real consumers is out of scope;
//! the run loop only ever talks to these traits.

use std::time::{Duration, Instant};

use crate::camera::StereoFramePair;

/// Consumer of captured frame pairs.
pub trait FrameSink {
    fn publish(&mut self, frame: &StereoFramePair);
}

/// Snapshot of the exposure controller state, emitted when feedback
/// reporting is enabled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSnapshot {
    pub exposure: i64,
    pub gain_level: u8,
    pub measured: f64,
    pub target: f64,
}

/// Consumer of exposure feedback snapshots.
pub trait FeedbackSink {
    fn publish(&mut self, snapshot: &ParameterSnapshot);
}

/// Settings pushed from outside the control loop, drained once per frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SettingsUpdate {
    Exposure(i64),
    GainLevel(u8),
    Target(f64),
    LoopGain(f64),
    AutoEnabled(bool),
    FeedbackEnabled(bool),
}

/// Frame sink that logs throughput once a second.
pub struct StatsSink {
    frame_id: String,
    window_start: Instant,
    frames_in_window: u32,
    total: u64,
}

impl StatsSink {
    pub fn new(frame_id: &str) -> Self {
        Self {
            frame_id: frame_id.to_string(),
            window_start: Instant::now(),
            frames_in_window: 0,
            total: 0,
        }
    }

    /// Total frames published so far.
    pub fn total(&self) -> u64 {
        self.total
    }
}

impl FrameSink for StatsSink {
    fn publish(&mut self, frame: &StereoFramePair) {
        self.total += 1;
        self.frames_in_window += 1;

        let elapsed = self.window_start.elapsed();
        if elapsed >= Duration::from_secs(1) {
            let fps = f64::from(self.frames_in_window) / elapsed.as_secs_f64();
            log::info!(
                "{}: {:.1} fps, frame {} ({}x{})",
                self.frame_id,
                fps,
                frame.sequence,
                frame.width,
                frame.height
            );
            self.window_start = Instant::now();
            self.frames_in_window = 0;
        }
    }
}

/// Feedback sink that logs each snapshot.
pub struct LogFeedbackSink;

impl FeedbackSink for LogFeedbackSink {
    fn publish(&mut self, snapshot: &ParameterSnapshot) {
        log::info!(
            "exposure {} gain {} measured {:.1} target {:.1}",
            snapshot.exposure,
            snapshot.gain_level,
            snapshot.measured,
            snapshot.target
        );
    }
}
