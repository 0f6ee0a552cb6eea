//! Adaptive exposure: proportional feedback toward a target brightness.
//!
//! The controller measures the mean gray of the upper half of the left
//! image every Nth frame and nudges the hardware exposure so the next
//! frames land closer to the target. Brightness is assumed to scale
//! roughly linearly with exposure near the operating point; the saturation
//! branches catch the cases where that assumption breaks down.

use crate::camera::{ExposureControl, StereoFramePair};
use crate::sink::{FeedbackSink, ParameterSnapshot};

/// Evaluate on every Nth frame to bound the rate of hardware writes.
pub const DEFAULT_INTERVAL: u64 = 5;
pub const DEFAULT_TARGET: f64 = 128.0;
pub const DEFAULT_LOOP_GAIN: f64 = 1.0;

/// Known-good small exposure used when the correction underflows.
const RESCUE_EXPOSURE: i64 = 150;
const RESCUE_GAIN_LEVEL: u8 = 1;

/// Upper bound on the correction; beyond this the sensor is starved of
/// light and gain has to do the work instead.
const EXPOSURE_OVERFLOW: f64 = 1_000_000.0;
const OVERFLOW_EXPOSURE: i64 = 100_000;
const OVERFLOW_GAIN_LEVEL: u8 = 7;

/// Result of one evaluation step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub exposure: i64,
    pub gain_level: u8,
    /// True when a saturation branch forced a gain write.
    pub gain_changed: bool,
    pub measured: f64,
}

/// Exposure controller state.
///
/// This is the single owner of the active exposure setting; external
/// overrides go through the settings channel and land here before they
/// reach hardware. No process-wide shared state.
#[derive(Debug, Clone)]
pub struct AutoExposure {
    pub enabled: bool,
    pub exposure: i64,
    pub gain_level: u8,
    pub target: f64,
    pub loop_gain: f64,
    pub interval: u64,
    pub feedback_enabled: bool,
}

impl Default for AutoExposure {
    fn default() -> Self {
        Self {
            enabled: true,
            exposure: 1000,
            gain_level: 1,
            target: DEFAULT_TARGET,
            loop_gain: DEFAULT_LOOP_GAIN,
            interval: DEFAULT_INTERVAL,
            feedback_enabled: false,
        }
    }
}

impl AutoExposure {
    /// Proportional correction with saturation handling.
    ///
    /// `exposure' = exposure + gain * (target * exposure / measured - exposure)`,
    /// then in order: an underflowing (or non-finite, from a black frame)
    /// candidate rescues to minimum gain and a small known-good exposure;
    /// an overflowing candidate pins maximum gain and clamps the exposure;
    /// anything else is accepted as-is.
    pub fn evaluate(&mut self, measured: f64) -> Evaluation {
        let exposure = self.exposure as f64;
        let candidate =
            exposure + self.loop_gain * (self.target / measured * exposure - exposure);

        let gain_changed;
        if !candidate.is_finite() || candidate < 0.0 {
            self.gain_level = RESCUE_GAIN_LEVEL;
            self.exposure = RESCUE_EXPOSURE;
            gain_changed = true;
        } else if candidate > EXPOSURE_OVERFLOW {
            self.gain_level = OVERFLOW_GAIN_LEVEL;
            self.exposure = OVERFLOW_EXPOSURE;
            gain_changed = true;
        } else {
            self.exposure = candidate as i64;
            gain_changed = false;
        }

        Evaluation {
            exposure: self.exposure,
            gain_level: self.gain_level,
            gain_changed,
            measured,
        }
    }

    /// Run one frame through the controller.
    ///
    /// Evaluates only while enabled and only on every `interval`-th frame
    /// (by capture sequence number). Rejected hardware writes are logged
    /// and the loop proceeds with whatever setting the device holds.
    pub fn on_frame<C, F>(
        &mut self,
        frame: &StereoFramePair,
        control: &mut C,
        feedback: &mut F,
    ) -> Option<Evaluation>
    where
        C: ExposureControl,
        F: FeedbackSink,
    {
        if !self.enabled || self.interval == 0 || frame.sequence % self.interval != 0 {
            return None;
        }

        let measured = frame.left_upper_mean_gray();
        let evaluation = self.evaluate(measured);
        log::debug!(
            "brightness {:.3}, exposure {} gain {}",
            measured,
            evaluation.exposure,
            evaluation.gain_level
        );

        if evaluation.gain_changed && !control.set_gain_level(self.gain_level) {
            log::warn!("gain level {} rejected by device", self.gain_level);
        }
        if !control.set_exposure(self.exposure) {
            log::warn!("exposure {} rejected by device", self.exposure);
        }

        if self.feedback_enabled {
            feedback.publish(&ParameterSnapshot {
                exposure: self.exposure,
                gain_level: self.gain_level,
                measured,
                target: self.target,
            });
        }

        Some(evaluation)
    }
}
