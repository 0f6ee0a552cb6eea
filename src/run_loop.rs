//! Runtime capture loop: grab, publish, adapt.
//!
//! Single-threaded and lockstep with frame arrival: one thread owns the
//! device end to end, so exposure writes, the brightness metric, and the
//! next grab are naturally serialized without locks. Shutdown and pushed
//! settings are checked once per frame boundary; there is no way to cancel
//! an in-flight grab beyond its poll timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use crate::auto_exposure::AutoExposure;
use crate::camera::{CaptureError, ExposureControl, FrameSource};
use crate::sink::{FeedbackSink, FrameSink, SettingsUpdate};

/// Consecutive capture failures tolerated before the loop gives up.
pub const DEFAULT_RETRY_BUDGET: u32 = 10;

/// Fatal run-loop errors.
#[derive(Debug)]
pub enum RunError {
    /// The device failed too many grabs in a row
    CaptureRetriesExhausted { consecutive: u32, last: CaptureError },
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::CaptureRetriesExhausted { consecutive, last } => {
                write!(f, "{} consecutive capture failures, last: {}", consecutive, last)
            }
        }
    }
}

impl std::error::Error for RunError {}

/// Install a SIGINT handler and return the flag it raises.
pub fn shutdown_flag() -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })?;
    Ok(flag)
}

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub retry_budget: u32,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            retry_budget: DEFAULT_RETRY_BUDGET,
        }
    }
}

/// Run the capture loop until shutdown is requested.
///
/// Per iteration: drain pushed settings, grab one frame pair, publish it,
/// and let the exposure controller evaluate. Capture errors are logged and
/// retried up to the budget; a rejected control write never stops the loop.
pub fn run<S, C, FS, FB>(
    source: &mut S,
    control: &mut C,
    state: &mut AutoExposure,
    frames: &mut FS,
    feedback: &mut FB,
    updates: &Receiver<SettingsUpdate>,
    shutdown: &AtomicBool,
    options: RunOptions,
) -> Result<(), RunError>
where
    S: FrameSource,
    C: ExposureControl,
    FS: FrameSink,
    FB: FeedbackSink,
{
    let mut consecutive_failures = 0u32;

    while !shutdown.load(Ordering::SeqCst) {
        while let Ok(update) = updates.try_recv() {
            apply_update(state, control, update);
        }

        let frame = match source.grab_next() {
            Ok(frame) => {
                consecutive_failures = 0;
                frame
            }
            Err(e) => {
                consecutive_failures += 1;
                log::warn!("capture failed ({} consecutive): {}", consecutive_failures, e);
                if consecutive_failures >= options.retry_budget {
                    return Err(RunError::CaptureRetriesExhausted {
                        consecutive: consecutive_failures,
                        last: e,
                    });
                }
                continue;
            }
        };

        frames.publish(&frame);
        state.on_frame(&frame, control, feedback);
    }

    log::info!("shutdown requested, stopping capture");
    Ok(())
}

/// Apply one pushed settings update to the controller state and, where it
/// bypasses the feedback loop, to the hardware directly.
fn apply_update<C: ExposureControl>(
    state: &mut AutoExposure,
    control: &mut C,
    update: SettingsUpdate,
) {
    log::info!("reconfigure: {:?}", update);
    match update {
        SettingsUpdate::Exposure(value) => {
            if state.enabled {
                // The feedback loop owns exposure while active.
                log::debug!("auto-exposure active, ignoring pushed exposure {}", value);
            } else {
                state.exposure = value;
                if !control.set_exposure(value) {
                    log::warn!("pushed exposure {} rejected by device", value);
                }
            }
        }
        SettingsUpdate::GainLevel(level) => {
            state.gain_level = level;
            if !control.set_gain_level(level) {
                log::warn!("pushed gain level {} rejected by device", level);
            }
        }
        SettingsUpdate::Target(target) => state.target = target,
        SettingsUpdate::LoopGain(gain) => state.loop_gain = gain,
        SettingsUpdate::AutoEnabled(enabled) => state.enabled = enabled,
        SettingsUpdate::FeedbackEnabled(enabled) => state.feedback_enabled = enabled,
    }
}
