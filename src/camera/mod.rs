//! Stereo camera access: device session, frame acquisition, and hardware
//! exposure control.
//!
//! - Device enumeration and format negotiation via [`DeviceSession`]
//! - Blocking stereo capture via [`FrameGrabber`]
//! - Exposure/gain writes via the [`ExposureControl`] trait

mod control;
mod device;
mod grabber;
mod types;

pub use control::{clamp_to_range, list_controls, ExposureControl, V4lExposureControl};
pub use device::{list_devices, DeviceInfo, DeviceSession};
pub use grabber::{FrameGrabber, DEFAULT_GRAB_TIMEOUT_MS};
pub use types::{
    deinterleave, mean_gray, CaptureError, DeinterleavePattern, DeviceError, ExposureCaps,
    FrameSource, Resolution, StereoFramePair,
};
