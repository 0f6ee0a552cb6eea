//! Hardware exposure and gain control.

use v4l::control::{Control, Value};
use v4l::Device;

use super::types::ExposureCaps;

const V4L2_CID_BRIGHTNESS: u32 = 0x0098_0900;
const V4L2_CID_EXPOSURE_AUTO: u32 = 0x009a_0901;
const V4L2_CID_EXPOSURE_ABSOLUTE: u32 = 0x009a_0902;

/// V4L2_EXPOSURE_MANUAL menu value for V4L2_CID_EXPOSURE_AUTO.
const EXPOSURE_AUTO_MANUAL: i64 = 1;

/// Capability interface over the sensor's exposure and gain controls.
///
/// Writes report acceptance as a boolean; a rejected write is not an
/// error, the caller continues with whatever setting the hardware holds.
pub trait ExposureControl {
    /// Write an exposure value. Out-of-range values are clamped to the
    /// device bounds before reaching hardware.
    fn set_exposure(&mut self, value: i64) -> bool;

    /// Write a gain (brightness) level from the device's fixed ladder.
    fn set_gain_level(&mut self, level: u8) -> bool;

    /// Read the current exposure from the device.
    ///
    /// Slow path: stalls capture throughput on some drivers, so callers
    /// must not invoke it per frame.
    fn get_exposure(&mut self) -> Option<i64>;

    /// Exposure/gain bounds used for clamping.
    fn caps(&self) -> ExposureCaps;
}

/// Clamp a requested control value into `[min, max]`.
pub fn clamp_to_range(value: i64, min: i64, max: i64) -> i64 {
    value.clamp(min, max)
}

/// `ExposureControl` backed by V4L2 integer controls.
pub struct V4lExposureControl<'a> {
    device: &'a Device,
    caps: ExposureCaps,
}

impl<'a> V4lExposureControl<'a> {
    /// Query the device's control bounds and switch it to manual exposure.
    ///
    /// Missing control descriptions fall back to the fixed sensor-pairing
    /// defaults; the adapter stays usable and clamps against those.
    pub fn new(device: &'a Device) -> Self {
        let mut caps = ExposureCaps::default();
        match device.query_controls() {
            Ok(descriptions) => {
                for d in descriptions {
                    match d.id {
                        V4L2_CID_EXPOSURE_ABSOLUTE => {
                            caps.exposure_min = d.minimum;
                            caps.exposure_max = d.maximum;
                        }
                        V4L2_CID_BRIGHTNESS => {
                            caps.gain_min = d.minimum;
                            caps.gain_max = d.maximum;
                        }
                        _ => {}
                    }
                }
            }
            Err(e) => {
                log::warn!("control query failed, using default bounds: {}", e);
            }
        }

        // Manual exposure, otherwise absolute writes are silently ignored.
        let manual = Control {
            id: V4L2_CID_EXPOSURE_AUTO,
            value: Value::Integer(EXPOSURE_AUTO_MANUAL),
        };
        if let Err(e) = device.set_control(manual) {
            log::warn!("could not disable hardware auto-exposure: {}", e);
        }

        Self { device, caps }
    }

    fn write(&self, id: u32, value: i64) -> bool {
        let result = self.device.set_control(Control {
            id,
            value: Value::Integer(value),
        });
        match result {
            Ok(()) => true,
            Err(e) => {
                log::warn!("control write {:#x}={} rejected: {}", id, value, e);
                false
            }
        }
    }
}

impl ExposureControl for V4lExposureControl<'_> {
    fn set_exposure(&mut self, value: i64) -> bool {
        let clamped = clamp_to_range(value, self.caps.exposure_min, self.caps.exposure_max);
        self.write(V4L2_CID_EXPOSURE_ABSOLUTE, clamped)
    }

    fn set_gain_level(&mut self, level: u8) -> bool {
        let clamped = clamp_to_range(i64::from(level), self.caps.gain_min, self.caps.gain_max);
        self.write(V4L2_CID_BRIGHTNESS, clamped)
    }

    fn get_exposure(&mut self) -> Option<i64> {
        match self.device.control(V4L2_CID_EXPOSURE_ABSOLUTE) {
            Ok(Control {
                value: Value::Integer(v),
                ..
            }) => Some(v),
            Ok(_) => None,
            Err(e) => {
                log::warn!("exposure read failed: {}", e);
                None
            }
        }
    }

    fn caps(&self) -> ExposureCaps {
        self.caps
    }
}

/// Print the device's control descriptions to stdout.
pub fn list_controls(device: &Device) -> std::io::Result<()> {
    let descriptions = device.query_controls()?;
    for d in descriptions {
        println!(
            "{:#010x} {:<32} min={} max={} default={}",
            d.id, d.name, d.minimum, d.maximum, d.default
        );
    }
    Ok(())
}
