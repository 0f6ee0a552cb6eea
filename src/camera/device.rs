//! Device session: open, format negotiation, enumeration.

use std::fmt;

use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

use super::types::{DeviceError, Resolution};

/// Pixel format carrying both sensors' bytes in one 16-bit-per-pixel
/// payload. Property of the sensor packing, not negotiable.
const STEREO_FOURCC: &[u8; 4] = b"Y16 ";

/// Information about an available video device node.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Node index (e.g. 0 for /dev/video0)
    pub index: usize,
    /// Device node path
    pub path: String,
    /// Driver-reported card name, if available
    pub name: Option<String>,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "[{}] {} ({})", self.index, self.path, name),
            None => write!(f, "[{}] {}", self.index, self.path),
        }
    }
}

/// List all video device nodes on the system.
///
/// Returns an empty vector (not an error) when no devices are present.
pub fn list_devices() -> Vec<DeviceInfo> {
    let mut nodes: Vec<DeviceInfo> = v4l::context::enum_devices()
        .into_iter()
        .map(|n| DeviceInfo {
            index: n.index(),
            path: n.path().to_string_lossy().to_string(),
            name: n.name(),
        })
        .collect();
    nodes.sort_by_key(|n| n.index);
    nodes
}

/// An open capture device with a negotiated stereo format.
///
/// Owns the device handle exclusively; the handle and any mapped buffers
/// built on it are released on drop, exactly once, including when a later
/// setup step fails.
pub struct DeviceSession {
    device: Device,
    path: String,
    resolution: Resolution,
}

impl fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSession")
            .field("path", &self.path)
            .field("resolution", &self.resolution)
            .finish_non_exhaustive()
    }
}

impl DeviceSession {
    /// Open the device node at `path`.
    ///
    /// The capture format is not negotiated yet; call `negotiate_format`
    /// before building a grabber.
    pub fn open(path: &str) -> Result<Self, DeviceError> {
        let device = Device::with_path(path).map_err(|e| DeviceError::Open {
            path: path.to_string(),
            source: e,
        })?;

        Ok(Self {
            device,
            path: path.to_string(),
            resolution: Resolution::default(),
        })
    }

    /// Request the packed stereo format at the given resolution.
    ///
    /// Drivers may substitute a different size; anything other than an
    /// exact match is a negotiation failure, because the deinterleave rule
    /// is defined only for the negotiated geometry.
    pub fn negotiate_format(&mut self, requested: Resolution) -> Result<(), DeviceError> {
        let fmt = Format::new(requested.width, requested.height, FourCC::new(STEREO_FOURCC));
        let actual = self
            .device
            .set_format(&fmt)
            .map_err(|e| DeviceError::Negotiation {
                requested,
                detail: e.to_string(),
            })?;

        let got = Resolution {
            width: actual.width,
            height: actual.height,
        };
        if got != requested || actual.fourcc != FourCC::new(STEREO_FOURCC) {
            return Err(DeviceError::Negotiation {
                requested,
                detail: format!("driver offered {} {}", got, actual.fourcc),
            });
        }

        log::info!("negotiated {} {} on {}", got, actual.fourcc, self.path);
        self.resolution = requested;
        Ok(())
    }

    /// The underlying V4L2 device handle.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Device node path this session was opened on.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The negotiated per-sensor resolution.
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }
}
