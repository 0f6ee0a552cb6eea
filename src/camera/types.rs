//! Camera types and data structures.

use std::fmt;
use std::time::SystemTime;

/// Capture resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Native resolution of the stereo sensor pair (752x480 per sensor).
    pub const NATIVE: Resolution = Resolution {
        width: 752,
        height: 480,
    };

    /// Number of pixels in one sensor image.
    pub fn pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Expected byte length of the combined two-sensor payload
    /// (one byte per pixel per sensor).
    pub fn payload_len(&self) -> usize {
        self.pixels() * 2
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::NATIVE
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// How the two sensors' bytes are packed into the combined payload.
///
/// The true packing is a property of the sensor hardware and must come from
/// its documentation; both supported patterns split bit-exact. The default
/// assumes each 2-byte pixel pair carries one byte per sensor, left first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeinterleavePattern {
    /// Each pixel is a 2-byte pair, one byte per sensor.
    PixelInterleaved { left_first: bool },
    /// Payload rows alternate between the two sensors.
    RowAlternating { left_first: bool },
}

impl Default for DeinterleavePattern {
    fn default() -> Self {
        DeinterleavePattern::PixelInterleaved { left_first: true }
    }
}

impl DeinterleavePattern {
    /// Parse a pattern name as used in config files and CLI flags.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "pixel" | "pixel-left" => Some(Self::PixelInterleaved { left_first: true }),
            "pixel-right" => Some(Self::PixelInterleaved { left_first: false }),
            "row" | "row-left" => Some(Self::RowAlternating { left_first: true }),
            "row-right" => Some(Self::RowAlternating { left_first: false }),
            _ => None,
        }
    }
}

/// A pair of planar mono8 images captured in the same sensor readout.
#[derive(Debug, Clone)]
pub struct StereoFramePair {
    /// Left sensor image, row-major, one byte per pixel
    pub left: Vec<u8>,
    /// Right sensor image, row-major, one byte per pixel
    pub right: Vec<u8>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// Wall-clock capture time
    pub timestamp: SystemTime,
    /// Monotonically increasing capture counter
    pub sequence: u64,
}

impl StereoFramePair {
    /// Mean gray value over the full left image.
    pub fn left_mean_gray(&self) -> f64 {
        mean_gray(&self.left)
    }

    /// Mean gray value over the upper half of the left image.
    ///
    /// The lower half is excluded to reduce sensitivity to nearby
    /// foreground objects.
    pub fn left_upper_mean_gray(&self) -> f64 {
        let half = self.width as usize * (self.height as usize / 2);
        mean_gray(&self.left[..half])
    }
}

/// Mean gray value of a mono8 buffer. Empty input yields 0.
pub fn mean_gray(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let sum: u64 = data.iter().map(|&b| u64::from(b)).sum();
    sum as f64 / data.len() as f64
}

/// Split a combined two-sensor payload into planar left/right images.
///
/// The payload must be exactly `resolution.payload_len()` bytes; anything
/// else is a capture I/O error (a partial pair is never produced).
pub fn deinterleave(
    payload: &[u8],
    resolution: Resolution,
    pattern: DeinterleavePattern,
) -> Result<(Vec<u8>, Vec<u8>), CaptureError> {
    let expected = resolution.payload_len();
    if payload.len() != expected {
        return Err(CaptureError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "short payload: got {} bytes, expected {}",
                payload.len(),
                expected
            ),
        )));
    }

    let pixels = resolution.pixels();
    let mut left = vec![0u8; pixels];
    let mut right = vec![0u8; pixels];

    match pattern {
        DeinterleavePattern::PixelInterleaved { left_first } => {
            for (i, pair) in payload.chunks_exact(2).enumerate() {
                let (l, r) = if left_first {
                    (pair[0], pair[1])
                } else {
                    (pair[1], pair[0])
                };
                left[i] = l;
                right[i] = r;
            }
        }
        DeinterleavePattern::RowAlternating { left_first } => {
            let row = resolution.width as usize;
            for (i, src_row) in payload.chunks_exact(row).enumerate() {
                let dst_row = i / 2;
                let to_left = (i % 2 == 0) == left_first;
                let dst = if to_left { &mut left } else { &mut right };
                dst[dst_row * row..(dst_row + 1) * row].copy_from_slice(src_row);
            }
        }
    }

    Ok((left, right))
}

/// Source of captured stereo frames.
///
/// Implemented by the real frame grabber; tests substitute synthetic
/// sensors. The calibration builder and run loop depend only on this.
pub trait FrameSource {
    fn grab_next(&mut self) -> Result<StereoFramePair, CaptureError>;

    /// Grab `n` settle frames and return the last one.
    ///
    /// Used after a hardware parameter change to let the sensor stabilize
    /// before measuring; the measured frame is the final settle grab.
    fn settle_and_grab(&mut self, n: u32) -> Result<StereoFramePair, CaptureError> {
        let mut frame = self.grab_next()?;
        for _ in 1..n {
            frame = self.grab_next()?;
        }
        Ok(frame)
    }
}

/// Hardware exposure/gain bounds reported by the device.
#[derive(Debug, Clone, Copy)]
pub struct ExposureCaps {
    pub exposure_min: i64,
    pub exposure_max: i64,
    pub gain_min: i64,
    pub gain_max: i64,
}

impl Default for ExposureCaps {
    fn default() -> Self {
        // Fallback bounds for the fixed sensor pairing; real bounds come
        // from the driver's control descriptions.
        Self {
            exposure_min: 1,
            exposure_max: 1_000_000,
            gain_min: 1,
            gain_max: 7,
        }
    }
}

/// Errors that make the device unusable at startup.
#[derive(Debug)]
pub enum DeviceError {
    /// Failed to open the device node (bad path, permission, busy)
    Open { path: String, source: std::io::Error },
    /// The driver does not support the requested capture format
    Negotiation { requested: Resolution, detail: String },
    /// Failed to map the streaming buffers
    BufferMap(std::io::Error),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Open { path, source } => {
                write!(f, "Failed to open device '{}': {}", path, source)
            }
            DeviceError::Negotiation { requested, detail } => {
                write!(f, "Device does not support {} capture: {}", requested, detail)
            }
            DeviceError::BufferMap(e) => write!(f, "Failed to map capture buffers: {}", e),
        }
    }
}

impl std::error::Error for DeviceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeviceError::Open { source, .. } => Some(source),
            DeviceError::BufferMap(e) => Some(e),
            DeviceError::Negotiation { .. } => None,
        }
    }
}

/// Per-frame capture errors; recoverable by retrying the next grab.
#[derive(Debug)]
pub enum CaptureError {
    /// The device produced no frame within the grab timeout
    Timeout { waited_ms: u32 },
    /// Dequeue or payload error
    Io(std::io::Error),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Timeout { waited_ms } => {
                write!(f, "No frame delivered within {} ms", waited_ms)
            }
            CaptureError::Io(e) => write!(f, "Capture I/O error: {}", e),
        }
    }
}

impl std::error::Error for CaptureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CaptureError::Io(e) => Some(e),
            CaptureError::Timeout { .. } => None,
        }
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(e: std::io::Error) -> Self {
        CaptureError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(width: u32, height: u32, left: &[u8], right: &[u8]) -> StereoFramePair {
        StereoFramePair {
            left: left.to_vec(),
            right: right.to_vec(),
            width,
            height,
            timestamp: SystemTime::now(),
            sequence: 0,
        }
    }

    #[test]
    fn test_resolution_native() {
        assert_eq!(Resolution::NATIVE.width, 752);
        assert_eq!(Resolution::NATIVE.height, 480);
        assert_eq!(Resolution::default(), Resolution::NATIVE);
    }

    #[test]
    fn test_resolution_payload_len() {
        let r = Resolution { width: 4, height: 2 };
        assert_eq!(r.pixels(), 8);
        assert_eq!(r.payload_len(), 16);
    }

    #[test]
    fn test_mean_gray() {
        assert_eq!(mean_gray(&[]), 0.0);
        assert_eq!(mean_gray(&[10, 20, 30]), 20.0);
        assert_eq!(mean_gray(&[255; 16]), 255.0);
    }

    #[test]
    fn test_upper_half_roi_excludes_lower_half() {
        // 2x4 image: upper two rows are 100, lower two rows are 0.
        let left = vec![100, 100, 100, 100, 0, 0, 0, 0];
        let p = pair(2, 4, &left, &[0; 8]);
        assert_eq!(p.left_upper_mean_gray(), 100.0);
        assert_eq!(p.left_mean_gray(), 50.0);
    }

    #[test]
    fn test_deinterleave_pixel_interleaved() {
        let r = Resolution { width: 2, height: 2 };
        // Pairs: (L0,R0) (L1,R1) (L2,R2) (L3,R3)
        let payload = [1, 11, 2, 12, 3, 13, 4, 14];
        let (left, right) = deinterleave(
            &payload,
            r,
            DeinterleavePattern::PixelInterleaved { left_first: true },
        )
        .unwrap();
        assert_eq!(left, vec![1, 2, 3, 4]);
        assert_eq!(right, vec![11, 12, 13, 14]);
    }

    #[test]
    fn test_deinterleave_pixel_interleaved_right_first() {
        let r = Resolution { width: 2, height: 1 };
        let payload = [11, 1, 12, 2];
        let (left, right) = deinterleave(
            &payload,
            r,
            DeinterleavePattern::PixelInterleaved { left_first: false },
        )
        .unwrap();
        assert_eq!(left, vec![1, 2]);
        assert_eq!(right, vec![11, 12]);
    }

    #[test]
    fn test_deinterleave_row_alternating() {
        let r = Resolution { width: 3, height: 2 };
        // Payload rows: L0 R0 L1 R1
        let payload = [1, 2, 3, 11, 12, 13, 4, 5, 6, 14, 15, 16];
        let (left, right) = deinterleave(
            &payload,
            r,
            DeinterleavePattern::RowAlternating { left_first: true },
        )
        .unwrap();
        assert_eq!(left, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(right, vec![11, 12, 13, 14, 15, 16]);
    }

    #[test]
    fn test_deinterleave_rejects_short_payload() {
        let r = Resolution { width: 2, height: 2 };
        let payload = [0u8; 7];
        let result = deinterleave(&payload, r, DeinterleavePattern::default());
        assert!(matches!(result, Err(CaptureError::Io(_))));
    }

    #[test]
    fn test_deinterleave_pattern_names() {
        assert_eq!(
            DeinterleavePattern::from_name("pixel"),
            Some(DeinterleavePattern::PixelInterleaved { left_first: true })
        );
        assert_eq!(
            DeinterleavePattern::from_name("row-right"),
            Some(DeinterleavePattern::RowAlternating { left_first: false })
        );
        assert_eq!(DeinterleavePattern::from_name("bogus"), None);
    }

    #[test]
    fn test_settle_and_grab_counts() {
        struct Counting {
            grabs: u32,
        }
        impl FrameSource for Counting {
            fn grab_next(&mut self) -> Result<StereoFramePair, CaptureError> {
                self.grabs += 1;
                Ok(StereoFramePair {
                    left: vec![self.grabs as u8],
                    right: vec![0],
                    width: 1,
                    height: 1,
                    timestamp: SystemTime::now(),
                    sequence: u64::from(self.grabs),
                })
            }
        }

        let mut source = Counting { grabs: 0 };
        let frame = source.settle_and_grab(5).unwrap();
        // Five grabs total; the measured frame is the fifth.
        assert_eq!(source.grabs, 5);
        assert_eq!(frame.left[0], 5);
    }

    #[test]
    fn test_error_display() {
        let e = DeviceError::Negotiation {
            requested: Resolution { width: 752, height: 480 },
            detail: "driver offered 640x480".to_string(),
        };
        assert!(format!("{}", e).contains("752x480"));
        assert!(format!("{}", e).contains("640x480"));

        let e = CaptureError::Timeout { waited_ms: 2000 };
        assert!(format!("{}", e).contains("2000"));
    }
}
