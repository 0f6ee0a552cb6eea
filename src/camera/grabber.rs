//! Blocking frame acquisition from the mmap streaming interface.

use std::os::raw::c_int;
use std::time::SystemTime;

use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::{CaptureStream, Stream as StreamTrait};

use super::device::DeviceSession;
use super::types::{
    deinterleave, CaptureError, DeinterleavePattern, DeviceError, FrameSource, Resolution,
    StereoFramePair,
};

/// Number of mmap buffers to request from the driver.
const BUFFER_COUNT: u32 = 4;

/// Default bound on the blocking wait for a completed buffer.
pub const DEFAULT_GRAB_TIMEOUT_MS: u32 = 2000;

/// Millisecond timeout for poll(2). Clamped: a value above `i32::MAX`
/// would go negative through the cast, which poll treats as infinite.
fn poll_timeout(timeout_ms: u32) -> c_int {
    timeout_ms.min(i32::MAX as u32) as c_int
}

/// Grabs combined stereo payloads and splits them into frame pairs.
///
/// Owns the mmap stream over the session's buffers; streaming starts when
/// the grabber is built and stops when it is dropped. Each successful grab
/// copies the payload out of the device buffer, deinterleaves it, and
/// re-arms the buffer before returning, so the pair handed to the caller
/// never aliases device memory.
pub struct FrameGrabber<'a> {
    stream: Stream<'a>,
    fd: c_int,
    resolution: Resolution,
    pattern: DeinterleavePattern,
    timeout_ms: u32,
    sequence: u64,
}

impl<'a> FrameGrabber<'a> {
    /// Map the streaming buffers and start capture.
    pub fn new(
        session: &'a DeviceSession,
        pattern: DeinterleavePattern,
        timeout_ms: u32,
    ) -> Result<Self, DeviceError> {
        let mut stream =
            Stream::with_buffers(session.device(), Type::VideoCapture, BUFFER_COUNT)
                .map_err(DeviceError::BufferMap)?;

        // Queue the buffers and issue STREAMON up front; otherwise the
        // poll in grab_next would wait on a stream that never started.
        stream.start().map_err(DeviceError::BufferMap)?;

        Ok(Self {
            stream,
            fd: session.device().handle().fd(),
            resolution: session.resolution(),
            pattern,
            timeout_ms,
            sequence: 0,
        })
    }

    /// The deinterleave pattern in effect.
    pub fn pattern(&self) -> DeinterleavePattern {
        self.pattern
    }

    /// Wait for a completed buffer, bounded by the grab timeout.
    ///
    /// The raw dequeue blocks indefinitely if the device stops delivering
    /// frames, so the wait goes through poll(2) first.
    fn wait_for_frame(&self) -> Result<(), CaptureError> {
        let mut pfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let rc = unsafe { libc::poll(&mut pfd, 1, poll_timeout(self.timeout_ms)) };
        match rc {
            -1 => Err(CaptureError::Io(std::io::Error::last_os_error())),
            0 => Err(CaptureError::Timeout {
                waited_ms: self.timeout_ms,
            }),
            _ => Ok(()),
        }
    }
}

impl FrameSource for FrameGrabber<'_> {
    fn grab_next(&mut self) -> Result<StereoFramePair, CaptureError> {
        self.wait_for_frame()?;

        let (buffer, meta) = CaptureStream::next(&mut self.stream)?;
        let used = (meta.bytesused as usize).min(buffer.len());
        let (left, right) = deinterleave(&buffer[..used], self.resolution, self.pattern)?;

        let sequence = self.sequence;
        self.sequence += 1;

        Ok(StereoFramePair {
            left,
            right,
            width: self.resolution.width,
            height: self.resolution.height,
            timestamp: SystemTime::now(),
            sequence,
        })
    }
}
