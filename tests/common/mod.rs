//! Shared test doubles: a recording exposure control and a synthetic
//! sensor whose brightness is a deterministic function of exposure.

#![allow(dead_code)]

use std::cell::Cell;
use std::rc::Rc;
use std::time::SystemTime;

use stereocam::camera::{
    CaptureError, ExposureCaps, ExposureControl, FrameSource, StereoFramePair,
};

/// Records every accepted write and mirrors the current exposure into a
/// shared cell so a synthetic sensor can react to it.
pub struct MockControl {
    current: Rc<Cell<i64>>,
    pub exposure_writes: Vec<i64>,
    pub gain_writes: Vec<u8>,
    caps: ExposureCaps,
}

impl MockControl {
    pub fn new() -> (Self, Rc<Cell<i64>>) {
        let current = Rc::new(Cell::new(0));
        let control = Self {
            current: Rc::clone(&current),
            exposure_writes: Vec::new(),
            gain_writes: Vec::new(),
            caps: ExposureCaps::default(),
        };
        (control, current)
    }
}

impl ExposureControl for MockControl {
    fn set_exposure(&mut self, value: i64) -> bool {
        let clamped = value.clamp(self.caps.exposure_min, self.caps.exposure_max);
        self.current.set(clamped);
        self.exposure_writes.push(clamped);
        true
    }

    fn set_gain_level(&mut self, level: u8) -> bool {
        self.gain_writes.push(level);
        true
    }

    fn get_exposure(&mut self) -> Option<i64> {
        Some(self.current.get())
    }

    fn caps(&self) -> ExposureCaps {
        self.caps
    }
}

/// Produces uniform frames whose gray level is `brightness(exposure)`.
pub struct SyntheticSensor<F>
where
    F: Fn(i64) -> f64,
{
    exposure: Rc<Cell<i64>>,
    brightness: F,
    sequence: u64,
    pub grabs: u64,
}

impl<F> SyntheticSensor<F>
where
    F: Fn(i64) -> f64,
{
    pub fn new(exposure: Rc<Cell<i64>>, brightness: F) -> Self {
        Self {
            exposure,
            brightness,
            sequence: 0,
            grabs: 0,
        }
    }
}

impl<F> FrameSource for SyntheticSensor<F>
where
    F: Fn(i64) -> f64,
{
    fn grab_next(&mut self) -> Result<StereoFramePair, CaptureError> {
        let value = (self.brightness)(self.exposure.get()).round().clamp(0.0, 255.0) as u8;
        let sequence = self.sequence;
        self.sequence += 1;
        self.grabs += 1;
        Ok(StereoFramePair {
            left: vec![value; 64],
            right: vec![value; 64],
            width: 8,
            height: 8,
            timestamp: SystemTime::now(),
            sequence,
        })
    }
}
