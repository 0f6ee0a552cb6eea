//! Calibration runs against a synthetic sensor with a known linear
//! brightness curve, so every recorded cell can be checked analytically.

mod common;

use common::{MockControl, SyntheticSensor};
use stereocam::calibration::{CalibrationCurveBuilder, CalibrationOptions, CalibrationTable};

/// Brightness rises by one gray level per four exposure units.
fn linear_quarter(exposure: i64) -> f64 {
    exposure as f64 / 4.0
}

#[test]
fn test_build_covers_useful_gray_range() {
    let (mut control, exposure) = MockControl::new();
    let mut sensor = SyntheticSensor::new(exposure, linear_quarter);

    let options = CalibrationOptions::default();
    let builder = CalibrationCurveBuilder::new(options).unwrap();
    let table = builder.build(&mut control, &mut sensor).unwrap();

    // A strictly monotone sensor leaves no holes between the bounds.
    assert!(table.unset_in(options.min_gray, options.max_gray()).is_empty());
}

#[test]
fn test_build_records_monotone_exposures() {
    let (mut control, exposure) = MockControl::new();
    let mut sensor = SyntheticSensor::new(exposure, linear_quarter);

    let builder = CalibrationCurveBuilder::new(CalibrationOptions::default()).unwrap();
    let table = builder.build(&mut control, &mut sensor).unwrap();

    let entries: Vec<_> = table.entries().collect();
    assert!(entries.len() >= 200);
    for pair in entries.windows(2) {
        assert!(
            pair[0].1 <= pair[1].1,
            "exposure decreased between gray {} and {}",
            pair[0].0,
            pair[1].0
        );
    }
}

#[test]
fn test_walkthrough_steps_respect_adaptive_increment_bound() {
    let (mut control, exposure) = MockControl::new();
    // One gray level per exposure unit, so every sample is recorded.
    let mut sensor = SyntheticSensor::new(exposure, |e| e as f64);

    let mut table = CalibrationTable::new();
    let builder = CalibrationCurveBuilder::new(CalibrationOptions::default()).unwrap();
    builder
        .walkthrough(&mut table, &mut control, &mut sensor)
        .unwrap();

    // The scan never advances exposure by more than max(1, exposure / 10)
    // per step, so it cannot skip past brightness levels.
    assert!(control.exposure_writes.len() >= 2);
    for pair in control.exposure_writes.windows(2) {
        let bound = (pair[0] / 10).max(1);
        assert!(
            pair[1] - pair[0] <= bound,
            "step from {} to {} exceeds bound {}",
            pair[0],
            pair[1],
            bound
        );
    }

    // The recorded samples inherit the bound: adjacent gray levels were
    // reached without skipping exposures in between.
    let entries: Vec<_> = table.entries().collect();
    for pair in entries.windows(2) {
        assert!(pair[1].1 - pair[0].1 <= (pair[0].1 / 10).max(1));
    }
}

#[test]
fn test_fill_gaps_closes_bounded_gap() {
    let (mut control, exposure) = MockControl::new();
    let mut sensor = SyntheticSensor::new(exposure, linear_quarter);

    // Gap [100, 104) bounded by measurements at gray 99 and 104. The
    // interpolated exposures land exactly on the missing levels.
    let mut table = CalibrationTable::new();
    table.set_if_unset(99, 396);
    table.set_if_unset(104, 416);

    let builder = CalibrationCurveBuilder::new(CalibrationOptions::default()).unwrap();
    builder
        .fill_gaps(&mut table, &mut control, &mut sensor)
        .unwrap();

    assert_eq!(table.get(100), Some(400));
    assert_eq!(table.get(101), Some(404));
    assert_eq!(table.get(102), Some(408));
    assert_eq!(table.get(103), Some(412));
    // Eight settle frames for each of the four probes.
    assert_eq!(sensor.grabs, 32);
}

#[test]
fn test_fill_gaps_skips_unbounded_gap() {
    let (mut control, exposure) = MockControl::new();
    let mut sensor = SyntheticSensor::new(exposure, linear_quarter);

    // Only an upper bound exists; the gap below it has nothing to
    // interpolate from and must be left alone.
    let mut table = CalibrationTable::new();
    table.set_if_unset(230, 920);

    let builder = CalibrationCurveBuilder::new(CalibrationOptions::default()).unwrap();
    builder
        .fill_gaps(&mut table, &mut control, &mut sensor)
        .unwrap();

    assert_eq!(table.set_count(), 1);
    assert_eq!(sensor.grabs, 0);
}

#[test]
fn test_fill_gaps_is_idempotent_on_complete_range() {
    let (mut control, exposure) = MockControl::new();
    let mut sensor = SyntheticSensor::new(exposure, linear_quarter);

    let options = CalibrationOptions::default();
    let builder = CalibrationCurveBuilder::new(options).unwrap();
    let mut table = builder.build(&mut control, &mut sensor).unwrap();

    let before = table.clone();
    let grabs_before = sensor.grabs;
    builder
        .fill_gaps(&mut table, &mut control, &mut sensor)
        .unwrap();

    // No gaps remain, so a second pass measures nothing and changes nothing.
    assert_eq!(table, before);
    assert_eq!(sensor.grabs, grabs_before);
}
