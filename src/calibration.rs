//! Offline calibration: brightness-to-exposure lookup table construction.
//!
//! Scans the exposure space in two phases. Phase 1 walks exposure upward
//! with an adaptive step, recording which exposure produced which mean
//! brightness. Phase 2 interpolates exposures for gray levels the
//! walkthrough skipped and measures what they actually produce. The
//! resulting table maps a desired mean gray value to the exposure that
//! achieved it, so a consumer can skip the runtime feedback loop entirely.
//!
//! Calibration drives the same device as the capture loop and must never
//! run while it is active; the binary keeps them on separate subcommands.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::camera::{CaptureError, ExposureControl, FrameSource};

/// Number of brightness buckets (one per 8-bit gray level).
pub const TABLE_SIZE: usize = 256;

/// Walkthrough starting point and step.
const START_EXPOSURE: i64 = 10;
const MAX_WALKTHROUGH_STEPS: u32 = 1000;

/// Exposure floor below which the walkthrough never terminates early.
const EXPOSURE_FLOOR: i64 = 255;

/// Errors from calibration capture or table persistence.
#[derive(Debug, thiserror::Error)]
pub enum CalibrationError {
    #[error("Capture failed during calibration: {0}")]
    Capture(#[from] CaptureError),
    #[error("Failed to write table '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to encode table: {0}")]
    Encode(#[from] toml::ser::Error),
    #[error("Failed to parse table '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("min_gray {0} out of range (expected 0..=127)")]
    InvalidMinGray(usize),
}

/// Lookup table from target mean gray value to the exposure that
/// empirically produced it.
///
/// Cells start unset; once set they are never overwritten within a run, so
/// an early clean measurement is not replaced by a later noisier one.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationTable {
    cells: Vec<Option<i64>>,
}

/// On-disk form: only the set cells, as (gray, exposure) pairs.
#[derive(Debug, Serialize, Deserialize)]
struct TableFile {
    entries: Vec<TableEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TableEntry {
    gray: u8,
    exposure: i64,
}

impl Default for CalibrationTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibrationTable {
    pub fn new() -> Self {
        Self {
            cells: vec![None; TABLE_SIZE],
        }
    }

    pub fn get(&self, gray: usize) -> Option<i64> {
        self.cells.get(gray).copied().flatten()
    }

    /// Record `exposure` for `gray` only if that cell is still unset.
    /// Returns whether the cell was written.
    pub fn set_if_unset(&mut self, gray: usize, exposure: i64) -> bool {
        match self.cells.get_mut(gray) {
            Some(cell @ None) => {
                *cell = Some(exposure);
                true
            }
            _ => false,
        }
    }

    /// Number of set cells.
    pub fn set_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    /// Gray levels within `[min_gray, max_gray)` that remain unset.
    pub fn unset_in(&self, min_gray: usize, max_gray: usize) -> Vec<usize> {
        (min_gray..max_gray.min(TABLE_SIZE))
            .filter(|&g| self.cells[g].is_none())
            .collect()
    }

    /// Iterate over set cells in gray order.
    pub fn entries(&self) -> impl Iterator<Item = (usize, i64)> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter_map(|(g, c)| c.map(|e| (g, e)))
    }

    /// Persist the table as TOML.
    pub fn save(&self, path: &Path) -> Result<(), CalibrationError> {
        let file = TableFile {
            entries: self
                .entries()
                .map(|(gray, exposure)| TableEntry {
                    gray: gray as u8,
                    exposure,
                })
                .collect(),
        };
        let text = toml::to_string_pretty(&file)?;
        std::fs::write(path, text).map_err(|e| CalibrationError::Io {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load a previously saved table.
    pub fn load(path: &Path) -> Result<Self, CalibrationError> {
        let text = std::fs::read_to_string(path).map_err(|e| CalibrationError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let file: TableFile = toml::from_str(&text).map_err(|e| CalibrationError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut table = Self::new();
        for entry in file.entries {
            table.set_if_unset(usize::from(entry.gray), entry.exposure);
        }
        Ok(table)
    }
}

/// Round a measured mean gray to its table bucket.
fn bucket(sum: f64) -> usize {
    ((sum + 0.5) as usize).min(TABLE_SIZE - 1)
}

/// Tuning knobs for a calibration run.
#[derive(Debug, Clone, Copy)]
pub struct CalibrationOptions {
    /// Lower bound of the useful gray range; the upper bound is its mirror
    /// (255 - min_gray).
    pub min_gray: usize,
    /// Settle frames per walkthrough measurement
    pub walkthrough_settle: u32,
    /// Settle frames per gap-fill measurement
    pub gap_fill_settle: u32,
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        Self {
            min_gray: 20,
            walkthrough_settle: 5,
            gap_fill_settle: 8,
        }
    }
}

impl CalibrationOptions {
    pub fn max_gray(&self) -> usize {
        TABLE_SIZE - 1 - self.min_gray
    }
}

/// Two-phase calibration curve builder.
pub struct CalibrationCurveBuilder {
    options: CalibrationOptions,
}

impl CalibrationCurveBuilder {
    /// Rejects a `min_gray` whose mirrored upper bound would not leave a
    /// usable gray range (and whose arithmetic would underflow).
    pub fn new(options: CalibrationOptions) -> Result<Self, CalibrationError> {
        if options.min_gray >= TABLE_SIZE / 2 {
            return Err(CalibrationError::InvalidMinGray(options.min_gray));
        }
        Ok(Self { options })
    }

    /// Run both phases and return the table.
    ///
    /// Gray levels that remain unset after the gap fill are accepted and
    /// reported; an incomplete table is not an error.
    pub fn build<C, S>(
        &self,
        control: &mut C,
        source: &mut S,
    ) -> Result<CalibrationTable, CalibrationError>
    where
        C: ExposureControl,
        S: FrameSource,
    {
        let mut table = CalibrationTable::new();
        self.walkthrough(&mut table, control, source)?;
        log::info!("walkthrough recorded {} gray levels", table.set_count());

        self.fill_gaps(&mut table, control, source)?;
        let remaining = table.unset_in(self.options.min_gray, self.options.max_gray());
        if remaining.is_empty() {
            log::info!("calibration complete, all gray levels covered");
        } else {
            log::info!(
                "calibration finished with {} gray levels unset: {:?}",
                remaining.len(),
                remaining
            );
        }
        Ok(table)
    }

    /// Phase 1: walk exposure upward with an adaptive step.
    ///
    /// The step shrinks toward 1 where brightness rises quickly and grows
    /// toward exposure/10 where it rises slowly, so the scan spends its
    /// samples where the curve is steep in exposure terms.
    pub fn walkthrough<C, S>(
        &self,
        table: &mut CalibrationTable,
        control: &mut C,
        source: &mut S,
    ) -> Result<(), CalibrationError>
    where
        C: ExposureControl,
        S: FrameSource,
    {
        let max_gray = self.options.max_gray() as f64;
        let mut sum = 0.0_f64;
        let mut last_sum = 10.0_f64;
        let mut exposure = START_EXPOSURE;
        let mut increment: i64 = 1;

        for step in 0..MAX_WALKTHROUGH_STEPS {
            if sum >= max_gray && last_sum >= max_gray && exposure >= EXPOSURE_FLOOR {
                break;
            }

            if !control.set_exposure(exposure) {
                log::warn!("walkthrough exposure {} rejected", exposure);
            }
            let frame = source.settle_and_grab(self.options.walkthrough_settle)?;

            last_sum = sum;
            sum = frame.left_mean_gray();
            table.set_if_unset(bucket(sum), exposure);

            if last_sum < sum {
                let adapted = (increment as f64 / (sum - last_sum))
                    .min(exposure as f64 / 10.0)
                    .max(1.0);
                increment = adapted as i64;
            }
            exposure += increment;
            log::debug!(
                "walkthrough step {}: exposure {} brightness {:.3}",
                step,
                exposure,
                sum
            );
        }
        Ok(())
    }

    /// Phase 2: interpolate exposures for unset gray levels.
    ///
    /// For each maximal gap bounded by known exposures, try linearly
    /// interpolated exposures and record whichever brightness bucket each
    /// one actually lands in. The landed bucket may differ from the
    /// targeted level, so a gap is not guaranteed to close in one pass.
    pub fn fill_gaps<C, S>(
        &self,
        table: &mut CalibrationTable,
        control: &mut C,
        source: &mut S,
    ) -> Result<(), CalibrationError>
    where
        C: ExposureControl,
        S: FrameSource,
    {
        let min_gray = self.options.min_gray;
        let max_gray = self.options.max_gray();

        let mut i = min_gray;
        while i < max_gray {
            if table.get(i).is_some() {
                i += 1;
                continue;
            }

            let mut j = i;
            while j < max_gray && table.get(j).is_none() {
                j += 1;
            }

            let lower = if i > 0 { table.get(i - 1) } else { None };
            let upper = table.get(j);
            match (lower, upper) {
                (Some(min_exposure), Some(max_exposure)) => {
                    log::info!(
                        "gap [{}, {}) bounded by exposures {} and {}",
                        i,
                        j,
                        min_exposure,
                        max_exposure
                    );
                    for k in i..j {
                        let exposure = ((k - i + 1) as f64
                            * (max_exposure - min_exposure) as f64
                            / (j - i + 1) as f64
                            + min_exposure as f64) as i64;

                        if !control.set_exposure(exposure) {
                            log::warn!("gap-fill exposure {} rejected", exposure);
                        }
                        let frame = source.settle_and_grab(self.options.gap_fill_settle)?;
                        let sum = frame.left_mean_gray();
                        let landed = bucket(sum);
                        if table.set_if_unset(landed, exposure) {
                            log::debug!("gap fill: tried {} for level {}, landed in {}", exposure, k, landed);
                        }
                    }
                }
                _ => {
                    log::warn!("gap [{}, {}) has no bounding samples, left unset", i, j);
                }
            }
            i = j;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_rounds_to_nearest() {
        assert_eq!(bucket(0.0), 0);
        assert_eq!(bucket(19.4), 19);
        assert_eq!(bucket(19.6), 20);
        assert_eq!(bucket(255.0), 255);
        assert_eq!(bucket(300.0), 255);
    }

    #[test]
    fn test_set_if_unset_never_overwrites() {
        let mut table = CalibrationTable::new();
        assert!(table.set_if_unset(100, 500));
        assert!(!table.set_if_unset(100, 9999));
        assert_eq!(table.get(100), Some(500));
    }

    #[test]
    fn test_set_if_unset_out_of_range() {
        let mut table = CalibrationTable::new();
        assert!(!table.set_if_unset(256, 1));
        assert_eq!(table.set_count(), 0);
    }

    #[test]
    fn test_unset_in_range() {
        let mut table = CalibrationTable::new();
        table.set_if_unset(20, 10);
        table.set_if_unset(22, 30);
        assert_eq!(table.unset_in(20, 24), vec![21, 23]);
    }

    #[test]
    fn test_entries_in_gray_order() {
        let mut table = CalibrationTable::new();
        table.set_if_unset(200, 9000);
        table.set_if_unset(50, 100);
        let entries: Vec<_> = table.entries().collect();
        assert_eq!(entries, vec![(50, 100), (200, 9000)]);
    }

    #[test]
    fn test_table_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.toml");

        let mut table = CalibrationTable::new();
        table.set_if_unset(20, 15);
        table.set_if_unset(128, 4000);
        table.set_if_unset(235, 90000);
        table.save(&path).unwrap();

        let loaded = CalibrationTable::load(&path).unwrap();
        assert_eq!(loaded, table);
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.toml");
        std::fs::write(&path, "not = [valid").unwrap();

        match CalibrationTable::load(&path) {
            Err(CalibrationError::Parse { .. }) => {}
            other => panic!("Expected parse error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_options_max_gray_mirrors_min() {
        let options = CalibrationOptions::default();
        assert_eq!(options.min_gray, 20);
        assert_eq!(options.max_gray(), 235);
    }

    #[test]
    fn test_builder_rejects_min_gray_out_of_range() {
        // A config can carry any value; 256+ would underflow max_gray and
        // 128+ leaves no usable range.
        for min_gray in [128, 255, 300] {
            let options = CalibrationOptions {
                min_gray,
                ..CalibrationOptions::default()
            };
            match CalibrationCurveBuilder::new(options) {
                Err(CalibrationError::InvalidMinGray(v)) => assert_eq!(v, min_gray),
                _ => panic!("Expected InvalidMinGray for {}", min_gray),
            }
        }

        let options = CalibrationOptions {
            min_gray: 127,
            ..CalibrationOptions::default()
        };
        assert!(CalibrationCurveBuilder::new(options).is_ok());
    }
}
