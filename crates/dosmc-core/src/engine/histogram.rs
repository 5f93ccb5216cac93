use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistogramError {
    #[error("Histogram interval must satisfy min < max with finite bounds, got [{min}, {max}]")]
    InvalidInterval { min: f64, max: f64 },

    #[error("Histogram requires at least one bin")]
    NoBins,

    #[error("Histogram bin width must be positive, got {0}")]
    InvalidBinWidth(f64),

    #[error("Expected {expected} values, got {found}")]
    LengthMismatch { expected: usize, found: usize },

    #[error("File I/O error for '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error for '{path}': {source}")]
    Csv { path: String, source: csv::Error },

    #[error("Malformed histogram file '{path}': {message}")]
    Format { path: String, message: String },
}

/// One row of the persisted histogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct BinRecord {
    bin: usize,
    lower: f64,
    upper: f64,
    log_dos: f64,
    count: u64,
}

/// Uniformly binned histogram over a closed interval, holding a visit count and an
/// accumulated log density of states per bin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    min: f64,
    max: f64,
    bin_width: f64,
    log_dos: Vec<f64>,
    counts: Vec<u64>,
    lower_outliers: u64,
    upper_outliers: u64,
}

impl Histogram {
    pub fn with_bin_count(min: f64, max: f64, bins: usize) -> Result<Self, HistogramError> {
        if !(min.is_finite() && max.is_finite() && min < max) {
            return Err(HistogramError::InvalidInterval { min, max });
        }
        if bins == 0 {
            return Err(HistogramError::NoBins);
        }
        Ok(Self {
            min,
            max,
            bin_width: (max - min) / bins as f64,
            log_dos: vec![0.0; bins],
            counts: vec![0; bins],
            lower_outliers: 0,
            upper_outliers: 0,
        })
    }

    /// Builds `ceil((max - min) / width)` bins of exactly `width`; the upper bound is
    /// extended to the end of the last bin.
    pub fn with_bin_width(min: f64, max: f64, width: f64) -> Result<Self, HistogramError> {
        if !(min.is_finite() && max.is_finite() && min < max) {
            return Err(HistogramError::InvalidInterval { min, max });
        }
        if !(width.is_finite() && width > 0.0) {
            return Err(HistogramError::InvalidBinWidth(width));
        }
        let bins = ((max - min) / width).ceil().max(1.0) as usize;
        let mut histogram = Self::with_bin_count(min, min + bins as f64 * width, bins)?;
        histogram.bin_width = width;
        Ok(histogram)
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn bin_width(&self) -> f64 {
        self.bin_width
    }

    pub fn bin_count(&self) -> usize {
        self.counts.len()
    }

    pub fn log_dos(&self) -> &[f64] {
        &self.log_dos
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn lower_outliers(&self) -> u64 {
        self.lower_outliers
    }

    pub fn upper_outliers(&self) -> u64 {
        self.upper_outliers
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Bin holding `value`, or `None` outside `[min, max]`. The upper bound belongs to the
    /// last bin.
    pub fn bin_of(&self, value: f64) -> Option<usize> {
        if !self.contains(value) {
            return None;
        }
        let index = ((value - self.min) / self.bin_width) as usize;
        Some(index.min(self.bin_count() - 1))
    }

    /// Lower and upper edge of a bin.
    pub fn bin_bounds(&self, bin: usize) -> (f64, f64) {
        let lower = self.min + bin as f64 * self.bin_width;
        (lower, lower + self.bin_width)
    }

    /// Log density of states at `value`, clamped to the nearest edge bin outside the domain.
    pub fn value_at(&self, value: f64) -> f64 {
        let clamped = if value.is_nan() {
            self.min
        } else {
            value.clamp(self.min, self.max)
        };
        self.bin_of(clamped).map_or(0.0, |bin| self.log_dos[bin])
    }

    /// Counts a visit to `value` and adds `scale_factor` to its bin's log density of states.
    ///
    /// Values outside the domain only increment the outlier counters.
    pub fn record(&mut self, value: f64, scale_factor: f64) -> Option<usize> {
        match self.bin_of(value) {
            Some(bin) => {
                self.counts[bin] += 1;
                self.log_dos[bin] += scale_factor;
                Some(bin)
            }
            None => {
                if value < self.min {
                    self.lower_outliers += 1;
                } else {
                    self.upper_outliers += 1;
                }
                None
            }
        }
    }

    /// Clears visit and outlier counts; the log density of states is kept.
    pub fn reset_counts(&mut self) {
        self.counts.fill(0);
        self.lower_outliers = 0;
        self.upper_outliers = 0;
    }

    pub fn total_count(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Ratio of the smallest bin count to the mean count.
    ///
    /// Returns 0 when nothing has been recorded or when any bin is still empty.
    pub fn flatness(&self) -> f64 {
        let total = self.total_count();
        if total == 0 {
            return 0.0;
        }
        let min = self.counts.iter().copied().min().unwrap_or(0);
        if min == 0 {
            return 0.0;
        }
        let mean = total as f64 / self.bin_count() as f64;
        min as f64 / mean
    }

    pub fn set_log_dos(&mut self, values: Vec<f64>) -> Result<(), HistogramError> {
        if values.len() != self.bin_count() {
            return Err(HistogramError::LengthMismatch {
                expected: self.bin_count(),
                found: values.len(),
            });
        }
        self.log_dos = values;
        Ok(())
    }

    fn set_counts(&mut self, values: Vec<u64>) -> Result<(), HistogramError> {
        if values.len() != self.bin_count() {
            return Err(HistogramError::LengthMismatch {
                expected: self.bin_count(),
                found: values.len(),
            });
        }
        self.counts = values;
        Ok(())
    }

    /// Log density of states shifted so that its smallest entry is zero.
    pub fn normalized_log_dos(&self) -> Vec<f64> {
        let floor = self.log_dos.iter().copied().fold(f64::INFINITY, f64::min);
        self.log_dos.iter().map(|g| g - floor).collect()
    }

    /// Writes one row per bin with columns `bin,lower,upper,log_dos,count`.
    pub fn write_csv(&self, path: &Path) -> Result<(), HistogramError> {
        let path_str = path.to_string_lossy().to_string();
        let mut writer = csv::Writer::from_path(path).map_err(|e| HistogramError::Csv {
            path: path_str.clone(),
            source: e,
        })?;
        for (bin, (&log_dos, &count)) in self.log_dos.iter().zip(&self.counts).enumerate() {
            let (lower, upper) = self.bin_bounds(bin);
            writer
                .serialize(BinRecord {
                    bin,
                    lower,
                    upper,
                    log_dos,
                    count,
                })
                .map_err(|e| HistogramError::Csv {
                    path: path_str.clone(),
                    source: e,
                })?;
        }
        writer.flush().map_err(|e| HistogramError::Io {
            path: path_str,
            source: e,
        })
    }

    /// Reads a histogram previously written by [`write_csv`](Self::write_csv).
    pub fn read_csv(path: &Path) -> Result<Self, HistogramError> {
        let path_str = path.to_string_lossy().to_string();
        let mut reader = csv::Reader::from_path(path).map_err(|e| HistogramError::Csv {
            path: path_str.clone(),
            source: e,
        })?;
        let mut records: Vec<BinRecord> = Vec::new();
        for result in reader.deserialize() {
            let record: BinRecord = result.map_err(|e| HistogramError::Csv {
                path: path_str.clone(),
                source: e,
            })?;
            records.push(record);
        }

        let (Some(first), Some(last)) = (records.first(), records.last()) else {
            return Err(HistogramError::Format {
                path: path_str,
                message: "no bins found".to_string(),
            });
        };
        if let Some((i, _)) = records.iter().enumerate().find(|(i, r)| r.bin != *i) {
            return Err(HistogramError::Format {
                path: path_str,
                message: format!("bins must be numbered consecutively from 0 (row {i})"),
            });
        }

        let mut histogram = Self::with_bin_count(first.lower, last.upper, records.len())?;
        histogram.set_log_dos(records.iter().map(|r| r.log_dos).collect())?;
        histogram.set_counts(records.iter().map(|r| r.count).collect())?;
        Ok(histogram)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const TOLERANCE: f64 = 1e-12;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    #[test]
    fn bin_width_construction_rounds_bin_count_up() {
        let histogram = Histogram::with_bin_width(0.0, 1.0, 0.3).unwrap();
        assert_eq!(histogram.bin_count(), 4);
        assert!(approx_eq(histogram.bin_width(), 0.3));
        assert!(approx_eq(histogram.max(), 1.2));
    }

    #[test]
    fn invalid_construction_is_rejected() {
        assert!(matches!(
            Histogram::with_bin_count(1.0, 0.0, 4),
            Err(HistogramError::InvalidInterval { .. })
        ));
        assert!(matches!(
            Histogram::with_bin_count(0.0, 1.0, 0),
            Err(HistogramError::NoBins)
        ));
        assert!(matches!(
            Histogram::with_bin_width(0.0, 1.0, -0.1),
            Err(HistogramError::InvalidBinWidth(_))
        ));
    }

    #[test]
    fn bin_of_covers_closed_interval() {
        let histogram = Histogram::with_bin_count(-2.0, 2.0, 4).unwrap();
        assert_eq!(histogram.bin_of(-2.0), Some(0));
        assert_eq!(histogram.bin_of(-0.5), Some(1));
        assert_eq!(histogram.bin_of(0.0), Some(2));
        assert_eq!(histogram.bin_of(2.0), Some(3));
        assert_eq!(histogram.bin_of(2.0001), None);
        assert_eq!(histogram.bin_of(-3.0), None);
        assert_eq!(histogram.bin_of(f64::NAN), None);
    }

    #[test]
    fn record_updates_counts_log_dos_and_outliers() {
        let mut histogram = Histogram::with_bin_count(0.0, 4.0, 4).unwrap();
        assert_eq!(histogram.record(0.5, 1.0), Some(0));
        assert_eq!(histogram.record(0.7, 0.5), Some(0));
        assert_eq!(histogram.record(3.5, 1.0), Some(3));
        assert_eq!(histogram.record(-1.0, 1.0), None);
        assert_eq!(histogram.record(9.0, 1.0), None);

        assert_eq!(histogram.counts(), &[2, 0, 0, 1]);
        assert!(approx_eq(histogram.log_dos()[0], 1.5));
        assert_eq!(histogram.lower_outliers(), 1);
        assert_eq!(histogram.upper_outliers(), 1);
        assert!(approx_eq(histogram.value_at(-10.0), 1.5));
        assert!(approx_eq(histogram.value_at(10.0), 1.0));

        histogram.reset_counts();
        assert_eq!(histogram.total_count(), 0);
        assert_eq!(histogram.lower_outliers(), 0);
        assert!(approx_eq(histogram.log_dos()[0], 1.5));
    }

    #[test]
    fn skewed_histogram_is_not_flat() {
        let mut histogram = Histogram::with_bin_count(0.0, 5.0, 5).unwrap();
        assert_eq!(histogram.flatness(), 0.0);
        for _ in 0..96 {
            histogram.record(0.5, 1.0);
        }
        for bin in 1..5 {
            histogram.record(bin as f64 + 0.5, 1.0);
        }
        let flatness = histogram.flatness();
        assert!(flatness < 0.8);
        assert!(approx_eq(flatness, 1.0 / 20.0));
    }

    #[test]
    fn uniform_histogram_is_perfectly_flat() {
        let mut histogram = Histogram::with_bin_count(0.0, 3.0, 3).unwrap();
        for bin in 0..3 {
            for _ in 0..10 {
                histogram.record(bin as f64 + 0.5, 1.0);
            }
        }
        assert!(approx_eq(histogram.flatness(), 1.0));
    }

    #[test]
    fn empty_bin_means_zero_flatness() {
        let mut histogram = Histogram::with_bin_count(0.0, 3.0, 3).unwrap();
        histogram.record(0.5, 1.0);
        histogram.record(1.5, 1.0);
        assert_eq!(histogram.flatness(), 0.0);
    }

    #[test]
    fn set_log_dos_checks_length() {
        let mut histogram = Histogram::with_bin_count(0.0, 1.0, 2).unwrap();
        assert!(matches!(
            histogram.set_log_dos(vec![1.0]),
            Err(HistogramError::LengthMismatch { expected: 2, found: 1 })
        ));
        histogram.set_log_dos(vec![3.0, 5.0]).unwrap();
        assert_eq!(histogram.normalized_log_dos(), vec![0.0, 2.0]);
    }

    #[test]
    fn csv_file_restores_weights_and_counts() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("dos.csv");
        let mut histogram = Histogram::with_bin_count(-1.0, 1.0, 4).unwrap();
        histogram.record(-0.9, 2.0);
        histogram.record(0.2, 0.5);
        histogram.record(0.2, 0.5);
        histogram.write_csv(&file_path).unwrap();

        let content = fs::read_to_string(&file_path).unwrap();
        assert!(content.starts_with("bin,lower,upper,log_dos,count"));

        let restored = Histogram::read_csv(&file_path).unwrap();
        assert_eq!(restored.bin_count(), 4);
        assert!(approx_eq(restored.min(), -1.0));
        assert!(approx_eq(restored.max(), 1.0));
        assert_eq!(restored.counts(), histogram.counts());
        assert_eq!(restored.log_dos(), histogram.log_dos());
    }

    #[test]
    fn read_csv_fails_for_missing_or_malformed_files() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.csv");
        assert!(matches!(
            Histogram::read_csv(&missing),
            Err(HistogramError::Csv { .. })
        ));

        let empty = dir.path().join("empty.csv");
        fs::write(&empty, "bin,lower,upper,log_dos,count\n").unwrap();
        assert!(matches!(
            Histogram::read_csv(&empty),
            Err(HistogramError::Format { .. })
        ));

        let gapped = dir.path().join("gapped.csv");
        fs::write(
            &gapped,
            "bin,lower,upper,log_dos,count\n0,0.0,1.0,0.0,1\n2,1.0,2.0,0.0,1\n",
        )
        .unwrap();
        assert!(matches!(
            Histogram::read_csv(&gapped),
            Err(HistogramError::Format { .. })
        ));
    }
}
