//! Time-series helpers shared by the detectors.

use crate::detect::DetectError;

/// Minimum samples before a z-score is statistically meaningful here.
pub const MIN_Z_SAMPLES: usize = 5;

/// A simple time series for statistical analysis.
pub struct TimeSeries {
    values: Vec<f64>,
}

impl TimeSeries {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().sum::<f64>() / self.values.len() as f64
    }

    pub fn variance(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let sum_sq_diff: f64 = self.values.iter().map(|&x| (x - mean).powi(2)).sum();
        sum_sq_diff / self.values.len() as f64
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Calculate the Z-score of a value relative to this series.
    /// Z = (value - mean) / std_dev
    pub fn z_score(&self, value: f64) -> Result<f64, DetectError> {
        if self.values.len() < MIN_Z_SAMPLES {
            return Err(DetectError::InsufficientBaseline {
                needed: MIN_Z_SAMPLES,
                have: self.values.len(),
            });
        }
        let std = self.std_dev();
        if std == 0.0 {
            // Deviation from a constant baseline is infinite Z
            if (value - self.mean()).abs() > f64::EPSILON {
                return Ok(f64::INFINITY);
            }
            return Ok(0.0);
        }
        Ok((value - self.mean()) / std)
    }

    /// Least-squares slope over sample index (units per sample).
    pub fn linear_slope(&self) -> f64 {
        let n = self.values.len();
        if n < 2 {
            return 0.0;
        }
        let n_f = n as f64;
        let x_mean = (n_f - 1.0) / 2.0;
        let y_mean = self.mean();
        let mut num = 0.0;
        let mut den = 0.0;
        for (i, &y) in self.values.iter().enumerate() {
            let dx = i as f64 - x_mean;
            num += dx * (y - y_mean);
            den += dx * dx;
        }
        if den == 0.0 {
            0.0
        } else {
            num / den
        }
    }
}
