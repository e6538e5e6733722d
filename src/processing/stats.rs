//! Per-axis summary statistics.

use serde::Serialize;

/// Population standard deviation and RMS of one position vector.
///
/// Both are NaN for an empty vector, which keeps "no bunches" distinguishable from
/// "bunches centred at zero".
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AxisStats {
    /// Population standard deviation.
    pub std_dev: f64,
    /// Root mean square.
    pub rms: f64,
}

impl AxisStats {
    /// Both NaN.
    pub const UNDEFINED: AxisStats = AxisStats {
        std_dev: f64::NAN,
        rms: f64::NAN,
    };

    /// Compute both statistics in a single pass (Welford update for the variance).
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::UNDEFINED;
        }

        let mut count = 0u64;
        let mut mean = 0.0;
        let mut m2 = 0.0;
        let mut sum_sq = 0.0;

        for &value in values {
            count += 1;
            let delta = value - mean;
            mean += delta / count as f64;
            m2 += delta * (value - mean);
            sum_sq += value * value;
        }

        let n = count as f64;
        Self {
            std_dev: (m2 / n).sqrt(),
            rms: (sum_sq / n).sqrt(),
        }
    }

    /// False for an empty vector.
    pub fn is_defined(&self) -> bool {
        !self.std_dev.is_nan() && !self.rms.is_nan()
    }
}

impl Default for AxisStats {
    fn default() -> Self {
        Self::UNDEFINED
    }
}
