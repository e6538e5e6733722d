//! Beam position from four electrode peak vectors.
//!
//! With `Σ = a + b + c + d` per bunch, the normalized difference signals are
//!
//! ```text
//! h = (a - b - c + d) / Σ
//! v = (a + b - c - d) / Σ
//! ```
//!
//! and each axis position is the chamber's cubic polynomial in `h` and `v`. Guarded entries
//! are set to 0 instead of dividing, and any bunch whose signals or positions overflow is
//! reported at `h = v = 0`, so no NaN or infinity ever reaches the output.

use crate::acquisition::readiness::ELECTRODE_COUNT;
use crate::calibration::{CalibrationTable, COEFFICIENT_COUNT};
use crate::error::{AppResult, BpmError};
use crate::processing::stats::AxisStats;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Largest accepted per-electrode gain. Keeps `Σ` of four full-scale ADC peaks finite.
pub const MAX_GAIN: f64 = 1.0e3;

/// Check gain factors before they are applied to peak vectors.
///
/// # Errors
///
/// `Configuration` unless every entry is finite and in `(0, MAX_GAIN]`.
pub fn validate_gains(gains: &[f64; ELECTRODE_COUNT]) -> AppResult<()> {
    match gains.iter().find(|g| !(g.is_finite() && **g > 0.0 && **g <= MAX_GAIN)) {
        Some(gain) => Err(BpmError::Configuration(format!(
            "gain_correction entries must be finite and in (0, {}], got {}",
            MAX_GAIN, gain
        ))),
        None => Ok(()),
    }
}

/// When `h` and `v` are forced to zero instead of divided.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroGuard {
    /// Only where the electrode sum is exactly zero.
    #[default]
    Denominator,
    /// Wherever any single electrode peak is zero, e.g. a bunch cut by the noise threshold
    /// on one electrode only. Zero sums are guarded as well.
    AnyElectrode,
}

impl ZeroGuard {
    fn guards(self, a: f64, b: f64, c: f64, d: f64) -> bool {
        let sum = a + b + c + d;
        if !sum.is_finite() {
            return true;
        }
        match self {
            ZeroGuard::Denominator => sum == 0.0,
            ZeroGuard::AnyElectrode => sum == 0.0 || a == 0.0 || b == 0.0 || c == 0.0 || d == 0.0,
        }
    }
}

/// Normalized horizontal and vertical difference signals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedSignals {
    /// Horizontal signal per bunch.
    pub h: Vec<f64>,
    /// Vertical signal per bunch.
    pub v: Vec<f64>,
}

/// Element-wise `h`/`v` for equal-length peak vectors.
///
/// A non-finite electrode sum is guarded like a zero one, and a quotient that still
/// overflows yields `h = v = 0` for that bunch.
///
/// # Errors
///
/// `LengthMismatch` if `b`, `c` or `d` differs in length from `a`.
pub fn normalized_signals(
    peaks: &[Vec<f64>; ELECTRODE_COUNT],
    guard: ZeroGuard,
) -> AppResult<NormalizedSignals> {
    let [a, b, c, d] = peaks;
    let len = a.len();
    if let Some(other) = [b, c, d].into_iter().find(|p| p.len() != len) {
        return Err(BpmError::LengthMismatch {
            expected: len,
            actual: other.len(),
        });
    }

    let mut signals = NormalizedSignals {
        h: Vec::with_capacity(len),
        v: Vec::with_capacity(len),
    };

    for i in 0..len {
        let (a, b, c, d) = (a[i], b[i], c[i], d[i]);
        if guard.guards(a, b, c, d) {
            signals.h.push(0.0);
            signals.v.push(0.0);
        } else {
            let sum = a + b + c + d;
            let h = (a - b - c + d) / sum;
            let v = (a + b - c - d) / sum;
            if h.is_finite() && v.is_finite() {
                signals.h.push(h);
                signals.v.push(v);
            } else {
                signals.h.push(0.0);
                signals.v.push(0.0);
            }
        }
    }

    Ok(signals)
}

/// `c0 + c1·h + c2·v + c3·h² + c4·h·v + c5·v² + c6·h³ + c7·h²·v + c8·h·v² + c9·v³`
pub fn evaluate_polynomial(coefficients: &[f64; COEFFICIENT_COUNT], h: f64, v: f64) -> f64 {
    let [c0, c1, c2, c3, c4, c5, c6, c7, c8, c9] = *coefficients;
    c0 + c1 * h
        + c2 * v
        + c3 * h * h
        + c4 * h * v
        + c5 * v * v
        + c6 * h * h * h
        + c7 * h * h * v
        + c8 * h * v * v
        + c9 * v * v * v
}

/// Position vectors and statistics for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionResult {
    /// Horizontal position per bunch.
    pub x: Vec<f64>,
    /// Vertical position per bunch.
    pub y: Vec<f64>,
    /// Spread of `x`; NaN when there are no bunches.
    pub x_stats: AxisStats,
    /// Spread of `y`; NaN when there are no bunches.
    pub y_stats: AxisStats,
}

impl PositionResult {
    /// Number of bunches in this cycle.
    pub fn bunches(&self) -> usize {
        self.x.len()
    }
}

/// Applies gains, guards and the chamber polynomial.
#[derive(Debug, Clone)]
pub struct PositionCalculator {
    table: Arc<CalibrationTable>,
    zero_guard: ZeroGuard,
    gains: [f64; ELECTRODE_COUNT],
}

impl PositionCalculator {
    /// Unit gains and the `Denominator` guard.
    pub fn new(table: Arc<CalibrationTable>) -> Self {
        Self {
            table,
            zero_guard: ZeroGuard::default(),
            gains: [1.0; ELECTRODE_COUNT],
        }
    }

    /// Select the zero-guard policy.
    pub fn with_zero_guard(mut self, zero_guard: ZeroGuard) -> Self {
        self.zero_guard = zero_guard;
        self
    }

    /// Multiplicative gains for the A/B/C/D peak vectors.
    ///
    /// # Errors
    ///
    /// `Configuration` for a non-finite, non-positive or oversized gain (see
    /// [`validate_gains`]); the calculator is not built.
    pub fn with_gains(mut self, gains: [f64; ELECTRODE_COUNT]) -> AppResult<Self> {
        validate_gains(&gains)?;
        self.gains = gains;
        Ok(self)
    }

    /// Calibration table in use.
    pub fn table(&self) -> &Arc<CalibrationTable> {
        &self.table
    }

    /// Compute X/Y positions for chamber `chamber` from the four peak vectors.
    ///
    /// # Errors
    ///
    /// `ChamberOutOfRange` before any computation for an index above 17, and
    /// `LengthMismatch` for peak vectors of unequal length.
    pub fn calculate(
        &self,
        chamber: usize,
        peaks: &[Vec<f64>; ELECTRODE_COUNT],
    ) -> AppResult<PositionResult> {
        let calibration = self.table.get(chamber)?;

        let signals = if self.gains.iter().all(|&g| g == 1.0) {
            normalized_signals(peaks, self.zero_guard)?
        } else {
            let corrected: [Vec<f64>; ELECTRODE_COUNT] = std::array::from_fn(|i| {
                peaks[i].iter().map(|p| p * self.gains[i]).collect()
            });
            normalized_signals(&corrected, self.zero_guard)?
        };

        let (x, y): (Vec<f64>, Vec<f64>) = signals
            .h
            .iter()
            .zip(&signals.v)
            .map(|(&h, &v)| {
                let x = evaluate_polynomial(&calibration.x, h, v);
                let y = evaluate_polynomial(&calibration.y, h, v);
                if x.is_finite() && y.is_finite() {
                    (x, y)
                } else {
                    (calibration.x[0], calibration.y[0])
                }
            })
            .unzip();

        Ok(PositionResult {
            x_stats: AxisStats::from_values(&x),
            y_stats: AxisStats::from_values(&y),
            x,
            y,
        })
    }
}
