//! Chamber calibration table.
//!
//! Every monitor location has a beam-pipe cross-section with its own empirically fitted
//! third-order position polynomial. The table below holds the X and Y coefficient sets for
//! all 18 chamber geometries. It is built once, never mutated, and shared between the
//! pipeline and any monitoring code through an `Arc<CalibrationTable>`.
//!
//! Coefficient order follows the polynomial terms
//! `1, h, v, h², h·v, v², h³, h²·v, h·v², v³`.

use crate::error::{AppResult, BpmError};
use serde::Serialize;

/// Number of terms in the position polynomial.
pub const COEFFICIENT_COUNT: usize = 10;

/// Number of chamber geometries in the table.
pub const CHAMBER_COUNT: usize = 18;

/// Highest valid chamber-type index.
pub const MAX_CHAMBER_INDEX: usize = CHAMBER_COUNT - 1;

/// Calibration data for one chamber geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChamberCalibration {
    /// Short geometry label as used by the accelerator operators.
    pub name: &'static str,
    /// Coefficients for the horizontal position polynomial.
    pub x: [f64; COEFFICIENT_COUNT],
    /// Coefficients for the vertical position polynomial.
    pub y: [f64; COEFFICIENT_COUNT],
}

/// Immutable lookup table indexed by chamber type (0..=17).
#[derive(Debug, Clone)]
pub struct CalibrationTable {
    entries: [ChamberCalibration; CHAMBER_COUNT],
}

impl CalibrationTable {
    /// The table of fitted coefficients used in the SuperKEKB / KEKB rings.
    pub fn standard() -> Self {
        Self {
            entries: STANDARD_CHAMBERS,
        }
    }

    /// Build a table from custom entries (e.g. refitted coefficients).
    pub fn from_entries(entries: [ChamberCalibration; CHAMBER_COUNT]) -> Self {
        Self { entries }
    }

    /// Look up a chamber by index, rejecting anything outside `0..=17`.
    pub fn get(&self, index: usize) -> AppResult<&ChamberCalibration> {
        self.entries.get(index).ok_or(BpmError::ChamberOutOfRange {
            index,
            max: MAX_CHAMBER_INDEX,
        })
    }

    /// Resolve a chamber name (case-insensitive) to its index.
    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.name.eq_ignore_ascii_case(name))
    }

    /// Iterate over `(index, calibration)` pairs in table order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &ChamberCalibration)> {
        self.entries.iter().enumerate()
    }

    /// Number of chamber types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false for the standard table.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CalibrationTable {
    fn default() -> Self {
        Self::standard()
    }
}

const STANDARD_CHAMBERS: [ChamberCalibration; CHAMBER_COUNT] = [
    // SKB antechamber 90x220, LER normal
    ChamberCalibration {
        name: "f90x220A",
        x: [-1.92E-07, 9.17E-01, -3.51E-16, 9.73E-10, -6.18E-12, -2.74E-11, 1.30E-04, -7.72E-19, -3.81E-04, 2.18E-18],
        y: [9.41E-08, 3.49E-16, 9.45E-01, 1.52E-09, 1.22E-12, -1.53E-09, -3.34E-18, -3.56E-04, 2.41E-18, 1.32E-04],
    },
    ChamberCalibration {
        name: "f50x190(+25)SP",
        x: [4.89E-06, 5.04E-01, 1.25E-14, -2.00E-08, -9.36E-12, 3.51E-09, 7.24E-05, -1.38E-17, -2.07E-04, -2.95E-17],
        y: [3.30E-07, 1.20E-14, 5.08E-01, 9.54E-10, -5.51E-11, -1.87E-09, -1.63E-17, -1.80E-04, -3.14E-17, 5.98E-05],
    },
    ChamberCalibration {
        name: "f64",
        x: [-1.77E-08, 6.54E-01, -4.05E-16, 1.64E-10, -2.43E-13, -8.21E-11, 9.28E-05, -1.17E-18, -2.59E-04, 2.91E-18],
        y: [1.77E-08, 2.93E-16, 6.54E-01, 8.21E-11, 2.43E-13, -1.64E-10, -1.92E-18, -2.59E-04, 1.20E-19, 9.28E-05],
    },
    ChamberCalibration {
        name: "122x50",
        x: [-8.35E-16, 5.37E-01, -3.04E-16, -1.01E-17, -1.09E-17, 2.83E-17, 8.22E-05, -5.50E-19, -3.82E-04, 2.14E-18],
        y: [1.52E-14, 4.04E-17, 8.65E-01, 4.26E-18, -7.24E-18, -8.61E-17, 2.79E-21, -1.94E-04, -1.64E-19, 1.25E-04],
    },
    ChamberCalibration {
        name: "65x48",
        x: [-1.43E-09, 8.28E-01, -9.81E-17, 1.80E-11, -1.14E-13, -2.30E-12, 5.26E-04, 2.46E-19, -5.28E-04, 2.53E-19],
        y: [1.90E-09, 4.80E-16, 4.70E-01, 1.25E-11, 3.73E-14, -9.04E-12, -3.78E-18, 1.44E-04, -2.50E-19, -3.55E-05],
    },
    ChamberCalibration {
        name: "60x40",
        x: [-2.30E-09, 5.94E-01, -1.83E-16, 1.93E-11, 7.52E-14, -7.44E-12, 2.40E-04, 6.45E-20, -3.90E-04, 4.86E-19],
        y: [-2.09E-09, 2.55E-17, 4.45E-01, -5.37E-12, 1.13E-13, 8.21E-12, -4.27E-19, 3.76E-05, 2.62E-19, -2.96E-05],
    },
    ChamberCalibration {
        name: "f50x190",
        x: [4.58E-06, 5.04E-01, 1.18E-14, -1.88E-08, -6.19E-12, 3.29E-09, 7.24E-05, -1.33E-17, -2.07E-04, -2.74E-17],
        y: [1.21E-07, 1.13E-14, 5.08E-01, 7.52E-10, -5.16E-11, -9.59E-10, -1.69E-17, -1.80E-04, -2.72E-17, 5.98E-05],
    },
    ChamberCalibration {
        name: "f90",
        x: [-2.15E-16, 9.17E-01, -5.61E-17, 5.91E-17, 2.75E-17, -3.36E-17, 1.28E-04, 3.68E-18, -3.72E-04, -1.77E-18],
        y: [7.94E-15, -1.56E-16, 9.17E-01, -4.91E-17, 1.45E-17, -8.11E-17, 3.82E-18, -3.71E-04, -3.13E-18, 1.28E-04],
    },
    ChamberCalibration {
        name: "SKB_oval_50x44",
        x: [3.00E-08, 5.10E-01, -1.38E-16, -1.81E-10, 6.04E-13, 8.20E-11, 8.42E-05, -3.63E-19, -1.80E-04, 6.04E-19],
        y: [-2.77E-08, 1.23E-16, 4.51E-01, -7.09E-11, -6.32E-13, 1.20E-10, -5.96E-19, -1.85E-04, 1.49E-19, 5.92E-05],
    },
    ChamberCalibration {
        name: "104x50",
        x: [5.21E-15, 5.59E-01, 4.03E-16, -2.64E-17, 1.13E-17, -3.49E-17, 8.02E-05, -5.50E-19, -4.27E-04, -3.06E-18],
        y: [5.37E-15, 2.06E-16, 8.11E-01, -1.55E-17, -1.15E-17, -4.22E-17, -7.58E-19, -1.62E-04, -1.50E-19, 9.38E-05],
    },
    ChamberCalibration {
        name: "f80x220_Ar",
        x: [9.11E-04, 8.21E-01, 6.77E-08, -1.24E-05, 3.97E-08, 5.89E-06, 8.83E-05, -2.21E-11, -3.48E-04, -6.07E-10],
        y: [-3.76E-04, 6.97E-08, 8.52E-01, -1.25E-06, 1.77E-08, 4.89E-06, -5.11E-10, -3.25E-04, -1.62E-10, 1.07E-04],
    },
    ChamberCalibration {
        name: "f80",
        x: [-7.18E-15, 9.18E-01, -1.14E-15, -1.47E-17, 1.34E-17, 1.21E-16, 1.27E-04, 3.77E-18, -3.73E-04, 1.16E-17],
        y: [5.10E-15, -5.28E-16, 9.18E-01, 2.04E-18, 2.56E-17, -1.10E-16, 2.84E-18, -3.72E-04, 5.50E-18, 1.27E-04],
    },
    ChamberCalibration {
        name: "SKB_dumping_ring",
        x: [-1.08E-06, 3.34E-01, -2.84E-15, 2.54E-09, -1.25E-10, -1.31E-09, 9.59E-05, 8.90E-19, -1.91E-04, 2.53E-18],
        y: [2.23E-06, 9.58E-15, 3.13E-01, 2.31E-09, 5.96E-11, -4.30E-09, -3.91E-17, 3.25E-06, 3.46E-17, -3.18E-05],
    },
    ChamberCalibration {
        name: "f94",
        x: [2.37E-14, 9.63E-01, 4.00E-16, -6.01E-17, 8.17E-18, -9.16E-17, 1.37E-04, 5.39E-19, -3.76E-04, -2.26E-18],
        y: [8.28E-15, -6.28E-16, 9.63E-01, -1.31E-17, 2.53E-17, -6.36E-17, 4.31E-18, -3.76E-04, -1.51E-18, 1.37E-04],
    },
    ChamberCalibration {
        name: "f150",
        x: [6.324E-05, 1.529E+00, 3.731E-09, -4.462E-07, -2.381E-14, -1.751E-07, 2.150E-04, -7.140E-12, -6.185E-04, -2.362E-11],
        y: [-3.624E-05, 3.732E-09, 1.529E+00, 1.969E-07, -1.295E-10, 1.969E-07, -2.360E-11, -6.182E-04, -7.196E-12, 2.156E-04],
    },
    // Longer antechamber variant of f90x220A
    ChamberCalibration {
        name: "f90x220A_H24",
        x: [1.984E-04, 9.162E-01, -1.207E-11, -2.564E-06, -5.775E-10, 1.098E-07, 1.219E-04, 2.340E-13, -4.081E-04, 7.407E-15],
        y: [1.850E-04, -1.392E-11, 9.705E-01, 2.072E-08, -7.145E-10, -2.635E-06, -8.891E-15, -3.600E-04, 3.387E-13, 1.322E-04],
    },
    // QC1 final-focus chamber
    ChamberCalibration {
        name: "f20",
        x: [-3.37E-07, 2.06E-01, 2.31E-15, 3.25E-09, -4.07E-12, -1.64E-09, 2.95E-05, 3.32E-17, -8.15E-05, -3.19E-17],
        y: [3.37E-07, 2.32E-15, 2.06E-01, 1.64E-09, 4.07E-12, -3.25E-09, -3.22E-17, -8.15E-05, 3.37E-17, 2.95E-05],
    },
    // QC2 final-focus chamber
    ChamberCalibration {
        name: "f70",
        x: [-3.25E-03, 7.09E-01, -4.28E-09, 6.65E-05, 4.65E-09, -1.53E-06, 1.53E-04, 1.36E-10, -2.90E-04, 3.89E-12],
        y: [-3.17E-03, -5.19E-09, 7.09E-01, -4.30E-07, 3.10E-09, 6.42E-05, -5.74E-13, -2.87E-04, 1.76E-10, 1.51E-04],
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_has_eighteen_chambers() {
        let table = CalibrationTable::standard();
        assert_eq!(table.len(), CHAMBER_COUNT);
        assert_eq!(table.iter().count(), 18);
    }

    #[test]
    fn chamber_zero_matches_fitted_offsets() {
        let table = CalibrationTable::standard();
        let chamber = table.get(0).unwrap();
        assert_eq!(chamber.name, "f90x220A");
        assert_eq!(chamber.x[0], -1.92E-07);
        assert_eq!(chamber.x[1], 0.917);
        assert_eq!(chamber.y[0], 9.41E-08);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let table = CalibrationTable::standard();
        assert!(table.get(MAX_CHAMBER_INDEX).is_ok());
        match table.get(18) {
            Err(BpmError::ChamberOutOfRange { index, max }) => {
                assert_eq!(index, 18);
                assert_eq!(max, 17);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn find_by_name_is_case_insensitive() {
        let table = CalibrationTable::standard();
        assert_eq!(table.find_by_name("f70"), Some(17));
        assert_eq!(table.find_by_name("skb_dumping_ring"), Some(12));
        assert_eq!(table.find_by_name("f999"), None);
    }

    #[test]
    fn chamber_names_are_unique() {
        let table = CalibrationTable::standard();
        let mut names: Vec<_> = table.iter().map(|(_, c)| c.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), CHAMBER_COUNT);
    }
}
