//! Bunch peak extraction.
//!
//! A sample buffer is cut into fixed-width windows starting at an alignment offset, and each
//! window is reduced to its maximum. Windows whose maximum stays below the noise threshold
//! report 0 so that noise-dominated bunches never show up as small positive peaks.

use serde::{Deserialize, Serialize};

/// How the first bunch window of a cycle is located.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    /// Start at the minimum of the first window on the reference electrode (A).
    #[default]
    FirstWindowMinimum,
    /// Start at a fixed sample offset.
    Fixed(usize),
}

impl Alignment {
    /// Resolve the start offset for one cycle from the reference electrode.
    pub fn resolve(self, reference: &[i16], bunch_width: usize) -> usize {
        match self {
            Alignment::FirstWindowMinimum => alignment_offset(reference, bunch_width),
            Alignment::Fixed(offset) => offset,
        }
    }
}

/// Index of the minimum sample within the first `width` samples of `reference`.
///
/// The inter-bunch trough marks the window boundary. Ties pick the first index; an empty
/// reference yields 0.
pub fn alignment_offset(reference: &[i16], width: usize) -> usize {
    let head = &reference[..width.min(reference.len())];
    head.iter()
        .enumerate()
        .fold(None::<(usize, i16)>, |best, (i, &sample)| match best {
            Some((_, min)) if sample >= min => best,
            _ => Some((i, sample)),
        })
        .map_or(0, |(i, _)| i)
}

/// Number of complete windows of `width` samples after `offset` in a buffer of `len`.
pub fn window_count(len: usize, offset: usize, width: usize) -> usize {
    if width == 0 {
        return 0;
    }
    len.saturating_sub(offset) / width
}

/// Thresholded per-window maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeakExtractor {
    bunch_width: usize,
    noise_threshold: i32,
}

impl PeakExtractor {
    /// `bunch_width` samples per window; maxima below `noise_threshold` become 0.
    pub fn new(bunch_width: usize, noise_threshold: i32) -> Self {
        Self {
            bunch_width,
            noise_threshold,
        }
    }

    /// Samples per window.
    pub fn bunch_width(&self) -> usize {
        self.bunch_width
    }

    /// Lowest maximum reported as a peak.
    pub fn noise_threshold(&self) -> i32 {
        self.noise_threshold
    }

    /// Reduce `samples` to one peak per bunch window starting at `offset`.
    ///
    /// Output length is `floor((len - offset) / bunch_width)`, empty when fewer than one
    /// full window remains or the width is zero.
    pub fn extract(&self, samples: &[i16], offset: usize) -> Vec<f64> {
        let count = window_count(samples.len(), offset, self.bunch_width);
        if count == 0 {
            return Vec::new();
        }

        let end = offset + count * self.bunch_width;
        samples[offset..end]
            .chunks_exact(self.bunch_width)
            .map(|window| {
                let max = window.iter().copied().max().unwrap_or(0);
                if i32::from(max) < self.noise_threshold {
                    0.0
                } else {
                    f64::from(max)
                }
            })
            .collect()
    }
}
