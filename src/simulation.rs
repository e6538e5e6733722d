//! Simulated four-electrode beam source.
//!
//! Produces bunch-train waveforms for electrodes A..D whose relative amplitudes encode a
//! chosen normalized position `(h, v)`. With a per-bunch amplitude `k`, the electrodes see
//!
//! ```text
//! a = k(1 + h + v)    b = k(1 - h + v)
//! c = k(1 - h - v)    d = k(1 + h - v)
//! ```
//!
//! so a noiseless burst reproduces exactly `h` and `v` in the position calculator. Each bunch
//! is a triangular pulse centred in its window with flat baseline around it, which makes the
//! window boundary the minimum the alignment search looks for.
//!
//! Seeded generators give reproducible noise for tests and benches.

use crate::acquisition::channel::{encode_samples, AcquisitionMode};
use crate::acquisition::interleave::interleave;
use crate::acquisition::readiness::{ReadinessAggregator, ELECTRODE_COUNT};
use crate::error::AppResult;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Shape of the simulated bunch train.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamParameters {
    /// Number of bunches; capped at what fits in the buffer.
    pub bunch_count: usize,
    /// Samples per bunch window.
    pub bunch_width: usize,
    /// Per-electrode peak height for a centred beam, in ADC counts.
    pub amplitude: f64,
    /// Normalized horizontal offset, `-1.0..=1.0`.
    pub horizontal: f64,
    /// Normalized vertical offset, `-1.0..=1.0`.
    pub vertical: f64,
    /// Peak-to-peak half range of uniform additive noise, in ADC counts.
    pub noise: f64,
}

impl Default for BeamParameters {
    fn default() -> Self {
        Self {
            bunch_count: usize::MAX,
            bunch_width: 12,
            amplitude: 4000.0,
            horizontal: 0.0,
            vertical: 0.0,
            noise: 20.0,
        }
    }
}

impl BeamParameters {
    /// Peak height on each electrode for the configured position.
    pub fn electrode_amplitudes(&self) -> [f64; ELECTRODE_COUNT] {
        let (k, h, v) = (self.amplitude, self.horizontal, self.vertical);
        [
            k * (1.0 + h + v),
            k * (1.0 - h + v),
            k * (1.0 - h - v),
            k * (1.0 + h - v),
        ]
    }
}

/// Waveform generator for one monitor.
#[derive(Debug)]
pub struct SimulatedBeam {
    params: BeamParameters,
    capacity: usize,
    rng: StdRng,
}

impl SimulatedBeam {
    /// `capacity` is the per-electrode sample count of each generated frame.
    pub fn new(capacity: usize, params: BeamParameters) -> Self {
        Self {
            params,
            capacity,
            rng: StdRng::from_entropy(),
        }
    }

    /// Use a fixed seed for reproducible noise.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Current beam settings.
    pub fn params(&self) -> &BeamParameters {
        &self.params
    }

    /// Move the beam for subsequent bursts.
    pub fn set_position(&mut self, horizontal: f64, vertical: f64) {
        self.params.horizontal = horizontal;
        self.params.vertical = vertical;
    }

    /// Bunches that fit into one frame.
    pub fn bunches(&self) -> usize {
        if self.params.bunch_width == 0 {
            return 0;
        }
        self.params
            .bunch_count
            .min(self.capacity / self.params.bunch_width)
    }

    /// One burst worth of samples for A, B, C, D.
    pub fn electrode_samples(&mut self) -> [Vec<i16>; ELECTRODE_COUNT] {
        let amplitudes = self.params.electrode_amplitudes();
        let bunches = self.bunches();
        let width = self.params.bunch_width;
        let half = (width / 4).max(1) as f64;
        let centre = (width / 2) as f64;

        let mut out: [Vec<i16>; ELECTRODE_COUNT] = Default::default();
        for (samples, &peak) in out.iter_mut().zip(amplitudes.iter()) {
            samples.reserve_exact(self.capacity);
            for i in 0..self.capacity {
                let pulse = if width > 0 && i / width < bunches {
                    let j = (i % width) as f64;
                    peak * (1.0 - (j - centre).abs() / half).max(0.0)
                } else {
                    0.0
                };
                let noise = if self.params.noise > 0.0 {
                    self.rng.gen_range(-self.params.noise..self.params.noise)
                } else {
                    0.0
                };
                samples.push(to_sample(pulse + noise));
            }
        }
        out
    }

    /// One raw little-endian frame per electrode.
    pub fn electrode_frames(&mut self) -> [Vec<u8>; ELECTRODE_COUNT] {
        let samples = self.electrode_samples();
        [
            encode_samples(&samples[0]),
            encode_samples(&samples[1]),
            encode_samples(&samples[2]),
            encode_samples(&samples[3]),
        ]
    }

    /// One fault-path frame carrying all four electrodes interleaved.
    pub fn interleaved_frame(&mut self) -> Vec<u8> {
        interleave(&self.electrode_samples())
    }

    /// Deliver one burst to `aggregator` the way its mode expects.
    ///
    /// Live buffers get one raw frame each; fault buffers get a single interleaved frame.
    pub fn feed(&mut self, aggregator: &ReadinessAggregator) -> AppResult<()> {
        let mode = aggregator.channels()[0].mode();
        match mode {
            AcquisitionMode::Live => {
                for (channel, frame) in aggregator.channels().iter().zip(self.electrode_frames()) {
                    channel.ingest(&frame)?;
                }
            }
            AcquisitionMode::Fault => {
                aggregator.ingest_interleaved(&self.interleaved_frame())?;
            }
        }
        Ok(())
    }
}

fn to_sample(value: f64) -> i16 {
    value.round().clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}
