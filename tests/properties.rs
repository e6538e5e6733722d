//! Property-based tests for the acquisition and processing invariants.
//!
//! Covers: buffer round-trip, peak window count and thresholding, offset-only positions for
//! balanced electrodes, zero-sum guarding, and result frame decoding.

use bpm_daq::acquisition::channel::encode_samples;
use bpm_daq::acquisition::{AcquisitionMode, ChannelBuffer};
use bpm_daq::calibration::{CalibrationTable, CHAMBER_COUNT};
use bpm_daq::output::ResultFrame;
use bpm_daq::processing::position::normalized_signals;
use bpm_daq::processing::{PeakExtractor, PositionCalculator, ZeroGuard};
use proptest::prelude::*;
use std::sync::Arc;

// ── Channel Buffer ───────────────────────────────────────────────────

proptest! {
    /// `ingest` followed by `snapshot` returns exactly the ingested samples.
    #[test]
    fn ingest_snapshot_round_trip(samples in prop::collection::vec(any::<i16>(), 1..1024)) {
        let channel = ChannelBuffer::new("A", AcquisitionMode::Live, samples.len()).unwrap();
        channel.ingest(&encode_samples(&samples)).unwrap();
        prop_assert_eq!(channel.snapshot(), samples);
    }

    /// A frame of any other length leaves the buffer untouched.
    #[test]
    fn wrong_length_is_rejected(capacity in 1usize..64, len in 1usize..200) {
        prop_assume!(len != capacity * 2);
        let channel = ChannelBuffer::new("A", AcquisitionMode::Live, capacity).unwrap();
        prop_assert!(channel.ingest(&vec![0x55; len]).is_err());
        prop_assert!(!channel.is_ready());
        prop_assert_eq!(channel.snapshot(), vec![0; capacity]);
    }
}

// ── Peak Extractor ───────────────────────────────────────────────────

proptest! {
    /// Output length is floor((len - offset) / width).
    #[test]
    fn peak_count_matches_window_count(
        samples in prop::collection::vec(any::<i16>(), 0..600),
        width in 1usize..32,
        offset in 0usize..40,
    ) {
        let peaks = PeakExtractor::new(width, 0).extract(&samples, offset);
        prop_assert_eq!(peaks.len(), samples.len().saturating_sub(offset) / width);
    }

    /// Every peak is either the window maximum (at or above threshold) or 0.
    #[test]
    fn peaks_are_thresholded_maxima(
        samples in prop::collection::vec(any::<i16>(), 12..240),
        threshold in -2000i32..2000,
    ) {
        let width = 12;
        let peaks = PeakExtractor::new(width, threshold).extract(&samples, 0);

        for (k, peak) in peaks.iter().enumerate() {
            let max = samples[k * width..(k + 1) * width].iter().copied().max().unwrap();
            if i32::from(max) >= threshold {
                prop_assert_eq!(*peak, f64::from(max));
            } else {
                prop_assert_eq!(*peak, 0.0);
            }
        }
    }
}

// ── Position Calculator ──────────────────────────────────────────────

proptest! {
    /// Balanced electrodes give h = v = 0 and positions equal to c0.
    #[test]
    fn balanced_peaks_give_offsets(
        k in 1.0f64..30000.0,
        len in 0usize..64,
        chamber in 0usize..CHAMBER_COUNT,
    ) {
        let table = Arc::new(CalibrationTable::standard());
        let calculator = PositionCalculator::new(table.clone());
        let peaks: [Vec<f64>; 4] = std::array::from_fn(|_| vec![k; len]);

        let result = calculator.calculate(chamber, &peaks).unwrap();
        let entry = table.get(chamber).unwrap();
        prop_assert!(result.x.iter().all(|&x| x == entry.x[0]));
        prop_assert!(result.y.iter().all(|&y| y == entry.y[0]));
        prop_assert_eq!(result.x.len(), len);
    }

    /// Normalized signals and positions are always finite.
    #[test]
    fn outputs_are_finite(
        a in prop::collection::vec(-4000i16..4000, 16),
        b in prop::collection::vec(-4000i16..4000, 16),
        c in prop::collection::vec(-4000i16..4000, 16),
        zero_sum_at in 0usize..16,
    ) {
        let to_f64 = |v: &[i16]| v.iter().map(|&s| f64::from(s)).collect::<Vec<_>>();
        let (a, b, c) = (to_f64(&a), to_f64(&b), to_f64(&c));
        // Pick d so that one bunch has an exactly zero electrode sum.
        let d: Vec<f64> = (0..16)
            .map(|i| if i == zero_sum_at { -(a[i] + b[i] + c[i]) } else { 1.0 })
            .collect();
        let peaks = [a, b, c, d];

        let signals = normalized_signals(&peaks, ZeroGuard::Denominator).unwrap();
        prop_assert_eq!(signals.h[zero_sum_at], 0.0);
        prop_assert_eq!(signals.v[zero_sum_at], 0.0);
        prop_assert!(signals.h.iter().chain(&signals.v).all(|s| s.is_finite()));

        let result = PositionCalculator::new(Arc::new(CalibrationTable::standard()))
            .calculate(0, &peaks)
            .unwrap();
        prop_assert!(result.x.iter().chain(&result.y).all(|p| p.is_finite()));
    }
}

// ── Result Encoder ───────────────────────────────────────────────────

proptest! {
    /// Size is 12 + 4·len_x + 4·len_y and decoding recovers every bit.
    #[test]
    fn frame_decode_recovers_bits(
        counter in any::<u32>(),
        x_bits in prop::collection::vec(any::<u32>(), 0..128),
        y_bits in prop::collection::vec(any::<u32>(), 0..128),
    ) {
        let frame = ResultFrame::new(
            counter,
            x_bits.iter().map(|&b| f32::from_bits(b)).collect(),
            y_bits.iter().map(|&b| f32::from_bits(b)).collect(),
        );
        let bytes = frame.encode();
        prop_assert_eq!(bytes.len(), 8 + 4 * x_bits.len() + 4 * y_bits.len() + 4);

        let (decoded, consumed) = ResultFrame::decode(&bytes).unwrap();
        prop_assert_eq!(consumed, bytes.len());
        prop_assert_eq!(decoded.event_counter, counter);
        prop_assert_eq!(decoded.x.iter().map(|f| f.to_bits()).collect::<Vec<_>>(), x_bits);
        prop_assert_eq!(decoded.y.iter().map(|f| f.to_bits()).collect::<Vec<_>>(), y_bits);
    }
}
