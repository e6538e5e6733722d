//! Interleaved multi-electrode frames.
//!
//! The fault/record path delivers one frame holding all electrodes, ordered by scan:
//! `[a0, b0, c0, d0, a1, b1, c1, d1, ...]`, each sample a little-endian `i16`.

use crate::acquisition::channel::SAMPLE_BYTES;
use crate::error::{AppResult, BpmError};

/// Split an interleaved raw frame into per-channel sample vectors.
///
/// # Errors
///
/// `EmptyFrame` for an empty frame, `FrameSize` if the length is not a whole number of
/// scans (`SAMPLE_BYTES * n_channels` bytes each).
pub fn deinterleave(raw: &[u8], n_channels: usize) -> AppResult<Vec<Vec<i16>>> {
    if raw.is_empty() {
        return Err(BpmError::EmptyFrame {
            channel: "interleaved".into(),
        });
    }

    let scan_bytes = SAMPLE_BYTES * n_channels;
    if n_channels == 0 || raw.len() % scan_bytes != 0 {
        return Err(BpmError::FrameSize {
            channel: "interleaved".into(),
            expected: (raw.len() / scan_bytes.max(1) + 1) * scan_bytes,
            actual: raw.len(),
        });
    }

    let n_scans = raw.len() / scan_bytes;
    let mut channels = vec![Vec::with_capacity(n_scans); n_channels];

    for (i, pair) in raw.chunks_exact(SAMPLE_BYTES).enumerate() {
        channels[i % n_channels].push(i16::from_le_bytes([pair[0], pair[1]]));
    }

    Ok(channels)
}

/// Build an interleaved raw frame from equal-length channel vectors.
///
/// Channels shorter than the first are padded with zeros.
pub fn interleave(channels: &[Vec<i16>]) -> Vec<u8> {
    let n_scans = channels.first().map_or(0, Vec::len);
    let mut raw = Vec::with_capacity(n_scans * channels.len() * SAMPLE_BYTES);

    for scan in 0..n_scans {
        for channel in channels {
            let sample = channel.get(scan).copied().unwrap_or(0);
            raw.extend_from_slice(&sample.to_le_bytes());
        }
    }

    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_scans_into_channels() {
        let channels = vec![vec![1, 2], vec![10, 20], vec![-1, -2], vec![300, 400]];
        let raw = interleave(&channels);
        assert_eq!(raw.len(), 16);

        let split = deinterleave(&raw, 4).unwrap();
        assert_eq!(split, channels);
    }

    #[test]
    fn partial_scan_rejected() {
        let raw = vec![0u8; 10];
        assert!(matches!(
            deinterleave(&raw, 4),
            Err(BpmError::FrameSize { actual: 10, .. })
        ));
    }

    #[test]
    fn empty_frame_rejected() {
        assert!(matches!(
            deinterleave(&[], 4),
            Err(BpmError::EmptyFrame { .. })
        ));
    }

    #[test]
    fn little_endian_sample_order() {
        let raw = [0x34, 0x12, 0xff, 0xff];
        let split = deinterleave(&raw, 2).unwrap();
        assert_eq!(split, vec![vec![0x1234], vec![-1]]);
    }
}
