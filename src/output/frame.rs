//! Result frame wire format.
//!
//! All fields are little-endian:
//!
//! ```text
//! [0..4)              u32        event counter
//! [4..8)              u32        len_x
//! [8..8 + 4·len_x)    f32[len_x] X positions
//! [.. +4)             u32        len_y
//! [.. +4·len_y)       f32[len_y] Y positions
//! ```
//!
//! Frames written back-to-back (optionally each behind an 8-byte `f64` timestamp) are read
//! with [`FrameReader`].

use crate::error::{AppResult, BpmError};
use crate::processing::position::PositionResult;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Bytes in a frame with two empty vectors.
pub const HEADER_BYTES: usize = 12;

/// Bytes of the optional timestamp prefix.
pub const TIMESTAMP_BYTES: usize = 8;

const ELEMENT_BYTES: usize = 4;

/// One cycle's output as carried on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultFrame {
    /// Cycles completed before this one.
    pub event_counter: u32,
    /// Horizontal positions, one per bunch.
    pub x: Vec<f32>,
    /// Vertical positions, one per bunch.
    pub y: Vec<f32>,
}

impl ResultFrame {
    /// Frame from already narrowed vectors.
    pub fn new(event_counter: u32, x: Vec<f32>, y: Vec<f32>) -> Self {
        Self { event_counter, x, y }
    }

    /// Narrow a position result to `f32` for transmission.
    pub fn from_result(event_counter: u32, result: &PositionResult) -> Self {
        Self {
            event_counter,
            x: result.x.iter().map(|&p| p as f32).collect(),
            y: result.y.iter().map(|&p| p as f32).collect(),
        }
    }

    /// `4 + 4 + 4·len_x + 4 + 4·len_y`
    pub fn encoded_len(&self) -> usize {
        HEADER_BYTES + ELEMENT_BYTES * (self.x.len() + self.y.len())
    }

    /// Serialize into a buffer allocated at its final size.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());

        buf.put_u32_le(self.event_counter);
        put_vector(&mut buf, &self.x);
        put_vector(&mut buf, &self.y);

        debug_assert_eq!(buf.len(), self.encoded_len());
        buf.freeze()
    }

    /// Parse one frame from the start of `data`.
    ///
    /// Returns the frame and the number of bytes it occupied; trailing bytes are left for
    /// the caller.
    pub fn decode(data: &[u8]) -> AppResult<(Self, usize)> {
        let mut cursor = data;

        let event_counter = take_u32(&mut cursor, "event counter")?;
        let x = take_vector(&mut cursor, "X")?;
        let y = take_vector(&mut cursor, "Y")?;

        let consumed = data.len() - cursor.remaining();
        Ok((Self { event_counter, x, y }, consumed))
    }
}

fn put_vector(buf: &mut BytesMut, values: &[f32]) {
    buf.put_u32_le(values.len() as u32);
    for &value in values {
        buf.put_f32_le(value);
    }
}

fn take_u32(cursor: &mut &[u8], field: &str) -> AppResult<u32> {
    if cursor.remaining() < 4 {
        return Err(BpmError::Decode(format!(
            "truncated {}: need 4 bytes, have {}",
            field,
            cursor.remaining()
        )));
    }
    Ok(cursor.get_u32_le())
}

fn take_vector(cursor: &mut &[u8], axis: &str) -> AppResult<Vec<f32>> {
    let len = take_u32(cursor, &format!("{} length", axis))? as usize;
    let needed = len.checked_mul(ELEMENT_BYTES).ok_or_else(|| {
        BpmError::Decode(format!("{} length {} overflows", axis, len))
    })?;

    if cursor.remaining() < needed {
        return Err(BpmError::Decode(format!(
            "truncated {} vector: need {} bytes, have {}",
            axis,
            needed,
            cursor.remaining()
        )));
    }

    Ok((0..len).map(|_| cursor.get_f32_le()).collect())
}

/// Prefix `frame` with an `f64` Unix timestamp in seconds.
pub fn prepend_timestamp(timestamp: f64, frame: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(TIMESTAMP_BYTES + frame.len());
    buf.put_f64_le(timestamp);
    buf.put_slice(frame);
    buf.freeze()
}

/// Strip the 8-byte timestamp header, returning it with the remaining bytes.
pub fn split_timestamp(data: &[u8]) -> AppResult<(f64, &[u8])> {
    if data.len() < TIMESTAMP_BYTES {
        return Err(BpmError::Decode(format!(
            "truncated timestamp: need {} bytes, have {}",
            TIMESTAMP_BYTES,
            data.len()
        )));
    }
    let (mut head, rest) = data.split_at(TIMESTAMP_BYTES);
    Ok((head.get_f64_le(), rest))
}

/// A decoded frame plus its timestamp, if the stream carries them.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedFrame {
    /// Unix seconds written by `TimestampedSink`.
    pub timestamp: Option<f64>,
    /// The frame itself.
    pub frame: ResultFrame,
}

/// Iterates over back-to-back frames in a byte buffer.
///
/// Stops after the first decode error.
pub struct FrameReader<'a> {
    data: &'a [u8],
    timestamped: bool,
    failed: bool,
}

impl<'a> FrameReader<'a> {
    /// Reader over frames without timestamp headers.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            timestamped: false,
            failed: false,
        }
    }

    /// Expect an 8-byte timestamp before every frame.
    pub fn timestamped(mut self, timestamped: bool) -> Self {
        self.timestamped = timestamped;
        self
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    fn read_next(&mut self) -> AppResult<RecordedFrame> {
        let (timestamp, body) = if self.timestamped {
            let (ts, rest) = split_timestamp(self.data)?;
            (Some(ts), rest)
        } else {
            (None, self.data)
        };

        let (frame, consumed) = ResultFrame::decode(body)?;
        self.data = &body[consumed..];
        Ok(RecordedFrame { timestamp, frame })
    }
}

impl Iterator for FrameReader<'_> {
    type Item = AppResult<RecordedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.data.is_empty() {
            return None;
        }

        let item = self.read_next();
        if item.is_err() {
            self.failed = true;
        }
        Some(item)
    }
}
