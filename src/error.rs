//! Custom error types for the acquisition core.
//!
//! This module defines the primary error type, `BpmError`, used by every stage of the
//! beam-position pipeline. Using the `thiserror` crate, it provides a centralized and
//! consistent way to report the handful of things that can go wrong between a raw
//! electrode frame arriving and a result frame leaving.
//!
//! ## Error Hierarchy
//!
//! `BpmError` groups its variants by how the pipeline reacts to them:
//!
//! - **Ingestion** (`FrameSize`, `EmptyFrame`): a frame of the wrong shape was offered to a
//!   channel buffer. The frame is discarded and the previous buffer content is kept.
//! - **Configuration** (`ChamberOutOfRange`, `Configuration`, `Config`): a bad setting was
//!   supplied. The request is rejected synchronously and the last good result is kept.
//! - **Processing** (`LengthMismatch`): the four electrode peak vectors disagree in length.
//!   The cycle is skipped.
//! - **Output** (`Decode`, `Sink`, `Io`): a result frame could not be parsed or delivered.
//!
//! Nothing here is fatal to the process. `is_recoverable` tells callers whether retrying on
//! the next cycle makes sense.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, BpmError>;

/// Errors raised between frame ingestion and result delivery.
#[derive(Error, Debug)]
pub enum BpmError {
    /// Raw frame length does not match the channel buffer capacity.
    #[error("Frame size mismatch on channel {channel}: expected {expected} bytes, got {actual}")]
    FrameSize {
        /// Electrode label.
        channel: String,
        /// Bytes the buffer accepts.
        expected: usize,
        /// Bytes offered.
        actual: usize,
    },

    /// Zero-length frame.
    #[error("Empty frame received on channel {channel}")]
    EmptyFrame {
        /// Electrode label.
        channel: String,
    },

    /// Chamber-type index outside the calibration table.
    #[error("Chamber type {index} out of range (valid: 0..={max})")]
    ChamberOutOfRange {
        /// Requested index.
        index: usize,
        /// Highest valid index.
        max: usize,
    },

    /// A setting failed validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// The configuration sources could not be read or parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Peak vectors handed to the position calculator have different lengths.
    #[error("Peak vector length mismatch: expected {expected}, got {actual}")]
    LengthMismatch {
        /// Length of electrode A's vector.
        expected: usize,
        /// Length of the first vector that differs.
        actual: usize,
    },

    /// Truncated or inconsistent result frame.
    #[error("Result frame decode error: {0}")]
    Decode(String),

    /// The sink refused a frame (e.g. its receiver is gone).
    #[error("Frame sink error: {0}")]
    Sink(String),

    /// File sink or recording I/O.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BpmError {
    /// Whether the pipeline can carry on with the next cycle after this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, BpmError::Config(_) | BpmError::Io(_))
    }

    /// Whether this error came from a bad setting rather than from data.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            BpmError::ChamberOutOfRange { .. } | BpmError::Configuration(_) | BpmError::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_size_message_names_channel() {
        let err = BpmError::FrameSize {
            channel: "B".into(),
            expected: 1024,
            actual: 1000,
        };
        let msg = err.to_string();
        assert!(msg.contains("channel B"));
        assert!(msg.contains("1024"));
        assert!(msg.contains("1000"));
        assert!(err.is_recoverable());
        assert!(!err.is_configuration());
    }

    #[test]
    fn chamber_out_of_range_is_configuration() {
        let err = BpmError::ChamberOutOfRange { index: 18, max: 17 };
        assert!(err.is_configuration());
        assert!(err.is_recoverable());
        assert_eq!(err.to_string(), "Chamber type 18 out of range (valid: 0..=17)");
    }

    #[test]
    fn io_errors_are_not_recoverable() {
        let err: BpmError = std::io::Error::from(std::io::ErrorKind::PermissionDenied).into();
        assert!(!err.is_recoverable());
    }
}
