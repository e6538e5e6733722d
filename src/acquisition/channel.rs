//! Per-electrode sample buffer with a readiness flag.
//!
//! Each of the four electrodes owns one `ChannelBuffer`. The external streaming layer calls
//! [`ChannelBuffer::ingest`] from its own delivery context; the pipeline later consumes the
//! buffer through the readiness aggregator. A single `parking_lot::Mutex` guards both the
//! samples and the flag so the two can never disagree, and it is held only while copying.
//!
//! # Mode rules
//!
//! - **Live**: every valid frame overwrites the buffer. An unconsumed frame is dropped and
//!   counted, giving bounded staleness for the display path.
//! - **Fault**: the first unconsumed frame is held until it is published. Frames arriving in
//!   the meantime are dropped and counted, so the triggering event is never lost.

use crate::error::{AppResult, BpmError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

/// Bytes per raw sample (little-endian `i16`).
pub const SAMPLE_BYTES: usize = 2;

/// Capture mode of a channel buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionMode {
    /// Continuously refreshed capture for live display.
    #[default]
    Live,
    /// Triggered long capture for post-mortem analysis of a beam loss.
    Fault,
}

/// What `ingest` did with an accepted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Stored into an already consumed buffer.
    Stored,
    /// Stored over a frame that was never consumed (live mode).
    Overwrote,
    /// Dropped because a fault-mode frame is still waiting to be published.
    Held,
}

/// Cumulative counters for one channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    /// Frames stored into the buffer.
    pub frames_ingested: u64,
    /// Frames lost: overwritten before use (live) or refused while held (fault).
    pub frames_dropped: u64,
    /// Frames rejected for their length.
    pub size_mismatches: u64,
}

struct ChannelState {
    samples: Vec<i16>,
    ready: bool,
}

/// Fixed-capacity sample buffer for one electrode.
pub struct ChannelBuffer {
    name: String,
    mode: AcquisitionMode,
    capacity: usize,
    state: Mutex<ChannelState>,
    notify: Option<Arc<Notify>>,
    frames_ingested: AtomicU64,
    frames_dropped: AtomicU64,
    size_mismatches: AtomicU64,
}

impl std::fmt::Debug for ChannelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelBuffer")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("capacity", &self.capacity)
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl ChannelBuffer {
    /// Create a zero-filled buffer holding `capacity` samples.
    ///
    /// # Errors
    ///
    /// Returns `BpmError::Configuration` if `capacity` is zero.
    pub fn new(name: impl Into<String>, mode: AcquisitionMode, capacity: usize) -> AppResult<Self> {
        if capacity == 0 {
            return Err(BpmError::Configuration(
                "channel buffer capacity must be non-zero".into(),
            ));
        }

        Ok(Self {
            name: name.into(),
            mode,
            capacity,
            state: Mutex::new(ChannelState {
                samples: vec![0; capacity],
                ready: false,
            }),
            notify: None,
            frames_ingested: AtomicU64::new(0),
            frames_dropped: AtomicU64::new(0),
            size_mismatches: AtomicU64::new(0),
        })
    }

    /// Signal `notify` after every accepted frame.
    pub fn with_notify(mut self, notify: Arc<Notify>) -> Self {
        self.notify = Some(notify);
        self
    }

    /// Electrode label.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Overwrite policy in effect.
    pub fn mode(&self) -> AcquisitionMode {
        self.mode
    }

    /// Capacity in samples.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Expected raw frame length in bytes.
    pub fn frame_bytes(&self) -> usize {
        self.capacity * SAMPLE_BYTES
    }

    /// Store a raw little-endian `i16` frame.
    ///
    /// # Errors
    ///
    /// `EmptyFrame` or `FrameSize` if the frame is not exactly `frame_bytes()` long. The
    /// previous buffer content and readiness flag are left untouched.
    pub fn ingest(&self, raw: &[u8]) -> AppResult<IngestOutcome> {
        self.check_len(raw.len(), self.frame_bytes())?;

        let outcome = self.store(|samples| {
            for (dst, pair) in samples.iter_mut().zip(raw.chunks_exact(SAMPLE_BYTES)) {
                *dst = i16::from_le_bytes([pair[0], pair[1]]);
            }
        });
        Ok(outcome)
    }

    /// Store an already decoded frame (e.g. one slice of an interleaved fault frame).
    pub fn ingest_samples(&self, samples: &[i16]) -> AppResult<IngestOutcome> {
        self.check_len(samples.len(), self.capacity)
            .map_err(|err| match err {
                // Report in bytes like raw frames so operators see one unit.
                BpmError::FrameSize { channel, .. } => BpmError::FrameSize {
                    channel,
                    expected: self.frame_bytes(),
                    actual: samples.len() * SAMPLE_BYTES,
                },
                other => other,
            })?;

        Ok(self.store(|dst| dst.copy_from_slice(samples)))
    }

    fn check_len(&self, actual: usize, expected: usize) -> AppResult<()> {
        if actual == 0 {
            self.size_mismatches.fetch_add(1, Ordering::Relaxed);
            warn!(channel = %self.name, "Discarding empty frame");
            return Err(BpmError::EmptyFrame {
                channel: self.name.clone(),
            });
        }

        if actual != expected {
            self.size_mismatches.fetch_add(1, Ordering::Relaxed);
            warn!(
                channel = %self.name,
                expected,
                actual,
                "Discarding frame with unexpected size"
            );
            return Err(BpmError::FrameSize {
                channel: self.name.clone(),
                expected,
                actual,
            });
        }

        Ok(())
    }

    fn store<F>(&self, copy: F) -> IngestOutcome
    where
        F: FnOnce(&mut [i16]),
    {
        let outcome = {
            let mut state = self.state.lock();
            match (self.mode, state.ready) {
                (AcquisitionMode::Fault, true) => IngestOutcome::Held,
                (_, was_ready) => {
                    copy(&mut state.samples);
                    state.ready = true;
                    if was_ready {
                        IngestOutcome::Overwrote
                    } else {
                        IngestOutcome::Stored
                    }
                }
            }
        };

        match outcome {
            IngestOutcome::Held => {
                self.frames_dropped.fetch_add(1, Ordering::Relaxed);
                debug!(channel = %self.name, "Fault frame pending publish, dropping newer frame");
            }
            IngestOutcome::Overwrote => {
                self.frames_ingested.fetch_add(1, Ordering::Relaxed);
                self.frames_dropped.fetch_add(1, Ordering::Relaxed);
                trace!(channel = %self.name, "Overwrote unconsumed frame");
            }
            IngestOutcome::Stored => {
                self.frames_ingested.fetch_add(1, Ordering::Relaxed);
            }
        }

        if outcome != IngestOutcome::Held {
            if let Some(notify) = &self.notify {
                notify.notify_one();
            }
        }

        outcome
    }

    /// Copy of the current buffer. Does not touch the readiness flag.
    pub fn snapshot(&self) -> Vec<i16> {
        self.state.lock().samples.clone()
    }

    /// The last `n` samples (all of them if `n >= capacity`).
    pub fn display_tail(&self, n: usize) -> Vec<i16> {
        let state = self.state.lock();
        let start = state.samples.len().saturating_sub(n);
        state.samples[start..].to_vec()
    }

    /// Mark the current frame as consumed.
    pub fn publish(&self) {
        self.state.lock().ready = false;
    }

    /// Snapshot and publish in one critical section.
    ///
    /// A frame arriving after this call sets the flag again and is kept for the next cycle.
    pub fn consume(&self) -> Vec<i16> {
        let mut state = self.state.lock();
        state.ready = false;
        state.samples.clone()
    }

    /// True while an accepted frame has not been consumed.
    pub fn is_ready(&self) -> bool {
        self.state.lock().ready
    }

    /// Cumulative counters.
    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            frames_ingested: self.frames_ingested.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            size_mismatches: self.size_mismatches.load(Ordering::Relaxed),
        }
    }
}

/// Encode samples as a raw little-endian frame.
pub fn encode_samples(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}
