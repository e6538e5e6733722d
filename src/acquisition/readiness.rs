//! Readiness aggregation across the four electrode buffers.
//!
//! `all_ready` is an advisory AND over the four flags, taken one buffer at a time without a
//! global lock. `dispatch` is the only place frames are handed to the processing pipeline:
//! it re-checks readiness behind a try-lock gate, then consumes each buffer (snapshot and
//! flag clear in one critical section). Whatever frame a buffer holds at the moment it is
//! consumed is the one used, so a frame that races in after `all_ready` returned true wins
//! over the one that was there at check time.

use crate::acquisition::channel::{AcquisitionMode, ChannelBuffer, ChannelStats, IngestOutcome};
use crate::acquisition::interleave::deinterleave;
use crate::error::AppResult;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::trace;

/// Number of pickup electrodes on a monitor.
pub const ELECTRODE_COUNT: usize = 4;

/// Electrode position label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Electrode {
    /// Top, +x side
    A,
    /// Top, -x side
    B,
    /// Bottom, -x side
    C,
    /// Bottom, +x side
    D,
}

impl Electrode {
    /// A, B, C, D in buffer order.
    pub const ALL: [Electrode; ELECTRODE_COUNT] =
        [Electrode::A, Electrode::B, Electrode::C, Electrode::D];

    /// Position in per-electrode arrays.
    pub fn index(self) -> usize {
        match self {
            Electrode::A => 0,
            Electrode::B => 1,
            Electrode::C => 2,
            Electrode::D => 3,
        }
    }

    /// Channel name used in logs and errors.
    pub fn label(self) -> &'static str {
        match self {
            Electrode::A => "A",
            Electrode::B => "B",
            Electrode::C => "C",
            Electrode::D => "D",
        }
    }
}

/// One consumed frame per electrode, handed to the pipeline by `dispatch`.
#[derive(Debug, Clone)]
pub struct ElectrodeSnapshot {
    /// Dispatch sequence number, starting at 1.
    pub sequence: u64,
    /// Samples for A, B, C, D in that order.
    pub samples: [Vec<i16>; ELECTRODE_COUNT],
}

impl ElectrodeSnapshot {
    /// Samples of one electrode.
    pub fn electrode(&self, electrode: Electrode) -> &[i16] {
        &self.samples[electrode.index()]
    }
}

/// Gate over the four channel buffers.
pub struct ReadinessAggregator {
    channels: [Arc<ChannelBuffer>; ELECTRODE_COUNT],
    notify: Arc<Notify>,
    gate: Mutex<()>,
    dispatches: AtomicU64,
}

impl ReadinessAggregator {
    /// Create four buffers labelled A..D, all wired to one shared `Notify`.
    pub fn new(mode: AcquisitionMode, capacity: usize) -> AppResult<Self> {
        let notify = Arc::new(Notify::new());
        let make = |electrode: Electrode| -> AppResult<Arc<ChannelBuffer>> {
            Ok(Arc::new(
                ChannelBuffer::new(electrode.label(), mode, capacity)?.with_notify(notify.clone()),
            ))
        };

        Ok(Self {
            channels: [
                make(Electrode::A)?,
                make(Electrode::B)?,
                make(Electrode::C)?,
                make(Electrode::D)?,
            ],
            notify,
            gate: Mutex::new(()),
            dispatches: AtomicU64::new(0),
        })
    }

    /// Wrap existing buffers. `notify` is only signalled if the buffers were built with it.
    pub fn from_channels(
        channels: [Arc<ChannelBuffer>; ELECTRODE_COUNT],
        notify: Arc<Notify>,
    ) -> Self {
        Self {
            channels,
            notify,
            gate: Mutex::new(()),
            dispatches: AtomicU64::new(0),
        }
    }

    /// Buffer fed by `electrode`'s stream.
    pub fn channel(&self, electrode: Electrode) -> &Arc<ChannelBuffer> {
        &self.channels[electrode.index()]
    }

    /// All four buffers, A first.
    pub fn channels(&self) -> &[Arc<ChannelBuffer>; ELECTRODE_COUNT] {
        &self.channels
    }

    /// Signalled whenever any buffer accepts a frame.
    pub fn notify(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    /// True iff every buffer holds an unconsumed frame right now.
    pub fn all_ready(&self) -> bool {
        self.channels.iter().all(|channel| channel.is_ready())
    }

    /// Readiness flag of each buffer, A first.
    pub fn ready_flags(&self) -> [bool; ELECTRODE_COUNT] {
        [
            self.channels[0].is_ready(),
            self.channels[1].is_ready(),
            self.channels[2].is_ready(),
            self.channels[3].is_ready(),
        ]
    }

    /// Consume all four buffers if they are all ready.
    ///
    /// Returns `None` when not every buffer is ready, or when another dispatch is already
    /// in flight. At most one dispatch happens per "all ready" transition because every
    /// flag is cleared before the gate is released.
    pub fn dispatch(&self) -> Option<ElectrodeSnapshot> {
        let _guard = self.gate.try_lock()?;

        if !self.all_ready() {
            return None;
        }

        let samples = [
            self.channels[0].consume(),
            self.channels[1].consume(),
            self.channels[2].consume(),
            self.channels[3].consume(),
        ];
        let sequence = self.dispatches.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(sequence, "Dispatched electrode snapshot");

        Some(ElectrodeSnapshot { sequence, samples })
    }

    /// Number of successful dispatches so far.
    pub fn dispatch_count(&self) -> u64 {
        self.dispatches.load(Ordering::Relaxed)
    }

    /// Route one interleaved A/B/C/D frame into the four buffers.
    ///
    /// Each buffer still applies its own size and mode rules; a size error on the split
    /// frame is reported before any buffer is touched.
    pub fn ingest_interleaved(&self, raw: &[u8]) -> AppResult<[IngestOutcome; ELECTRODE_COUNT]> {
        let split = deinterleave(raw, ELECTRODE_COUNT)?;
        for (channel, samples) in self.channels.iter().zip(split.iter()) {
            if samples.len() != channel.capacity() {
                // Let the buffer produce and count the size error.
                channel.ingest_samples(samples)?;
            }
        }

        Ok([
            self.channels[0].ingest_samples(&split[0])?,
            self.channels[1].ingest_samples(&split[1])?,
            self.channels[2].ingest_samples(&split[2])?,
            self.channels[3].ingest_samples(&split[3])?,
        ])
    }

    /// Latest `n` samples of every electrode, for the record display.
    pub fn display_tail(&self, n: usize) -> [Vec<i16>; ELECTRODE_COUNT] {
        [
            self.channels[0].display_tail(n),
            self.channels[1].display_tail(n),
            self.channels[2].display_tail(n),
            self.channels[3].display_tail(n),
        ]
    }

    /// Counters of each buffer, A first.
    pub fn stats(&self) -> [ChannelStats; ELECTRODE_COUNT] {
        [
            self.channels[0].stats(),
            self.channels[1].stats(),
            self.channels[2].stats(),
            self.channels[3].stats(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::interleave::interleave;

    fn fill(aggregator: &ReadinessAggregator, electrodes: &[Electrode], value: i16) {
        for &electrode in electrodes {
            let channel = aggregator.channel(electrode);
            channel
                .ingest_samples(&vec![value; channel.capacity()])
                .unwrap();
        }
    }

    #[test]
    fn all_ready_requires_every_flag() {
        let aggregator = ReadinessAggregator::new(AcquisitionMode::Live, 4).unwrap();
        assert!(!aggregator.all_ready());

        fill(&aggregator, &[Electrode::A, Electrode::B, Electrode::C], 1);
        assert!(!aggregator.all_ready());
        assert_eq!(aggregator.ready_flags(), [true, true, true, false]);

        fill(&aggregator, &[Electrode::D], 1);
        assert!(aggregator.all_ready());

        aggregator.channel(Electrode::B).publish();
        assert!(!aggregator.all_ready());
    }

    #[test]
    fn dispatch_clears_all_flags() {
        let aggregator = ReadinessAggregator::new(AcquisitionMode::Live, 4).unwrap();
        fill(&aggregator, &Electrode::ALL, 7);

        let snapshot = aggregator.dispatch().unwrap();
        assert_eq!(snapshot.sequence, 1);
        assert_eq!(snapshot.electrode(Electrode::C), &[7, 7, 7, 7]);
        assert_eq!(aggregator.ready_flags(), [false; 4]);
    }

    #[test]
    fn dispatch_happens_once_per_transition() {
        let aggregator = ReadinessAggregator::new(AcquisitionMode::Live, 4).unwrap();
        fill(&aggregator, &Electrode::ALL, 7);

        assert!(aggregator.dispatch().is_some());
        assert!(aggregator.dispatch().is_none());
        assert_eq!(aggregator.dispatch_count(), 1);

        fill(&aggregator, &Electrode::ALL, 8);
        let second = aggregator.dispatch().unwrap();
        assert_eq!(second.sequence, 2);
        assert_eq!(second.electrode(Electrode::A), &[8, 8, 8, 8]);
    }

    #[test]
    fn live_frame_arriving_after_readiness_check_is_used() {
        let aggregator = ReadinessAggregator::new(AcquisitionMode::Live, 4).unwrap();
        fill(&aggregator, &Electrode::ALL, 1);
        assert!(aggregator.all_ready());

        // lands between the readiness check and the dispatch
        fill(&aggregator, &[Electrode::B], 2);

        let snapshot = aggregator.dispatch().unwrap();
        assert_eq!(snapshot.electrode(Electrode::A), &[1, 1, 1, 1]);
        assert_eq!(snapshot.electrode(Electrode::B), &[2, 2, 2, 2]);
        assert!(aggregator.dispatch().is_none());
    }

    #[test]
    fn fault_frame_arriving_after_readiness_check_is_dropped() {
        let aggregator = ReadinessAggregator::new(AcquisitionMode::Fault, 4).unwrap();
        fill(&aggregator, &Electrode::ALL, 1);
        assert!(aggregator.all_ready());

        fill(&aggregator, &[Electrode::B], 2);

        let snapshot = aggregator.dispatch().unwrap();
        assert_eq!(snapshot.electrode(Electrode::B), &[1, 1, 1, 1]);
        assert_eq!(aggregator.stats()[1].frames_dropped, 1);
    }

    #[test]
    fn dispatch_without_readiness_returns_none() {
        let aggregator = ReadinessAggregator::new(AcquisitionMode::Live, 4).unwrap();
        fill(&aggregator, &[Electrode::A], 1);
        assert!(aggregator.dispatch().is_none());
        // A stays pending for the next cycle
        assert!(aggregator.channel(Electrode::A).is_ready());
    }

    #[test]
    fn interleaved_frame_fills_every_channel() {
        let aggregator = ReadinessAggregator::new(AcquisitionMode::Fault, 2).unwrap();
        let raw = interleave(&[vec![1, 2], vec![3, 4], vec![5, 6], vec![7, 8]]);

        let outcomes = aggregator.ingest_interleaved(&raw).unwrap();
        assert_eq!(outcomes, [IngestOutcome::Stored; 4]);

        let snapshot = aggregator.dispatch().unwrap();
        assert_eq!(snapshot.electrode(Electrode::D), &[7, 8]);
    }

    #[test]
    fn interleaved_frame_of_wrong_length_touches_nothing() {
        let aggregator = ReadinessAggregator::new(AcquisitionMode::Fault, 2).unwrap();
        let raw = interleave(&[vec![1, 2, 3], vec![3, 4, 5], vec![5, 6, 7], vec![7, 8, 9]]);

        assert!(aggregator.ingest_interleaved(&raw).is_err());
        assert_eq!(aggregator.ready_flags(), [false; 4]);
    }
}
