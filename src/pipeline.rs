//! Pipeline driver.
//!
//! `BpmPipeline` owns the readiness aggregator and runs one cycle per dispatch:
//!
//! 1. consume the four electrode buffers (`ReadinessAggregator::dispatch`)
//! 2. resolve the bunch alignment offset on electrode A
//! 3. extract one peak vector per electrode
//! 4. compute X/Y positions for the configured chamber
//! 5. encode a result frame stamped with the completed-cycle count and hand it to the sink
//!
//! Cycles are single-flight: the sink lives behind an async mutex that is held from dispatch
//! to delivery, so a second caller waits and then finds the flags already cleared.
//!
//! The event counter in a frame is the number of cycles completed before it. It is bumped
//! only after the sink accepted the frame, so the first frame carries 0.

use crate::acquisition::channel::{AcquisitionMode, ChannelStats};
use crate::acquisition::readiness::{
    Electrode, ElectrodeSnapshot, ReadinessAggregator, ELECTRODE_COUNT,
};
use crate::calibration::CalibrationTable;
use crate::config::PipelineConfig;
use crate::error::{AppResult, BpmError};
use crate::output::frame::ResultFrame;
use crate::output::sink::FrameSink;
use crate::processing::peak::{Alignment, PeakExtractor};
use crate::processing::position::{PositionCalculator, PositionResult};
use crate::processing::stats::AxisStats;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

/// Read-only view for monitoring and GUI collaborators.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    /// Live or fault capture.
    pub mode: AcquisitionMode,
    /// Completed cycles since start or the last reset.
    pub event_counter: u32,
    /// Readiness flags of A, B, C, D.
    pub ready: [bool; ELECTRODE_COUNT],
    /// Calibration entry in use.
    pub chamber_type: usize,
    /// Name of that entry.
    pub chamber_name: String,
    /// Snapshots handed to processing, including failed cycles.
    pub dispatches: u64,
    /// Bunches in the latest result, if any.
    pub bunches: Option<usize>,
    /// Horizontal spread of the latest result.
    pub x_stats: Option<AxisStats>,
    /// Vertical spread of the latest result.
    pub y_stats: Option<AxisStats>,
    /// Per-electrode counters, A first.
    pub channels: [ChannelStats; ELECTRODE_COUNT],
}

/// What one completed cycle produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Aggregator dispatch sequence of the consumed snapshot.
    pub sequence: u64,
    /// Counter value written into the frame.
    pub event_counter: u32,
    /// Bunches in the frame.
    pub bunches: usize,
    /// Encoded frame length.
    pub frame_bytes: usize,
}

/// Beam-position pipeline for one monitor.
pub struct BpmPipeline {
    mode: AcquisitionMode,
    aggregator: Arc<ReadinessAggregator>,
    extractor: PeakExtractor,
    calculator: PositionCalculator,
    alignment: Alignment,
    chamber: AtomicUsize,
    event_counter: AtomicU32,
    latest: RwLock<Option<PositionResult>>,
    sink: Mutex<Box<dyn FrameSink>>,
    poll_interval: Duration,
    status_tx: watch::Sender<PipelineStatus>,
}

impl BpmPipeline {
    /// Build the pipeline and its four channel buffers from `config`.
    ///
    /// # Errors
    ///
    /// `ChamberOutOfRange` for a chamber index above 17 and `Configuration` for a zero
    /// bunch width, buffer capacity or poll interval, or for a gain that is not finite and
    /// in `(0, MAX_GAIN]` (see `processing::position::MAX_GAIN`).
    pub fn new(
        config: &PipelineConfig,
        table: Arc<CalibrationTable>,
        sink: Box<dyn FrameSink>,
    ) -> AppResult<Self> {
        if config.bunch_width == 0 {
            return Err(BpmError::Configuration("bunch_width must be positive".into()));
        }
        if config.poll_interval_ms == 0 {
            return Err(BpmError::Configuration("poll_interval_ms must be positive".into()));
        }
        let chamber_name = table.get(config.chamber_type)?.name.to_string();

        let aggregator = Arc::new(ReadinessAggregator::new(config.mode, config.capacity())?);
        let calculator = PositionCalculator::new(table)
            .with_zero_guard(config.zero_guard)
            .with_gains(config.gain_correction)?;

        let initial = PipelineStatus {
            mode: config.mode,
            event_counter: 0,
            ready: [false; ELECTRODE_COUNT],
            chamber_type: config.chamber_type,
            chamber_name,
            dispatches: 0,
            bunches: None,
            x_stats: None,
            y_stats: None,
            channels: aggregator.stats(),
        };
        let (status_tx, _) = watch::channel(initial);

        Ok(Self {
            mode: config.mode,
            aggregator,
            extractor: PeakExtractor::new(config.bunch_width, config.noise_threshold),
            calculator,
            alignment: config.alignment,
            chamber: AtomicUsize::new(config.chamber_type),
            event_counter: AtomicU32::new(0),
            latest: RwLock::new(None),
            sink: Mutex::new(sink),
            poll_interval: config.poll_interval(),
            status_tx,
        })
    }

    /// Entry point for the external stream collaborators feeding the buffers.
    pub fn aggregator(&self) -> &Arc<ReadinessAggregator> {
        &self.aggregator
    }

    /// Calibration entry used by the next cycle.
    pub fn chamber_type(&self) -> usize {
        self.chamber.load(Ordering::Acquire)
    }

    /// Select a different calibration entry for subsequent cycles.
    ///
    /// An index outside the table is rejected and nothing changes, including the latest
    /// result.
    pub fn set_chamber_type(&self, index: usize) -> AppResult<()> {
        let name = match self.calculator.table().get(index) {
            Ok(entry) => entry.name,
            Err(err) => {
                warn!(index, "Rejected chamber type change");
                return Err(err);
            }
        };

        let previous = self.chamber.swap(index, Ordering::AcqRel);
        info!(previous, chamber = index, name, "Chamber type changed");
        self.publish_status();
        Ok(())
    }

    /// Cycles completed since start or the last reset.
    pub fn event_counter(&self) -> u32 {
        self.event_counter.load(Ordering::Acquire)
    }

    /// Explicit external reset of the event counter.
    pub fn reset_event_counter(&self) {
        self.event_counter.store(0, Ordering::Release);
        info!("Event counter reset");
        self.publish_status();
    }

    /// Latest successfully computed result.
    pub fn latest_result(&self) -> Option<PositionResult> {
        self.latest.read().clone()
    }

    /// Peaks and positions for one consumed snapshot, using the current chamber.
    pub fn compute_positions(&self, snapshot: &ElectrodeSnapshot) -> AppResult<PositionResult> {
        let offset = self
            .alignment
            .resolve(snapshot.electrode(Electrode::A), self.extractor.bunch_width());

        let peaks: [Vec<f64>; ELECTRODE_COUNT] =
            std::array::from_fn(|i| self.extractor.extract(&snapshot.samples[i], offset));

        self.calculator.calculate(self.chamber_type(), &peaks)
    }

    /// Run one cycle if all four buffers are ready.
    ///
    /// Returns `Ok(None)` when there was nothing to dispatch. On a processing or sink error
    /// the consumed frames are dropped, the previous result is kept and the counter is not
    /// advanced. The latest result only changes once the sink has accepted its frame.
    #[instrument(skip(self), level = "trace")]
    pub async fn run_cycle(&self) -> AppResult<Option<CycleReport>> {
        let mut sink = self.sink.lock().await;

        let Some(snapshot) = self.aggregator.dispatch() else {
            return Ok(None);
        };

        let result = self.compute_positions(&snapshot)?;
        let event_counter = self.event_counter.load(Ordering::Acquire);
        let frame = ResultFrame::from_result(event_counter, &result).encode();
        let report = CycleReport {
            sequence: snapshot.sequence,
            event_counter,
            bunches: result.bunches(),
            frame_bytes: frame.len(),
        };

        sink.send(frame).await?;
        *self.latest.write() = Some(result);
        self.event_counter.fetch_add(1, Ordering::AcqRel);
        drop(sink);

        debug!(
            event_counter,
            sequence = report.sequence,
            bunches = report.bunches,
            "Cycle complete"
        );
        self.publish_status();
        Ok(Some(report))
    }

    /// Current telemetry.
    pub fn status(&self) -> PipelineStatus {
        let chamber_type = self.chamber_type();
        let chamber_name = self
            .calculator
            .table()
            .get(chamber_type)
            .map(|entry| entry.name.to_string())
            .unwrap_or_default();
        let latest = self.latest.read();

        PipelineStatus {
            mode: self.mode,
            event_counter: self.event_counter(),
            ready: self.aggregator.ready_flags(),
            chamber_type,
            chamber_name,
            dispatches: self.aggregator.dispatch_count(),
            bunches: latest.as_ref().map(PositionResult::bunches),
            x_stats: latest.as_ref().map(|r| r.x_stats),
            y_stats: latest.as_ref().map(|r| r.y_stats),
            channels: self.aggregator.stats(),
        }
    }

    /// Status updates, published after every completed cycle and on control changes.
    pub fn subscribe(&self) -> watch::Receiver<PipelineStatus> {
        self.status_tx.subscribe()
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(self.status());
    }

    /// Drive cycles until `shutdown` turns true or its sender is dropped.
    ///
    /// Wakes on every accepted frame and on the poll tick. Cycle errors are logged and
    /// never end the loop.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> AppResult<()> {
        let notify = self.aggregator.notify();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            chamber = self.chamber_type(),
            poll_ms = self.poll_interval.as_millis() as u64,
            "Pipeline started"
        );

        while !*shutdown.borrow() {
            tokio::select! {
                _ = notify.notified() => {}
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            match self.run_cycle().await {
                Ok(_) => {}
                Err(err) if err.is_recoverable() => {
                    warn!(error = %err, "Cycle skipped");
                }
                Err(err) => {
                    error!(error = %err, "Cycle failed");
                }
            }
        }

        self.sink.lock().await.flush().await?;
        info!(event_counter = self.event_counter(), "Pipeline stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::sink::ChannelSink;
    use bytes::Bytes;
    use tokio::sync::mpsc;

    fn config(capacity: usize) -> PipelineConfig {
        PipelineConfig {
            live_capacity: capacity,
            fault_capacity: capacity,
            bunch_width: 4,
            noise_threshold: 100,
            alignment: Alignment::Fixed(0),
            ..PipelineConfig::default()
        }
    }

    fn pipeline(capacity: usize) -> (BpmPipeline, mpsc::Receiver<Bytes>) {
        let (sink, rx) = ChannelSink::bounded(16);
        let pipeline = BpmPipeline::new(
            &config(capacity),
            Arc::new(CalibrationTable::standard()),
            Box::new(sink),
        )
        .unwrap();
        (pipeline, rx)
    }

    fn feed(pipeline: &BpmPipeline, samples: &[i16]) {
        for electrode in Electrode::ALL {
            pipeline.aggregator().channel(electrode).ingest_samples(samples).unwrap();
        }
    }

    #[tokio::test]
    async fn nothing_ready_means_no_cycle() {
        let (pipeline, _rx) = pipeline(8);
        assert!(pipeline.run_cycle().await.unwrap().is_none());
        assert_eq!(pipeline.event_counter(), 0);
    }

    #[tokio::test]
    async fn first_frame_carries_zero_then_counter_advances() {
        let (pipeline, mut rx) = pipeline(8);
        let burst: &[i16] = &[0, 1000, 0, 0, 0, 1000, 0, 0];

        feed(&pipeline, burst);
        let report = pipeline.run_cycle().await.unwrap().unwrap();
        assert_eq!(report.event_counter, 0);
        assert_eq!(report.bunches, 2);

        let (frame, _) = ResultFrame::decode(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame.event_counter, 0);
        assert_eq!(frame.x, vec![-1.92E-07f64 as f32; 2]);

        feed(&pipeline, burst);
        pipeline.run_cycle().await.unwrap();
        let (frame, _) = ResultFrame::decode(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame.event_counter, 1);
        assert_eq!(pipeline.event_counter(), 2);
    }

    #[tokio::test]
    async fn rejected_chamber_keeps_state() {
        let (pipeline, _rx) = pipeline(8);
        feed(&pipeline, &[500; 8]);
        pipeline.run_cycle().await.unwrap();
        let before = pipeline.latest_result();

        assert!(matches!(
            pipeline.set_chamber_type(18),
            Err(BpmError::ChamberOutOfRange { index: 18, .. })
        ));
        assert_eq!(pipeline.chamber_type(), 0);
        assert_eq!(pipeline.latest_result(), before);
    }

    #[tokio::test]
    async fn chamber_change_applies_to_next_cycle() {
        let (pipeline, mut rx) = pipeline(4);
        pipeline.set_chamber_type(14).unwrap();
        feed(&pipeline, &[800; 4]);
        pipeline.run_cycle().await.unwrap();

        let (frame, _) = ResultFrame::decode(&rx.recv().await.unwrap()).unwrap();
        let c0 = CalibrationTable::standard().get(14).unwrap().x[0];
        assert_eq!(frame.x, vec![c0 as f32]);
        assert_eq!(pipeline.status().chamber_name, "f150");
    }

    #[tokio::test]
    async fn reset_and_status() {
        let (pipeline, _rx) = pipeline(4);
        let mut updates = pipeline.subscribe();

        feed(&pipeline, &[800; 4]);
        pipeline.run_cycle().await.unwrap();
        assert!(updates.has_changed().unwrap());
        assert_eq!(updates.borrow_and_update().event_counter, 1);

        pipeline.reset_event_counter();
        let status = pipeline.status();
        assert_eq!(status.event_counter, 0);
        assert_eq!(status.dispatches, 1);
        assert_eq!(status.bunches, Some(1));
        assert_eq!(status.ready, [false; 4]);
        assert_eq!(status.channels[0].frames_ingested, 1);
    }

    #[tokio::test]
    async fn sink_failure_keeps_previous_result() {
        let (pipeline, mut rx) = pipeline(4);
        feed(&pipeline, &[800; 4]);
        pipeline.run_cycle().await.unwrap();
        rx.recv().await.unwrap();
        let emitted = pipeline.latest_result().unwrap();

        drop(rx);
        feed(&pipeline, &[800; 4]);
        pipeline
            .aggregator()
            .channel(Electrode::A)
            .ingest_samples(&[1600; 4])
            .unwrap();

        assert!(matches!(pipeline.run_cycle().await, Err(BpmError::Sink(_))));
        assert_eq!(pipeline.event_counter(), 1);
        assert_eq!(pipeline.latest_result(), Some(emitted.clone()));
        assert_eq!(pipeline.status().x_stats, Some(emitted.x_stats));
        assert_eq!(pipeline.aggregator().ready_flags(), [false; 4]);
    }

    #[tokio::test]
    async fn concurrent_cycles_run_once() {
        let (pipeline, mut rx) = pipeline(4);
        feed(&pipeline, &[800; 4]);

        let (first, second) = tokio::join!(pipeline.run_cycle(), pipeline.run_cycle());
        let reports = [first.unwrap(), second.unwrap()];
        assert_eq!(reports.iter().filter(|r| r.is_some()).count(), 1);

        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
        assert_eq!(pipeline.event_counter(), 1);
        assert_eq!(pipeline.aggregator().dispatch_count(), 1);
    }

    #[test]
    fn unusable_gain_rejected_at_construction() {
        for gains in [[f64::NAN, 1.0, 1.0, 1.0], [1e308; 4]] {
            let config = PipelineConfig {
                gain_correction: gains,
                ..config(8)
            };
            let result = BpmPipeline::new(
                &config,
                Arc::new(CalibrationTable::standard()),
                Box::new(crate::output::sink::DiscardSink::new()),
            );
            assert!(matches!(result, Err(BpmError::Configuration(_))));
        }
    }

    #[test]
    fn zero_bunch_width_rejected_at_construction() {
        let mut config = config(8);
        config.bunch_width = 0;
        let result = BpmPipeline::new(
            &config,
            Arc::new(CalibrationTable::standard()),
            Box::new(crate::output::sink::DiscardSink::new()),
        );
        assert!(matches!(result, Err(BpmError::Configuration(_))));
    }
}
