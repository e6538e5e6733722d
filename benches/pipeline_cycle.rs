//! Criterion benchmarks for the per-cycle hot path.
//!
//! A live cycle has to finish well inside the poll period; fault captures are eight times
//! longer and set the worst case.
//!
//! Key metrics:
//! - Raw frame ingestion per electrode
//! - Peak extraction per electrode
//! - Full cycle (dispatch, peaks, positions, encode) for live and fault capacities
//!
//! Run with: cargo bench --bench pipeline_cycle

use bpm_daq::acquisition::{AcquisitionMode, ChannelBuffer};
use bpm_daq::calibration::CalibrationTable;
use bpm_daq::config::PipelineConfig;
use bpm_daq::output::DiscardSink;
use bpm_daq::pipeline::BpmPipeline;
use bpm_daq::processing::PeakExtractor;
use bpm_daq::simulation::{BeamParameters, SimulatedBeam};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

const CAPACITIES: [(&str, usize); 2] = [("live_512", 512), ("fault_4096", 4096)];

fn channel_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel_ingest");

    for (name, capacity) in CAPACITIES {
        let channel = ChannelBuffer::new("A", AcquisitionMode::Live, capacity).unwrap();
        let mut beam = SimulatedBeam::new(capacity, BeamParameters::default()).with_seed(1);
        let [frame, ..] = beam.electrode_frames();

        group.throughput(Throughput::Bytes(frame.len() as u64));
        group.bench_with_input(BenchmarkId::new("ingest", name), &frame, |b, frame| {
            b.iter(|| channel.ingest(black_box(frame)).unwrap());
        });
    }

    group.finish();
}

fn peak_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("peak_extraction");
    let extractor = PeakExtractor::new(12, 500);

    for (name, capacity) in CAPACITIES {
        let mut beam = SimulatedBeam::new(capacity, BeamParameters::default()).with_seed(2);
        let [samples, ..] = beam.electrode_samples();

        group.throughput(Throughput::Elements(capacity as u64));
        group.bench_with_input(BenchmarkId::new("extract", name), &samples, |b, samples| {
            b.iter(|| extractor.extract(black_box(samples), 0));
        });
    }

    group.finish();
}

fn full_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_cycle");
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    for (name, capacity) in CAPACITIES {
        let config = PipelineConfig {
            mode: AcquisitionMode::Live,
            live_capacity: capacity,
            fault_capacity: capacity,
            ..PipelineConfig::default()
        };
        let pipeline = BpmPipeline::new(
            &config,
            Arc::new(CalibrationTable::standard()),
            Box::new(DiscardSink::new()),
        )
        .unwrap();
        let mut beam = SimulatedBeam::new(capacity, BeamParameters::default()).with_seed(3);
        let frames = beam.electrode_frames();

        group.bench_function(BenchmarkId::new("cycle", name), |b| {
            b.iter(|| {
                for (channel, frame) in pipeline.aggregator().channels().iter().zip(&frames) {
                    channel.ingest(frame).unwrap();
                }
                runtime.block_on(pipeline.run_cycle()).unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, channel_ingest, peak_extraction, full_cycle);
criterion_main!(benches);
