//! Result frame encoding and delivery.

pub mod frame;
pub mod sink;

pub use frame::{split_timestamp, FrameReader, RecordedFrame, ResultFrame};
pub use sink::{open, ChannelSink, DiscardSink, FileSink, FrameSink, TimestampedSink};
