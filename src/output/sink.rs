//! Outbound destinations for encoded result frames.
//!
//! The pipeline only builds frames; transport is owned by whatever implements
//! [`FrameSink`]. A sink receives each frame once, fully written.

use crate::config::{OutputConfig, OutputKind};
use crate::error::{AppResult, BpmError};
use crate::output::frame::prepend_timestamp;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::debug;

/// A consumer of encoded result frames.
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Deliver one complete frame.
    async fn send(&mut self, frame: Bytes) -> AppResult<()>;

    /// Flush any buffered output. The default does nothing.
    async fn flush(&mut self) -> AppResult<()> {
        Ok(())
    }
}

#[async_trait]
impl FrameSink for Box<dyn FrameSink> {
    async fn send(&mut self, frame: Bytes) -> AppResult<()> {
        (**self).send(frame).await
    }

    async fn flush(&mut self) -> AppResult<()> {
        (**self).flush().await
    }
}

/// Forwards frames into a bounded tokio channel.
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
}

impl ChannelSink {
    /// Forward into `tx`.
    pub fn new(tx: mpsc::Sender<Bytes>) -> Self {
        Self { tx }
    }

    /// Create a sink together with the receiving end.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send(&mut self, frame: Bytes) -> AppResult<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| BpmError::Sink("frame receiver dropped".into()))
    }
}

/// Appends frames back-to-back to a file.
pub struct FileSink {
    path: PathBuf,
    file: File,
    bytes_written: u64,
}

impl FileSink {
    /// Open `path` for appending, creating it and its parent directory if needed.
    pub async fn create(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        debug!(path = %path.display(), "Opened result frame file");

        Ok(Self {
            path,
            file,
            bytes_written: 0,
        })
    }

    /// File being appended to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes appended by this sink.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

#[async_trait]
impl FrameSink for FileSink {
    async fn send(&mut self, frame: Bytes) -> AppResult<()> {
        self.file.write_all(&frame).await?;
        self.bytes_written += frame.len() as u64;
        Ok(())
    }

    async fn flush(&mut self) -> AppResult<()> {
        self.file.flush().await?;
        Ok(())
    }
}

/// Drops every frame; counts them.
#[derive(Debug, Default)]
pub struct DiscardSink {
    frames: u64,
}

impl DiscardSink {
    /// Empty counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames received so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

#[async_trait]
impl FrameSink for DiscardSink {
    async fn send(&mut self, _frame: Bytes) -> AppResult<()> {
        self.frames += 1;
        Ok(())
    }
}

/// Prefixes every frame with the current Unix time as a little-endian `f64`.
pub struct TimestampedSink<S> {
    inner: S,
}

impl<S: FrameSink> TimestampedSink<S> {
    /// Wrap `inner`.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Unwrap the inner sink.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

fn unix_seconds() -> f64 {
    let now = Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_nanos()) * 1e-9
}

#[async_trait]
impl<S: FrameSink> FrameSink for TimestampedSink<S> {
    async fn send(&mut self, frame: Bytes) -> AppResult<()> {
        self.inner
            .send(prepend_timestamp(unix_seconds(), &frame))
            .await
    }

    async fn flush(&mut self) -> AppResult<()> {
        self.inner.flush().await
    }
}

/// Build the sink described by the `[output]` section.
pub async fn open(config: &OutputConfig) -> AppResult<Box<dyn FrameSink>> {
    let sink: Box<dyn FrameSink> = match config.kind {
        OutputKind::File => Box::new(FileSink::create(&config.path).await?),
        OutputKind::Discard => Box::new(DiscardSink::new()),
    };

    if config.prepend_timestamp {
        Ok(Box::new(TimestampedSink::new(sink)))
    } else {
        Ok(sink)
    }
}
