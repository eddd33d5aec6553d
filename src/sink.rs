//! Outbound pad
//!
//! The filter hands converted frames to a [`FrameSink`]. A sink failure
//! models downstream backpressure or shutdown and is propagated to the
//! caller unchanged.

use crate::error::{Error, Result};
use crate::types::VideoFrame;

/// Trait for downstream frame consumers
pub trait FrameSink: Send {
    /// Accept one frame. Ownership transfers to the sink.
    fn emit(&mut self, frame: VideoFrame) -> Result<()>;

    /// Flush and finalize
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    /// Frames accepted so far
    fn frames_emitted(&self) -> u64;
}

/// Discards all frames, counting them
#[derive(Default)]
pub struct NullSink {
    frames: u64,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameSink for NullSink {
    fn emit(&mut self, _frame: VideoFrame) -> Result<()> {
        self.frames += 1;
        Ok(())
    }

    fn frames_emitted(&self) -> u64 {
        self.frames
    }
}

/// Hands frames to another thread over a bounded channel.
///
/// `emit` blocks while the channel is full; a disconnected receiver turns
/// into [`Error::Downstream`].
pub struct ChannelSink {
    tx: crossbeam_channel::Sender<VideoFrame>,
    frames: u64,
}

impl ChannelSink {
    pub fn bounded(capacity: usize) -> (Self, crossbeam_channel::Receiver<VideoFrame>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self { tx, frames: 0 }, rx)
    }
}

impl FrameSink for ChannelSink {
    fn emit(&mut self, frame: VideoFrame) -> Result<()> {
        self.tx
            .send(frame)
            .map_err(|_| Error::Downstream("receiver disconnected".to_string()))?;
        self.frames += 1;
        Ok(())
    }

    fn frames_emitted(&self) -> u64 {
        self.frames
    }
}
