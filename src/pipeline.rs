//! Scaling pipeline driver
//!
//! Connects the inbound pad to the filter and the outbound sink. The
//! model is cooperative and single-threaded: each frame is processed to
//! completion (or failure) before the next one is accepted, with no
//! internal queuing.

use crate::error::Result;
use crate::filter::ScaleFilter;
use crate::sink::FrameSink;
use crate::types::{Stats, VideoFrame};

/// Drives frames through a [`ScaleFilter`] into a [`FrameSink`]
pub struct ScalePipeline {
    filter: ScaleFilter,
    sink: Box<dyn FrameSink>,
}

impl ScalePipeline {
    pub fn new(filter: ScaleFilter, sink: Box<dyn FrameSink>) -> Self {
        Self { filter, sink }
    }

    /// Accept one frame from upstream and forward the converted result.
    /// Sink errors propagate unchanged; they signal downstream
    /// backpressure or shutdown.
    pub fn push(&mut self, frame: VideoFrame) -> Result<()> {
        let out = self.filter.filter_frame(frame)?;
        self.sink.emit(out)
    }

    /// Run a whole sequence of frames, stopping at the first error
    pub fn run(&mut self, frames: impl IntoIterator<Item = VideoFrame>) -> Result<()> {
        for frame in frames {
            self.push(frame)?;
        }
        Ok(())
    }

    pub fn filter(&self) -> &ScaleFilter {
        &self.filter
    }

    pub fn frames_emitted(&self) -> u64 {
        self.sink.frames_emitted()
    }

    /// Finalize the sink and return the filter statistics
    pub fn finish(mut self) -> Result<Stats> {
        self.sink.finish()?;
        Ok(self.filter.stats())
    }
}
