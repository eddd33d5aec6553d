//! SurfScale - Hardware Video Scaler
//!
//! Scaling and format-conversion stage for GPU-resident video frames.
//! Pixels never leave the device; the platform's video-processing engine
//! does the work and this crate does the lifecycle management around it:
//!
//! - **Binding**: enumerator and processor are created lazily on the first
//!   frame and reused for as long as the input geometry holds
//! - **Views**: input views live for one invocation, output views are
//!   cached per pool slice; everything is released on every exit path
//! - **Frames**: output surfaces come from a pooled texture array, one
//!   output per input, timing metadata carried across
//!
//! # Example
//!
//! ```rust,no_run
//! use surfscale::{ScaleConfig, ScaleFilter, StubEngine, SurfaceFormat};
//!
//! fn main() -> surfscale::Result<()> {
//!     let engine = StubEngine::new();
//!     let config = ScaleConfig::default()
//!         .with_size("iw/2", "ih/2")
//!         .with_format(SurfaceFormat::Nv12);
//!     let mut filter = ScaleFilter::new(engine, config)?;
//!     // feed decoded frames: filter.filter_frame(frame)?
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod device;
pub mod error;
pub mod expr;
pub mod filter;
pub mod pipeline;
pub mod pool;
pub mod sink;
pub mod types;

// Re-exports for convenience
pub use config::ScaleConfig;
pub use device::{
    ContentDescription, DeviceBinding, DeviceId, DeviceKind, StubEngine, SurfaceRef, VideoEngine,
};
pub use error::{Error, Result};
pub use expr::{negotiate, SizeExpr};
pub use filter::{FilterCaps, ScaleFilter};
pub use pipeline::ScalePipeline;
pub use pool::FramePool;
pub use sink::{ChannelSink, FrameSink, NullSink};
pub use types::{Framerate, Resolution, Stats, SurfaceFormat, VideoFrame};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
