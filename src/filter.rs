//! Hardware scaling filter
//!
//! The stage that takes decoded GPU frames in, runs them through the
//! platform video processor, and hands resized/reformatted frames out.
//!
//! Binding to the processor is lazy: device handles and the real input
//! geometry are only trustworthy once the first frame arrives, so the
//! enumerator/processor pair is created then and reused for as long as
//! the geometry holds. The state machine is explicit:
//!
//! ```text
//! Unconfigured --first frame--> Configured(binding)
//! Unconfigured --create error-> Failed
//! ```
//!
//! A frame whose geometry or format differs from the configured one is
//! rejected rather than silently pushed through a stale processor.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::ScaleConfig;
use crate::device::{
    ContentDescription, Enumerator, FrameLayout, InputView, OutputView, Processor,
    ProcessorUsage, SurfaceHandle, VideoEngine,
};
use crate::error::{Error, Result};
use crate::expr::{self, SizeExpr};
use crate::pool::FramePool;
use crate::types::{Resolution, Stats, SurfaceFormat, VideoFrame};

/// Capabilities advertised to the host
#[derive(Debug, Clone, Copy)]
pub struct FilterCaps {
    /// Frames stay on the device; the host must not insert a download stage
    pub hardware_frames: bool,
    /// The host may enable/disable the stage over a timeline
    pub timeline: bool,
}

/// Everything that exists only while the processor is bound.
///
/// Field order matters for teardown: views go before the processor, the
/// processor before the enumerator it was built from.
struct Binding {
    output_views: HashMap<(SurfaceHandle, u32), OutputView>,
    processor: Processor,
    enumerator: Enumerator,
    pool: FramePool,
    input_geometry: Resolution,
    input_format: SurfaceFormat,
    output_geometry: Resolution,
}

enum State {
    Unconfigured,
    Configured(Binding),
    Failed,
}

/// Single-input single-output hardware scaling stage
pub struct ScaleFilter {
    engine: Arc<dyn VideoEngine>,
    config: ScaleConfig,
    width: SizeExpr,
    height: SizeExpr,
    state: State,
    stats: Stats,
}

impl ScaleFilter {
    /// Create the filter. Options are validated here; an invalid size
    /// expression or output format is fatal before any frame is accepted.
    pub fn new(engine: Arc<dyn VideoEngine>, config: ScaleConfig) -> Result<Self> {
        config.validate()?;
        let (width, height) = config.parse_size()?;
        Ok(Self {
            engine,
            config,
            width,
            height,
            state: State::Unconfigured,
            stats: Stats::default(),
        })
    }

    pub const fn caps() -> FilterCaps {
        FilterCaps {
            hardware_frames: true,
            timeline: true,
        }
    }

    /// Negotiated output geometry, once the first frame has been seen
    pub fn output_geometry(&self) -> Option<Resolution> {
        match &self.state {
            State::Configured(binding) => Some(binding.output_geometry),
            _ => None,
        }
    }

    pub fn stats(&self) -> Stats {
        self.stats.clone()
    }

    /// Drop the processor binding and return to the unconfigured state.
    /// The next frame triggers a full re-negotiation.
    pub fn reset(&mut self) {
        if matches!(self.state, State::Configured(_)) {
            tracing::debug!("processor binding dropped on reset");
        }
        self.state = State::Unconfigured;
    }

    /// Process one frame. The input frame is consumed; exactly one output
    /// frame is returned, or an error and none.
    pub fn filter_frame(&mut self, frame: VideoFrame) -> Result<VideoFrame> {
        self.stats.frames_in += 1;

        // Device-type equality is validated before any engine call.
        let filter_device = self.engine.device_binding();
        if frame.device != filter_device {
            self.stats.frames_failed += 1;
            return Err(Error::DeviceMismatch {
                frame: frame.device.to_string(),
                filter: filter_device.to_string(),
            });
        }

        if let Err(e) = self.ensure_binding(frame.resolution(), frame.format) {
            self.stats.frames_failed += 1;
            return Err(e);
        }

        match self.convert(&frame) {
            Ok(mut out) => {
                out.copy_metadata_from(&frame);
                // Input ownership ends here; its surface goes back to the
                // upstream pool before the output leaves the filter.
                drop(frame);
                self.stats.frames_out += 1;
                Ok(out)
            }
            Err(e) => {
                self.stats.frames_failed += 1;
                tracing::error!(error = %e, "frame conversion failed");
                Err(e)
            }
        }
    }

    /// Bind the processor for the observed input, or verify the existing
    /// binding still matches. At most one creation sequence per geometry.
    fn ensure_binding(&mut self, input: Resolution, format: SurfaceFormat) -> Result<()> {
        match &self.state {
            State::Failed => return Err(Error::FilterFailed),
            State::Configured(binding) => {
                if binding.input_geometry != input {
                    return Err(Error::GeometryChanged(format!(
                        "configured for {}, got {}",
                        binding.input_geometry, input
                    )));
                }
                if binding.input_format != format {
                    return Err(Error::GeometryChanged(format!(
                        "input format changed from {} to {}",
                        binding.input_format, format
                    )));
                }
                return Ok(());
            }
            State::Unconfigured => {}
        }

        match self.configure(input, format) {
            Ok(binding) => {
                self.state = State::Configured(binding);
                self.stats.bindings_created += 1;
                Ok(())
            }
            Err(e) => {
                // Whatever the driver state is now, it is not trustworthy
                // for a blind retry. Stay failed until the host resets.
                self.state = State::Failed;
                tracing::error!(error = %e, "processor configuration failed");
                Err(e)
            }
        }
    }

    fn configure(&self, input: Resolution, input_format: SurfaceFormat) -> Result<Binding> {
        let output = expr::negotiate(input, &self.width, &self.height, self.config.format)?;

        let desc = ContentDescription {
            input,
            output,
            input_rate: self.config.frame_rate,
            output_rate: self.config.frame_rate,
            layout: FrameLayout::Progressive,
            usage: ProcessorUsage::PlaybackNormal,
        };
        let enumerator = Enumerator::create(&self.engine, &desc)?;

        if !enumerator.check_format(input_format)?.input {
            return Err(Error::UnsupportedFormat(format!(
                "{} as conversion input",
                input_format
            )));
        }
        if !enumerator.check_format(self.config.format)?.output {
            return Err(Error::UnsupportedFormat(format!(
                "{} as conversion output",
                self.config.format
            )));
        }

        let processor = Processor::create(&self.engine, &enumerator)?;
        let pool = FramePool::new(
            self.engine.clone(),
            output,
            self.config.format,
            self.config.pool_capacity,
        )?;

        tracing::info!(
            input = %input,
            output = %output,
            format = %self.config.format,
            "video processor configured"
        );

        Ok(Binding {
            output_views: HashMap::new(),
            processor,
            enumerator,
            pool,
            input_geometry: input,
            input_format,
            output_geometry: output,
        })
    }

    fn convert(&mut self, frame: &VideoFrame) -> Result<VideoFrame> {
        let State::Configured(binding) = &mut self.state else {
            return Err(Error::FilterFailed);
        };

        let out = binding.pool.acquire()?;

        // The input view lives for exactly this invocation and is dropped
        // on every exit path.
        let input_view = InputView::create(&self.engine, &binding.enumerator, &frame.surface)?;

        let key = (out.surface.handle(), out.surface.array_slice());
        if !binding.output_views.contains_key(&key) {
            let view = OutputView::create(&self.engine, &binding.enumerator, &out.surface)?;
            binding.output_views.insert(key, view);
        }
        let output_view = &binding.output_views[&key];

        self.engine
            .blit(binding.processor.handle(), output_view.handle(), input_view.handle())?;

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::stub::{StubCall, StubEngine};
    use crate::types::{SideData, SideDataKind};

    const E_FAIL: i32 = 0x8000_4005u32 as i32;

    fn halving_config() -> ScaleConfig {
        ScaleConfig::default().with_size("iw/2", "ih/2")
    }

    fn setup(config: ScaleConfig) -> (Arc<StubEngine>, ScaleFilter, FramePool) {
        let stub = StubEngine::new();
        let engine: Arc<dyn VideoEngine> = stub.clone();
        let filter = ScaleFilter::new(engine.clone(), config).unwrap();
        let source =
            FramePool::new(engine, Resolution::FHD_1080P, SurfaceFormat::Nv12, 8).unwrap();
        (stub, filter, source)
    }

    fn next_frame(source: &FramePool, pts: i64) -> VideoFrame {
        let mut frame = source.acquire().unwrap();
        frame.pts = pts;
        frame.dts = pts - 1_000;
        frame.duration = 16_666;
        frame
    }

    #[test]
    fn test_halving_1080p() {
        let (_stub, mut filter, source) = setup(halving_config());

        for i in 0..5 {
            let pts = i * 16_666;
            let out = filter.filter_frame(next_frame(&source, pts)).unwrap();
            assert_eq!(out.resolution(), Resolution::new(960, 540));
            assert_eq!(out.format, SurfaceFormat::Nv12);
            assert_eq!(out.pts, pts);
        }
        assert_eq!(filter.output_geometry(), Some(Resolution::new(960, 540)));
    }

    #[test]
    fn test_p010_output_selector() {
        let (_stub, mut filter, source) =
            setup(halving_config().with_format(SurfaceFormat::P010));
        let out = filter.filter_frame(next_frame(&source, 0)).unwrap();
        assert_eq!(out.format, SurfaceFormat::P010);
        assert_eq!(out.resolution(), Resolution::new(960, 540));
    }

    #[test]
    fn test_binding_created_once() {
        let (stub, mut filter, source) = setup(halving_config());

        for i in 0..3 {
            filter.filter_frame(next_frame(&source, i)).unwrap();
        }

        let counters = stub.counters();
        assert_eq!(counters.enumerators_created, 1);
        assert_eq!(counters.processors_created, 1);
        assert_eq!(counters.blits, 3);
        assert_eq!(filter.stats().bindings_created, 1);
    }

    #[test]
    fn test_metadata_propagation() {
        let (_stub, mut filter, source) = setup(halving_config());

        let mut frame = next_frame(&source, 40_000);
        frame.side_data.push(SideData {
            kind: SideDataKind::MasteringDisplay,
            data: vec![9, 9, 9],
        });
        let side_data = frame.side_data.clone();

        let out = filter.filter_frame(frame).unwrap();
        assert_eq!(out.pts, 40_000);
        assert_eq!(out.dts, 39_000);
        assert_eq!(out.duration, 16_666);
        assert_eq!(out.side_data, side_data);
        // Geometry comes from negotiation, not from the input frame.
        assert_eq!(out.resolution(), Resolution::new(960, 540));
    }

    #[test]
    fn test_output_carries_filter_device() {
        let (stub, mut filter, source) = setup(halving_config());
        let out = filter.filter_frame(next_frame(&source, 0)).unwrap();
        assert_eq!(out.device, stub.device_binding());
    }

    #[test]
    fn test_device_mismatch_issues_no_engine_calls() {
        let (stub, mut filter, _source) = setup(halving_config());

        let other: Arc<dyn VideoEngine> = StubEngine::new();
        let foreign_pool =
            FramePool::new(other, Resolution::FHD_1080P, SurfaceFormat::Nv12, 2).unwrap();
        let foreign = foreign_pool.acquire().unwrap();

        let before = stub.counters();
        let err = filter.filter_frame(foreign).unwrap_err();
        assert!(matches!(err, Error::DeviceMismatch { .. }));
        assert!(err.is_config());
        assert_eq!(stub.counters(), before);
        assert!(filter.output_geometry().is_none());
    }

    #[test]
    fn test_geometry_change_rejected_binding_kept() {
        let (stub, mut filter, source) = setup(halving_config());
        filter.filter_frame(next_frame(&source, 0)).unwrap();

        let engine: Arc<dyn VideoEngine> = stub.clone();
        let hd_source =
            FramePool::new(engine, Resolution::HD_720P, SurfaceFormat::Nv12, 2).unwrap();
        let err = filter.filter_frame(hd_source.acquire().unwrap()).unwrap_err();
        assert!(matches!(err, Error::GeometryChanged(_)));

        // The binding still serves correctly-sized frames.
        let out = filter.filter_frame(next_frame(&source, 1)).unwrap();
        assert_eq!(out.resolution(), Resolution::new(960, 540));
        assert_eq!(filter.stats().bindings_created, 1);
    }

    #[test]
    fn test_input_format_change_rejected() {
        let (stub, mut filter, source) = setup(halving_config());
        filter.filter_frame(next_frame(&source, 0)).unwrap();

        let engine: Arc<dyn VideoEngine> = stub.clone();
        let p010_source =
            FramePool::new(engine, Resolution::FHD_1080P, SurfaceFormat::P010, 2).unwrap();
        let err = filter.filter_frame(p010_source.acquire().unwrap()).unwrap_err();
        assert!(matches!(err, Error::GeometryChanged(_)));
    }

    #[test]
    fn test_unsupported_output_format_fails_configuration() {
        let stub = StubEngine::new();
        stub.mark_output_unsupported(SurfaceFormat::P010);
        let engine: Arc<dyn VideoEngine> = stub.clone();
        let mut filter = ScaleFilter::new(
            engine.clone(),
            halving_config().with_format(SurfaceFormat::P010),
        )
        .unwrap();
        let source =
            FramePool::new(engine, Resolution::FHD_1080P, SurfaceFormat::Nv12, 2).unwrap();

        let err = filter.filter_frame(source.acquire().unwrap()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));

        // Configuration failure sticks until a reset.
        let err = filter.filter_frame(source.acquire().unwrap()).unwrap_err();
        assert!(matches!(err, Error::FilterFailed));
    }

    #[test]
    fn test_configure_failure_marks_failed() {
        let (stub, mut filter, source) = setup(halving_config());
        stub.fail_next(StubCall::CreateProcessor, E_FAIL);

        let err = filter.filter_frame(next_frame(&source, 0)).unwrap_err();
        assert!(err.is_external());
        assert!(matches!(
            filter.filter_frame(next_frame(&source, 1)),
            Err(Error::FilterFailed)
        ));

        // A reset clears the failure and the next frame reconfigures.
        filter.reset();
        let out = filter.filter_frame(next_frame(&source, 2)).unwrap();
        assert_eq!(out.resolution(), Resolution::new(960, 540));
        assert_eq!(filter.stats().bindings_created, 1);
    }

    #[test]
    fn test_blit_failure_is_per_frame() {
        let (stub, mut filter, source) = setup(halving_config());
        filter.filter_frame(next_frame(&source, 0)).unwrap();

        stub.fail_next(StubCall::Blit, E_FAIL);
        let err = filter.filter_frame(next_frame(&source, 1)).unwrap_err();
        assert!(err.is_external());

        // The binding survives an external per-frame failure.
        let out = filter.filter_frame(next_frame(&source, 2)).unwrap();
        assert_eq!(out.pts, 2);

        let stats = filter.stats();
        assert_eq!(stats.frames_in, 3);
        assert_eq!(stats.frames_out, 2);
        assert_eq!(stats.frames_failed, 1);
    }

    #[test]
    fn test_input_views_released_on_every_path() {
        let (stub, mut filter, source) = setup(halving_config());

        filter.filter_frame(next_frame(&source, 0)).unwrap();
        stub.fail_next(StubCall::Blit, E_FAIL);
        let _ = filter.filter_frame(next_frame(&source, 1));
        filter.filter_frame(next_frame(&source, 2)).unwrap();

        let counters = stub.counters();
        assert_eq!(counters.input_views_created, 3);
        // Only the cached output views are still alive.
        assert_eq!(stub.live_views() as u64, counters.output_views_created);
    }

    #[test]
    fn test_failed_frame_returns_pool_slot() {
        let (stub, mut filter, source) = setup(halving_config().with_pool_capacity(1));

        stub.fail_next(StubCall::Blit, E_FAIL);
        assert!(filter.filter_frame(next_frame(&source, 0)).is_err());

        // The output slot taken for the failed frame is free again.
        let out = filter.filter_frame(next_frame(&source, 1)).unwrap();
        assert_eq!(out.pts, 1);
    }

    #[test]
    fn test_pool_exhaustion_is_per_frame() {
        let (_stub, mut filter, source) = setup(halving_config().with_pool_capacity(1));

        let held = filter.filter_frame(next_frame(&source, 0)).unwrap();
        let err = filter.filter_frame(next_frame(&source, 1)).unwrap_err();
        assert!(err.is_resource());

        drop(held);
        let out = filter.filter_frame(next_frame(&source, 2)).unwrap();
        assert_eq!(out.pts, 2);
    }

    #[test]
    fn test_output_views_cached_per_slice() {
        let (stub, mut filter, source) = setup(halving_config().with_pool_capacity(2));

        for i in 0..6 {
            filter.filter_frame(next_frame(&source, i)).unwrap();
        }

        let counters = stub.counters();
        assert_eq!(counters.blits, 6);
        assert!(counters.output_views_created <= 2);
    }

    #[test]
    fn test_teardown_releases_everything() {
        let (stub, mut filter, source) = setup(halving_config());
        filter.filter_frame(next_frame(&source, 0)).unwrap();

        drop(filter);
        assert_eq!(stub.live_enumerators(), 0);
        assert_eq!(stub.live_processors(), 0);
        assert_eq!(stub.live_views(), 0);
        // Only the test's own source pool remains.
        assert_eq!(stub.live_surfaces(), 1);
    }

    #[test]
    fn test_reset_reconfigures_for_new_geometry() {
        let (stub, mut filter, source) = setup(halving_config());
        filter.filter_frame(next_frame(&source, 0)).unwrap();
        assert_eq!(filter.output_geometry(), Some(Resolution::new(960, 540)));

        filter.reset();
        let engine: Arc<dyn VideoEngine> = stub.clone();
        let hd_source =
            FramePool::new(engine, Resolution::HD_720P, SurfaceFormat::Nv12, 2).unwrap();
        let out = filter.filter_frame(hd_source.acquire().unwrap()).unwrap();
        assert_eq!(out.resolution(), Resolution::new(640, 360));
        assert_eq!(filter.stats().bindings_created, 2);
        assert_eq!(stub.live_enumerators(), 1);
        assert_eq!(stub.live_processors(), 1);
    }

    #[test]
    fn test_invalid_options_rejected_at_creation() {
        let engine: Arc<dyn VideoEngine> = StubEngine::new();
        let result = ScaleFilter::new(engine, ScaleConfig::default().with_size("bogus", "ih"));
        assert!(matches!(result, Err(Error::InvalidSizeExpression { .. })));
    }

    #[test]
    fn test_caps() {
        let caps = ScaleFilter::caps();
        assert!(caps.hardware_frames);
        assert!(caps.timeline);
    }
}
