//! In-memory engine backend
//!
//! Mints opaque handles and tracks their lifetimes without touching a real
//! GPU. Backs the CLI demo and the test suite; fault injection makes the
//! failure paths reachable deterministically. No pixels are read or
//! written.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::device::{
    ContentDescription, DeviceId, DeviceKind, EnumeratorHandle, FormatSupport, ProcessorHandle,
    SurfaceDescription, SurfaceHandle, VideoEngine, ViewHandle,
};
use crate::error::{Error, Result};
use crate::types::SurfaceFormat;

const E_INVALIDARG: i32 = 0x8007_0057u32 as i32;

static NEXT_DEVICE_ID: AtomicU64 = AtomicU64::new(1);

/// Engine entry points that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StubCall {
    CreateEnumerator,
    CheckFormat,
    CreateProcessor,
    CreateSurface,
    CreateInputView,
    CreateOutputView,
    Blit,
}

impl StubCall {
    fn name(&self) -> &'static str {
        match self {
            StubCall::CreateEnumerator => "CreateVideoProcessorEnumerator",
            StubCall::CheckFormat => "CheckVideoProcessorFormat",
            StubCall::CreateProcessor => "CreateVideoProcessor",
            StubCall::CreateSurface => "CreateTexture2D",
            StubCall::CreateInputView => "CreateVideoProcessorInputView",
            StubCall::CreateOutputView => "CreateVideoProcessorOutputView",
            StubCall::Blit => "VideoProcessorBlt",
        }
    }
}

/// Running totals of engine calls that succeeded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StubCounters {
    pub enumerators_created: u64,
    pub format_checks: u64,
    pub processors_created: u64,
    pub surfaces_created: u64,
    pub input_views_created: u64,
    pub output_views_created: u64,
    pub blits: u64,
}

struct ViewRecord {
    surface: u64,
    output: bool,
}

#[derive(Default)]
struct StubState {
    next_handle: u64,
    enumerators: HashMap<u64, ContentDescription>,
    processors: HashMap<u64, u64>,
    surfaces: HashMap<u64, SurfaceDescription>,
    views: HashMap<u64, ViewRecord>,
    counters: StubCounters,
    fail_next: Option<(StubCall, i32)>,
    unsupported_outputs: HashSet<SurfaceFormat>,
}

impl StubState {
    fn mint(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn trip(&mut self, call: StubCall) -> Result<()> {
        if let Some((armed, code)) = self.fail_next {
            if armed == call {
                self.fail_next = None;
                return Err(Error::External {
                    call: call.name(),
                    code,
                });
            }
        }
        Ok(())
    }
}

/// In-memory [`VideoEngine`] implementation
pub struct StubEngine {
    id: DeviceId,
    kind: DeviceKind,
    state: Mutex<StubState>,
}

impl StubEngine {
    pub fn new() -> Arc<Self> {
        Self::with_kind(DeviceKind::Stub)
    }

    /// Create a stub that reports a specific device kind
    pub fn with_kind(kind: DeviceKind) -> Arc<Self> {
        Arc::new(Self {
            id: DeviceId(NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed)),
            kind,
            state: Mutex::new(StubState::default()),
        })
    }

    /// Make the next matching engine call fail with the given status code
    pub fn fail_next(&self, call: StubCall, code: i32) {
        self.state.lock().fail_next = Some((call, code));
    }

    /// Report a format as unusable for conversion output
    pub fn mark_output_unsupported(&self, format: SurfaceFormat) {
        self.state.lock().unsupported_outputs.insert(format);
    }

    pub fn counters(&self) -> StubCounters {
        self.state.lock().counters
    }

    pub fn live_enumerators(&self) -> usize {
        self.state.lock().enumerators.len()
    }

    pub fn live_processors(&self) -> usize {
        self.state.lock().processors.len()
    }

    pub fn live_surfaces(&self) -> usize {
        self.state.lock().surfaces.len()
    }

    pub fn live_views(&self) -> usize {
        self.state.lock().views.len()
    }
}

impl VideoEngine for StubEngine {
    fn kind(&self) -> DeviceKind {
        self.kind
    }

    fn device_id(&self) -> DeviceId {
        self.id
    }

    fn create_enumerator(&self, desc: &ContentDescription) -> Result<EnumeratorHandle> {
        let mut state = self.state.lock();
        state.trip(StubCall::CreateEnumerator)?;
        if desc.input.pixels() == 0 || desc.output.pixels() == 0 {
            return Err(Error::External {
                call: StubCall::CreateEnumerator.name(),
                code: E_INVALIDARG,
            });
        }
        let handle = state.mint();
        state.enumerators.insert(handle, *desc);
        state.counters.enumerators_created += 1;
        tracing::trace!(handle, input = %desc.input, output = %desc.output, "enumerator created");
        Ok(EnumeratorHandle(handle))
    }

    fn check_format(
        &self,
        enumerator: EnumeratorHandle,
        format: SurfaceFormat,
    ) -> Result<FormatSupport> {
        let mut state = self.state.lock();
        state.trip(StubCall::CheckFormat)?;
        if !state.enumerators.contains_key(&enumerator.0) {
            return Err(Error::External {
                call: StubCall::CheckFormat.name(),
                code: E_INVALIDARG,
            });
        }
        state.counters.format_checks += 1;
        Ok(FormatSupport {
            input: true,
            output: !state.unsupported_outputs.contains(&format),
        })
    }

    fn create_processor(&self, enumerator: EnumeratorHandle) -> Result<ProcessorHandle> {
        let mut state = self.state.lock();
        state.trip(StubCall::CreateProcessor)?;
        if !state.enumerators.contains_key(&enumerator.0) {
            return Err(Error::External {
                call: StubCall::CreateProcessor.name(),
                code: E_INVALIDARG,
            });
        }
        let handle = state.mint();
        state.processors.insert(handle, enumerator.0);
        state.counters.processors_created += 1;
        Ok(ProcessorHandle(handle))
    }

    fn create_surface(&self, desc: &SurfaceDescription) -> Result<SurfaceHandle> {
        let mut state = self.state.lock();
        state.trip(StubCall::CreateSurface)?;
        if desc.resolution.pixels() == 0 || desc.array_layers == 0 {
            return Err(Error::External {
                call: StubCall::CreateSurface.name(),
                code: E_INVALIDARG,
            });
        }
        let handle = state.mint();
        state.surfaces.insert(handle, *desc);
        state.counters.surfaces_created += 1;
        Ok(SurfaceHandle(handle))
    }

    fn create_input_view(
        &self,
        enumerator: EnumeratorHandle,
        surface: SurfaceHandle,
        array_slice: u32,
    ) -> Result<ViewHandle> {
        let mut state = self.state.lock();
        state.trip(StubCall::CreateInputView)?;
        let valid = state.enumerators.contains_key(&enumerator.0)
            && state
                .surfaces
                .get(&surface.0)
                .is_some_and(|desc| array_slice < desc.array_layers);
        if !valid {
            return Err(Error::External {
                call: StubCall::CreateInputView.name(),
                code: E_INVALIDARG,
            });
        }
        let handle = state.mint();
        state.views.insert(
            handle,
            ViewRecord {
                surface: surface.0,
                output: false,
            },
        );
        state.counters.input_views_created += 1;
        Ok(ViewHandle(handle))
    }

    fn create_output_view(
        &self,
        enumerator: EnumeratorHandle,
        surface: SurfaceHandle,
        array_slice: u32,
    ) -> Result<ViewHandle> {
        let mut state = self.state.lock();
        state.trip(StubCall::CreateOutputView)?;
        let valid = state.enumerators.contains_key(&enumerator.0)
            && state
                .surfaces
                .get(&surface.0)
                .is_some_and(|desc| array_slice < desc.array_layers);
        if !valid {
            return Err(Error::External {
                call: StubCall::CreateOutputView.name(),
                code: E_INVALIDARG,
            });
        }
        let handle = state.mint();
        state.views.insert(
            handle,
            ViewRecord {
                surface: surface.0,
                output: true,
            },
        );
        state.counters.output_views_created += 1;
        Ok(ViewHandle(handle))
    }

    fn blit(
        &self,
        processor: ProcessorHandle,
        output: ViewHandle,
        input: ViewHandle,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.trip(StubCall::Blit)?;
        let valid = state.processors.contains_key(&processor.0)
            && state.views.get(&output.0).is_some_and(|v| v.output)
            && state.views.get(&input.0).is_some_and(|v| !v.output)
            && state.views[&output.0].surface != state.views[&input.0].surface;
        if !valid {
            return Err(Error::External {
                call: StubCall::Blit.name(),
                code: E_INVALIDARG,
            });
        }
        state.counters.blits += 1;
        Ok(())
    }

    fn release_enumerator(&self, handle: EnumeratorHandle) {
        if self.state.lock().enumerators.remove(&handle.0).is_none() {
            tracing::warn!(?handle, "release of unknown enumerator");
        }
    }

    fn release_processor(&self, handle: ProcessorHandle) {
        if self.state.lock().processors.remove(&handle.0).is_none() {
            tracing::warn!(?handle, "release of unknown processor");
        }
    }

    fn release_surface(&self, handle: SurfaceHandle) {
        if self.state.lock().surfaces.remove(&handle.0).is_none() {
            tracing::warn!(?handle, "release of unknown surface");
        }
    }

    fn release_view(&self, handle: ViewHandle) {
        if self.state.lock().views.remove(&handle.0).is_none() {
            tracing::warn!(?handle, "release of unknown view");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Framerate, Resolution};

    fn desc() -> ContentDescription {
        ContentDescription {
            input: Resolution::FHD_1080P,
            output: Resolution::new(960, 540),
            input_rate: Framerate::FPS_60,
            output_rate: Framerate::FPS_60,
            layout: Default::default(),
            usage: Default::default(),
        }
    }

    #[test]
    fn test_fail_injection_trips_once() {
        let stub = StubEngine::new();
        stub.fail_next(StubCall::CreateEnumerator, 0x8000_4005u32 as i32);

        let err = stub.create_enumerator(&desc()).unwrap_err();
        assert!(err.is_external());

        // The injection is consumed; the next call succeeds.
        assert!(stub.create_enumerator(&desc()).is_ok());
        assert_eq!(stub.counters().enumerators_created, 1);
    }

    #[test]
    fn test_views_require_known_enumerator_and_surface() {
        let stub = StubEngine::new();
        let surface = stub
            .create_surface(&SurfaceDescription {
                resolution: Resolution::FHD_1080P,
                format: SurfaceFormat::Nv12,
                array_layers: 2,
            })
            .unwrap();

        let err = stub
            .create_input_view(EnumeratorHandle(999), surface, 0)
            .unwrap_err();
        assert!(err.is_external());

        let enumerator = stub.create_enumerator(&desc()).unwrap();
        // Slice index past the end of the array is rejected.
        assert!(stub.create_input_view(enumerator, surface, 2).is_err());
        assert!(stub.create_input_view(enumerator, surface, 1).is_ok());
    }

    #[test]
    fn test_blit_checks_view_direction() {
        let stub = StubEngine::new();
        let enumerator = stub.create_enumerator(&desc()).unwrap();
        let processor = stub.create_processor(enumerator).unwrap();
        let src = stub
            .create_surface(&SurfaceDescription {
                resolution: Resolution::FHD_1080P,
                format: SurfaceFormat::Nv12,
                array_layers: 1,
            })
            .unwrap();
        let dst = stub
            .create_surface(&SurfaceDescription {
                resolution: Resolution::new(960, 540),
                format: SurfaceFormat::Nv12,
                array_layers: 1,
            })
            .unwrap();

        let input = stub.create_input_view(enumerator, src, 0).unwrap();
        let output = stub.create_output_view(enumerator, dst, 0).unwrap();

        assert!(stub.blit(processor, output, input).is_ok());
        // Swapped views are rejected.
        assert!(stub.blit(processor, input, output).is_err());
        assert_eq!(stub.counters().blits, 1);
    }

    #[test]
    fn test_distinct_device_ids() {
        let a = StubEngine::new();
        let b = StubEngine::new();
        assert_ne!(a.device_id(), b.device_id());
    }
}
