//! Hardware video-processing engine abstraction
//!
//! The platform engine (Direct3D 11 video APIs on Windows, comparable
//! engines elsewhere) is reached through the [`VideoEngine`] trait. The
//! trait hands out opaque handles; everything the filter holds on to is
//! wrapped in a scoped owner ([`Enumerator`], [`Processor`], [`InputView`],
//! [`OutputView`], [`SurfaceRef`]) that releases the handle when dropped,
//! on success and failure paths alike.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Framerate, Resolution, SurfaceFormat};

pub mod stub;

pub use stub::StubEngine;

/// Identifies one device instance for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(pub u64);

/// The platform API family a device belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Direct3D 11 video device
    D3d11,
    /// Vulkan video device
    Vulkan,
    /// In-memory stub device
    Stub,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceKind::D3d11 => "d3d11",
            DeviceKind::Vulkan => "vulkan",
            DeviceKind::Stub => "stub",
        };
        write!(f, "{}", name)
    }
}

/// The device association carried by every hardware frame.
///
/// Frames produced on one device cannot be consumed by a filter bound to
/// another; the filter compares bindings before issuing any engine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceBinding {
    pub id: DeviceId,
    pub kind: DeviceKind,
}

impl fmt::Display for DeviceBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.kind, self.id.0)
    }
}

/// Opaque handle to a GPU surface (possibly a texture array)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(pub u64);

/// Opaque handle to a processor enumerator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumeratorHandle(pub u64);

/// Opaque handle to a video processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessorHandle(pub u64);

/// Opaque handle to an input or output view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewHandle(pub u64);

/// Scan layout of the content fed to a processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameLayout {
    #[default]
    Progressive,
    InterlacedTopFieldFirst,
    InterlacedBottomFieldFirst,
}

/// Intended usage, a hint the driver may use to pick a conversion path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessorUsage {
    #[default]
    PlaybackNormal,
    OptimalSpeed,
    OptimalQuality,
}

/// Describes the conversion a processor will be asked to perform.
///
/// An enumerator is created for one content description; the processor
/// built from it is only valid for that description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentDescription {
    pub input: Resolution,
    pub output: Resolution,
    pub input_rate: Framerate,
    pub output_rate: Framerate,
    pub layout: FrameLayout,
    pub usage: ProcessorUsage,
}

/// Describes a surface allocation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceDescription {
    pub resolution: Resolution,
    pub format: SurfaceFormat,
    /// Number of array slices; pools allocate one array and hand out slices
    pub array_layers: u32,
}

/// What an enumerator reports for a given format
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatSupport {
    /// Usable as a conversion source
    pub input: bool,
    /// Usable as a conversion destination
    pub output: bool,
}

/// The platform video-processing capability.
///
/// Implementations wrap the native device and command context and are
/// expected to guard their internal state with a lock; the device may be
/// shared with peer stages (decoder, encoder) between frames. All calls
/// block until the operation is issued; completion ordering is left to the
/// platform's own command queue.
///
/// Release methods are infallible; they run from `Drop`. Implementations
/// should log release of an unknown handle rather than panic.
pub trait VideoEngine: Send + Sync {
    fn kind(&self) -> DeviceKind;

    fn device_id(&self) -> DeviceId;

    fn device_binding(&self) -> DeviceBinding {
        DeviceBinding {
            id: self.device_id(),
            kind: self.kind(),
        }
    }

    /// Query the device for an enumerator matching the content description
    fn create_enumerator(&self, desc: &ContentDescription) -> Result<EnumeratorHandle>;

    /// Ask the enumerator whether a format is usable as input and/or output
    fn check_format(
        &self,
        enumerator: EnumeratorHandle,
        format: SurfaceFormat,
    ) -> Result<FormatSupport>;

    /// Create a processor bound to the enumerator
    fn create_processor(&self, enumerator: EnumeratorHandle) -> Result<ProcessorHandle>;

    /// Allocate a surface (or texture array)
    fn create_surface(&self, desc: &SurfaceDescription) -> Result<SurfaceHandle>;

    /// Wrap one slice of a surface as a conversion source
    fn create_input_view(
        &self,
        enumerator: EnumeratorHandle,
        surface: SurfaceHandle,
        array_slice: u32,
    ) -> Result<ViewHandle>;

    /// Wrap one slice of a surface as a conversion destination
    fn create_output_view(
        &self,
        enumerator: EnumeratorHandle,
        surface: SurfaceHandle,
        array_slice: u32,
    ) -> Result<ViewHandle>;

    /// Issue the blit. Single stream, single rectangle, no color adjustment.
    fn blit(
        &self,
        processor: ProcessorHandle,
        output: ViewHandle,
        input: ViewHandle,
    ) -> Result<()>;

    fn release_enumerator(&self, handle: EnumeratorHandle);

    fn release_processor(&self, handle: ProcessorHandle);

    fn release_surface(&self, handle: SurfaceHandle);

    fn release_view(&self, handle: ViewHandle);
}

/// Scoped owner of an enumerator handle
pub struct Enumerator {
    engine: Arc<dyn VideoEngine>,
    handle: EnumeratorHandle,
}

impl Enumerator {
    pub fn create(engine: &Arc<dyn VideoEngine>, desc: &ContentDescription) -> Result<Self> {
        let handle = engine.create_enumerator(desc)?;
        Ok(Self {
            engine: engine.clone(),
            handle,
        })
    }

    pub fn handle(&self) -> EnumeratorHandle {
        self.handle
    }

    pub fn check_format(&self, format: SurfaceFormat) -> Result<FormatSupport> {
        self.engine.check_format(self.handle, format)
    }
}

impl Drop for Enumerator {
    fn drop(&mut self) {
        self.engine.release_enumerator(self.handle);
    }
}

/// Scoped owner of a processor handle
pub struct Processor {
    engine: Arc<dyn VideoEngine>,
    handle: ProcessorHandle,
}

impl Processor {
    pub fn create(engine: &Arc<dyn VideoEngine>, enumerator: &Enumerator) -> Result<Self> {
        let handle = engine.create_processor(enumerator.handle())?;
        Ok(Self {
            engine: engine.clone(),
            handle,
        })
    }

    pub fn handle(&self) -> ProcessorHandle {
        self.handle
    }
}

impl Drop for Processor {
    fn drop(&mut self) {
        self.engine.release_processor(self.handle);
    }
}

/// Scoped owner of a per-frame input view
pub struct InputView {
    engine: Arc<dyn VideoEngine>,
    handle: ViewHandle,
}

impl InputView {
    pub fn create(
        engine: &Arc<dyn VideoEngine>,
        enumerator: &Enumerator,
        surface: &SurfaceRef,
    ) -> Result<Self> {
        let handle =
            engine.create_input_view(enumerator.handle(), surface.handle(), surface.array_slice())?;
        Ok(Self {
            engine: engine.clone(),
            handle,
        })
    }

    pub fn handle(&self) -> ViewHandle {
        self.handle
    }
}

impl Drop for InputView {
    fn drop(&mut self) {
        self.engine.release_view(self.handle);
    }
}

/// Scoped owner of an output view
pub struct OutputView {
    engine: Arc<dyn VideoEngine>,
    handle: ViewHandle,
}

impl OutputView {
    pub fn create(
        engine: &Arc<dyn VideoEngine>,
        enumerator: &Enumerator,
        surface: &SurfaceRef,
    ) -> Result<Self> {
        let handle = engine.create_output_view(
            enumerator.handle(),
            surface.handle(),
            surface.array_slice(),
        )?;
        Ok(Self {
            engine: engine.clone(),
            handle,
        })
    }

    pub fn handle(&self) -> ViewHandle {
        self.handle
    }
}

impl Drop for OutputView {
    fn drop(&mut self) {
        self.engine.release_view(self.handle);
    }
}

/// Where a surface slice goes when the last reference to it drops
pub trait SurfaceReclaim: Send + Sync {
    fn reclaim(&self, handle: SurfaceHandle, array_slice: u32);
}

struct SurfaceInner {
    handle: SurfaceHandle,
    array_slice: u32,
    reclaim: Arc<dyn SurfaceReclaim>,
}

impl Drop for SurfaceInner {
    fn drop(&mut self) {
        self.reclaim.reclaim(self.handle, self.array_slice);
    }
}

/// Shared reference to one slice of a GPU surface.
///
/// Cloning is cheap; the underlying slice is reclaimed (recycled into its
/// pool, or released back to the engine) when the last clone drops.
#[derive(Clone)]
pub struct SurfaceRef {
    inner: Arc<SurfaceInner>,
}

impl SurfaceRef {
    pub fn new(handle: SurfaceHandle, array_slice: u32, reclaim: Arc<dyn SurfaceReclaim>) -> Self {
        Self {
            inner: Arc::new(SurfaceInner {
                handle,
                array_slice,
                reclaim,
            }),
        }
    }

    /// Reference a standalone surface; the engine releases it on last drop
    pub fn with_engine(engine: Arc<dyn VideoEngine>, handle: SurfaceHandle, array_slice: u32) -> Self {
        Self::new(handle, array_slice, Arc::new(EngineReclaim { engine }))
    }

    pub fn handle(&self) -> SurfaceHandle {
        self.inner.handle
    }

    pub fn array_slice(&self) -> u32 {
        self.inner.array_slice
    }
}

impl fmt::Debug for SurfaceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurfaceRef")
            .field("handle", &self.inner.handle)
            .field("array_slice", &self.inner.array_slice)
            .finish()
    }
}

struct EngineReclaim {
    engine: Arc<dyn VideoEngine>,
}

impl SurfaceReclaim for EngineReclaim {
    fn reclaim(&self, handle: SurfaceHandle, _array_slice: u32) {
        self.engine.release_surface(handle);
    }
}
