//! Output frame pool
//!
//! Array-backed surface pool feeding the outbound pad. One texture array
//! is allocated per pool; each acquired frame borrows a slice and returns
//! it when the frame (and every clone of its surface reference) drops.
//! No two frames in flight share a slice.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::device::{
    SurfaceDescription, SurfaceHandle, SurfaceReclaim, SurfaceRef, VideoEngine,
};
use crate::error::{Error, Result};
use crate::types::{Resolution, SurfaceFormat, VideoFrame};

struct PoolShared {
    engine: Arc<dyn VideoEngine>,
    surface: SurfaceHandle,
    resolution: Resolution,
    format: SurfaceFormat,
    free: Mutex<Vec<u32>>,
}

impl SurfaceReclaim for PoolShared {
    fn reclaim(&self, _handle: SurfaceHandle, array_slice: u32) {
        self.free.lock().push(array_slice);
    }
}

impl Drop for PoolShared {
    fn drop(&mut self) {
        self.engine.release_surface(self.surface);
    }
}

/// Fixed-depth pool of GPU-backed output frames
pub struct FramePool {
    shared: Arc<PoolShared>,
    capacity: usize,
}

impl FramePool {
    pub fn new(
        engine: Arc<dyn VideoEngine>,
        resolution: Resolution,
        format: SurfaceFormat,
        capacity: usize,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::Config("pool capacity must be at least 1".to_string()));
        }
        let surface = engine
            .create_surface(&SurfaceDescription {
                resolution,
                format,
                array_layers: capacity as u32,
            })
            .map_err(|e| match e {
                Error::External { call, code } => Error::SurfaceAllocation(format!(
                    "{} failed with status {:#010x}",
                    call, code
                )),
                other => other,
            })?;
        tracing::debug!(%resolution, %format, capacity, "frame pool allocated");
        Ok(Self {
            shared: Arc::new(PoolShared {
                engine,
                surface,
                resolution,
                format,
                free: Mutex::new((0..capacity as u32).rev().collect()),
            }),
            capacity,
        })
    }

    /// Take a free frame out of the pool
    pub fn acquire(&self) -> Result<VideoFrame> {
        let slice = self.shared.free.lock().pop().ok_or(Error::PoolExhausted)?;
        let reclaim: Arc<dyn SurfaceReclaim> = self.shared.clone();
        let surface = SurfaceRef::new(self.shared.surface, slice, reclaim);
        Ok(VideoFrame::new(
            surface,
            self.shared.resolution,
            self.shared.format,
            self.shared.engine.device_binding(),
        ))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Frames currently available without recycling
    pub fn available(&self) -> usize {
        self.shared.free.lock().len()
    }

    pub fn resolution(&self) -> Resolution {
        self.shared.resolution
    }

    pub fn format(&self) -> SurfaceFormat {
        self.shared.format
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::StubEngine;

    fn pool_with_stub(capacity: usize) -> (Arc<StubEngine>, FramePool) {
        let stub = StubEngine::new();
        let engine: Arc<dyn VideoEngine> = stub.clone();
        let pool =
            FramePool::new(engine, Resolution::new(960, 540), SurfaceFormat::Nv12, capacity)
                .unwrap();
        (stub, pool)
    }

    #[test]
    fn test_acquired_frames_match_pool_geometry() {
        let (stub, pool) = pool_with_stub(2);
        let frame = pool.acquire().unwrap();
        assert_eq!(frame.resolution(), Resolution::new(960, 540));
        assert_eq!(frame.format, SurfaceFormat::Nv12);
        assert_eq!(frame.device, stub.device_binding());
    }

    #[test]
    fn test_exhaustion_and_recycling() {
        let (_stub, pool) = pool_with_stub(2);

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_ne!(a.surface.array_slice(), b.surface.array_slice());
        assert!(matches!(pool.acquire(), Err(Error::PoolExhausted)));

        drop(a);
        assert_eq!(pool.available(), 1);
        let c = pool.acquire().unwrap();
        assert!(pool.acquire().is_err());
        drop(b);
        drop(c);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_backing_surface_released_with_pool() {
        let (stub, pool) = pool_with_stub(2);
        assert_eq!(stub.live_surfaces(), 1);

        // A frame in flight keeps the backing array alive past the pool.
        let frame = pool.acquire().unwrap();
        drop(pool);
        assert_eq!(stub.live_surfaces(), 1);
        drop(frame);
        assert_eq!(stub.live_surfaces(), 0);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let stub = StubEngine::new();
        let engine: Arc<dyn VideoEngine> = stub;
        let result = FramePool::new(engine, Resolution::FHD_1080P, SurfaceFormat::Nv12, 0);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_allocation_failure_is_resource_error() {
        let stub = StubEngine::new();
        stub.fail_next(
            crate::device::stub::StubCall::CreateSurface,
            0x8876_017Cu32 as i32,
        );
        let engine: Arc<dyn VideoEngine> = stub;
        let result = FramePool::new(engine, Resolution::FHD_1080P, SurfaceFormat::Nv12, 2);
        match result {
            Err(e) => assert!(e.is_resource()),
            Ok(_) => panic!("allocation should have failed"),
        }
    }
}
