//! Common types used throughout SurfScale

use serde::{Deserialize, Serialize};

use crate::device::{DeviceBinding, SurfaceRef};

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    // Common resolutions
    pub const HD_720P: Self = Self::new(1280, 720);
    pub const FHD_1080P: Self = Self::new(1920, 1080);
    pub const QHD_1440P: Self = Self::new(2560, 1440);
    pub const UHD_4K: Self = Self::new(3840, 2160);

    /// Calculate total pixels
    pub fn pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Calculate aspect ratio
    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::FHD_1080P
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Surface pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceFormat {
    /// NV12 - 8-bit 4:2:0 semi-planar (Y plane + interleaved UV)
    Nv12,
    /// P010 - 10-bit 4:2:0 semi-planar
    P010,
    /// BGRA - 32-bit packed, common for composition sources
    Bgra,
}

impl SurfaceFormat {
    /// Chroma is stored at half resolution in both directions
    pub fn is_chroma_subsampled(&self) -> bool {
        matches!(self, SurfaceFormat::Nv12 | SurfaceFormat::P010)
    }

    /// Formats the scaler can be configured to produce
    pub fn is_output_format(&self) -> bool {
        matches!(self, SurfaceFormat::Nv12 | SurfaceFormat::P010)
    }
}

impl Default for SurfaceFormat {
    fn default() -> Self {
        SurfaceFormat::Nv12
    }
}

impl std::fmt::Display for SurfaceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SurfaceFormat::Nv12 => "nv12",
            SurfaceFormat::P010 => "p010",
            SurfaceFormat::Bgra => "bgra",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for SurfaceFormat {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nv12" => Ok(SurfaceFormat::Nv12),
            "p010" => Ok(SurfaceFormat::P010),
            "bgra" => Ok(SurfaceFormat::Bgra),
            other => Err(crate::error::Error::Config(format!(
                "unknown surface format: {}",
                other
            ))),
        }
    }
}

/// Framerate representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Framerate {
    pub num: u32,
    pub den: u32,
}

impl Framerate {
    pub const fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    pub const FPS_24: Self = Self::new(24, 1);
    pub const FPS_30: Self = Self::new(30, 1);
    pub const FPS_60: Self = Self::new(60, 1);

    /// Get framerate as f64
    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Frame duration in microseconds
    pub fn frame_duration_us(&self) -> i64 {
        (1_000_000 * self.den as i64) / self.num as i64
    }
}

impl Default for Framerate {
    fn default() -> Self {
        Self::FPS_60
    }
}

impl std::fmt::Display for Framerate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.den == 1 {
            write!(f, "{} fps", self.num)
        } else {
            write!(f, "{:.2} fps", self.as_f64())
        }
    }
}

/// Kind of per-frame side data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideDataKind {
    /// Mastering display color volume
    MasteringDisplay,
    /// Content light level
    ContentLightLevel,
    /// Opaque side data identified by a host-assigned tag
    Other(u32),
}

/// Per-frame side data, carried through the filter untouched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideData {
    pub kind: SideDataKind,
    pub data: Vec<u8>,
}

/// A video frame backed by a GPU surface
#[derive(Debug)]
pub struct VideoFrame {
    /// GPU surface holding the pixels
    pub surface: SurfaceRef,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Pixel format of the surface
    pub format: SurfaceFormat,
    /// Presentation timestamp in microseconds
    pub pts: i64,
    /// Decode timestamp in microseconds
    pub dts: i64,
    /// Duration in microseconds
    pub duration: i64,
    /// Side data attached by upstream stages
    pub side_data: Vec<SideData>,
    /// The device context that owns the surface
    pub device: DeviceBinding,
}

impl VideoFrame {
    /// Create a frame over an existing surface with zeroed timing
    pub fn new(
        surface: SurfaceRef,
        resolution: Resolution,
        format: SurfaceFormat,
        device: DeviceBinding,
    ) -> Self {
        Self {
            surface,
            width: resolution.width,
            height: resolution.height,
            format,
            pts: 0,
            dts: 0,
            duration: 0,
            side_data: Vec::new(),
            device,
        }
    }

    /// Get resolution
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Copy timing metadata and side data from another frame.
    ///
    /// Geometry, format and the surface reference are deliberately left
    /// alone; they describe this frame, not the source.
    pub fn copy_metadata_from(&mut self, src: &VideoFrame) {
        self.pts = src.pts;
        self.dts = src.dts;
        self.duration = src.duration;
        self.side_data = src.side_data.clone();
    }
}

/// Filter statistics for monitoring
#[derive(Debug, Clone, Default)]
pub struct Stats {
    /// Frames accepted from the inbound pad
    pub frames_in: u64,
    /// Frames produced on the outbound pad
    pub frames_out: u64,
    /// Frames rejected or failed
    pub frames_failed: u64,
    /// Processor bindings created over the filter's lifetime
    pub bindings_created: u64,
}
