//! Filter configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::expr::SizeExpr;
use crate::types::{Framerate, SurfaceFormat};

/// Scaling stage configuration.
///
/// Options are validated when the filter is created, not per frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleConfig {
    /// Output width expression (e.g. "iw", "iw/2", "-1")
    pub width: String,
    /// Output height expression
    pub height: String,
    /// Output pixel format
    pub format: SurfaceFormat,
    /// Outbound pool depth; bounds how many output frames can be in flight
    pub pool_capacity: usize,
    /// Nominal stream rate advertised to the processor
    pub frame_rate: Framerate,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            width: "iw".to_string(),
            height: "ih".to_string(),
            format: SurfaceFormat::Nv12,
            pool_capacity: 4,
            frame_rate: Framerate::FPS_60,
        }
    }
}

impl ScaleConfig {
    pub fn with_size(mut self, width: impl Into<String>, height: impl Into<String>) -> Self {
        self.width = width.into();
        self.height = height.into();
        self
    }

    pub fn with_format(mut self, format: SurfaceFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_pool_capacity(mut self, capacity: usize) -> Self {
        self.pool_capacity = capacity;
        self
    }

    pub fn with_frame_rate(mut self, rate: Framerate) -> Self {
        self.frame_rate = rate;
        self
    }

    /// Parse the size expressions
    pub fn parse_size(&self) -> Result<(SizeExpr, SizeExpr)> {
        Ok((SizeExpr::parse(&self.width)?, SizeExpr::parse(&self.height)?))
    }

    /// Validate all options; fatal at startup when this fails
    pub fn validate(&self) -> Result<()> {
        self.parse_size()?;
        if !self.format.is_output_format() {
            return Err(Error::UnsupportedFormat(self.format.to_string()));
        }
        if self.pool_capacity == 0 {
            return Err(Error::Config("pool_capacity must be at least 1".to_string()));
        }
        if self.frame_rate.num == 0 || self.frame_rate.den == 0 {
            return Err(Error::Config("frame_rate must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&text).map_err(|e| Error::Config(format!("bad config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}
