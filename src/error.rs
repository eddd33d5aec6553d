//! Error types for SurfScale

use thiserror::Error;

/// Result type alias for SurfScale operations
pub type Result<T> = std::result::Result<T, Error>;

/// SurfScale error type
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Device mismatch: frame belongs to {frame}, filter is bound to {filter}")]
    DeviceMismatch { frame: String, filter: String },

    #[error("Invalid size expression '{expr}': {reason}")]
    InvalidSizeExpression { expr: String, reason: String },

    #[error("Output format not supported by the processor: {0}")]
    UnsupportedFormat(String),

    #[error("Input geometry changed after configuration: {0}")]
    GeometryChanged(String),

    #[error("Filter is in failed state, reset before feeding more frames")]
    FilterFailed,

    #[error("Configuration error: {0}")]
    Config(String),

    // Resource exhaustion
    #[error("Frame pool exhausted")]
    PoolExhausted,

    #[error("Surface allocation failed: {0}")]
    SurfaceAllocation(String),

    // External / driver errors
    #[error("{call} failed with status {code:#010x}")]
    External { call: &'static str, code: i32 },

    // Pipeline errors
    #[error("Downstream sink rejected frame: {0}")]
    Downstream(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error was detected at configuration time
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::DeviceMismatch { .. }
                | Error::InvalidSizeExpression { .. }
                | Error::UnsupportedFormat(_)
                | Error::GeometryChanged(_)
                | Error::Config(_)
        )
    }

    /// Check if this error is a resource-exhaustion condition
    pub fn is_resource(&self) -> bool {
        matches!(self, Error::PoolExhausted | Error::SurfaceAllocation(_))
    }

    /// Check if this error came from the hardware engine itself
    pub fn is_external(&self) -> bool {
        matches!(self, Error::External { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let e = Error::External {
            call: "VideoProcessorBlt",
            code: 0x8000_4005u32 as i32,
        };
        assert!(e.is_external());
        assert!(!e.is_config());

        let e = Error::Config("bad".into());
        assert!(e.is_config());
        assert!(!e.is_resource());

        assert!(Error::PoolExhausted.is_resource());
    }

    #[test]
    fn test_external_displays_status_code() {
        let e = Error::External {
            call: "VideoProcessorBlt",
            code: 0x8000_4005u32 as i32,
        };
        let msg = e.to_string();
        assert!(msg.contains("VideoProcessorBlt"));
        assert!(msg.contains("0x80004005"));
    }
}
