//! Error taxonomy for the grid/render/sound pipeline.
//!
//! Only configuration problems and host start-up failures are errors.
//! "Engine not loaded yet", "audio not running" and "tick after teardown"
//! are ordinary states and never show up here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifewaveError {
    /// Grid dimensions must both be positive
    #[error("invalid grid dimensions {width}x{height} (both must be > 0)")]
    InvalidDimensions { width: u32, height: u32 },

    /// Instance buffers for this grid would exceed the GPU buffer limit
    #[error("grid {width}x{height} needs {bytes} B of instance buffer, device limit is {limit} B")]
    GridTooLarge {
        width: u32,
        height: u32,
        bytes: u64,
        limit: u64,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("audio: {0}")]
    Audio(String),

    #[error("render: {0}")]
    Render(String),
}

pub type Result<T> = std::result::Result<T, LifewaveError>;

/// Fail fast on zero-sized grids.
pub fn check_dimensions(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(LifewaveError::InvalidDimensions { width, height });
    }
    Ok(())
}
