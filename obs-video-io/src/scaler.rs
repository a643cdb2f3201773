//! Scaler seam used by consumers that need a different format or size
//!
//! The pipeline only knows these traits. [`crate::format_conversion`]
//! provides the default software implementation.

use crate::error::ScalerError;
use crate::frame_buffer::FrameBuffer;
use crate::types::{VideoData, VideoScaleInfo};

/// Scaling algorithm requested at scaler creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScaleAlgorithm {
    #[default]
    Default,
    Point,
    FastBilinear,
    Bilinear,
    Bicubic,
}

/// A configured conversion from one fixed source layout to one fixed target layout
pub trait VideoScaler: Send {
    /// Convert `src` into `dst`. Returns false if the frame could not be converted.
    fn scale(&mut self, dst: &mut FrameBuffer, src: &VideoData<'_>) -> bool;
}

/// Creates scalers for newly connected consumers
pub trait ScalerFactory: Send + Sync {
    fn create(
        &self,
        dst: &VideoScaleInfo,
        src: &VideoScaleInfo,
        algorithm: ScaleAlgorithm,
    ) -> Result<Box<dyn VideoScaler>, ScalerError>;
}
