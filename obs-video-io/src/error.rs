//! Error types for the video output pipeline

use crate::types::VideoFormat;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VideoError {
    #[error("invalid video parameters: width, height, fps and format must be non-zero")]
    InvalidParam,
    #[error("failed to allocate {format:?} frame of {width}x{height}")]
    AllocFail {
        format: VideoFormat,
        width: u32,
        height: u32,
    },
    #[error("failed to spawn dispatch thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),
    #[error("consumer is already connected")]
    AlreadyConnected,
    #[error("could not create scaler: {0}")]
    Scaler(#[from] ScalerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScalerError {
    #[error("bad scale conversion type")]
    BadConversion,
    #[error("scaler creation failed")]
    Failed,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("cannot convert {0:?} frames to RGB")]
    UnsupportedFormat(VideoFormat),
    #[error("failed to write snapshot: {0}")]
    Image(#[from] image::ImageError),
}
