//! Video output pipeline
//!
//! A single producer publishes raw frames into a bounded cache; a dispatch
//! thread fans each frame out to every connected consumer, converting format
//! and size per consumer when asked to.
//!
//! Key properties:
//! - Fixed ring of preallocated cache slots, no allocation per frame
//! - Overruns merge into the newest slot and are counted as skipped
//! - Per-consumer scalers with rotating conversion buffers
//! - Frame timing and skip statistics

pub mod cache;
pub mod error;
pub mod format_conversion;
pub mod frame_buffer;
pub mod input;
pub mod scaler;
pub mod signal;
pub mod snapshot;
pub mod stats;
pub mod types;
pub mod video_output;

pub use error::{ScalerError, SnapshotError, VideoError};
pub use format_conversion::{SoftwareScaler, SoftwareScalerFactory};
pub use frame_buffer::FrameBuffer;
pub use input::{ConsumerId, VideoConsumer};
pub use scaler::{ScaleAlgorithm, ScalerFactory, VideoScaler};
pub use snapshot::{CapturedFrame, Snapshot, SnapshotConsumer};
pub use stats::{SkipReport, VideoOutputStats};
pub use types::*;
pub use video_output::VideoOutput;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_video_format_sizes() {
        assert_eq!(VideoFormat::I420.plane_count(), 3);
        assert_eq!(VideoFormat::NV12.plane_count(), 2);
        assert_eq!(VideoFormat::RGBA.plane_count(), 1);
    }

    #[test]
    fn test_snapshot_through_output() {
        let output = VideoOutput::open(VideoOutputInfo {
            width: 16,
            height: 8,
            cache_size: 2,
            ..Default::default()
        })
        .unwrap();

        let snapshot = Arc::new(SnapshotConsumer::new());
        output.connect(None, snapshot.clone()).unwrap();
        snapshot.request("frame.png");

        let mut frame = output.lock_frame(1, 7).unwrap();
        unsafe { frame.plane_mut(0) }.unwrap().fill(235);
        output.unlock_frame();

        let mut captured = None;
        for _ in 0..500 {
            captured = snapshot.take();
            if captured.is_some() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }

        let captured = captured.unwrap();
        assert_eq!(captured.frame.timestamp, 7);
        assert_eq!((captured.frame.width, captured.frame.height), (16, 8));
        assert_eq!(captured.frame.format, VideoFormat::NV12);
    }
}
