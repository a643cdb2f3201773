//! Single-frame capture to an image file
//!
//! A [`SnapshotConsumer`] is connected like any other consumer. It stays
//! idle until armed with [`SnapshotConsumer::request`]; the next delivered
//! frame is copied out and parked in a one-slot queue. Color conversion and
//! encoding happen later, on whatever thread calls [`Snapshot::save`].

use crate::error::SnapshotError;
use crate::input::VideoConsumer;
use crate::types::{VideoData, VideoFormat, MAX_AV_PLANES};
use crossbeam_queue::ArrayQueue;
use image::{Rgb, RgbImage};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

/// Owned copy of one delivered frame
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub format: VideoFormat,
    pub width: u32,
    pub height: u32,
    pub timestamp: u64,
    planes: Vec<Vec<u8>>,
    linesize: [u32; MAX_AV_PLANES],
}

impl CapturedFrame {
    pub fn from_data(frame: &VideoData<'_>) -> Self {
        let planes = (0..frame.format.plane_count())
            .map(|plane| frame.plane(plane).to_vec())
            .collect();

        Self {
            format: frame.format,
            width: frame.width,
            height: frame.height,
            timestamp: frame.timestamp,
            planes,
            linesize: frame.linesize,
        }
    }

    fn sample(&self, plane: usize, offset: usize) -> u8 {
        self.planes
            .get(plane)
            .and_then(|data| data.get(offset))
            .copied()
            .unwrap_or(0)
    }

    fn row_start(&self, plane: usize, row: u32) -> usize {
        self.linesize[plane] as usize * row as usize
    }

    /// (Y, U, V) at pixel (x, y); chroma is replicated for subsampled formats
    fn yuv_at(&self, x: u32, y: u32) -> (u8, u8, u8) {
        let luma = self.sample(0, self.row_start(0, y) + x as usize);

        match self.format {
            VideoFormat::I420 => {
                let (cx, cy) = (x as usize / 2, y / 2);
                (
                    luma,
                    self.sample(1, self.row_start(1, cy) + cx),
                    self.sample(2, self.row_start(2, cy) + cx),
                )
            }
            VideoFormat::NV12 => {
                let offset = self.row_start(1, y / 2) + (x as usize / 2) * 2;
                (luma, self.sample(1, offset), self.sample(1, offset + 1))
            }
            VideoFormat::I444 => {
                let (u, v) = (self.row_start(1, y), self.row_start(2, y));
                (
                    luma,
                    self.sample(1, u + x as usize),
                    self.sample(2, v + x as usize),
                )
            }
            _ => (luma, 128, 128),
        }
    }

    fn rgb_at(&self, x: u32, y: u32) -> Rgb<u8> {
        let offset = self.row_start(0, y) + x as usize * 4;
        let px = |i: usize| self.sample(0, offset + i);

        match self.format {
            VideoFormat::RGBA => Rgb([px(0), px(1), px(2)]),
            VideoFormat::BGRA | VideoFormat::BGRX => Rgb([px(2), px(1), px(0)]),
            _ => {
                let (y, u, v) = self.yuv_at(x, y);
                yuv_to_rgb(y, u, v)
            }
        }
    }

    /// Convert to 8-bit RGB
    pub fn to_rgb(&self) -> Result<RgbImage, SnapshotError> {
        match self.format {
            VideoFormat::I420
            | VideoFormat::NV12
            | VideoFormat::I444
            | VideoFormat::RGBA
            | VideoFormat::BGRA
            | VideoFormat::BGRX => {}
            other => return Err(SnapshotError::UnsupportedFormat(other)),
        }

        Ok(RgbImage::from_fn(self.width, self.height, |x, y| self.rgb_at(x, y)))
    }

    /// Convert and write to `path`; the file format follows the extension
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        self.to_rgb()?.save(path)?;
        Ok(())
    }
}

/// BT.601 limited range, integer arithmetic
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> Rgb<u8> {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;

    let clip = |value: i32| value.clamp(0, 255) as u8;

    Rgb([
        clip((298 * c + 409 * e + 128) >> 8),
        clip((298 * c - 100 * d - 208 * e + 128) >> 8),
        clip((298 * c + 516 * d + 128) >> 8),
    ])
}

/// A captured frame together with its requested destination
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub path: PathBuf,
    pub frame: CapturedFrame,
}

impl Snapshot {
    pub fn save(&self) -> Result<(), SnapshotError> {
        self.frame.save(&self.path)?;
        log::info!(
            "Saved {}x{} snapshot to {}",
            self.frame.width,
            self.frame.height,
            self.path.display()
        );
        Ok(())
    }
}

/// Consumer capturing the next frame after each request
pub struct SnapshotConsumer {
    pending: Mutex<Option<PathBuf>>,
    ready: ArrayQueue<Snapshot>,
}

impl SnapshotConsumer {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(None),
            ready: ArrayQueue::new(1),
        }
    }

    /// Arm capture of the next delivered frame. A newer request replaces an older one.
    pub fn request(&self, path: impl Into<PathBuf>) {
        *self.pending.lock() = Some(path.into());
    }

    pub fn is_armed(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Take the most recent capture, if one is waiting
    pub fn take(&self) -> Option<Snapshot> {
        self.ready.pop()
    }
}

impl Default for SnapshotConsumer {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoConsumer for SnapshotConsumer {
    fn deliver(&self, frame: &VideoData<'_>) {
        let Some(path) = self.pending.lock().take() else {
            return;
        };

        let snapshot = Snapshot {
            path,
            frame: CapturedFrame::from_data(frame),
        };

        if let Some(dropped) = self.ready.force_push(snapshot) {
            log::debug!("Replacing unsaved snapshot for {}", dropped.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_buffer::FrameBuffer;

    fn nv12(y: u8, u: u8, v: u8) -> FrameBuffer {
        let mut buffer = FrameBuffer::new(VideoFormat::NV12, 4, 2).unwrap();
        buffer.plane_mut(0).fill(y);
        for pair in buffer.plane_mut(1).chunks_exact_mut(2) {
            pair[0] = u;
            pair[1] = v;
        }
        buffer
    }

    #[test]
    fn test_yuv_to_rgb_reference_points() {
        assert_eq!(yuv_to_rgb(16, 128, 128), Rgb([0, 0, 0]));
        assert_eq!(yuv_to_rgb(235, 128, 128), Rgb([255, 255, 255]));
        assert_eq!(yuv_to_rgb(0, 128, 128), Rgb([0, 0, 0]));
        assert_eq!(yuv_to_rgb(255, 128, 128), Rgb([255, 255, 255]));
        // Pure red in BT.601 limited range
        assert_eq!(yuv_to_rgb(81, 90, 240), Rgb([255, 0, 0]));
    }

    #[test]
    fn test_nv12_to_rgb() {
        let buffer = nv12(235, 128, 128);
        let image = CapturedFrame::from_data(&buffer.data(0)).to_rgb().unwrap();

        assert_eq!(image.dimensions(), (4, 2));
        assert!(image.pixels().all(|px| *px == Rgb([255, 255, 255])));
    }

    #[test]
    fn test_i420_chroma_is_replicated() {
        let mut buffer = FrameBuffer::new(VideoFormat::I420, 4, 2).unwrap();
        buffer.plane_mut(0).fill(81);
        let u = buffer.plane_mut(1);
        u[0] = 90;
        u[1] = 128;
        let v = buffer.plane_mut(2);
        v[0] = 240;
        v[1] = 128;

        let image = CapturedFrame::from_data(&buffer.data(0)).to_rgb().unwrap();
        assert_eq!(*image.get_pixel(0, 0), Rgb([255, 0, 0]));
        assert_eq!(*image.get_pixel(1, 1), Rgb([255, 0, 0]));
        assert_eq!(*image.get_pixel(2, 0), yuv_to_rgb(81, 128, 128));
    }

    #[test]
    fn test_bgra_swaps_channels() {
        let mut buffer = FrameBuffer::new(VideoFormat::BGRA, 2, 1).unwrap();
        buffer.plane_mut(0)[..4].copy_from_slice(&[10, 20, 30, 255]);

        let image = CapturedFrame::from_data(&buffer.data(0)).to_rgb().unwrap();
        assert_eq!(*image.get_pixel(0, 0), Rgb([30, 20, 10]));
    }

    #[test]
    fn test_unsupported_format() {
        let buffer = FrameBuffer::new(VideoFormat::UYVY, 4, 2).unwrap();
        let err = CapturedFrame::from_data(&buffer.data(0)).to_rgb().unwrap_err();
        assert!(matches!(err, SnapshotError::UnsupportedFormat(VideoFormat::UYVY)));
    }

    #[test]
    fn test_captures_once_per_request() {
        let consumer = SnapshotConsumer::new();
        let buffer = nv12(16, 128, 128);

        consumer.deliver(&buffer.data(1));
        assert!(consumer.take().is_none());

        consumer.request("first.png");
        assert!(consumer.is_armed());
        consumer.deliver(&buffer.data(2));
        consumer.deliver(&buffer.data(3));
        assert!(!consumer.is_armed());

        let snapshot = consumer.take().unwrap();
        assert_eq!(snapshot.path, PathBuf::from("first.png"));
        assert_eq!(snapshot.frame.timestamp, 2);
        assert!(consumer.take().is_none());
    }

    #[test]
    fn test_newer_capture_replaces_unsaved() {
        let consumer = SnapshotConsumer::new();
        let buffer = nv12(16, 128, 128);

        consumer.request("a.png");
        consumer.deliver(&buffer.data(1));
        consumer.request("b.png");
        consumer.deliver(&buffer.data(2));

        let snapshot = consumer.take().unwrap();
        assert_eq!(snapshot.path, PathBuf::from("b.png"));
        assert!(consumer.take().is_none());
    }

    #[test]
    fn test_save_writes_file() {
        let consumer = SnapshotConsumer::new();
        let buffer = nv12(128, 128, 128);
        let path = std::env::temp_dir().join(format!("video-io-snapshot-{}.png", std::process::id()));

        consumer.request(&path);
        consumer.deliver(&buffer.data(0));
        consumer.take().unwrap().save().unwrap();

        let written = image::open(&path).unwrap().to_rgb8();
        assert_eq!(written.dimensions(), (4, 2));
        let _ = std::fs::remove_file(&path);
    }
}
