//! Aligned multi-plane frame storage
//!
//! Each frame is one contiguous allocation; every plane starts on a
//! 32-byte boundary so SIMD converters can use aligned loads.

use crate::error::VideoError;
use crate::types::{VideoData, VideoFormat, VideoFrame, MAX_AV_PLANES};
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;
use std::slice;

const FRAME_ALIGNMENT: usize = 32; // AVX2 requires 32-byte alignment

fn align_up(value: usize) -> usize {
    (value + FRAME_ALIGNMENT - 1) & !(FRAME_ALIGNMENT - 1)
}

/// Owned pixel storage for one frame of a fixed format and geometry
pub struct FrameBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
    offsets: [usize; MAX_AV_PLANES],
    lengths: [usize; MAX_AV_PLANES],
    linesize: [u32; MAX_AV_PLANES],
    format: VideoFormat,
    width: u32,
    height: u32,
}

// The buffer owns its allocation; shared access only hands out `&[u8]`.
unsafe impl Send for FrameBuffer {}
unsafe impl Sync for FrameBuffer {}

impl FrameBuffer {
    /// Allocate a zeroed frame
    ///
    /// # Arguments
    /// * `format` - Video format
    /// * `width` - Frame width in pixels
    /// * `height` - Frame height in pixels
    pub fn new(format: VideoFormat, width: u32, height: u32) -> Result<Self, VideoError> {
        let alloc_fail = || VideoError::AllocFail {
            format,
            width,
            height,
        };

        if format == VideoFormat::None || width == 0 || height == 0 {
            return Err(alloc_fail());
        }

        let mut offsets = [0usize; MAX_AV_PLANES];
        let mut lengths = [0usize; MAX_AV_PLANES];
        let mut linesize = [0u32; MAX_AV_PLANES];
        let mut total = 0usize;

        for plane in 0..MAX_AV_PLANES {
            let Some(plane_layout) = format.plane_layout(plane, width, height) else {
                break;
            };

            let row_bytes = plane_layout.row_bytes();
            offsets[plane] = align_up(total);
            lengths[plane] = plane_layout.size();
            linesize[plane] = u32::try_from(row_bytes).map_err(|_| alloc_fail())?;
            total = offsets[plane] + lengths[plane];
        }

        let layout =
            Layout::from_size_align(align_up(total), FRAME_ALIGNMENT).map_err(|_| alloc_fail())?;

        // SAFETY: layout has a non-zero size since width and height are non-zero.
        let ptr = NonNull::new(unsafe { alloc_zeroed(layout) }).ok_or_else(alloc_fail)?;

        Ok(FrameBuffer {
            ptr,
            layout,
            offsets,
            lengths,
            linesize,
            format,
            width,
            height,
        })
    }

    pub fn format(&self) -> VideoFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn linesize(&self) -> [u32; MAX_AV_PLANES] {
        self.linesize
    }

    /// Total bytes allocated, including alignment padding
    #[cfg(test)]
    pub(crate) fn allocated_size(&self) -> usize {
        self.layout.size()
    }

    pub fn plane(&self, plane: usize) -> &[u8] {
        if plane >= MAX_AV_PLANES || self.lengths[plane] == 0 {
            return &[];
        }
        // SAFETY: offsets/lengths were computed inside the allocation.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr().add(self.offsets[plane]), self.lengths[plane]) }
    }

    pub fn plane_mut(&mut self, plane: usize) -> &mut [u8] {
        if plane >= MAX_AV_PLANES || self.lengths[plane] == 0 {
            return &mut [];
        }
        // SAFETY: offsets/lengths were computed inside the allocation.
        unsafe {
            slice::from_raw_parts_mut(self.ptr.as_ptr().add(self.offsets[plane]), self.lengths[plane])
        }
    }

    /// Mutable views of every plane at once; unused entries are empty
    pub fn planes_mut(&mut self) -> [&mut [u8]; MAX_AV_PLANES] {
        let base = self.ptr.as_ptr();
        let offsets = self.offsets;
        let lengths = self.lengths;

        // SAFETY: planes never overlap, and the borrow of `self` covers them all.
        std::array::from_fn(|plane| {
            if lengths[plane] == 0 {
                return <&mut [u8]>::default();
            }
            unsafe { slice::from_raw_parts_mut(base.add(offsets[plane]), lengths[plane]) }
        })
    }

    /// Raw descriptor for handing the buffer to a producer
    pub fn frame(&self) -> VideoFrame {
        let mut frame = VideoFrame::new(self.width, self.height, self.format);
        for plane in 0..MAX_AV_PLANES {
            if self.lengths[plane] != 0 {
                // SAFETY: offset is inside the allocation.
                frame.data[plane] = unsafe { self.ptr.as_ptr().add(self.offsets[plane]) };
                frame.linesize[plane] = self.linesize[plane];
            }
        }
        frame
    }

    /// Borrowed view of the buffer stamped with `timestamp`
    pub fn data(&self, timestamp: u64) -> VideoData<'_> {
        VideoData {
            planes: std::array::from_fn(|plane| self.plane(plane)),
            linesize: self.linesize,
            width: self.width,
            height: self.height,
            format: self.format,
            timestamp,
        }
    }
}

impl Drop for FrameBuffer {
    fn drop(&mut self) {
        // SAFETY: ptr was allocated with this exact layout.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("linesize", &self.linesize)
            .finish()
    }
}
