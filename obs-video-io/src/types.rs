//! Video data types and constants

use std::slice;

/// Maximum number of planes a frame can carry
pub const MAX_AV_PLANES: usize = 4;

/// Hard upper bound on the number of cache slots per output
pub const MAX_CACHE_SIZE: usize = 16;

/// Video format enumeration
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VideoFormat {
    #[default]
    None = 0,
    I420 = 1,  // Planar YUV 4:2:0
    NV12 = 2,  // Semi-planar YUV 4:2:0 (Y plane, interleaved UV)
    YVYU = 3,  // Packed YUV 4:2:2
    YUY2 = 4,  // Packed YUV 4:2:2
    UYVY = 5,  // Packed YUV 4:2:2
    RGBA = 6,  // Packed RGB
    BGRA = 7,  // Packed BGR
    BGRX = 8,  // Packed BGR (no alpha)
    Y800 = 9,  // Grayscale
    I444 = 10, // Planar YUV 4:4:4
    BGR3 = 11, // Packed BGR 24-bit
    I422 = 12, // Planar YUV 4:2:2
    I40A = 13, // Planar YUVA 4:2:0
    I42A = 14, // Planar YUVA 4:2:2
    YUVA = 15, // Planar YUVA 4:4:4
    AYUV = 16, // Packed YUVA 4:4:4
    I010 = 17, // Planar YUV 4:2:0 10-bit
    P010 = 18, // Semi-planar YUV 4:2:0 10-bit
    I210 = 19, // Planar YUV 4:2:2 10-bit
    I412 = 20, // Planar YUV 4:4:4 12-bit
    YA2L = 21, // Planar YUVA 4:4:4 12-bit
    P216 = 22, // Semi-planar YUV 4:2:2 16-bit
    P416 = 23, // Semi-planar YUV 4:4:4 16-bit
    R10L = 24, // Packed RGB 10-bit
}

/// Memory layout of one plane of a frame.
///
/// A "unit" is the smallest horizontally addressable element of the plane:
/// one sample for planar formats, one interleaved UV pair for semi-planar
/// chroma, one macropixel (two pixels) for packed 4:2:2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    pub units_per_row: u32,
    pub rows: u32,
    pub unit_bytes: u32,
    /// Size of one colour component in bytes, 0 when the unit is bit-packed
    pub component_bytes: u32,
}

impl PlaneLayout {
    const fn new(units_per_row: u32, rows: u32, unit_bytes: u32, component_bytes: u32) -> Self {
        Self {
            units_per_row,
            rows,
            unit_bytes,
            component_bytes,
        }
    }

    /// Bytes in one tightly packed row
    pub fn row_bytes(&self) -> usize {
        self.units_per_row as usize * self.unit_bytes as usize
    }

    pub fn size(&self) -> usize {
        self.row_bytes() * self.rows as usize
    }
}

impl VideoFormat {
    pub fn from_u32(value: u32) -> Option<Self> {
        use VideoFormat::*;
        const ALL: [VideoFormat; 25] = [
            None, I420, NV12, YVYU, YUY2, UYVY, RGBA, BGRA, BGRX, Y800, I444, BGR3, I422, I40A,
            I42A, YUVA, AYUV, I010, P010, I210, I412, YA2L, P216, P416, R10L,
        ];
        ALL.get(value as usize).copied()
    }

    /// Layout of `plane` for a frame of the given size, `None` past the last plane
    pub fn plane_layout(self, plane: usize, width: u32, height: u32) -> Option<PlaneLayout> {
        use VideoFormat::*;

        let (w, h) = (width, height);
        let cw = width.div_ceil(2);
        let ch = height.div_ceil(2);
        let layout = PlaneLayout::new;

        let found = match (self, plane) {
            (None, _) => return Option::None,

            (I420 | I40A, 0) => layout(w, h, 1, 1),
            (I420 | I40A, 1 | 2) => layout(cw, ch, 1, 1),
            (I40A, 3) => layout(w, h, 1, 1),

            (NV12, 0) => layout(w, h, 1, 1),
            (NV12, 1) => layout(cw, ch, 2, 1),

            (YVYU | YUY2 | UYVY, 0) => layout(cw, h, 4, 1),

            (RGBA | BGRA | BGRX | AYUV, 0) => layout(w, h, 4, 1),
            (BGR3, 0) => layout(w, h, 3, 1),
            (Y800, 0) => layout(w, h, 1, 1),
            (R10L, 0) => layout(w, h, 4, 0),

            (I444 | YUVA, 0..=2) => layout(w, h, 1, 1),
            (YUVA, 3) => layout(w, h, 1, 1),

            (I422 | I42A, 0) => layout(w, h, 1, 1),
            (I422 | I42A, 1 | 2) => layout(cw, h, 1, 1),
            (I42A, 3) => layout(w, h, 1, 1),

            (I010, 0) => layout(w, h, 2, 2),
            (I010, 1 | 2) => layout(cw, ch, 2, 2),
            (P010, 0) => layout(w, h, 2, 2),
            (P010, 1) => layout(cw, ch, 4, 2),

            (I210, 0) => layout(w, h, 2, 2),
            (I210, 1 | 2) => layout(cw, h, 2, 2),
            (I412, 0..=2) => layout(w, h, 2, 2),
            (YA2L, 0..=3) => layout(w, h, 2, 2),

            (P216, 0) => layout(w, h, 2, 2),
            (P216, 1) => layout(cw, h, 4, 2),
            (P416, 0) => layout(w, h, 2, 2),
            (P416, 1) => layout(w, h, 4, 2),

            _ => return Option::None,
        };

        Some(found)
    }

    /// Returns number of planes for this format
    pub fn plane_count(self) -> usize {
        (0..MAX_AV_PLANES)
            .take_while(|&plane| self.plane_layout(plane, 2, 2).is_some())
            .count()
    }

    /// Check if format is planar
    pub fn is_planar(self) -> bool {
        self.plane_count() > 1
    }

    /// Calculate frame size in bytes (tightly packed, no alignment padding)
    pub fn calculate_size(self, width: u32, height: u32) -> usize {
        (0..MAX_AV_PLANES)
            .map_while(|plane| self.plane_layout(plane, width, height))
            .map(|layout| layout.size())
            .sum()
    }
}

/// Colorspace enumeration
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSpace {
    #[default]
    Default = 0,
    CS601 = 1,     // BT.601 (SD)
    CS709 = 2,     // BT.709 (HD)
    SRGB = 3,      // sRGB
    CS2100PQ = 4,  // BT.2100 PQ (HDR)
    CS2100HLG = 5, // BT.2100 HLG (HDR)
}

impl ColorSpace {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Default),
            1 => Some(Self::CS601),
            2 => Some(Self::CS709),
            3 => Some(Self::SRGB),
            4 => Some(Self::CS2100PQ),
            5 => Some(Self::CS2100HLG),
            _ => None,
        }
    }
}

/// Color range enumeration
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorRange {
    #[default]
    Default = 0,
    Partial = 1, // Limited range (16-235)
    Full = 2,    // Full range (0-255)
}

impl ColorRange {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Default),
            1 => Some(Self::Partial),
            2 => Some(Self::Full),
            _ => None,
        }
    }
}

/// Configuration of a video output, fixed once the output is open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoOutputInfo {
    pub name: String,
    pub format: VideoFormat,
    pub fps_num: u32,
    pub fps_den: u32,
    pub width: u32,
    pub height: u32,
    /// Number of cache slots, clamped to [`MAX_CACHE_SIZE`]
    pub cache_size: usize,
    pub colorspace: ColorSpace,
    pub range: ColorRange,
    /// Pin the dispatch thread to this core when set
    pub dispatch_core: Option<usize>,
}

impl Default for VideoOutputInfo {
    fn default() -> Self {
        Self {
            name: "video".to_string(),
            format: VideoFormat::NV12,
            fps_num: 30,
            fps_den: 1,
            width: 1920,
            height: 1080,
            cache_size: MAX_CACHE_SIZE,
            colorspace: ColorSpace::Default,
            range: ColorRange::Default,
            dispatch_core: None,
        }
    }
}

impl VideoOutputInfo {
    pub fn is_valid(&self) -> bool {
        self.width != 0
            && self.height != 0
            && self.fps_num != 0
            && self.fps_den != 0
            && self.format != VideoFormat::None
    }

    /// The native format of the output as a conversion target
    pub fn scale_info(&self) -> VideoScaleInfo {
        VideoScaleInfo {
            format: self.format,
            width: self.width,
            height: self.height,
            range: self.range,
            colorspace: self.colorspace,
        }
    }
}

/// Target (or source) description for a format conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VideoScaleInfo {
    pub format: VideoFormat,
    pub width: u32,
    pub height: u32,
    pub range: ColorRange,
    pub colorspace: ColorSpace,
}

impl VideoScaleInfo {
    pub fn new(format: VideoFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
            ..Default::default()
        }
    }

    /// Whether a frame in `self` can be handed out as-is to a consumer asking for `other`
    pub fn same_geometry(&self, other: &VideoScaleInfo) -> bool {
        self.format == other.format && self.width == other.width && self.height == other.height
    }
}

/// Raw descriptor of a frame living in a cache slot or a conversion buffer.
///
/// Copying the descriptor does not copy pixels; it lends them.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct VideoFrame {
    pub data: [*mut u8; MAX_AV_PLANES],
    pub linesize: [u32; MAX_AV_PLANES],
    pub width: u32,
    pub height: u32,
    pub format: VideoFormat,
    pub timestamp: u64,
}

unsafe impl Send for VideoFrame {}
unsafe impl Sync for VideoFrame {}

impl VideoFrame {
    pub fn new(width: u32, height: u32, format: VideoFormat) -> Self {
        Self {
            data: [std::ptr::null_mut(); MAX_AV_PLANES],
            linesize: [0; MAX_AV_PLANES],
            width,
            height,
            format,
            timestamp: 0,
        }
    }

    fn plane_len(&self, plane: usize) -> Option<usize> {
        let layout = self.format.plane_layout(plane, self.width, self.height)?;
        if self.data[plane].is_null() {
            return None;
        }
        Some(self.linesize[plane] as usize * layout.rows as usize)
    }

    /// Borrow one plane of the frame.
    ///
    /// # Safety
    /// The descriptor must point at live memory that nobody writes while the
    /// returned slice is alive.
    pub unsafe fn plane(&self, plane: usize) -> Option<&[u8]> {
        let len = self.plane_len(plane)?;
        Some(slice::from_raw_parts(self.data[plane], len))
    }

    /// Mutably borrow one plane of the frame.
    ///
    /// # Safety
    /// The descriptor must point at live memory that nobody else accesses
    /// while the returned slice is alive (for a producer: between a
    /// successful `lock_frame` and the matching `unlock_frame`).
    pub unsafe fn plane_mut(&mut self, plane: usize) -> Option<&mut [u8]> {
        let len = self.plane_len(plane)?;
        Some(slice::from_raw_parts_mut(self.data[plane], len))
    }

    /// Borrow the whole frame as a [`VideoData`].
    ///
    /// # Safety
    /// Same contract as [`VideoFrame::plane`], for every plane and for `'a`.
    pub unsafe fn as_data<'a>(&self) -> VideoData<'a> {
        let mut planes: [&'a [u8]; MAX_AV_PLANES] = [&[]; MAX_AV_PLANES];
        for (plane, out) in planes.iter_mut().enumerate() {
            if let Some(len) = self.plane_len(plane) {
                *out = slice::from_raw_parts(self.data[plane], len);
            }
        }

        VideoData {
            planes,
            linesize: self.linesize,
            width: self.width,
            height: self.height,
            format: self.format,
            timestamp: self.timestamp,
        }
    }
}

/// A borrowed frame as seen by scalers and consumers
#[derive(Debug, Clone, Copy)]
pub struct VideoData<'a> {
    pub planes: [&'a [u8]; MAX_AV_PLANES],
    pub linesize: [u32; MAX_AV_PLANES],
    pub width: u32,
    pub height: u32,
    pub format: VideoFormat,
    pub timestamp: u64,
}

impl<'a> VideoData<'a> {
    pub fn plane(&self, plane: usize) -> &'a [u8] {
        self.planes.get(plane).copied().unwrap_or(&[])
    }

    pub fn scale_info(&self) -> VideoScaleInfo {
        VideoScaleInfo::new(self.format, self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_counts() {
        assert_eq!(VideoFormat::None.plane_count(), 0);
        assert_eq!(VideoFormat::I420.plane_count(), 3);
        assert_eq!(VideoFormat::NV12.plane_count(), 2);
        assert_eq!(VideoFormat::RGBA.plane_count(), 1);
        assert_eq!(VideoFormat::I40A.plane_count(), 4);
        assert_eq!(VideoFormat::P010.plane_count(), 2);
        assert_eq!(VideoFormat::YA2L.plane_count(), 4);
        assert!(VideoFormat::I444.is_planar());
        assert!(!VideoFormat::UYVY.is_planar());
    }

    #[test]
    fn test_calculate_size() {
        assert_eq!(VideoFormat::NV12.calculate_size(1920, 1080), 1920 * 1080 * 3 / 2);
        assert_eq!(VideoFormat::I420.calculate_size(4, 4), 16 + 4 + 4);
        assert_eq!(VideoFormat::BGRA.calculate_size(10, 10), 400);
        assert_eq!(VideoFormat::UYVY.calculate_size(8, 2), 32);
        assert_eq!(VideoFormat::P010.calculate_size(4, 2), 16 + 8);
    }

    #[test]
    fn test_odd_dimensions_round_chroma_up() {
        let uv = VideoFormat::I420.plane_layout(1, 5, 3).unwrap();
        assert_eq!((uv.units_per_row, uv.rows), (3, 2));
    }

    #[test]
    fn test_format_from_u32() {
        assert_eq!(VideoFormat::from_u32(2), Some(VideoFormat::NV12));
        assert_eq!(VideoFormat::from_u32(24), Some(VideoFormat::R10L));
        assert_eq!(VideoFormat::from_u32(25), None);
        for value in 0..25 {
            assert_eq!(VideoFormat::from_u32(value).unwrap() as u32, value);
        }
    }

    #[test]
    fn test_output_info_validation() {
        let info = VideoOutputInfo::default();
        assert!(info.is_valid());

        assert!(!VideoOutputInfo { width: 0, ..info.clone() }.is_valid());
        assert!(!VideoOutputInfo { fps_den: 0, ..info.clone() }.is_valid());
        assert!(!VideoOutputInfo { fps_num: 0, ..info.clone() }.is_valid());
        assert!(!VideoOutputInfo { format: VideoFormat::None, ..info }.is_valid());
    }

    #[test]
    fn test_unallocated_frame_has_no_planes() {
        let frame = VideoFrame::new(16, 16, VideoFormat::NV12);
        let data = unsafe { frame.as_data() };
        assert!(data.plane(0).is_empty());
        assert!(data.plane(7).is_empty());
    }
}
