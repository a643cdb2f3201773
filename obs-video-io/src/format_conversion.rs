//! Software scaler used as the default [`ScalerFactory`]
//!
//! Supports two kinds of conversion:
//! - resampling within one format (any size, nearest or bilinear filtering,
//!   8- and 16-bit components), one fast_image_resize pass per plane
//! - repacking between related 4:2:0 / 4:2:2 layouts at the same size
//!   (UYVY -> NV12, NV12 -> I420, I420 -> NV12), chroma rows split across rayon
//!
//! Colour matrix and range changes are not performed.

use crate::error::ScalerError;
use crate::frame_buffer::FrameBuffer;
use crate::scaler::{ScaleAlgorithm, ScalerFactory, VideoScaler};
use crate::types::{PlaneLayout, VideoData, VideoFormat, VideoScaleInfo};
use fast_image_resize::images::{Image, ImageRef};
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Filter {
    Point,
    Bilinear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conversion {
    Resample(Filter),
    UyvyToNv12,
    Nv12ToI420,
    I420ToNv12,
}

/// Factory for [`SoftwareScaler`]
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareScalerFactory;

impl ScalerFactory for SoftwareScalerFactory {
    fn create(
        &self,
        dst: &VideoScaleInfo,
        src: &VideoScaleInfo,
        algorithm: ScaleAlgorithm,
    ) -> Result<Box<dyn VideoScaler>, ScalerError> {
        SoftwareScaler::new(*dst, *src, algorithm).map(|scaler| Box::new(scaler) as Box<dyn VideoScaler>)
    }
}

pub struct SoftwareScaler {
    dst: VideoScaleInfo,
    src: VideoScaleInfo,
    conversion: Conversion,
    resampler: Option<PlaneResampler>,
}

impl SoftwareScaler {
    pub fn new(
        dst: VideoScaleInfo,
        src: VideoScaleInfo,
        algorithm: ScaleAlgorithm,
    ) -> Result<Self, ScalerError> {
        let degenerate =
            |info: &VideoScaleInfo| info.format == VideoFormat::None || info.width == 0 || info.height == 0;
        if degenerate(&dst) || degenerate(&src) {
            return Err(ScalerError::Failed);
        }

        let same_size = dst.width == src.width && dst.height == src.height;
        let conversion = match (src.format, dst.format) {
            (from, to) if from == to => Conversion::Resample(match algorithm {
                ScaleAlgorithm::Point => Filter::Point,
                _ => Filter::Bilinear,
            }),
            (VideoFormat::UYVY, VideoFormat::NV12) if same_size => Conversion::UyvyToNv12,
            (VideoFormat::NV12, VideoFormat::I420) if same_size => Conversion::Nv12ToI420,
            (VideoFormat::I420, VideoFormat::NV12) if same_size => Conversion::I420ToNv12,
            _ => return Err(ScalerError::BadConversion),
        };

        let resampler = match conversion {
            Conversion::Resample(filter) => Some(PlaneResampler::new(filter)),
            _ => None,
        };

        Ok(Self {
            dst,
            src,
            conversion,
            resampler,
        })
    }
}

impl VideoScaler for SoftwareScaler {
    fn scale(&mut self, dst: &mut FrameBuffer, src: &VideoData<'_>) -> bool {
        if !src.scale_info().same_geometry(&self.src)
            || dst.format() != self.dst.format
            || dst.width() != self.dst.width
            || dst.height() != self.dst.height
        {
            return false;
        }

        match self.conversion {
            Conversion::Resample(_) => match self.resampler.as_mut() {
                Some(resampler) => resampler.resample_frame(dst, src),
                None => false,
            },
            Conversion::UyvyToNv12 => {
                let linesize = dst.linesize();
                let [out_y, out_uv, ..] = dst.planes_mut();
                compress_uyvy_to_nv12(
                    src.plane(0),
                    out_y,
                    out_uv,
                    src.width as usize,
                    src.height as usize,
                    src.linesize[0] as usize,
                    linesize[0] as usize,
                    linesize[1] as usize,
                )
            }
            Conversion::Nv12ToI420 => {
                let linesize = dst.linesize();
                let [out_y, out_u, out_v, _] = dst.planes_mut();
                copy_plane(out_y, linesize[0] as usize, src.plane(0), src.linesize[0] as usize, src.height as usize)
                    && deinterleave_uv(
                        src.plane(1),
                        src.linesize[1] as usize,
                        out_u,
                        out_v,
                        linesize[1] as usize,
                        src.width.div_ceil(2) as usize,
                        src.height.div_ceil(2) as usize,
                    )
            }
            Conversion::I420ToNv12 => {
                let linesize = dst.linesize();
                let [out_y, out_uv, ..] = dst.planes_mut();
                copy_plane(out_y, linesize[0] as usize, src.plane(0), src.linesize[0] as usize, src.height as usize)
                    && interleave_uv(
                        src.plane(1),
                        src.plane(2),
                        src.linesize[1] as usize,
                        out_uv,
                        linesize[1] as usize,
                        src.width.div_ceil(2) as usize,
                        src.height.div_ceil(2) as usize,
                    )
            }
        }
    }
}

/// Pixel type fast_image_resize should see for one unit of a plane
fn pixel_type(layout: PlaneLayout) -> Option<PixelType> {
    match (layout.unit_bytes, layout.component_bytes) {
        (1, 1) => Some(PixelType::U8),
        (2, 1) => Some(PixelType::U8x2),
        (3, 1) => Some(PixelType::U8x3),
        // Bit-packed 32-bit units are moved whole
        (4, 1) | (4, 0) => Some(PixelType::U8x4),
        (2, 2) => Some(PixelType::U16),
        (4, 2) => Some(PixelType::U16x2),
        _ => None,
    }
}

/// Word-aligned scratch for planes whose rows are not tightly packed
#[derive(Default)]
struct Staging {
    words: Vec<u16>,
}

impl Staging {
    fn bytes_mut(&mut self, len: usize) -> &mut [u8] {
        if self.words.len() * 2 < len {
            self.words.resize(len.div_ceil(2), 0);
        }
        &mut bytemuck::cast_slice_mut(self.words.as_mut_slice())[..len]
    }
}

/// Per-plane resampling through fast_image_resize
struct PlaneResampler {
    resizer: Resizer,
    options: ResizeOptions,
    packed_options: ResizeOptions,
    src_staging: Staging,
    dst_staging: Staging,
}

impl PlaneResampler {
    fn new(filter: Filter) -> Self {
        let algorithm = match filter {
            Filter::Point => ResizeAlg::Nearest,
            Filter::Bilinear => ResizeAlg::Convolution(FilterType::Bilinear),
        };

        Self {
            resizer: Resizer::new(),
            // Interleaved chroma is not alpha
            options: ResizeOptions::new().resize_alg(algorithm).use_alpha(false),
            // Bit-packed units cannot be blended, only picked
            packed_options: ResizeOptions::new()
                .resize_alg(ResizeAlg::Nearest)
                .use_alpha(false),
            src_staging: Staging::default(),
            dst_staging: Staging::default(),
        }
    }

    fn resample_frame(&mut self, dst: &mut FrameBuffer, src: &VideoData<'_>) -> bool {
        let format = src.format;
        let (dst_width, dst_height) = (dst.width(), dst.height());
        let dst_linesize = dst.linesize();
        let dst_planes = dst.planes_mut();

        for (plane, dst_plane) in dst_planes.into_iter().enumerate() {
            let (Some(src_layout), Some(dst_layout)) = (
                format.plane_layout(plane, src.width, src.height),
                format.plane_layout(plane, dst_width, dst_height),
            ) else {
                break;
            };

            let resampled = self.resample_plane(
                dst_plane,
                dst_layout,
                dst_linesize[plane] as usize,
                src.plane(plane),
                src_layout,
                src.linesize[plane] as usize,
            );
            if let Err(err) = resampled {
                log::trace!("video-io: plane {plane} of {format:?} not resampled: {err}");
                return false;
            }
        }

        true
    }

    fn resample_plane(
        &mut self,
        dst: &mut [u8],
        dst_layout: PlaneLayout,
        dst_linesize: usize,
        src: &[u8],
        src_layout: PlaneLayout,
        src_linesize: usize,
    ) -> Result<(), ScalerError> {
        let pixel_type = pixel_type(src_layout).ok_or(ScalerError::BadConversion)?;
        let options = if src_layout.component_bytes == 0 {
            &self.packed_options
        } else {
            &self.options
        };
        let (src_row, dst_row) = (src_layout.row_bytes(), dst_layout.row_bytes());
        let (src_rows, dst_rows) = (src_layout.rows as usize, dst_layout.rows as usize);

        if src_linesize < src_row
            || dst_linesize < dst_row
            || src.len() < src_linesize * src_rows
            || dst.len() < dst_linesize * dst_rows
        {
            return Err(ScalerError::Failed);
        }

        let src_tight = if src_linesize == src_row {
            &src[..src_layout.size()]
        } else {
            let tight = self.src_staging.bytes_mut(src_layout.size());
            compact_rows(src, src_linesize, tight, src_row, src_rows);
            &*tight
        };
        let src_image = ImageRef::new(
            src_layout.units_per_row,
            src_layout.rows,
            src_tight,
            pixel_type,
        )
        .map_err(|_| ScalerError::Failed)?;

        if dst_linesize == dst_row {
            let mut dst_image = Image::from_slice_u8(
                dst_layout.units_per_row,
                dst_layout.rows,
                &mut dst[..dst_layout.size()],
                pixel_type,
            )
            .map_err(|_| ScalerError::Failed)?;
            self.resizer
                .resize(&src_image, &mut dst_image, options)
                .map_err(|_| ScalerError::Failed)?;
        } else {
            let tight = self.dst_staging.bytes_mut(dst_layout.size());
            {
                let mut dst_image = Image::from_slice_u8(
                    dst_layout.units_per_row,
                    dst_layout.rows,
                    &mut *tight,
                    pixel_type,
                )
                .map_err(|_| ScalerError::Failed)?;
                self.resizer
                    .resize(&src_image, &mut dst_image, options)
                    .map_err(|_| ScalerError::Failed)?;
            }

            for (row, out) in tight.chunks(dst_row).zip(dst.chunks_mut(dst_linesize)) {
                out[..dst_row].copy_from_slice(row);
            }
        }

        Ok(())
    }
}

fn compact_rows(src: &[u8], src_linesize: usize, dst: &mut [u8], row_bytes: usize, rows: usize) {
    for (out, row) in dst.chunks_mut(row_bytes).zip(src.chunks(src_linesize)).take(rows) {
        out.copy_from_slice(&row[..row_bytes]);
    }
}

fn copy_plane(dst: &mut [u8], dst_linesize: usize, src: &[u8], src_linesize: usize, rows: usize) -> bool {
    let row_bytes = dst_linesize.min(src_linesize);
    if dst.len() < dst_linesize * rows || src.len() < src_linesize * rows {
        return false;
    }

    for y in 0..rows {
        dst[y * dst_linesize..y * dst_linesize + row_bytes]
            .copy_from_slice(&src[y * src_linesize..y * src_linesize + row_bytes]);
    }
    true
}

fn deinterleave_uv(
    uv: &[u8],
    uv_linesize: usize,
    out_u: &mut [u8],
    out_v: &mut [u8],
    out_linesize: usize,
    width: usize,
    height: usize,
) -> bool {
    if uv_linesize < width * 2
        || out_linesize < width
        || uv.len() < uv_linesize * height
        || out_u.len() < out_linesize * height
        || out_v.len() < out_linesize * height
    {
        return false;
    }

    out_u
        .par_chunks_mut(out_linesize)
        .zip(out_v.par_chunks_mut(out_linesize))
        .zip(uv.par_chunks(uv_linesize))
        .take(height)
        .for_each(|((u_row, v_row), uv_row)| {
            for x in 0..width {
                u_row[x] = uv_row[x * 2];
                v_row[x] = uv_row[x * 2 + 1];
            }
        });
    true
}

fn interleave_uv(
    u: &[u8],
    v: &[u8],
    in_linesize: usize,
    out_uv: &mut [u8],
    out_linesize: usize,
    width: usize,
    height: usize,
) -> bool {
    if in_linesize < width
        || out_linesize < width * 2
        || u.len() < in_linesize * height
        || v.len() < in_linesize * height
        || out_uv.len() < out_linesize * height
    {
        return false;
    }

    out_uv
        .par_chunks_mut(out_linesize)
        .zip(u.par_chunks(in_linesize).zip(v.par_chunks(in_linesize)))
        .take(height)
        .for_each(|(row, (u_row, v_row))| {
            for x in 0..width {
                row[x * 2] = u_row[x];
                row[x * 2 + 1] = v_row[x];
            }
        });
    true
}

/// Compress UYVY (4:2:2 packed) to NV12 (4:2:0 semi-planar)
///
/// Chroma of each output row pair is the average of the two source rows.
/// An odd trailing row or column reuses the last available sample.
#[allow(clippy::too_many_arguments)]
pub fn compress_uyvy_to_nv12(
    input: &[u8],
    output_y: &mut [u8],
    output_uv: &mut [u8],
    width: usize,
    height: usize,
    in_linesize: usize,
    out_y_linesize: usize,
    out_uv_linesize: usize,
) -> bool {
    let pairs = width.div_ceil(2);
    if input.len() < in_linesize * height
        || in_linesize < pairs * 4
        || output_y.len() < out_y_linesize * height
        || output_uv.len() < out_uv_linesize * height.div_ceil(2)
    {
        return false;
    }

    for y in (0..height).step_by(2) {
        let y1 = (y + 1).min(height - 1);
        let y0_offset = y * in_linesize;
        let y1_offset = y1 * in_linesize;
        let out_y0_offset = y * out_y_linesize;
        let out_y1_offset = y1 * out_y_linesize;
        let out_uv_offset = (y / 2) * out_uv_linesize;

        for pair in 0..pairs {
            let x = pair * 2;
            let in0 = y0_offset + pair * 4;
            let in1 = y1_offset + pair * 4;

            // UYVY format: U0 Y0 V0 Y1
            let u0 = input[in0];
            let y00 = input[in0 + 1];
            let v0 = input[in0 + 2];
            let y01 = input[in0 + 3];

            let u1 = input[in1];
            let y10 = input[in1 + 1];
            let v1 = input[in1 + 2];
            let y11 = input[in1 + 3];

            output_y[out_y0_offset + x] = y00;
            output_y[out_y1_offset + x] = y10;
            if x + 1 < width {
                output_y[out_y0_offset + x + 1] = y01;
                output_y[out_y1_offset + x + 1] = y11;
            }

            output_uv[out_uv_offset + x] = ((u0 as u16 + u1 as u16) / 2) as u8;
            output_uv[out_uv_offset + x + 1] = ((v0 as u16 + v1 as u16) / 2) as u8;
        }
    }

    true
}
