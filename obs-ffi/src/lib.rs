//! OBS FFI - C Foreign Function Interface
//!
//! Exposes the video output pipeline through a C-compatible API. Consumers
//! are plain `(callback, param)` pairs; the pair is the consumer's identity
//! for connect and disconnect.

use std::ffi::CStr;
use std::ptr;
use std::sync::Arc;

use libc::{c_char, c_int, c_void};
use obs_video_io::{
    ColorRange, ColorSpace, ConsumerId, VideoConsumer, VideoData, VideoError, VideoFormat,
    VideoOutput, VideoOutputInfo, VideoScaleInfo,
};
use parking_lot::Mutex;

pub const VIDEO_OUTPUT_SUCCESS: c_int = 0;
pub const VIDEO_OUTPUT_INVALIDPARAM: c_int = -1;
pub const VIDEO_OUTPUT_FAIL: c_int = -2;

/// Opaque handle to a video output (C-compatible)
pub struct OBSVideoOutput {
    _private: [u8; 0],
}

/// C-compatible video output info
#[repr(C)]
pub struct CVideoOutputInfo {
    /// Optional NUL-terminated name, used for the dispatch thread
    pub name: *const c_char,
    pub format: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    pub width: u32,
    pub height: u32,
    pub cache_size: usize,
    pub colorspace: u32,
    pub range: u32,
}

/// C-compatible conversion request
#[repr(C)]
pub struct CVideoScaleInfo {
    pub format: u32,
    pub width: u32,
    pub height: u32,
    pub range: u32,
    pub colorspace: u32,
}

/// C-compatible writable frame returned by lock_frame
#[repr(C)]
pub struct CVideoFrame {
    pub data: [*mut u8; 4],
    pub linesize: [u32; 4],
    pub width: u32,
    pub height: u32,
    pub format: u32,
    pub timestamp: u64,
}

/// C-compatible read-only frame passed to consumer callbacks
#[repr(C)]
pub struct CVideoData {
    pub data: [*const u8; 4],
    pub linesize: [u32; 4],
    pub width: u32,
    pub height: u32,
    pub format: u32,
    pub timestamp: u64,
}

pub type VideoCallback = extern "C" fn(param: *mut c_void, frame: *const CVideoData);

type CallbackKey = (usize, usize);

struct CallbackConsumer {
    callback: VideoCallback,
    param: *mut c_void,
}

// SAFETY: `param` is owned by the C caller, who guarantees it stays valid and
// may be used from the dispatch thread until the pair is disconnected.
unsafe impl Send for CallbackConsumer {}
unsafe impl Sync for CallbackConsumer {}

impl VideoConsumer for CallbackConsumer {
    fn deliver(&self, frame: &VideoData<'_>) {
        let mut data = [ptr::null(); 4];
        for (plane, out) in data.iter_mut().enumerate() {
            let bytes = frame.plane(plane);
            if !bytes.is_empty() {
                *out = bytes.as_ptr();
            }
        }

        let c_frame = CVideoData {
            data,
            linesize: frame.linesize,
            width: frame.width,
            height: frame.height,
            format: frame.format as u32,
            timestamp: frame.timestamp,
        };

        (self.callback)(self.param, &c_frame);
    }
}

/// What the opaque handle points at
struct FfiVideoOutput {
    output: VideoOutput,
    callbacks: Mutex<Vec<(CallbackKey, ConsumerId)>>,
}

fn callback_key(callback: VideoCallback, param: *mut c_void) -> CallbackKey {
    (callback as usize, param as usize)
}

unsafe fn handle<'a>(ptr: *const OBSVideoOutput) -> Option<&'a FfiVideoOutput> {
    (ptr as *const FfiVideoOutput).as_ref()
}

unsafe fn output_info(info: &CVideoOutputInfo) -> Option<VideoOutputInfo> {
    let name = if info.name.is_null() {
        VideoOutputInfo::default().name
    } else {
        CStr::from_ptr(info.name).to_string_lossy().into_owned()
    };

    Some(VideoOutputInfo {
        name,
        format: VideoFormat::from_u32(info.format)?,
        fps_num: info.fps_num,
        fps_den: info.fps_den,
        width: info.width,
        height: info.height,
        cache_size: info.cache_size,
        colorspace: ColorSpace::from_u32(info.colorspace).unwrap_or_default(),
        range: ColorRange::from_u32(info.range).unwrap_or_default(),
        dispatch_core: None,
    })
}

fn scale_info(info: &CVideoScaleInfo) -> Option<VideoScaleInfo> {
    Some(VideoScaleInfo {
        format: VideoFormat::from_u32(info.format)?,
        width: info.width,
        height: info.height,
        range: ColorRange::from_u32(info.range).unwrap_or_default(),
        colorspace: ColorSpace::from_u32(info.colorspace).unwrap_or_default(),
    })
}

// ============================================================================
// VIDEO OUTPUT API
// ============================================================================

/// Open a video output and start its dispatch thread
///
/// # Safety
/// `out` must be valid for writes. `info` must point at a valid
/// `CVideoOutputInfo` whose `name` is null or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn obs_video_output_open(
    out: *mut *mut OBSVideoOutput,
    info: *const CVideoOutputInfo,
) -> c_int {
    if out.is_null() || info.is_null() {
        return VIDEO_OUTPUT_INVALIDPARAM;
    }

    let Some(info) = output_info(&*info) else {
        return VIDEO_OUTPUT_INVALIDPARAM;
    };

    match VideoOutput::open(info) {
        Ok(output) => {
            let handle = Box::new(FfiVideoOutput {
                output,
                callbacks: Mutex::new(Vec::new()),
            });
            *out = Box::into_raw(handle) as *mut OBSVideoOutput;
            VIDEO_OUTPUT_SUCCESS
        }
        Err(VideoError::InvalidParam) => VIDEO_OUTPUT_INVALIDPARAM,
        Err(err) => {
            log::error!("obs_video_output_open: {err}");
            VIDEO_OUTPUT_FAIL
        }
    }
}

/// Stop and free a video output. Null is ignored.
///
/// # Safety
/// Caller must ensure ptr came from `obs_video_output_open` and is not
/// already freed. Must not be called from a consumer callback.
#[no_mangle]
pub unsafe extern "C" fn obs_video_output_close(ptr: *mut OBSVideoOutput) {
    if !ptr.is_null() {
        let mut handle = Box::from_raw(ptr as *mut FfiVideoOutput);
        handle.output.close();
    }
}

/// Connect a consumer callback
///
/// `conversion` may be null for the native format. Returns false for a null
/// handle or callback, an already connected `(callback, param)` pair, or a
/// conversion that cannot be set up.
///
/// # Safety
/// Caller must ensure ptr is valid and `conversion` is null or valid. `param`
/// must stay usable from the dispatch thread until disconnected.
#[no_mangle]
pub unsafe extern "C" fn obs_video_output_connect(
    ptr: *mut OBSVideoOutput,
    conversion: *const CVideoScaleInfo,
    callback: Option<VideoCallback>,
    param: *mut c_void,
) -> bool {
    let (Some(handle), Some(callback)) = (handle(ptr), callback) else {
        return false;
    };

    let conversion = match conversion.as_ref() {
        Some(info) => match scale_info(info) {
            Some(info) => Some(info),
            None => return false,
        },
        None => None,
    };

    let key = callback_key(callback, param);
    let mut callbacks = handle.callbacks.lock();
    if callbacks.iter().any(|(existing, _)| *existing == key) {
        return false;
    }

    let consumer = Arc::new(CallbackConsumer { callback, param });
    match handle.output.connect(conversion.as_ref(), consumer) {
        Ok(id) => {
            callbacks.push((key, id));
            true
        }
        Err(err) => {
            log::warn!("obs_video_output_connect: {err}");
            false
        }
    }
}

/// Disconnect a consumer callback. Unknown pairs are ignored.
///
/// # Safety
/// Caller must ensure ptr is valid. Must not be called from a consumer callback.
#[no_mangle]
pub unsafe extern "C" fn obs_video_output_disconnect(
    ptr: *mut OBSVideoOutput,
    callback: Option<VideoCallback>,
    param: *mut c_void,
) {
    let (Some(handle), Some(callback)) = (handle(ptr), callback) else {
        return;
    };

    let key = callback_key(callback, param);
    let mut callbacks = handle.callbacks.lock();
    if let Some(idx) = callbacks.iter().position(|(existing, _)| *existing == key) {
        let (_, id) = callbacks.remove(idx);
        handle.output.disconnect(id);
    }
}

/// Lock a frame for writing
///
/// # Safety
/// Caller must ensure ptr is valid. frame_out must be a valid pointer.
#[no_mangle]
pub unsafe extern "C" fn obs_video_output_lock_frame(
    ptr: *mut OBSVideoOutput,
    frame_out: *mut CVideoFrame,
    count: c_int,
    timestamp: u64,
) -> bool {
    let Some(handle) = handle(ptr) else {
        return false;
    };
    if frame_out.is_null() {
        return false;
    }

    let Some(frame) = handle.output.lock_frame(count.max(1) as u32, timestamp) else {
        return false;
    };

    (*frame_out).data = frame.data;
    (*frame_out).linesize = frame.linesize;
    (*frame_out).width = frame.width;
    (*frame_out).height = frame.height;
    (*frame_out).format = frame.format as u32;
    (*frame_out).timestamp = frame.timestamp;
    true
}

/// Publish the locked frame
///
/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn obs_video_output_unlock_frame(ptr: *mut OBSVideoOutput) {
    if let Some(handle) = handle(ptr) {
        handle.output.unlock_frame();
    }
}

/// Pause or resume delivery to consumers
///
/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn obs_video_output_set_paused(ptr: *mut OBSVideoOutput, paused: bool) {
    if let Some(handle) = handle(ptr) {
        handle.output.set_paused(paused);
    }
}

/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn obs_video_output_active(ptr: *const OBSVideoOutput) -> bool {
    handle(ptr).is_some_and(|handle| handle.output.active())
}

/// True once the output is closing; also true for null
///
/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn obs_video_output_stopped(ptr: *const OBSVideoOutput) -> bool {
    handle(ptr).map_or(true, |handle| handle.output.stopped())
}

/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn obs_video_output_get_format(ptr: *const OBSVideoOutput) -> u32 {
    handle(ptr).map_or(VideoFormat::None, |handle| handle.output.format()) as u32
}

/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn obs_video_output_get_width(ptr: *const OBSVideoOutput) -> u32 {
    handle(ptr).map_or(0, |handle| handle.output.width())
}

/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn obs_video_output_get_height(ptr: *const OBSVideoOutput) -> u32 {
    handle(ptr).map_or(0, |handle| handle.output.height())
}

/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn obs_video_output_get_frame_rate(ptr: *const OBSVideoOutput) -> f64 {
    handle(ptr).map_or(0.0, |handle| handle.output.frame_rate())
}

/// Nanoseconds between frames
///
/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn obs_video_output_get_frame_time(ptr: *const OBSVideoOutput) -> u64 {
    handle(ptr).map_or(0, |handle| handle.output.frame_time())
}

/// Get skipped frames count
///
/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn obs_video_output_get_skipped_frames(ptr: *const OBSVideoOutput) -> u64 {
    handle(ptr).map_or(0, |handle| handle.output.skipped_frames())
}

/// Get total frames count
///
/// # Safety
/// Caller must ensure ptr is valid.
#[no_mangle]
pub unsafe extern "C" fn obs_video_output_get_total_frames(ptr: *const OBSVideoOutput) -> u64 {
    handle(ptr).map_or(0, |handle| handle.output.total_frames())
}
