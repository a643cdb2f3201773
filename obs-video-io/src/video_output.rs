//! Video output pipeline
//!
//! One producer publishes frames into a fixed ring of cache slots; a
//! dedicated dispatch thread drains the oldest slot, converts it for every
//! connected consumer and retires it.
//!
//! Locking: the cache lock (slot bookkeeping, inside [`FrameCache`]) and the
//! registry lock (consumer list) are never held at the same time. The
//! dispatch thread takes the registry lock for a whole fan-out pass and the
//! cache lock only to read or retire slot state.

use crate::cache::FrameCache;
use crate::error::VideoError;
use crate::format_conversion::SoftwareScalerFactory;
use crate::input::{ConsumerId, VideoConsumer, VideoInput};
use crate::scaler::ScalerFactory;
use crate::signal::WorkSignal;
use crate::stats::{frame_time_ns, SkipReport, VideoOutputStats};
use crate::types::{VideoFormat, VideoFrame, VideoOutputInfo, VideoScaleInfo, MAX_CACHE_SIZE};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// State shared with the dispatch thread
struct Shared {
    frame_time: u64,
    cache: FrameCache,
    inputs: Mutex<Vec<VideoInput>>,
    /// Length of `inputs`, written under the registry lock and read without it
    consumers: AtomicUsize,
    signal: WorkSignal,
    stop: AtomicBool,
    paused: AtomicBool,
    total_frames: AtomicU64,
    skipped_frames: AtomicU64,
}

impl Shared {
    /// One dispatch pass over the oldest slot. Returns true once the slot is retired.
    fn output_cur_frame(&self) -> bool {
        let pass = self.cache.next_pass();

        if !pass.skip && !self.paused.load(Ordering::Acquire) {
            // SAFETY: the oldest slot is in flight, so the producer cannot be
            // writing it, and the cache outlives this pass.
            let data = unsafe { pass.frame.as_data() };

            let mut inputs = self.inputs.lock();
            for input in inputs.iter_mut() {
                input.deliver(&data);
            }
        }

        let released = self.cache.release(&pass, self.frame_time);

        if pass.skip {
            self.skipped_frames.fetch_add(1, Ordering::Relaxed);
        } else {
            self.total_frames.fetch_add(1, Ordering::Relaxed);
        }

        released.is_complete()
    }
}

fn video_thread(shared: Arc<Shared>) {
    while shared.signal.wait() {
        if shared.stop.load(Ordering::Acquire) {
            break;
        }

        // A slot may need several passes (repeat count or merged overruns)
        while !shared.stop.load(Ordering::Acquire) && !shared.output_cur_frame() {}
    }

    log::info!("Video output thread exiting");
}

/// A video output with its frame cache, consumers and dispatch thread
pub struct VideoOutput {
    info: VideoOutputInfo,
    native: VideoScaleInfo,
    shared: Arc<Shared>,
    scaler_factory: Arc<dyn ScalerFactory>,
    next_id: AtomicU64,
    thread_handle: Option<JoinHandle<()>>,
    initialized: bool,
}

impl VideoOutput {
    /// Open an output using the built-in software scaler
    pub fn open(info: VideoOutputInfo) -> Result<Self, VideoError> {
        Self::open_with_scaler(info, Arc::new(SoftwareScalerFactory))
    }

    /// Open an output that creates consumer scalers through `scaler_factory`
    pub fn open_with_scaler(
        mut info: VideoOutputInfo,
        scaler_factory: Arc<dyn ScalerFactory>,
    ) -> Result<Self, VideoError> {
        if !info.is_valid() {
            return Err(VideoError::InvalidParam);
        }

        info.cache_size = info.cache_size.clamp(1, MAX_CACHE_SIZE);

        let shared = Arc::new(Shared {
            frame_time: frame_time_ns(info.fps_num, info.fps_den),
            cache: FrameCache::new(&info)?,
            inputs: Mutex::new(Vec::new()),
            consumers: AtomicUsize::new(0),
            signal: WorkSignal::new(),
            stop: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            total_frames: AtomicU64::new(0),
            skipped_frames: AtomicU64::new(0),
        });

        let mut output = VideoOutput {
            native: info.scale_info(),
            info,
            shared,
            scaler_factory,
            next_id: AtomicU64::new(1),
            thread_handle: None,
            initialized: false,
        };

        // On failure `output` is dropped, which runs the regular close path
        output.spawn_video_thread()?;

        log::debug!(
            "video-io: opened '{}' {:?} {}x{} @ {}/{} ({} cache slots)",
            output.info.name,
            output.info.format,
            output.info.width,
            output.info.height,
            output.info.fps_num,
            output.info.fps_den,
            output.info.cache_size
        );

        Ok(output)
    }

    fn spawn_video_thread(&mut self) -> Result<(), VideoError> {
        let shared = self.shared.clone();
        let core = self.info.dispatch_core;

        let handle = thread::Builder::new()
            .name(format!("video-io: {}", self.info.name))
            .spawn(move || {
                if let Some(id) = core {
                    if !core_affinity::set_for_current(core_affinity::CoreId { id }) {
                        log::warn!("video-io: could not pin video thread to core {id}");
                    }
                }
                video_thread(shared);
            })?;

        self.thread_handle = Some(handle);
        self.initialized = true;
        Ok(())
    }

    /// Stop the dispatch thread and wait for it to exit
    fn stop(&mut self) {
        if !self.initialized {
            return;
        }

        self.initialized = false;
        self.shared.stop.store(true, Ordering::Release);
        self.shared.signal.post();

        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                log::error!("video-io: video thread panicked");
            }
        }
    }

    /// Stop dispatching and release every consumer.
    ///
    /// Must not be called from inside a consumer's `deliver`.
    pub fn close(&mut self) {
        self.stop();

        let inputs = {
            let mut inputs = self.shared.inputs.lock();
            self.shared.consumers.store(0, Ordering::Release);
            std::mem::take(&mut *inputs)
        };
        drop(inputs);
    }

    /// Register a consumer.
    ///
    /// `conversion` of `None` means the native format. A zero width or height
    /// in `conversion` is replaced by the native one. Fails without side
    /// effects if the consumer is already connected or no scaler can be built.
    pub fn connect(
        &self,
        conversion: Option<&VideoScaleInfo>,
        consumer: Arc<dyn VideoConsumer>,
    ) -> Result<ConsumerId, VideoError> {
        let mut inputs = self.shared.inputs.lock();

        if inputs.iter().any(|input| input.is_consumer(&consumer)) {
            return Err(VideoError::AlreadyConnected);
        }

        let conversion = self.resolve_conversion(conversion);
        let id = ConsumerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let input = VideoInput::new(
            id,
            conversion,
            &self.native,
            consumer,
            self.scaler_factory.as_ref(),
        )?;

        // First consumer opens a fresh measurement window
        if inputs.is_empty() {
            self.shared.skipped_frames.store(0, Ordering::Relaxed);
            self.shared.total_frames.store(0, Ordering::Relaxed);
        }

        log::debug!(
            "video-io: connected {id} as {:?} {}x{} (scaled: {})",
            input.conversion.format,
            input.conversion.width,
            input.conversion.height,
            input.has_scaler()
        );

        inputs.push(input);
        self.shared.consumers.store(inputs.len(), Ordering::Release);
        Ok(id)
    }

    fn resolve_conversion(&self, conversion: Option<&VideoScaleInfo>) -> VideoScaleInfo {
        let mut resolved = conversion.copied().unwrap_or(self.native);
        if resolved.width == 0 {
            resolved.width = self.native.width;
        }
        if resolved.height == 0 {
            resolved.height = self.native.height;
        }
        resolved
    }

    /// Remove a consumer. Unknown ids are ignored; returns whether one was removed.
    pub fn disconnect(&self, id: ConsumerId) -> bool {
        let mut inputs = self.shared.inputs.lock();

        let Some(idx) = inputs.iter().position(|input| input.id == id) else {
            return false;
        };
        let input = inputs.remove(idx);
        self.shared.consumers.store(inputs.len(), Ordering::Release);
        log::debug!(
            "video-io: disconnected {id} ({:?} {}x{})",
            input.conversion.format,
            input.conversion.width,
            input.conversion.height
        );

        if inputs.is_empty() {
            self.report_skips();
        }

        true
    }

    /// Log the skip summary of the measurement window that just ended
    fn report_skips(&self) -> Option<SkipReport> {
        let report = self.stats().skip_report()?;
        log::info!(
            "Video stopped, number of skipped frames due to encoding lag: {}/{} ({:.1}%)",
            report.skipped,
            report.intervals,
            report.percentage
        );
        Some(report)
    }

    /// Reserve the next cache slot for writing.
    ///
    /// `count` is the number of dispatch passes the frame should cover. When
    /// the cache is full the frame is merged into the newest slot, counted as
    /// skipped, and `None` is returned: the producer must not write.
    pub fn lock_frame(&self, count: u32, timestamp: u64) -> Option<VideoFrame> {
        self.shared.cache.acquire(count, timestamp)
    }

    /// Publish the frame reserved by the last successful `lock_frame`
    pub fn unlock_frame(&self) {
        if self.shared.cache.commit() {
            self.shared.signal.post();
        } else {
            log::warn!("video-io: unlock_frame without a locked frame");
        }
    }

    /// While paused, frames are retired on schedule but not delivered
    pub fn set_paused(&self, paused: bool) {
        self.shared.paused.store(paused, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Acquire)
    }

    pub fn info(&self) -> &VideoOutputInfo {
        &self.info
    }

    pub fn format(&self) -> VideoFormat {
        self.info.format
    }

    pub fn width(&self) -> u32 {
        self.info.width
    }

    pub fn height(&self) -> u32 {
        self.info.height
    }

    pub fn frame_rate(&self) -> f64 {
        self.info.fps_num as f64 / self.info.fps_den as f64
    }

    /// Nanoseconds between frames
    pub fn frame_time(&self) -> u64 {
        self.shared.frame_time
    }

    pub fn total_frames(&self) -> u64 {
        self.shared.total_frames.load(Ordering::Relaxed)
    }

    pub fn skipped_frames(&self) -> u64 {
        self.shared.skipped_frames.load(Ordering::Relaxed)
    }

    /// Whether any consumer is connected. Never waits for a delivery pass.
    pub fn active(&self) -> bool {
        self.consumer_count() > 0
    }

    pub fn consumer_count(&self) -> usize {
        self.shared.consumers.load(Ordering::Acquire)
    }

    pub fn stopped(&self) -> bool {
        self.shared.stop.load(Ordering::Acquire)
    }

    /// Get statistics
    pub fn stats(&self) -> VideoOutputStats {
        VideoOutputStats {
            total_frames: self.total_frames(),
            skipped_frames: self.skipped_frames(),
            available_frames: self.shared.cache.available_frames(),
            cache_size: self.shared.cache.capacity(),
            consumers: self.consumer_count(),
        }
    }
}

impl Drop for VideoOutput {
    fn drop(&mut self) {
        self.close();
    }
}
