//! Consumers connected to a video output

use crate::error::VideoError;
use crate::frame_buffer::FrameBuffer;
use crate::scaler::{ScaleAlgorithm, ScalerFactory, VideoScaler};
use crate::types::{VideoData, VideoScaleInfo};
use std::fmt;
use std::sync::Arc;

/// Rotating conversion outputs per consumer
pub const MAX_CONVERT_BUFFERS: usize = 3;

/// Receives frames on the dispatch thread.
///
/// `deliver` runs while the consumer list is locked and delays every other
/// consumer as well as slot retirement, so it must return quickly.
pub trait VideoConsumer: Send + Sync {
    fn deliver(&self, frame: &VideoData<'_>);
}

impl<F> VideoConsumer for F
where
    F: Fn(&VideoData<'_>) + Send + Sync,
{
    fn deliver(&self, frame: &VideoData<'_>) {
        self(frame)
    }
}

/// Handle returned by `connect`, used to disconnect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId(pub(crate) u64);

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "consumer#{}", self.0)
    }
}

pub(crate) struct VideoInput {
    pub(crate) id: ConsumerId,
    pub(crate) conversion: VideoScaleInfo,
    scaler: Option<Box<dyn VideoScaler>>,
    frames: Vec<FrameBuffer>,
    cur_frame: usize,
    consumer: Arc<dyn VideoConsumer>,
}

impl VideoInput {
    /// Build an input converting from `native` to `conversion`.
    ///
    /// A scaler and its buffers are only created when format or size differ.
    pub(crate) fn new(
        id: ConsumerId,
        conversion: VideoScaleInfo,
        native: &VideoScaleInfo,
        consumer: Arc<dyn VideoConsumer>,
        factory: &dyn ScalerFactory,
    ) -> Result<Self, VideoError> {
        let mut input = VideoInput {
            id,
            conversion,
            scaler: None,
            frames: Vec::new(),
            cur_frame: 0,
            consumer,
        };

        if !conversion.same_geometry(native) {
            let scaler = factory
                .create(&conversion, native, ScaleAlgorithm::FastBilinear)
                .inspect_err(|err| log::error!("video-io: scaler for {id} failed: {err} ({conversion:?})"))?;

            input.frames = (0..MAX_CONVERT_BUFFERS)
                .map(|_| FrameBuffer::new(conversion.format, conversion.width, conversion.height))
                .collect::<Result<_, _>>()?;
            input.scaler = Some(scaler);
        }

        Ok(input)
    }

    pub(crate) fn has_scaler(&self) -> bool {
        self.scaler.is_some()
    }

    pub(crate) fn is_consumer(&self, consumer: &Arc<dyn VideoConsumer>) -> bool {
        same_consumer(&self.consumer, consumer)
    }

    /// Convert if needed and hand the frame to the consumer.
    ///
    /// Returns false if conversion failed; the consumer is skipped for this frame.
    pub(crate) fn deliver(&mut self, src: &VideoData<'_>) -> bool {
        let Some(scaler) = self.scaler.as_mut() else {
            self.consumer.deliver(src);
            return true;
        };

        self.cur_frame = (self.cur_frame + 1) % MAX_CONVERT_BUFFERS;
        let buffer = &mut self.frames[self.cur_frame];

        if !scaler.scale(buffer, src) {
            log::warn!("video-io: Could not scale frame for {}", self.id);
            return false;
        }

        self.consumer.deliver(&buffer.data(src.timestamp));
        true
    }
}

/// Identity of the shared consumer object, ignoring vtable differences
pub(crate) fn same_consumer(a: &Arc<dyn VideoConsumer>, b: &Arc<dyn VideoConsumer>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
