//! Fixed-capacity frame cache shared by the producer and the dispatch thread
//!
//! Slots form a ring. `first_added` is the oldest slot awaiting dispatch,
//! `last_added` the most recently written one. All bookkeeping sits behind
//! a single mutex (the cache lock); pixel storage lives outside it and is
//! only ever lent out by descriptor.

use crate::error::VideoError;
use crate::frame_buffer::FrameBuffer;
use crate::types::{VideoFrame, VideoOutputInfo, MAX_CACHE_SIZE};
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, Default)]
struct SlotInfo {
    timestamp: u64,
    /// Dispatch passes left before the slot is retired
    count: u32,
    /// Overrun writes merged into this slot
    skipped: u32,
}

struct CacheState {
    slots: Vec<SlotInfo>,
    available_frames: usize,
    first_added: usize,
    last_added: usize,
    /// A slot was acquired and `commit` has not been called yet
    write_pending: bool,
}

/// One planned dispatch pass over the oldest slot
#[derive(Debug, Clone, Copy)]
pub struct DispatchPass {
    /// Descriptor of the oldest slot, stamped with its current timestamp
    pub frame: VideoFrame,
    /// Merged overrun pass: account for it, deliver nothing
    pub skip: bool,
}

/// Outcome of retiring one dispatch pass against the oldest slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotRelease {
    /// The slot is free again
    Complete,
    /// The slot stays; the pass was a merged overrun and delivered nothing
    Skipped,
    /// The slot stays and will be delivered again
    Repeat,
}

impl SlotRelease {
    pub fn is_complete(self) -> bool {
        self == SlotRelease::Complete
    }
}

pub struct FrameCache {
    buffers: Vec<FrameBuffer>,
    state: Mutex<CacheState>,
}

impl FrameCache {
    /// Allocate `info.cache_size` slots (clamped to [`MAX_CACHE_SIZE`], at least one)
    pub fn new(info: &VideoOutputInfo) -> Result<Self, VideoError> {
        let capacity = info.cache_size.clamp(1, MAX_CACHE_SIZE);

        let buffers = (0..capacity)
            .map(|_| FrameBuffer::new(info.format, info.width, info.height))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FrameCache {
            buffers,
            state: Mutex::new(CacheState {
                slots: vec![SlotInfo::default(); capacity],
                available_frames: capacity,
                first_added: 0,
                last_added: 0,
                write_pending: false,
            }),
        })
    }

    pub fn capacity(&self) -> usize {
        self.buffers.len()
    }

    pub fn available_frames(&self) -> usize {
        self.state.lock().available_frames
    }

    /// Slots published to the dispatch thread and not yet retired
    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> usize {
        self.capacity() - self.available_frames()
    }

    /// Reserve the next slot for the producer.
    ///
    /// With no free slot the write is merged into the tail slot: its pending
    /// and skip counts both grow by `count` and `None` is returned.
    pub fn acquire(&self, count: u32, timestamp: u64) -> Option<VideoFrame> {
        let count = count.max(1);
        let capacity = self.capacity();
        let mut state = self.state.lock();

        if state.available_frames == 0 {
            let tail = state.last_added;
            let slot = &mut state.slots[tail];
            slot.count = slot.count.saturating_add(count);
            slot.skipped = slot.skipped.saturating_add(count);
            return None;
        }

        if state.available_frames != capacity {
            state.last_added = (state.last_added + 1) % capacity;
        }

        let index = state.last_added;
        state.slots[index] = SlotInfo {
            timestamp,
            count,
            skipped: 0,
        };
        state.write_pending = true;

        let mut frame = self.buffers[index].frame();
        frame.timestamp = timestamp;
        Some(frame)
    }

    /// Publish the slot handed out by the last successful `acquire`.
    ///
    /// Returns false, changing nothing, when no acquire is outstanding.
    pub fn commit(&self) -> bool {
        let mut state = self.state.lock();
        if !state.write_pending {
            return false;
        }

        state.write_pending = false;
        state.available_frames -= 1;
        true
    }

    /// Plan one dispatch pass over the oldest slot.
    ///
    /// Merged overrun passes are skip passes: accounted for, never delivered.
    /// They run before the slot's final delivery, or last when the merge
    /// landed after that delivery was already planned.
    pub fn next_pass(&self) -> DispatchPass {
        let state = self.state.lock();
        let index = state.first_added;
        let slot = state.slots[index];

        let mut frame = self.buffers[index].frame();
        frame.timestamp = slot.timestamp;

        DispatchPass {
            frame,
            skip: slot.skipped > 0 && (slot.count > 1 || slot.count == slot.skipped),
        }
    }

    /// Account for a pass planned by [`FrameCache::next_pass`]
    pub fn release(&self, pass: &DispatchPass, frame_time: u64) -> SlotRelease {
        let capacity = self.capacity();
        let mut state = self.state.lock();

        let index = state.first_added;
        let slot = &mut state.slots[index];
        slot.timestamp = slot.timestamp.wrapping_add(frame_time);
        slot.count = slot.count.saturating_sub(1);
        if pass.skip {
            slot.skipped = slot.skipped.saturating_sub(1);
        }

        if slot.count == 0 {
            state.first_added = (state.first_added + 1) % capacity;
            state.available_frames += 1;
            if state.available_frames == capacity {
                state.last_added = state.first_added;
            }
            SlotRelease::Complete
        } else if pass.skip {
            SlotRelease::Skipped
        } else {
            SlotRelease::Repeat
        }
    }
}
