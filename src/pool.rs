//! Fixed pool of memory-mapped capture buffers.

use tracing::{debug, info};

use crate::negotiate::DeviceHandle;
use crate::traits::{BufferInfo, CameraDevice, CameraError, FrameMetadata, MappedBuffer, Result};

/// Who may touch a buffer slot's memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Mapped but never queued.
    Free,
    /// Owned by the driver, which may be writing into it.
    QueuedToDevice,
    /// Dequeued; user code may read it until it is requeued.
    OwnedByUser,
}

/// One mapped buffer of a [`BufferPool`].
pub struct BufferSlot<M> {
    info: BufferInfo,
    mapping: Option<M>,
    state: SlotState,
    metadata: FrameMetadata,
}

impl<M: MappedBuffer> BufferSlot<M> {
    /// Slot index, stable for the lifetime of the pool.
    pub const fn index(&self) -> u32 {
        self.info.index
    }

    /// Current ownership state.
    pub const fn state(&self) -> SlotState {
        self.state
    }

    /// Kernel-side length and offset of this slot.
    pub const fn info(&self) -> &BufferInfo {
        &self.info
    }

    /// Whether the slot still holds a mapping.
    pub const fn is_mapped(&self) -> bool {
        self.mapping.is_some()
    }

    /// Metadata of the last frame dequeued into this slot.
    pub const fn metadata(&self) -> &FrameMetadata {
        &self.metadata
    }

    /// Bytes of the last frame, only while the slot is owned by the user.
    ///
    /// The length is the driver-reported `bytes_used`, bounded by the
    /// mapping; a driver reporting zero yields the whole mapping.
    pub(crate) fn frame_bytes(&self) -> Option<&[u8]> {
        if self.state != SlotState::OwnedByUser {
            return None;
        }
        let bytes = self.mapping.as_ref()?.as_slice();
        let used = self.metadata.bytes_used as usize;
        if used == 0 || used > bytes.len() {
            Some(bytes)
        } else {
            bytes.get(..used)
        }
    }
}

/// The ordered set of buffer slots shared with a capture device.
///
/// A pool is built all-or-nothing by [`BufferPool::allocate`] and unmapped by
/// [`BufferPool::release`] or on drop.
pub struct BufferPool<M: MappedBuffer> {
    slots: Vec<BufferSlot<M>>,
}

impl<M: MappedBuffer> Default for BufferPool<M> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<M: MappedBuffer> BufferPool<M> {
    /// A pool with no slots.
    #[must_use]
    pub const fn empty() -> Self {
        Self { slots: Vec::new() }
    }

    /// Request exactly `count` buffers from the device and map all of them.
    ///
    /// If the device grants fewer buffers, or any query or mapping fails,
    /// every mapping made so far is undone before the error is returned.
    pub fn allocate<D>(handle: &mut DeviceHandle<D>, count: u32) -> Result<Self>
    where
        D: CameraDevice<Mapping = M>,
    {
        if count == 0 {
            return Err(CameraError::InvalidBufferCount(count));
        }

        let device = handle.device_mut();
        let granted = device.request_buffers(count)?;
        if granted != count {
            return Err(CameraError::PartialAllocation {
                requested: count,
                granted,
            });
        }

        // Dropping `slots` on an early return unmaps everything mapped so far.
        let mut slots = Vec::with_capacity(count as usize);
        for index in 0..count {
            let info = device.query_buffer(index)?;
            let mapping = device.map_buffer(&info)?;
            debug!(index, length = info.length, offset = info.offset, "mapped buffer");

            slots.push(BufferSlot {
                info,
                mapping: Some(mapping),
                state: SlotState::Free,
                metadata: FrameMetadata::default(),
            });
        }

        info!(count, "allocated buffer pool");
        Ok(Self { slots })
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the pool has no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Slot by index.
    pub fn slot(&self, index: u32) -> Option<&BufferSlot<M>> {
        self.slots.get(index as usize)
    }

    /// All slots in index order.
    pub fn slots(&self) -> impl Iterator<Item = &BufferSlot<M>> {
        self.slots.iter()
    }

    /// Ownership state of every slot, in index order.
    pub fn states(&self) -> Vec<SlotState> {
        self.slots.iter().map(|slot| slot.state).collect()
    }

    /// Unmap every slot and empty the pool. Returns the number of regions unmapped.
    ///
    /// Slots without a mapping are skipped. Calling this on an empty or
    /// already released pool does nothing.
    ///
    /// The stream must be stopped first; [`CaptureSession`](crate::stream::CaptureSession)
    /// borrows the pool for as long as it may be streaming.
    pub fn release(&mut self) -> usize {
        let mut unmapped = 0;
        for slot in &mut self.slots {
            if slot.mapping.take().is_some() {
                unmapped += 1;
            }
        }
        self.slots.clear();

        if unmapped > 0 {
            info!(unmapped, "released buffer pool");
        }
        unmapped
    }

    pub(crate) fn get(&self, index: u32) -> Result<&BufferSlot<M>> {
        self.slots
            .get(index as usize)
            .ok_or(CameraError::SlotOutOfRange {
                index,
                count: self.slots.len(),
            })
    }

    fn get_mut(&mut self, index: u32) -> Result<&mut BufferSlot<M>> {
        let count = self.slots.len();
        self.slots
            .get_mut(index as usize)
            .ok_or(CameraError::SlotOutOfRange { index, count })
    }

    /// Check that slot `index` is in one of `allowed` states.
    pub(crate) fn expect_state(&self, index: u32, allowed: &[SlotState]) -> Result<()> {
        let state = self.get(index)?.state;
        if allowed.contains(&state) {
            Ok(())
        } else {
            Err(CameraError::InvalidSlot { index, state })
        }
    }

    /// Move slot `index` to `to`, provided it is currently in one of `from`.
    pub(crate) fn transition(
        &mut self,
        index: u32,
        from: &[SlotState],
        to: SlotState,
    ) -> Result<()> {
        self.expect_state(index, from)?;
        self.get_mut(index)?.state = to;
        Ok(())
    }

    pub(crate) fn set_metadata(&mut self, index: u32, metadata: FrameMetadata) -> Result<()> {
        self.get_mut(index)?.metadata = metadata;
        Ok(())
    }

    /// Indices of slots in `state`.
    pub(crate) fn indices_in(&self, state: SlotState) -> Vec<u32> {
        self.slots
            .iter()
            .filter(|slot| slot.state == state)
            .map(BufferSlot::index)
            .collect()
    }
}

impl<M: MappedBuffer> Drop for BufferPool<M> {
    fn drop(&mut self) {
        self.release();
    }
}
