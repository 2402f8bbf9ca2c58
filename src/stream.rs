//! Streaming state machine: enqueue, start, dequeue/requeue, stop.

use tracing::{debug, info, trace, warn};

use crate::negotiate::DeviceHandle;
use crate::pool::{BufferPool, SlotState};
use crate::retry::RetryPolicy;
use crate::traits::{CameraDevice, CameraError, FrameMetadata, Outcome, Result};

/// Lifecycle of a [`CaptureSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Pool allocated, nothing queued.
    Idle,
    /// Every slot queued to the device.
    Enqueued,
    /// Device producing frames into queued slots.
    Streaming,
    /// Stream switched off; every slot back with the user.
    Stopped,
}

/// Read-only view of a dequeued buffer.
///
/// Borrows the session, so it cannot outlive the slot's user-owned window:
/// requeueing needs the session mutably.
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    index: u32,
    data: &'a [u8],
    metadata: FrameMetadata,
}

impl<'a> RawFrame<'a> {
    /// Slot the frame lives in.
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Raw packed YUYV bytes.
    pub const fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Length of the frame in bytes.
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the frame holds no bytes.
    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Driver metadata for the frame.
    pub const fn metadata(&self) -> &FrameMetadata {
        &self.metadata
    }
}

/// Drives the queue/dequeue/requeue protocol over a device and its pool.
///
/// The session borrows both for its whole lifetime, so the pool cannot be
/// released and the device cannot be closed while buffers may still be
/// queued. Dropping a session that is still streaming switches the stream off.
pub struct CaptureSession<'a, D: CameraDevice> {
    handle: &'a mut DeviceHandle<D>,
    pool: &'a mut BufferPool<D::Mapping>,
    policy: RetryPolicy,
    state: StreamState,
}

impl<'a, D: CameraDevice> CaptureSession<'a, D> {
    /// Create an idle session. `policy` governs every retry of a busy device.
    pub fn new(
        handle: &'a mut DeviceHandle<D>,
        pool: &'a mut BufferPool<D::Mapping>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            handle,
            pool,
            policy,
            state: StreamState::Idle,
        }
    }

    /// Current state.
    pub const fn state(&self) -> StreamState {
        self.state
    }

    /// The pool driven by this session.
    pub fn pool(&self) -> &BufferPool<D::Mapping> {
        self.pool
    }

    fn require(&self, operation: &'static str, allowed: &[StreamState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(CameraError::InvalidTransition {
                operation,
                state: self.state,
            })
        }
    }

    /// Queue every slot to the device.
    ///
    /// All or nothing: when a slot cannot be queued, the slots queued before
    /// it are taken back with a stream-off and the session ends up `Stopped`,
    /// ready for another `enqueue_all`.
    pub fn enqueue_all(&mut self) -> Result<()> {
        self.require("enqueue", &[StreamState::Idle, StreamState::Stopped])?;

        let from = [SlotState::Free, SlotState::OwnedByUser];
        for index in 0..self.slot_count() {
            self.pool.expect_state(index, &from)?;
        }
        for index in 0..self.slot_count() {
            if let Err(err) = self.queue_with_retry(index) {
                self.unwind_enqueue();
                return Err(err);
            }
            self.pool
                .transition(index, &from, SlotState::QueuedToDevice)?;
        }

        debug!(count = self.pool.len(), "queued all buffers");
        self.state = StreamState::Enqueued;
        Ok(())
    }

    /// Take back the slots queued by an `enqueue_all` that failed midway.
    fn unwind_enqueue(&mut self) {
        if self.pool.indices_in(SlotState::QueuedToDevice).is_empty() {
            return;
        }

        match self.handle.device_mut().stream_off() {
            Ok(()) => {
                if let Err(err) = self.reclaim_queued() {
                    warn!("failed to reclaim queued buffers: {err}");
                }
                self.state = StreamState::Stopped;
            }
            Err(err) => {
                // The device still holds them; stop() or drop retries.
                warn!("failed to take back partially queued buffers: {err}");
                self.state = StreamState::Enqueued;
            }
        }
    }

    /// Switch the stream on.
    ///
    /// A failure is fatal for the session: the device state is unknown and
    /// starting again could double-start it.
    pub fn start(&mut self) -> Result<()> {
        self.require("start", &[StreamState::Enqueued])?;
        self.handle.device_mut().stream_on()?;

        info!(buffers = self.pool.len(), "capture stream started");
        self.state = StreamState::Streaming;
        Ok(())
    }

    /// Try once to take a filled buffer from the device.
    ///
    /// Returns [`Outcome::WouldBlock`] immediately when no frame is ready.
    pub fn dequeue_one(&mut self) -> Result<Outcome<u32>> {
        self.require("dequeue", &[StreamState::Streaming])?;

        let Outcome::Ready(buffer) = self.handle.device_mut().dequeue_buffer()? else {
            trace!("no frame ready");
            return Ok(Outcome::WouldBlock);
        };

        self.pool.transition(
            buffer.index,
            &[SlotState::QueuedToDevice],
            SlotState::OwnedByUser,
        )?;
        self.pool.set_metadata(buffer.index, buffer.metadata)?;

        trace!(
            index = buffer.index,
            sequence = buffer.metadata.sequence,
            bytes_used = buffer.metadata.bytes_used,
            "dequeued buffer"
        );
        Ok(Outcome::Ready(buffer.index))
    }

    /// Dequeue the next frame, polling a busy device according to the policy.
    pub fn next_frame(&mut self) -> Result<u32> {
        let policy = self.policy;
        policy.run(|| self.dequeue_one())
    }

    /// View of a dequeued slot.
    pub fn frame(&self, index: u32) -> Result<RawFrame<'_>> {
        let slot = self.pool.get(index)?;
        let data = slot.frame_bytes().ok_or(CameraError::InvalidSlot {
            index,
            state: slot.state(),
        })?;

        Ok(RawFrame {
            index,
            data,
            metadata: *slot.metadata(),
        })
    }

    /// Hand a dequeued slot back to the device.
    ///
    /// The slot must be owned by the user; anything else is refused without
    /// touching the device. Transient rejection is retried per the policy.
    pub fn requeue_one(&mut self, index: u32) -> Result<()> {
        self.require("requeue", &[StreamState::Streaming])?;
        self.pool.expect_state(index, &[SlotState::OwnedByUser])?;

        self.queue_with_retry(index)?;
        self.pool
            .transition(index, &[SlotState::OwnedByUser], SlotState::QueuedToDevice)?;

        trace!(index, "requeued buffer");
        Ok(())
    }

    /// Switch the stream off. The device gives every queued buffer back.
    pub fn stop(&mut self) -> Result<()> {
        self.require("stop", &[StreamState::Enqueued, StreamState::Streaming])?;
        self.handle.device_mut().stream_off()?;
        self.reclaim_queued()?;

        info!("capture stream stopped");
        self.state = StreamState::Stopped;
        Ok(())
    }

    fn reclaim_queued(&mut self) -> Result<()> {
        for index in self.pool.indices_in(SlotState::QueuedToDevice) {
            self.pool
                .transition(index, &[SlotState::QueuedToDevice], SlotState::OwnedByUser)?;
        }
        Ok(())
    }

    fn queue_with_retry(&mut self, index: u32) -> Result<()> {
        let policy = self.policy;
        let device = self.handle.device_mut();
        policy.run(|| {
            let outcome = device.queue_buffer(index)?;
            if outcome.is_would_block() {
                debug!(index, "device busy, buffer not queued yet");
            }
            Ok(outcome)
        })
    }

    #[allow(clippy::cast_possible_truncation)]
    fn slot_count(&self) -> u32 {
        // Pools are built from a u32 count.
        self.pool.len() as u32
    }
}

impl<D: CameraDevice> Drop for CaptureSession<'_, D> {
    fn drop(&mut self) {
        if matches!(self.state, StreamState::Enqueued | StreamState::Streaming) {
            if let Err(err) = self.stop() {
                warn!("failed to stop capture stream on drop: {err}");
            }
        }
    }
}
