//! Core traits and types for the capture device boundary.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::pool::SlotState;
use crate::stream::StreamState;

/// Pixel format representation (e.g., YUYV, MJPG).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// YUYV pixel format (4:2:2 packed).
    pub const YUYV: Self = Self::new(b"YUYV");
    /// MJPEG pixel format (Motion JPEG).
    pub const MJPG: Self = Self::new(b"MJPG");
}

impl std::fmt::Display for FourCC {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in self.0 {
            write!(f, "{}", char::from(byte))?;
        }
        Ok(())
    }
}

impl From<v4l::FourCC> for FourCC {
    fn from(fourcc: v4l::FourCC) -> Self {
        Self(fourcc.repr)
    }
}

impl From<FourCC> for v4l::FourCC {
    fn from(fourcc: FourCC) -> Self {
        Self::new(&fourcc.0)
    }
}

/// Video format specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Format {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format.
    pub fourcc: FourCC,
    /// Bytes per line (stride).
    pub stride: u32,
    /// Total frame size in bytes.
    pub size: u32,
}

impl Format {
    /// Create a new format specification.
    ///
    /// Stride and size saturate at `u32::MAX`; use [`Format::checked`] to
    /// reject resolutions whose frame size does not fit.
    #[must_use]
    pub const fn new(width: u32, height: u32, fourcc: FourCC) -> Self {
        let stride = width.saturating_mul(2); // YUYV is 2 bytes per pixel
        let size = stride.saturating_mul(height);
        Self {
            width,
            height,
            fourcc,
            stride,
            size,
        }
    }

    /// Like [`Format::new`], but `None` when stride or size overflows `u32`.
    #[must_use]
    pub fn checked(width: u32, height: u32, fourcc: FourCC) -> Option<Self> {
        let stride = width.checked_mul(2)?;
        let size = stride.checked_mul(height)?;
        Some(Self {
            width,
            height,
            fourcc,
            stride,
            size,
        })
    }

    /// Length in bytes of one packed YUYV frame at this resolution.
    #[must_use]
    pub const fn yuyv_frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 2
    }
}

/// Device capability flags.
#[derive(Debug, Clone, Default)]
pub struct DeviceCapabilities {
    /// Driver name.
    pub driver: String,
    /// Card/device name.
    pub card: String,
    /// Bus information.
    pub bus_info: String,
    /// Whether the device can capture video.
    pub can_capture: bool,
    /// Whether the device supports streaming (memory-mapped) I/O.
    pub can_stream: bool,
}

/// Metadata for a captured frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameMetadata {
    /// Frame sequence number.
    pub sequence: u32,
    /// Capture timestamp.
    pub timestamp: Duration,
    /// Actual bytes used in the frame buffer.
    pub bytes_used: u32,
}

/// Kernel-side description of one buffer slot, as returned by a buffer query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    /// Slot index.
    pub index: u32,
    /// Length of the buffer in bytes.
    pub length: u32,
    /// Offset to pass to `mmap` for this buffer.
    pub offset: u32,
}

/// A buffer handed back by the driver on dequeue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DequeuedBuffer {
    /// Slot index the driver filled.
    pub index: u32,
    /// Frame metadata reported by the driver.
    pub metadata: FrameMetadata,
}

/// Result of a non-blocking device operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The operation completed.
    Ready(T),
    /// The device could not complete the operation right now (EAGAIN).
    WouldBlock,
}

impl<T> Outcome<T> {
    /// Returns the ready value, if any.
    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::WouldBlock => None,
        }
    }

    /// Whether the operation has to be retried later.
    pub const fn is_would_block(&self) -> bool {
        matches!(self, Self::WouldBlock)
    }
}

/// Error type for camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    /// Failed to open the device node.
    #[error("Failed to open device {path}: {source}")]
    DeviceOpen {
        /// Device path that was opened.
        path: String,
        /// Underlying OS error.
        source: io::Error,
    },
    /// The device lacks a capability this crate depends on.
    #[error("Unsupported device: {0}")]
    UnsupportedDevice(String),
    /// The device rejected the requested capture format.
    #[error("Format negotiation failed: {0}")]
    FormatNegotiation(String),
    /// The device rejected memory-mapped streaming.
    #[error("Memory-mapped streaming not supported: {0}")]
    StreamingUnsupported(String),
    /// A buffer count the pool cannot be built from.
    #[error("Invalid buffer count: {0}")]
    InvalidBufferCount(u32),
    /// The device granted fewer buffers than requested.
    #[error("Requested {requested} buffers but received {granted}")]
    PartialAllocation {
        /// Buffers requested.
        requested: u32,
        /// Buffers granted by the driver.
        granted: u32,
    },
    /// Querying a buffer slot failed.
    #[error("Failed to query buffer {index}: {source}")]
    BufferQuery {
        /// Slot index.
        index: u32,
        /// Underlying OS error.
        source: io::Error,
    },
    /// Mapping a buffer slot failed.
    #[error("Failed to map buffer {index}: {source}")]
    BufferMap {
        /// Slot index.
        index: u32,
        /// Underlying OS error.
        source: io::Error,
    },
    /// Stream-on failed.
    #[error("Failed to start stream: {0}")]
    StreamStart(io::Error),
    /// Stream-off failed.
    #[error("Failed to stop stream: {0}")]
    StreamStop(io::Error),
    /// Fatal error while dequeuing a buffer.
    #[error("Failed to dequeue buffer: {0}")]
    Dequeue(io::Error),
    /// Fatal error while queuing a buffer.
    #[error("Failed to queue buffer {index}: {source}")]
    Queue {
        /// Slot index.
        index: u32,
        /// Underlying OS error.
        source: io::Error,
    },
    /// Raw frame length does not match the destination image.
    #[error("Buffer length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        /// Length implied by the destination dimensions.
        expected: usize,
        /// Length actually provided.
        actual: usize,
    },
    /// Image dimensions that cannot hold a converted frame.
    #[error("Invalid image: {0}")]
    InvalidImage(String),
    /// A slot was used from the wrong ownership state.
    #[error("Buffer {index} is {state:?}")]
    InvalidSlot {
        /// Slot index.
        index: u32,
        /// State the slot was in.
        state: SlotState,
    },
    /// A slot index outside the pool.
    #[error("Buffer index {index} out of range for pool of {count}")]
    SlotOutOfRange {
        /// Slot index.
        index: u32,
        /// Number of slots in the pool.
        count: usize,
    },
    /// A streaming operation was called from the wrong state.
    #[error("Cannot {operation} while {state:?}")]
    InvalidTransition {
        /// Operation attempted.
        operation: &'static str,
        /// Session state at the time.
        state: StreamState,
    },
    /// A retry policy gave up.
    #[error("Gave up after {attempts} attempts in {elapsed:?}")]
    RetryExhausted {
        /// Attempts made.
        attempts: u32,
        /// Time spent retrying.
        elapsed: Duration,
    },
    /// Sending a telemetry record failed.
    #[error("Telemetry error: {0}")]
    Telemetry(io::Error),
    /// A frame did not match the expected test pattern.
    #[error("Validation failed: {0}")]
    Validation(String),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for camera operations.
pub type Result<T> = std::result::Result<T, CameraError>;

/// A memory region mapped from a device buffer.
///
/// Dropping the value unmaps the region.
pub trait MappedBuffer {
    /// The mapped bytes.
    fn as_slice(&self) -> &[u8];

    /// Length of the mapping in bytes.
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Whether the mapping is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Raw streaming primitives of a video capture device.
///
/// Implementations translate each method into one device control request.
/// Buffer ownership bookkeeping lives above this trait, in
/// [`BufferPool`](crate::pool::BufferPool) and
/// [`CaptureSession`](crate::stream::CaptureSession).
pub trait CameraDevice {
    /// Mapping type produced by [`CameraDevice::map_buffer`].
    type Mapping: MappedBuffer;

    /// Get device capabilities.
    fn capabilities(&self) -> &DeviceCapabilities;

    /// Get current format.
    fn format(&self) -> Result<Format>;

    /// Set capture format (progressive). Returns the format reported by the driver.
    fn set_format(&mut self, format: &Format) -> Result<Format>;

    /// Request `count` memory-mapped buffers. Returns the number granted.
    fn request_buffers(&mut self, count: u32) -> Result<u32>;

    /// Query length and mapping offset of one buffer.
    fn query_buffer(&self, index: u32) -> Result<BufferInfo>;

    /// Map a queried buffer into the process.
    fn map_buffer(&self, info: &BufferInfo) -> Result<Self::Mapping>;

    /// Hand a buffer to the driver.
    fn queue_buffer(&mut self, index: u32) -> Result<Outcome<()>>;

    /// Take back a filled buffer without blocking.
    fn dequeue_buffer(&mut self) -> Result<Outcome<DequeuedBuffer>>;

    /// Start streaming.
    fn stream_on(&mut self) -> Result<()>;

    /// Stop streaming. The driver releases every queued buffer.
    fn stream_off(&mut self) -> Result<()>;
}
