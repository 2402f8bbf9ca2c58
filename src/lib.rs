//! Tagcam: V4L2 capture pipeline for fiducial-marker tracking.
//!
//! This library negotiates a packed YUYV format with a V4L2 capture device,
//! shares a fixed pool of memory-mapped buffers with the driver, and drives
//! the queue/dequeue/requeue streaming protocol. Dequeued frames are converted
//! to luminance for a marker detector and the selected marker is reported as a
//! two-byte telemetry record.
//!
//! Device access sits behind the [`CameraDevice`] trait, enabling both
//! production use with real hardware and testing with mock devices.

pub mod convert;
pub mod detect;
pub mod device;
pub mod negotiate;
pub mod pnm;
pub mod pool;
pub mod retry;
pub mod stream;
pub mod telemetry;
pub mod traits;
pub mod validation;

#[cfg(test)]
pub mod mock;

pub use convert::{rgb_to_luma, yuyv_to_luma, yuyv_to_rgb, LumaImage, RgbImage};
pub use detect::{select_marker, AcceptPolicy, Detection, Detector, NullDetector};
pub use device::V4L2Device;
pub use negotiate::{negotiate, DeviceHandle};
pub use pool::{BufferPool, SlotState};
pub use retry::RetryPolicy;
pub use stream::{CaptureSession, RawFrame, StreamState};
pub use telemetry::{MarkerReport, TelemetrySink, UdpSink};
pub use traits::{
    CameraDevice, CameraError, DeviceCapabilities, Format, FourCC, FrameMetadata, Outcome,
};
