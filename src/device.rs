//! V4L2 device implementation using the v4l crate.
//!
//! Capability and format handling go through the safe `v4l::Device` API.
//! Buffer requests, queue/dequeue and stream control are issued as raw
//! ioctls so that slot ownership stays visible to [`crate::pool`] and
//! [`crate::stream`] instead of being hidden inside `v4l::io::mmap::Stream`.

#![allow(unsafe_code)]

use std::io;
use std::os::raw::{c_int, c_void};
use std::path::Path;
use std::ptr::{self, NonNull};
use std::sync::Arc;
use std::time::Duration;
use std::{mem, slice};

use tracing::{debug, warn};
use v4l::buffer::Type;
use v4l::capability::Flags;
use v4l::device::Handle;
use v4l::format::FieldOrder;
use v4l::memory::Memory;
use v4l::v4l2;
use v4l::v4l_sys::{v4l2_buffer, v4l2_requestbuffers};
use v4l::video::Capture;
use v4l::Device;

use crate::negotiate::{negotiate, DeviceHandle};
use crate::traits::{
    BufferInfo, CameraDevice, CameraError, DequeuedBuffer, DeviceCapabilities, Format, FourCC,
    FrameMetadata, MappedBuffer, Outcome, Result,
};

/// V4L2 device implementation wrapping the v4l crate.
pub struct V4L2Device {
    device: Device,
    handle: Arc<Handle>,
    capabilities: DeviceCapabilities,
}

impl V4L2Device {
    /// Open a V4L2 device node (e.g. `/dev/video0`) in non-blocking mode.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let open_error = |source: io::Error| CameraError::DeviceOpen {
            path: path.display().to_string(),
            source,
        };

        // `Device::with_path` opens O_RDWR | O_NONBLOCK.
        let device = Device::with_path(path).map_err(open_error)?;
        let caps = device.query_caps().map_err(open_error)?;

        let capabilities = DeviceCapabilities {
            driver: caps.driver,
            card: caps.card,
            bus_info: caps.bus,
            can_capture: caps.capabilities.contains(Flags::VIDEO_CAPTURE),
            can_stream: caps.capabilities.contains(Flags::STREAMING),
        };
        debug!(
            path = %path.display(),
            card = %capabilities.card,
            flags = ?caps.capabilities,
            "opened capture device"
        );

        let handle = device.handle();
        Ok(Self {
            device,
            handle,
            capabilities,
        })
    }

    /// Open `path` and negotiate a YUYV capture format at `width`x`height`.
    pub fn negotiate<P: AsRef<Path>>(
        path: P,
        width: u32,
        height: u32,
    ) -> Result<DeviceHandle<Self>> {
        negotiate(Self::open(path)?, width, height)
    }

    fn fd(&self) -> c_int {
        self.handle.fd()
    }

    fn new_buffer(index: u32) -> v4l2_buffer {
        // SAFETY: v4l2_buffer is a plain C struct for which all-zero is valid.
        let mut buf: v4l2_buffer = unsafe { mem::zeroed() };
        buf.index = index;
        buf.type_ = Type::VideoCapture as u32;
        buf.memory = Memory::Mmap as u32;
        buf
    }

    fn stream_control(&self, request: v4l2::vidioc::_IOC_TYPE) -> io::Result<()> {
        let mut typ = Type::VideoCapture as u32;
        // SAFETY: STREAMON/STREAMOFF read a single u32 buffer type.
        unsafe { v4l2::ioctl(self.fd(), request, ptr::addr_of_mut!(typ).cast::<c_void>()) }
    }
}

fn to_format(fmt: &v4l::Format) -> Format {
    Format {
        width: fmt.width,
        height: fmt.height,
        fourcc: FourCC::from(fmt.fourcc),
        stride: fmt.stride,
        size: fmt.size,
    }
}

impl CameraDevice for V4L2Device {
    type Mapping = MmapRegion;

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn format(&self) -> Result<Format> {
        let fmt = self
            .device
            .format()
            .map_err(|err| CameraError::FormatNegotiation(err.to_string()))?;

        Ok(to_format(&fmt))
    }

    fn set_format(&mut self, format: &Format) -> Result<Format> {
        let mut fmt = self
            .device
            .format()
            .map_err(|err| CameraError::FormatNegotiation(err.to_string()))?;

        fmt.width = format.width;
        fmt.height = format.height;
        fmt.fourcc = format.fourcc.into();
        fmt.field_order = FieldOrder::Progressive;

        let fmt = self
            .device
            .set_format(&fmt)
            .map_err(|err| CameraError::FormatNegotiation(err.to_string()))?;

        Ok(to_format(&fmt))
    }

    fn request_buffers(&mut self, count: u32) -> Result<u32> {
        // SAFETY: v4l2_requestbuffers is a plain C struct for which all-zero is valid.
        let mut req: v4l2_requestbuffers = unsafe { mem::zeroed() };
        req.count = count;
        req.type_ = Type::VideoCapture as u32;
        req.memory = Memory::Mmap as u32;

        // SAFETY: REQBUFS reads and writes a v4l2_requestbuffers.
        unsafe {
            v4l2::ioctl(
                self.fd(),
                v4l2::vidioc::VIDIOC_REQBUFS,
                ptr::addr_of_mut!(req).cast::<c_void>(),
            )
        }
        .map_err(|err| {
            if err.raw_os_error() == Some(libc::EINVAL) {
                CameraError::StreamingUnsupported(err.to_string())
            } else {
                CameraError::Io(err)
            }
        })?;

        Ok(req.count)
    }

    fn query_buffer(&self, index: u32) -> Result<BufferInfo> {
        let mut buf = Self::new_buffer(index);

        // SAFETY: QUERYBUF reads and writes a v4l2_buffer.
        unsafe {
            v4l2::ioctl(
                self.fd(),
                v4l2::vidioc::VIDIOC_QUERYBUF,
                ptr::addr_of_mut!(buf).cast::<c_void>(),
            )
        }
        .map_err(|source| CameraError::BufferQuery { index, source })?;

        Ok(BufferInfo {
            index,
            length: buf.length,
            // SAFETY: for MMAP buffers the driver fills the `offset` member.
            offset: unsafe { buf.m.offset },
        })
    }

    fn map_buffer(&self, info: &BufferInfo) -> Result<MmapRegion> {
        let len = info.length as usize;

        // SAFETY: maps a driver-provided offset/length pair on our own fd.
        #[allow(clippy::cast_lossless, clippy::cast_possible_wrap)]
        let addr = unsafe {
            v4l2::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.fd(),
                info.offset as libc::off_t,
            )
        }
        .map_err(|source| CameraError::BufferMap {
            index: info.index,
            source,
        })?;

        let ptr = NonNull::new(addr.cast::<u8>()).ok_or_else(|| CameraError::BufferMap {
            index: info.index,
            source: io::Error::other("mmap returned null"),
        })?;

        Ok(MmapRegion {
            ptr,
            len,
            _handle: Arc::clone(&self.handle),
        })
    }

    fn queue_buffer(&mut self, index: u32) -> Result<Outcome<()>> {
        let mut buf = Self::new_buffer(index);

        // SAFETY: QBUF reads and writes a v4l2_buffer.
        let ret = unsafe {
            v4l2::ioctl(
                self.fd(),
                v4l2::vidioc::VIDIOC_QBUF,
                ptr::addr_of_mut!(buf).cast::<c_void>(),
            )
        };

        match ret {
            Ok(()) => Ok(Outcome::Ready(())),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(Outcome::WouldBlock),
            Err(source) => Err(CameraError::Queue { index, source }),
        }
    }

    fn dequeue_buffer(&mut self) -> Result<Outcome<DequeuedBuffer>> {
        let mut buf = Self::new_buffer(0);

        // SAFETY: DQBUF reads and writes a v4l2_buffer.
        let ret = unsafe {
            v4l2::ioctl(
                self.fd(),
                v4l2::vidioc::VIDIOC_DQBUF,
                ptr::addr_of_mut!(buf).cast::<c_void>(),
            )
        };

        match ret {
            Ok(()) => {
                // V4L2 timestamps are always non-negative in practice
                #[allow(clippy::cast_sign_loss)]
                let secs = buf.timestamp.tv_sec.max(0) as u64;
                #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
                let nanos = (buf.timestamp.tv_usec.max(0) as u32).saturating_mul(1000);

                Ok(Outcome::Ready(DequeuedBuffer {
                    index: buf.index,
                    metadata: FrameMetadata {
                        sequence: buf.sequence,
                        timestamp: Duration::new(secs, nanos),
                        bytes_used: buf.bytesused,
                    },
                }))
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(Outcome::WouldBlock),
            Err(err) => Err(CameraError::Dequeue(err)),
        }
    }

    fn stream_on(&mut self) -> Result<()> {
        self.stream_control(v4l2::vidioc::VIDIOC_STREAMON)
            .map_err(CameraError::StreamStart)
    }

    fn stream_off(&mut self) -> Result<()> {
        self.stream_control(v4l2::vidioc::VIDIOC_STREAMOFF)
            .map_err(CameraError::StreamStop)
    }
}

/// One `mmap`ed V4L2 buffer.
///
/// Holds a reference to the device handle so the descriptor outlives the
/// mapping. Unmapped on drop.
pub struct MmapRegion {
    ptr: NonNull<u8>,
    len: usize,
    _handle: Arc<Handle>,
}

impl MappedBuffer for MmapRegion {
    fn as_slice(&self) -> &[u8] {
        // SAFETY: `ptr` is a live mapping of `len` bytes until drop. Callers only
        // read it while the slot is dequeued, so the driver is not writing.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for MmapRegion {
    fn drop(&mut self) {
        // SAFETY: the region was returned by mmap with this length and is unmapped once.
        if let Err(err) = unsafe { v4l2::munmap(self.ptr.as_ptr().cast::<c_void>(), self.len) } {
            warn!(len = self.len, "munmap failed: {err}");
        }
    }
}
