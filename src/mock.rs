//! Mock device implementation for testing without hardware.
//!
//! Behaves like a V4L2 driver at the ioctl level: buffers are requested,
//! queried and mapped, queued buffers complete in FIFO order once streaming,
//! and stream-off drops the queue. Failures are scripted with builder methods.

use std::cell::Cell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::time::Duration;

use crate::traits::{
    BufferInfo, CameraDevice, CameraError, DequeuedBuffer, DeviceCapabilities, Format, FourCC,
    FrameMetadata, MappedBuffer, Outcome, Result,
};

const PAGE_SIZE: u32 = 4096;

/// Mock device for testing without hardware.
pub struct MockDevice {
    capabilities: DeviceCapabilities,
    format: Format,
    granted_resolution: Option<(u32, u32)>,
    granted_fourcc: Option<FourCC>,
    reject_format: bool,
    buffer_limit: Option<u32>,
    reject_mmap: bool,
    fail_query_at: Option<u32>,
    fail_map_at: Option<u32>,
    fail_stream_on: bool,
    fail_dequeue: bool,
    lifo_completion: bool,
    pattern: TestPattern,
    stalls: u32,
    queue_rejections: u32,
    setup_queue_rejections: u32,
    fail_queue_at: Option<u32>,
    misreported_index: Option<u32>,
    buffer_count: u32,
    queued: VecDeque<u32>,
    streaming: bool,
    frame_count: u32,
    queue_attempts: u32,
    live_mappings: Rc<Cell<usize>>,
    total_mappings: Cell<usize>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    /// Create a new mock device with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            capabilities: DeviceCapabilities {
                driver: "mock".to_owned(),
                card: "Mock Camera".to_owned(),
                bus_info: "mock:0".to_owned(),
                can_capture: true,
                can_stream: true,
            },
            format: Format::new(640, 480, FourCC::YUYV),
            granted_resolution: None,
            granted_fourcc: None,
            reject_format: false,
            buffer_limit: None,
            reject_mmap: false,
            fail_query_at: None,
            fail_map_at: None,
            fail_stream_on: false,
            fail_dequeue: false,
            lifo_completion: false,
            pattern: TestPattern::ColorBars,
            stalls: 0,
            queue_rejections: 0,
            setup_queue_rejections: 0,
            fail_queue_at: None,
            misreported_index: None,
            buffer_count: 0,
            queued: VecDeque::new(),
            streaming: false,
            frame_count: 0,
            queue_attempts: 0,
            live_mappings: Rc::new(Cell::new(0)),
            total_mappings: Cell::new(0),
        }
    }

    /// Set the capabilities for this mock device.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Grant this resolution whatever is requested.
    #[must_use]
    pub const fn with_granted_resolution(mut self, width: u32, height: u32) -> Self {
        self.granted_resolution = Some((width, height));
        self
    }

    /// Grant this pixel format whatever is requested.
    #[must_use]
    pub const fn with_granted_fourcc(mut self, fourcc: FourCC) -> Self {
        self.granted_fourcc = Some(fourcc);
        self
    }

    /// Fail `set_format`.
    #[must_use]
    pub const fn rejecting_format(mut self) -> Self {
        self.reject_format = true;
        self
    }

    /// Grant at most `limit` buffers.
    #[must_use]
    pub const fn with_buffer_limit(mut self, limit: u32) -> Self {
        self.buffer_limit = Some(limit);
        self
    }

    /// Refuse memory-mapped buffer requests.
    #[must_use]
    pub const fn rejecting_mmap(mut self) -> Self {
        self.reject_mmap = true;
        self
    }

    /// Fail the buffer query of slot `index`.
    #[must_use]
    pub const fn failing_query_at(mut self, index: u32) -> Self {
        self.fail_query_at = Some(index);
        self
    }

    /// Fail the mapping of slot `index`.
    #[must_use]
    pub const fn failing_map_at(mut self, index: u32) -> Self {
        self.fail_map_at = Some(index);
        self
    }

    /// Fail stream-on.
    #[must_use]
    pub const fn failing_stream_on(mut self) -> Self {
        self.fail_stream_on = true;
        self
    }

    /// Fail every dequeue with an I/O error.
    #[must_use]
    pub const fn failing_dequeue(mut self) -> Self {
        self.fail_dequeue = true;
        self
    }

    /// Complete the most recently queued buffer first.
    #[must_use]
    pub const fn with_lifo_completion(mut self) -> Self {
        self.lifo_completion = true;
        self
    }

    /// Report "no frame ready" for the first `stalls` dequeues.
    #[must_use]
    pub const fn with_stalls(mut self, stalls: u32) -> Self {
        self.stalls = stalls;
        self
    }

    /// Reject the first `count` queue attempts made while streaming with EAGAIN.
    #[must_use]
    pub const fn with_queue_rejections(mut self, count: u32) -> Self {
        self.queue_rejections = count;
        self
    }

    /// Reject the first `count` queue attempts made before stream-on with EAGAIN.
    #[must_use]
    pub const fn with_setup_queue_rejections(mut self, count: u32) -> Self {
        self.setup_queue_rejections = count;
        self
    }

    /// Fail the next queue of slot `index` with EINVAL, once.
    #[must_use]
    pub const fn failing_queue_at(mut self, index: u32) -> Self {
        self.fail_queue_at = Some(index);
        self
    }

    /// Report every completed buffer as slot `index`, whichever slot it was.
    #[must_use]
    pub const fn misreporting_dequeue_index(mut self, index: u32) -> Self {
        self.misreported_index = Some(index);
        self
    }

    /// Set the content of every mapped buffer.
    #[must_use]
    pub const fn with_pattern(mut self, pattern: TestPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Mappings handed out and not yet dropped.
    pub fn live_mappings(&self) -> usize {
        self.live_mappings.get()
    }

    /// Mappings ever handed out.
    pub fn total_mappings(&self) -> usize {
        self.total_mappings.get()
    }

    /// Calls to `queue_buffer`, successful or not.
    pub const fn queue_attempts(&self) -> u32 {
        self.queue_attempts
    }

    /// Whether the stream is on.
    pub const fn is_streaming(&self) -> bool {
        self.streaming
    }
}

fn einval() -> io::Error {
    io::Error::from_raw_os_error(libc::EINVAL)
}

impl CameraDevice for MockDevice {
    type Mapping = MockMapping;

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn format(&self) -> Result<Format> {
        Ok(self.format.clone())
    }

    fn set_format(&mut self, format: &Format) -> Result<Format> {
        if self.reject_format {
            return Err(CameraError::FormatNegotiation(einval().to_string()));
        }
        let (width, height) = self
            .granted_resolution
            .unwrap_or((format.width, format.height));
        let fourcc = self.granted_fourcc.unwrap_or(format.fourcc);
        self.format = Format::new(width, height, fourcc);
        Ok(self.format.clone())
    }

    fn request_buffers(&mut self, count: u32) -> Result<u32> {
        if self.reject_mmap {
            return Err(CameraError::StreamingUnsupported(einval().to_string()));
        }
        self.buffer_count = self.buffer_limit.map_or(count, |limit| count.min(limit));
        Ok(self.buffer_count)
    }

    fn query_buffer(&self, index: u32) -> Result<BufferInfo> {
        if index >= self.buffer_count || self.fail_query_at == Some(index) {
            return Err(CameraError::BufferQuery {
                index,
                source: einval(),
            });
        }
        Ok(BufferInfo {
            index,
            length: self.format.size,
            offset: index * self.format.size.next_multiple_of(PAGE_SIZE),
        })
    }

    fn map_buffer(&self, info: &BufferInfo) -> Result<MockMapping> {
        if self.fail_map_at == Some(info.index) {
            return Err(CameraError::BufferMap {
                index: info.index,
                source: io::Error::from_raw_os_error(libc::ENOMEM),
            });
        }
        self.live_mappings.set(self.live_mappings.get() + 1);
        self.total_mappings.set(self.total_mappings.get() + 1);

        Ok(MockMapping {
            data: generate_test_frame(&self.format, self.pattern),
            live: Rc::clone(&self.live_mappings),
        })
    }

    fn queue_buffer(&mut self, index: u32) -> Result<Outcome<()>> {
        self.queue_attempts += 1;
        let rejections = if self.streaming {
            &mut self.queue_rejections
        } else {
            &mut self.setup_queue_rejections
        };
        if *rejections > 0 {
            *rejections -= 1;
            return Ok(Outcome::WouldBlock);
        }
        if self.fail_queue_at == Some(index) {
            self.fail_queue_at = None;
            return Err(CameraError::Queue {
                index,
                source: einval(),
            });
        }
        if index >= self.buffer_count || self.queued.contains(&index) {
            return Err(CameraError::Queue {
                index,
                source: einval(),
            });
        }
        self.queued.push_back(index);
        Ok(Outcome::Ready(()))
    }

    fn dequeue_buffer(&mut self) -> Result<Outcome<DequeuedBuffer>> {
        if self.fail_dequeue {
            return Err(CameraError::Dequeue(io::Error::from_raw_os_error(libc::EIO)));
        }
        if !self.streaming {
            return Err(CameraError::Dequeue(einval()));
        }
        if self.stalls > 0 {
            self.stalls -= 1;
            return Ok(Outcome::WouldBlock);
        }

        let next = if self.lifo_completion {
            self.queued.pop_back()
        } else {
            self.queued.pop_front()
        };
        let Some(index) = next else {
            return Ok(Outcome::WouldBlock);
        };
        let index = self.misreported_index.unwrap_or(index);

        let sequence = self.frame_count;
        self.frame_count += 1;

        Ok(Outcome::Ready(DequeuedBuffer {
            index,
            metadata: FrameMetadata {
                sequence,
                timestamp: Duration::from_millis(u64::from(sequence) * 33), // ~30fps
                bytes_used: self.format.size,
            },
        }))
    }

    fn stream_on(&mut self) -> Result<()> {
        if self.fail_stream_on {
            return Err(CameraError::StreamStart(io::Error::from_raw_os_error(libc::EBUSY)));
        }
        self.streaming = true;
        Ok(())
    }

    fn stream_off(&mut self) -> Result<()> {
        self.streaming = false;
        self.queued.clear();
        Ok(())
    }
}

/// Heap-backed stand-in for an mmapped buffer; tracks how many are alive.
pub struct MockMapping {
    data: Vec<u8>,
    live: Rc<Cell<usize>>,
}

impl MappedBuffer for MockMapping {
    fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for MockMapping {
    fn drop(&mut self) {
        self.live.set(self.live.get().saturating_sub(1));
    }
}

/// Test pattern types for mock frame generation.
#[derive(Debug, Clone, Copy)]
pub enum TestPattern {
    /// SMPTE color bars pattern.
    ColorBars,
    /// Horizontal gradient from dark to light.
    Gradient,
    /// Solid color with specified Y, U, V values.
    Solid(u8, u8, u8),
}

/// Generate test frame data based on pattern.
pub fn generate_test_frame(format: &Format, pattern: TestPattern) -> Vec<u8> {
    let mut data = vec![0u8; format.yuyv_frame_len()];

    match pattern {
        TestPattern::ColorBars => {
            generate_color_bars(&mut data, format.width);
        }
        TestPattern::Gradient => {
            generate_gradient(&mut data, format.width);
        }
        TestPattern::Solid(y, u, v) => {
            fill_units(&mut data, format.width, |_| (y, u, v));
        }
    }

    data
}

/// Write one `(Y, U, V)` per 4-byte unit, chosen by the unit's x coordinate.
fn fill_units<F>(data: &mut [u8], width: u32, mut yuv_at: F)
where
    F: FnMut(u32) -> (u8, u8, u8),
{
    let row_len = width as usize * 2;
    if row_len == 0 {
        return;
    }
    for row in data.chunks_exact_mut(row_len) {
        for (x, unit) in (0..width).step_by(2).zip(row.chunks_exact_mut(4)) {
            let (y_val, u_val, v_val) = yuv_at(x);
            unit.copy_from_slice(&[y_val, u_val, y_val, v_val]);
        }
    }
}

/// Generate YUYV color bars pattern.
fn generate_color_bars(data: &mut [u8], width: u32) {
    // 8 color bars: White, Yellow, Cyan, Green, Magenta, Red, Blue, Black
    let bars: [(u8, u8, u8); 8] = [
        (235, 128, 128), // White
        (210, 16, 146),  // Yellow
        (170, 166, 16),  // Cyan
        (145, 54, 34),   // Green
        (106, 202, 222), // Magenta
        (81, 90, 240),   // Red
        (41, 240, 110),  // Blue
        (16, 128, 128),  // Black
    ];
    let bar_width = (width / 8).max(1);

    fill_units(data, width, |x| {
        let bar_idx = (x / bar_width).min(7) as usize;
        bars.get(bar_idx).copied().unwrap_or((16, 128, 128))
    });
}

/// Generate YUYV horizontal gradient pattern.
fn generate_gradient(data: &mut [u8], width: u32) {
    fill_units(data, width, |x| {
        #[allow(clippy::cast_possible_truncation)]
        let y_val = ((x * 255) / width) as u8;
        (y_val, 128, 128)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_device_creation() {
        let device = MockDevice::new();
        assert_eq!(device.capabilities().driver, "mock");
        assert!(device.capabilities().can_capture);
        assert!(device.capabilities().can_stream);
    }

    #[test]
    fn test_mock_device_format() {
        let mut device = MockDevice::new();
        let format = device.format().expect("format should succeed");
        assert_eq!(format.width, 640);
        assert_eq!(format.height, 480);

        let new_format = Format::new(1280, 720, FourCC::YUYV);
        let actual = device
            .set_format(&new_format)
            .expect("set_format should succeed");
        assert_eq!(actual.width, 1280);
        assert_eq!(actual.height, 720);
    }

    #[test]
    fn test_mock_queue_protocol() {
        let mut device = MockDevice::new();
        assert_eq!(device.request_buffers(2).expect("reqbufs"), 2);
        assert_eq!(device.queue_buffer(0).expect("qbuf"), Outcome::Ready(()));
        assert!(device.queue_buffer(0).is_err(), "double queue must fail");
        assert!(device.dequeue_buffer().is_err(), "dequeue before stream-on");

        device.stream_on().expect("streamon");
        let buffer = device.dequeue_buffer().expect("dqbuf").ready();
        assert_eq!(buffer.map(|b| b.index), Some(0));
        assert_eq!(device.dequeue_buffer().expect("dqbuf"), Outcome::WouldBlock);
    }

    #[test]
    fn test_color_bars_pattern() {
        let format = Format::new(640, 480, FourCC::YUYV);
        let data = generate_test_frame(&format, TestPattern::ColorBars);

        // Check frame size
        assert_eq!(data.len(), (640 * 480 * 2) as usize);

        // First bar should be white (Y=235)
        assert_eq!(data.first(), Some(&235));
    }

    #[test]
    fn test_gradient_pattern() {
        let format = Format::new(640, 480, FourCC::YUYV);
        let data = generate_test_frame(&format, TestPattern::Gradient);

        // Left edge should be dark
        assert!(data.first().is_some_and(|&y| y < 10));

        // Right edge should be bright (check last row, last pixel)
        let last_row_start = (479 * 640 * 2) as usize;
        assert!(data.get(last_row_start + 638 * 2).is_some_and(|&y| y > 200));
    }

    #[test]
    fn test_solid_pattern() {
        let format = Format::new(64, 64, FourCC::YUYV);
        let data = generate_test_frame(&format, TestPattern::Solid(128, 64, 192));

        assert_eq!(data.get(..4), Some(&[128, 64, 128, 192][..]));
    }
}
