//! Capture format negotiation.

use tracing::{info, warn};

use crate::traits::{CameraDevice, CameraError, DeviceCapabilities, Format, FourCC, Result};

/// An opened, capability-checked device together with the format it granted.
///
/// All buffer-size math must use [`DeviceHandle::format`], never the
/// dimensions originally requested.
pub struct DeviceHandle<D> {
    device: D,
    format: Format,
}

impl<D: CameraDevice> DeviceHandle<D> {
    /// The format granted by the device.
    pub const fn format(&self) -> &Format {
        &self.format
    }

    /// Granted width in pixels.
    pub const fn width(&self) -> u32 {
        self.format.width
    }

    /// Granted height in pixels.
    pub const fn height(&self) -> u32 {
        self.format.height
    }

    /// Device capabilities.
    pub fn capabilities(&self) -> &DeviceCapabilities {
        self.device.capabilities()
    }

    /// The underlying device.
    pub const fn device(&self) -> &D {
        &self.device
    }

    pub(crate) fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Close the device.
    ///
    /// Buffers still mapped from it keep the descriptor alive until they are
    /// released.
    pub fn close(self) {
        info!(card = %self.device.capabilities().card, "closing capture device");
    }
}

/// Validate `device` and negotiate packed YUYV capture at `width`x`height`.
///
/// The device may adjust the resolution; the returned handle carries the
/// format it actually granted.
pub fn negotiate<D: CameraDevice>(
    mut device: D,
    width: u32,
    height: u32,
) -> Result<DeviceHandle<D>> {
    let caps = device.capabilities();
    if !caps.can_capture {
        return Err(CameraError::UnsupportedDevice(format!(
            "{} does not support video capture",
            caps.card
        )));
    }
    if !caps.can_stream {
        return Err(CameraError::UnsupportedDevice(format!(
            "{} does not support memory mapped streaming",
            caps.card
        )));
    }

    let Some(requested) = Format::checked(width, height, FourCC::YUYV) else {
        return Err(CameraError::FormatNegotiation(format!(
            "{width}x{height} YUYV frame size overflows u32"
        )));
    };
    device.set_format(&requested)?;

    let granted = device.format()?;
    if granted.fourcc != FourCC::YUYV {
        return Err(CameraError::FormatNegotiation(format!(
            "requested {} but device granted {}",
            requested.fourcc, granted.fourcc
        )));
    }
    if granted.width != width || granted.height != height {
        warn!(
            requested_width = width,
            requested_height = height,
            granted_width = granted.width,
            granted_height = granted.height,
            "device adjusted capture resolution"
        );
    }

    info!(
        width = granted.width,
        height = granted.height,
        fourcc = %granted.fourcc,
        stride = granted.stride,
        "negotiated capture format"
    );

    Ok(DeviceHandle {
        device,
        format: granted,
    })
}
