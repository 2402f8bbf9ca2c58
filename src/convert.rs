//! Packed YUYV to luminance and RGB conversion.
//!
//! A YUYV frame stores two pixels in every 4-byte unit `[Y0 U Y1 V]`; the
//! pair shares one chroma sample. Both converters refuse a source whose
//! length does not match the destination before writing anything.

use crate::traits::{CameraError, Result};

/// Default row alignment of a [`LumaImage`], matching the marker detector's
/// own image allocator.
pub const DEFAULT_STRIDE_ALIGNMENT: u32 = 96;

/// A single-channel 8-bit image whose rows may be padded past `width`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LumaImage {
    width: u32,
    height: u32,
    stride: u32,
    data: Vec<u8>,
}

impl LumaImage {
    /// Allocate a zeroed image with the stride rounded up to
    /// [`DEFAULT_STRIDE_ALIGNMENT`].
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let stride = width
            .checked_next_multiple_of(DEFAULT_STRIDE_ALIGNMENT)
            .ok_or_else(|| CameraError::InvalidImage(format!("width {width} too large")))?;
        Self::with_stride(width, height, stride)
    }

    /// Allocate a zeroed image with an explicit stride.
    ///
    /// The width must be even and non-zero (YUYV carries pixels in pairs) and
    /// the stride must be at least the width.
    pub fn with_stride(width: u32, height: u32, stride: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(CameraError::InvalidImage(format!("empty image {width}x{height}")));
        }
        if width % 2 != 0 {
            return Err(CameraError::InvalidImage(format!("width {width} is odd")));
        }
        if stride < width {
            return Err(CameraError::InvalidImage(format!(
                "stride {stride} is smaller than width {width}"
            )));
        }

        Ok(Self {
            width,
            height,
            stride,
            data: vec![0; stride as usize * height as usize],
        })
    }

    /// Width in pixels.
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Distance in bytes between the starts of consecutive rows.
    pub const fn stride(&self) -> u32 {
        self.stride
    }

    /// The whole buffer, padding included (`stride * height` bytes).
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Logical pixels of row `y`, without padding.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        let start = y as usize * self.stride as usize;
        self.data.get(start..start + self.width as usize)
    }

    /// Logical rows, top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = &[u8]> {
        let width = self.width as usize;
        self.data
            .chunks_exact(self.stride as usize)
            .map(move |row| row.get(..width).unwrap_or(row))
    }

    /// Luminance at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width {
            return None;
        }
        self.row(y)?.get(x as usize).copied()
    }

    /// Length of the packed YUYV frame this image converts from.
    pub const fn yuyv_len(&self) -> usize {
        self.width as usize * self.height as usize * 2
    }
}

/// A packed 8-bit RGB image (`width * 3` bytes per row, no padding).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl RgbImage {
    /// Allocate a zeroed image.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 || width % 2 != 0 {
            return Err(CameraError::InvalidImage(format!(
                "cannot hold a YUYV frame of {width}x{height}"
            )));
        }
        Ok(Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 3],
        })
    }

    /// Width in pixels.
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Interleaved RGB bytes, row-major.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// RGB triplet at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Option<(u8, u8, u8)> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 3;
        match self.data.get(offset..offset + 3)? {
            [r, g, b] => Some((*r, *g, *b)),
            _ => None,
        }
    }

    /// Length of the packed YUYV frame this image converts from.
    pub const fn yuyv_len(&self) -> usize {
        self.width as usize * self.height as usize * 2
    }
}

/// Copy the luma samples of a packed YUYV frame into `dst`, dropping chroma.
///
/// Every row's padding (`stride - width` cells) is zeroed.
pub fn yuyv_to_luma(raw: &[u8], dst: &mut LumaImage) -> Result<()> {
    let expected = dst.yuyv_len();
    if raw.len() != expected {
        return Err(CameraError::LengthMismatch {
            expected,
            actual: raw.len(),
        });
    }

    let width = dst.width as usize;
    let src_rows = raw.chunks_exact(width * 2);
    let dst_rows = dst.data.chunks_exact_mut(dst.stride as usize);

    for (src, row) in src_rows.zip(dst_rows) {
        let (pixels, padding) = row.split_at_mut(width);
        for (unit, pair) in src.chunks_exact(4).zip(pixels.chunks_exact_mut(2)) {
            if let ([y0, _, y1, _], [p0, p1]) = (unit, pair) {
                *p0 = *y0;
                *p1 = *y1;
            }
        }
        padding.fill(0);
    }

    Ok(())
}

/// Convert a packed YUYV frame to interleaved RGB.
pub fn yuyv_to_rgb(raw: &[u8], dst: &mut RgbImage) -> Result<()> {
    let expected = dst.yuyv_len();
    if raw.len() != expected {
        return Err(CameraError::LengthMismatch {
            expected,
            actual: raw.len(),
        });
    }

    for (unit, out) in raw.chunks_exact(4).zip(dst.data.chunks_exact_mut(6)) {
        if let ([y0, u, y1, v], [r0, g0, b0, r1, g1, b1]) = (unit, out) {
            (*r0, *g0, *b0) = yuv_to_rgb(*y0, *u, *v);
            (*r1, *g1, *b1) = yuv_to_rgb(*y1, *u, *v);
        }
    }

    Ok(())
}

/// Convert an RGB image to luminance with the luminosity weights
/// `0.21 R + 0.72 G + 0.07 B`, zeroing row padding.
pub fn rgb_to_luma(src: &RgbImage, dst: &mut LumaImage) -> Result<()> {
    if src.width != dst.width || src.height != dst.height {
        return Err(CameraError::LengthMismatch {
            expected: dst.width as usize * dst.height as usize * 3,
            actual: src.data.len(),
        });
    }

    let width = dst.width as usize;
    let src_rows = src.data.chunks_exact(width * 3);
    let dst_rows = dst.data.chunks_exact_mut(dst.stride as usize);

    for (src, row) in src_rows.zip(dst_rows) {
        let (pixels, padding) = row.split_at_mut(width);
        for (rgb, out) in src.chunks_exact(3).zip(pixels.iter_mut()) {
            if let [r, g, b] = rgb {
                let luma = 0.07f32.mul_add(
                    f32::from(*b),
                    0.72f32.mul_add(f32::from(*g), 0.21 * f32::from(*r)),
                );
                *out = clamp_channel(luma.round());
            }
        }
        padding.fill(0);
    }

    Ok(())
}

/// Convert YUV values to RGB.
///
/// Uses the ITU-R BT.601 conversion formula.
///
/// # Arguments
///
/// * `y` - Luminance value (16-235 for studio range)
/// * `u` - Blue-difference chroma value (16-240)
/// * `v` - Red-difference chroma value (16-240)
///
/// # Returns
///
/// RGB tuple with values clamped to 0-255 range.
#[must_use]
#[allow(clippy::many_single_char_names)]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    // ITU-R BT.601 conversion
    let y_f = f32::from(y);
    let u_f = f32::from(u) - 128.0;
    let v_f = f32::from(v) - 128.0;

    let r = 1.402f32.mul_add(v_f, y_f);
    let g = 0.714_14f32.mul_add(-v_f, 0.344_14f32.mul_add(-u_f, y_f));
    let b = 1.772f32.mul_add(u_f, y_f);

    (clamp_channel(r), clamp_channel(g), clamp_channel(b))
}

fn clamp_channel(val: f32) -> u8 {
    if val < 0.0 {
        0
    } else if val > 255.0 {
        255
    } else {
        #[allow(clippy::cast_possible_truncation)]
        #[allow(clippy::cast_sign_loss)]
        {
            val as u8
        }
    }
}
