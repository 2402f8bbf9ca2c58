//! Frame validation utilities for test pattern verification.
//!
//! These check converted images against the patterns produced by the mock
//! device and by the vivid virtual camera, and check that a run of frames
//! carries consecutive driver sequence numbers.

use crate::convert::{LumaImage, RgbImage};
use crate::traits::{CameraError, FrameMetadata, Result};

/// Expected RGB values for SMPTE color bars (8 bars).
///
/// These are the RGB values resulting from converting the YUV values
/// used by the mock device's color bar pattern.
///
/// Colors in order: White, Yellow, Cyan, Green, Magenta, Red, Blue, Black
const SMPTE_COLOR_BARS: [(u8, u8, u8); 8] = [
    (235, 235, 235), // White
    (235, 235, 11),  // Yellow
    (12, 236, 237),  // Cyan
    (13, 237, 13),   // Green
    (237, 13, 237),  // Magenta
    (238, 14, 13),   // Red
    (15, 15, 239),   // Blue
    (16, 16, 16),    // Black
];

/// Tolerance for RGB color matching (accounts for YUV->RGB conversion errors).
const COLOR_TOLERANCE: u8 = 15;

/// Minimum left-to-right luminance rise for a gradient.
const MIN_GRADIENT_RISE: u8 = 50;

/// Validates that an RGB image contains the SMPTE color bar pattern.
///
/// Checks 8 vertical stripes at their center positions on the middle row,
/// each within [`COLOR_TOLERANCE`] of the expected color.
///
/// # Errors
///
/// Returns `Validation` if any color bar doesn't match the expected color.
pub fn validate_color_bars(image: &RgbImage) -> Result<()> {
    let bar_width = image.width() / 8;
    let center_y = image.height() / 2;

    for (bar_idx, expected_rgb) in (0u32..).zip(SMPTE_COLOR_BARS.iter()) {
        let sample_x = (bar_idx * bar_width) + (bar_width / 2);

        let actual_rgb = image.pixel(sample_x, center_y).ok_or_else(|| {
            CameraError::Validation(format!("no pixel at ({sample_x}, {center_y})"))
        })?;

        if !colors_match(actual_rgb, *expected_rgb, COLOR_TOLERANCE) {
            return Err(CameraError::Validation(format!(
                "color bar {bar_idx} mismatch at ({sample_x}, {center_y}): \
                 expected RGB{expected_rgb:?}, got RGB{actual_rgb:?}"
            )));
        }
    }

    Ok(())
}

/// Validates that a luminance image contains a horizontal gradient.
///
/// Samples every tenth pixel of the middle row: luminance must not drop by
/// more than one step between samples and must rise by at least
/// [`MIN_GRADIENT_RISE`] across the row.
///
/// # Errors
///
/// Returns `Validation` if the row is not monotonic or too flat.
pub fn validate_gradient(image: &LumaImage) -> Result<()> {
    let center_y = image.height() / 2;
    let row = image
        .row(center_y)
        .ok_or_else(|| CameraError::Validation(format!("no row {center_y}")))?;

    let mut samples = row.iter().copied().step_by(10);
    let Some(first) = samples.next() else {
        return Err(CameraError::Validation("empty row".to_owned()));
    };

    let mut prev = first;
    for (step, luma) in (1usize..).zip(samples) {
        // Allow small decreases due to rounding
        if luma.saturating_add(1) < prev {
            return Err(CameraError::Validation(format!(
                "gradient not monotonically increasing at x={}: {luma} < previous {prev}",
                step * 10
            )));
        }
        prev = luma;
    }

    let rise = prev.saturating_sub(first);
    if rise < MIN_GRADIENT_RISE {
        return Err(CameraError::Validation(format!(
            "gradient rises by only {rise} (expected at least {MIN_GRADIENT_RISE})"
        )));
    }

    Ok(())
}

/// Validates that every padding byte past `width` in each row is zero.
///
/// # Errors
///
/// Returns `Validation` naming the first row with a non-zero padding byte.
pub fn validate_padding(image: &LumaImage) -> Result<()> {
    let width = image.width() as usize;
    let stride = image.stride() as usize;

    for (y, row) in image.as_bytes().chunks_exact(stride).enumerate() {
        let padding = row.get(width..).unwrap_or_default();
        if let Some(offset) = padding.iter().position(|&byte| byte != 0) {
            return Err(CameraError::Validation(format!(
                "non-zero padding in row {y} at column {}",
                width + offset
            )));
        }
    }

    Ok(())
}

/// Validates that frame sequence numbers increment by 1 with no gaps.
///
/// # Errors
///
/// Returns `Validation` if the slice is empty or any sequence number doesn't
/// follow its predecessor.
pub fn validate_frame_sequence(frames: &[FrameMetadata]) -> Result<()> {
    if frames.is_empty() {
        return Err(CameraError::Validation("cannot validate empty frame sequence".to_owned()));
    }

    for (i, pair) in frames.windows(2).enumerate() {
        if let [prev, curr] = pair {
            let expected = prev.sequence.wrapping_add(1);
            if curr.sequence != expected {
                return Err(CameraError::Validation(format!(
                    "frame sequence gap at index {}: expected {expected}, got {}",
                    i + 1,
                    curr.sequence
                )));
            }
        }
    }

    Ok(())
}

/// Whether all three channels are within `tolerance` of each other.
const fn colors_match(actual: (u8, u8, u8), expected: (u8, u8, u8), tolerance: u8) -> bool {
    actual.0.abs_diff(expected.0) <= tolerance
        && actual.1.abs_diff(expected.1) <= tolerance
        && actual.2.abs_diff(expected.2) <= tolerance
}
