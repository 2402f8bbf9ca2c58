//! Marker detector boundary and the rule for picking "the" marker of a frame.

use std::ops::Range;

use crate::convert::LumaImage;

/// Marker ids in use by default (the first eight tags of the 16h5 family, minus 0).
pub const DEFAULT_VALID_IDS: Range<u32> = 1..9;

/// One marker reported by a detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    /// Decoded marker id.
    pub id: u32,
    /// Number of bits corrected while decoding; 0 is an exact match.
    pub hamming: u32,
}

/// An opaque fiducial-marker detector.
///
/// Implementations may keep internal state between frames, hence `&mut self`.
pub trait Detector {
    /// Detect markers in `image`, in the detector's own order.
    fn detect(&mut self, image: &LumaImage) -> Vec<Detection>;
}

/// A detector that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDetector;

impl Detector for NullDetector {
    fn detect(&mut self, _image: &LumaImage) -> Vec<Detection> {
        Vec::new()
    }
}

/// Which detections count as a found marker.
///
/// A detection is accepted when its hamming distance is at most
/// `exact_hamming`, or at most `near_hamming` with an id in `valid_ids`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptPolicy {
    /// Hamming distance accepted for any id.
    pub exact_hamming: u32,
    /// Hamming distance accepted for ids in `valid_ids`.
    pub near_hamming: u32,
    /// Ids that may be accepted with `near_hamming` errors.
    pub valid_ids: Range<u32>,
    /// Reject ids outside `valid_ids` even on an exact match.
    pub require_valid_id: bool,
}

impl Default for AcceptPolicy {
    fn default() -> Self {
        Self::lenient(DEFAULT_VALID_IDS)
    }
}

impl AcceptPolicy {
    /// Exact matches of any id, or single-bit corrections of a valid id.
    #[must_use]
    pub const fn lenient(valid_ids: Range<u32>) -> Self {
        Self {
            exact_hamming: 0,
            near_hamming: 1,
            valid_ids,
            require_valid_id: false,
        }
    }

    /// Exact or single-bit-corrected matches, valid ids only.
    #[must_use]
    pub const fn strict(valid_ids: Range<u32>) -> Self {
        Self {
            exact_hamming: 0,
            near_hamming: 1,
            valid_ids,
            require_valid_id: true,
        }
    }

    /// Whether `detection` qualifies.
    pub fn accepts(&self, detection: &Detection) -> bool {
        let valid = self.valid_ids.contains(&detection.id);
        if self.require_valid_id && !valid {
            return false;
        }
        detection.hamming <= self.exact_hamming || (detection.hamming <= self.near_hamming && valid)
    }
}

/// The first detection `policy` accepts. Later qualifying detections are ignored.
pub fn select_marker(detections: &[Detection], policy: &AcceptPolicy) -> Option<Detection> {
    detections
        .iter()
        .find(|detection| policy.accepts(detection))
        .copied()
}
