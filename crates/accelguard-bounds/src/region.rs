//! Origin/region/pitch arithmetic for rectangular transfers.

use accelguard_common::{Result, ValidationError};

/// Starting coordinate of a rectangular transfer, in bytes for buffers and
/// in pixels (plus layer index) for images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Origin {
    pub x: u64,
    pub y: u64,
    pub z: u64,
}

impl Origin {
    pub const ZERO: Self = Self { x: 0, y: 0, z: 0 };

    pub const fn new(x: u64, y: u64, z: u64) -> Self {
        Self { x, y, z }
    }

    pub const fn as_array(&self) -> [u64; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<[u64; 3]> for Origin {
    fn from([x, y, z]: [u64; 3]) -> Self {
        Self { x, y, z }
    }
}

/// Extent of a rectangular transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub width: u64,
    pub height: u64,
    pub depth: u64,
}

impl Region {
    pub const fn new(width: u64, height: u64, depth: u64) -> Self {
        Self { width, height, depth }
    }

    /// A single row of `width` units.
    pub const fn linear(width: u64) -> Self {
        Self { width, height: 1, depth: 1 }
    }

    pub const fn has_zero(&self) -> bool {
        self.width == 0 || self.height == 0 || self.depth == 0
    }

    pub const fn as_array(&self) -> [u64; 3] {
        [self.width, self.height, self.depth]
    }
}

impl From<[u64; 3]> for Region {
    fn from([width, height, depth]: [u64; 3]) -> Self {
        Self { width, height, depth }
    }
}

/// Byte span `[start, end)` touched by a rectangular transfer.
///
/// Values are `u128` and saturate at `u128::MAX`, which lies past every
/// `u64` limit, so an oversized span always fails a bounds comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RectSpan {
    pub start: u128,
    pub end: u128,
    pub row_pitch: u64,
    pub slice_pitch: u64,
}

impl RectSpan {
    /// Compute the span for `region` at `origin` with the given pitches.
    ///
    /// A zero row pitch defaults to `region.width`, a zero slice pitch to
    /// `region.height * row_pitch`. Explicit pitches narrower than the row
    /// or slice they step over are rejected. The caller checks for zero
    /// regions first.
    pub fn compute(origin: Origin, region: Region, row_pitch: u64, slice_pitch: u64) -> Result<Self> {
        let row_pitch = if row_pitch == 0 {
            region.width
        } else if row_pitch < region.width {
            return Err(ValidationError::InvalidPitch { pitch: row_pitch, required: region.width });
        } else {
            row_pitch
        };

        let min_slice = u128::from(region.height) * u128::from(row_pitch);
        let slice_pitch = if slice_pitch == 0 {
            u64::try_from(min_slice).map_err(|_| {
                ValidationError::InvalidArgument(format!(
                    "slice pitch for {} rows of {row_pitch} bytes overflows",
                    region.height
                ))
            })?
        } else if u128::from(slice_pitch) < min_slice {
            return Err(ValidationError::InvalidPitch {
                pitch: slice_pitch,
                required: u64::try_from(min_slice).unwrap_or(u64::MAX),
            });
        } else {
            slice_pitch
        };

        let rp = u128::from(row_pitch);
        let sp = u128::from(slice_pitch);
        let start = u128::from(origin.x)
            .saturating_add(u128::from(origin.y) * rp)
            .saturating_add(u128::from(origin.z) * sp);
        let end = start
            .saturating_add(u128::from(region.depth.saturating_sub(1)) * sp)
            .saturating_add(u128::from(region.height.saturating_sub(1)) * rp)
            .saturating_add(u128::from(region.width));

        Ok(Self { start, end, row_pitch, slice_pitch })
    }

    /// Length of the span in bytes.
    pub const fn len(&self) -> u128 {
        self.end - self.start
    }

    pub const fn is_empty(&self) -> bool {
        self.end == self.start
    }
}
