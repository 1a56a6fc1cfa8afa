//! Validation error taxonomy shared by the ledger, the registry, and the layer.

use crate::handle::{Handle, HandleKind};

/// Errors detected by the validation layer.
///
/// Lifetime errors (`InvalidReference`, `DoubleRelease`, `DuplicateRecord`,
/// `ReferenceOverflow`) are advisory unless the layer runs in strict mode. Bounds errors
/// (`OutOfBounds`, `ZeroSizedRegion`, `InvalidPitch`) always stop the call
/// before it reaches the driver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid reference to handle {handle}: not found or already released")]
    InvalidReference { handle: Handle },

    #[error("double release of handle {handle}: reference count is already zero")]
    DoubleRelease { handle: Handle },

    #[error("{kind} handle {handle} is already tracked")]
    DuplicateRecord { handle: Handle, kind: HandleKind },

    #[error("reference count of handle {handle} cannot grow past {max}", max = u32::MAX)]
    ReferenceOverflow { handle: Handle },

    #[error("out of bounds access on {target}: end offset {end} exceeds limit {limit}")]
    OutOfBounds { target: String, end: u64, limit: u64 },

    #[error("no tracked allocation for {target}")]
    UnregisteredAllocation { target: String },

    #[error("zero-sized region {region:?} on {target}")]
    ZeroSizedRegion { target: String, region: [u64; 3] },

    #[error("pitch {pitch} is smaller than the {required} bytes it must span")]
    InvalidPitch { pitch: u64, required: u64 },

    #[error("handle {handle} does not refer to an image")]
    NotAnImage { handle: Handle },

    #[error("allocation for {target} is already registered")]
    DuplicateAllocation { target: String },

    #[error("allocation [{base:#x}, {end:#x}) overlaps a live allocation at {existing:#x}")]
    OverlappingAllocation { base: u64, end: u64, existing: u64 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

impl ValidationError {
    /// Whether this error is a bounds violation that must stop the call.
    pub const fn is_bounds_violation(&self) -> bool {
        matches!(
            self,
            Self::OutOfBounds { .. } | Self::ZeroSizedRegion { .. } | Self::InvalidPitch { .. }
        )
    }

    /// Whether this error describes a handle lifetime problem.
    pub const fn is_lifetime_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidReference { .. }
                | Self::DoubleRelease { .. }
                | Self::DuplicateRecord { .. }
                | Self::ReferenceOverflow { .. }
        )
    }
}

/// Convenience result type for validation operations.
pub type Result<T> = std::result::Result<T, ValidationError>;
