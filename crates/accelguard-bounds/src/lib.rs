//! Allocation/bounds registry for the accelguard validation layer.
//!
//! Tracks every addressable memory region an application can name through
//! the driver API and checks data-movement arguments against it before the
//! call is forwarded:
//!
//! - [`allocation`]: buffer, sub-buffer, image, and USM allocation metadata
//! - [`region`]: origin/region/pitch arithmetic for rectangular copies
//! - [`registry`]: the keyed store and its `validate_*` checks
//!
//! Handle-keyed objects (buffers, sub-buffers, images) live in a hash map.
//! Pointer-keyed USM allocations live in an ordered map over base addresses
//! so the allocation containing an arbitrary pointer is found in O(log n).

pub mod allocation;
pub mod region;
pub mod registry;

pub use allocation::{Allocation, AllocationKind, ImageDesc, ImageType, UsmKind};
pub use region::{Origin, RectSpan, Region};
pub use registry::{AllocationKey, AllocationRegistry, RegistryStats, Scope};
