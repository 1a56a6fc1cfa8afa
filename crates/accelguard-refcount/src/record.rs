//! A single handle's reference count.

use accelguard_common::{Handle, HandleKind, Result, ValidationError};
use serde::Serialize;

/// Lifetime record for one handle.
///
/// `indirect` marks records created by enumeration ("get adapters",
/// "get devices") rather than by an explicit create call. Repeated
/// enumeration bumps the count instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RefCountRecord {
    pub handle: Handle,
    pub kind: HandleKind,
    pub count: u32,
    pub indirect: bool,
}

impl RefCountRecord {
    /// Record for an explicitly created object.
    pub const fn created(handle: Handle, kind: HandleKind) -> Self {
        Self { handle, kind, count: 1, indirect: false }
    }

    /// Record for an object first seen through enumeration.
    pub const fn discovered(handle: Handle, kind: HandleKind) -> Self {
        Self { handle, kind, count: 1, indirect: true }
    }

    /// Whether the handle may still be used.
    pub const fn is_live(&self) -> bool {
        self.count > 0
    }

    /// Add one reference. At `u32::MAX` the count is left unchanged.
    pub fn retain(&mut self) -> Result<u32> {
        self.count = self
            .count
            .checked_add(1)
            .ok_or(ValidationError::ReferenceOverflow { handle: self.handle })?;
        Ok(self.count)
    }

    /// Drop one reference. Going below zero is a double release.
    pub fn release(&mut self) -> Result<u32> {
        self.count = self
            .count
            .checked_sub(1)
            .ok_or(ValidationError::DoubleRelease { handle: self.handle })?;
        Ok(self.count)
    }
}
