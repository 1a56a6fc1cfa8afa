//! Opaque driver handles and their kind tags.
//!
//! A [`Handle`] is the raw value the driver hands back for an object. The
//! validation layer never dereferences it; it only uses it as a key into the
//! ledger and the registry. The [`HandleKind`] travels alongside it so that
//! diagnostics can say *what* leaked or was released twice.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque, process-unique identifier for a driver-managed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Handle(u64);

impl Handle {
    /// The null handle. Never valid as an argument.
    pub const NULL: Self = Self(0);

    /// Wrap a raw driver handle value.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw driver handle value.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Whether this is the null handle.
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u64> for Handle {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

/// Kind tag carried by every tracked handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleKind {
    Adapter,
    Platform,
    Device,
    Context,
    Buffer,
    Image,
    Sampler,
    Program,
    Kernel,
    Queue,
    Event,
    UsmPool,
    PhysicalMem,
    CommandBuffer,
    CommandBufferCommand,
    ExternalMemory,
    ExternalSemaphore,
    TensorMap,
}

impl HandleKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 18] = [
        Self::Adapter,
        Self::Platform,
        Self::Device,
        Self::Context,
        Self::Buffer,
        Self::Image,
        Self::Sampler,
        Self::Program,
        Self::Kernel,
        Self::Queue,
        Self::Event,
        Self::UsmPool,
        Self::PhysicalMem,
        Self::CommandBuffer,
        Self::CommandBufferCommand,
        Self::ExternalMemory,
        Self::ExternalSemaphore,
        Self::TensorMap,
    ];

    /// Snake-case name used in diagnostics.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Adapter => "adapter",
            Self::Platform => "platform",
            Self::Device => "device",
            Self::Context => "context",
            Self::Buffer => "buffer",
            Self::Image => "image",
            Self::Sampler => "sampler",
            Self::Program => "program",
            Self::Kernel => "kernel",
            Self::Queue => "queue",
            Self::Event => "event",
            Self::UsmPool => "usm_pool",
            Self::PhysicalMem => "physical_mem",
            Self::CommandBuffer => "command_buffer",
            Self::CommandBufferCommand => "command_buffer_command",
            Self::ExternalMemory => "external_memory",
            Self::ExternalSemaphore => "external_semaphore",
            Self::TensorMap => "tensor_map",
        }
    }

    /// Kinds the driver hands out through enumeration calls, where the same
    /// handle may be returned again by a later call.
    pub const fn is_discoverable(self) -> bool {
        matches!(self, Self::Adapter | Self::Platform | Self::Device)
    }

    /// Kinds that may own a tracked memory allocation.
    pub const fn owns_allocation(self) -> bool {
        matches!(self, Self::Buffer | Self::Image | Self::UsmPool)
    }
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_displays_as_hex() {
        assert_eq!(Handle::from_raw(0x1000).to_string(), "0x1000");
        assert_eq!(Handle::NULL.to_string(), "0x0");
    }

    #[test]
    fn null_handle_is_null() {
        assert!(Handle::NULL.is_null());
        assert!(!Handle::from_raw(1).is_null());
    }

    #[test]
    fn kind_names_are_unique() {
        let mut names: Vec<_> = HandleKind::ALL.iter().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), HandleKind::ALL.len());
    }

    #[test]
    fn only_enumerated_kinds_are_discoverable() {
        let discoverable: Vec<_> =
            HandleKind::ALL.iter().copied().filter(|k| k.is_discoverable()).collect();
        assert_eq!(discoverable, vec![HandleKind::Adapter, HandleKind::Platform, HandleKind::Device]);
    }

    #[test]
    fn memory_kinds_own_allocations() {
        assert!(HandleKind::Buffer.owns_allocation());
        assert!(HandleKind::Image.owns_allocation());
        assert!(HandleKind::UsmPool.owns_allocation());
        assert!(!HandleKind::Queue.owns_allocation());
    }
}
