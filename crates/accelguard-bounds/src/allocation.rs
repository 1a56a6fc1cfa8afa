//! Allocation metadata tracked by the registry.

use std::fmt;
use std::sync::Arc;

use accelguard_common::Handle;

// ── AllocationKind ──────────────────────────────────────────────────

/// What kind of memory an allocation describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocationKind {
    Host,
    Device,
    Shared,
    Buffer,
    SubBuffer,
    Image,
}

impl AllocationKind {
    /// Pointer-addressed (USM) allocations.
    pub const fn is_usm(self) -> bool {
        matches!(self, Self::Host | Self::Device | Self::Shared)
    }
}

impl fmt::Display for AllocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host allocation"),
            Self::Device => write!(f, "device allocation"),
            Self::Shared => write!(f, "shared allocation"),
            Self::Buffer => write!(f, "buffer"),
            Self::SubBuffer => write!(f, "sub-buffer"),
            Self::Image => write!(f, "image"),
        }
    }
}

/// The USM subset of [`AllocationKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsmKind {
    Host,
    Device,
    Shared,
}

impl From<UsmKind> for AllocationKind {
    fn from(kind: UsmKind) -> Self {
        match kind {
            UsmKind::Host => Self::Host,
            UsmKind::Device => Self::Device,
            UsmKind::Shared => Self::Shared,
        }
    }
}

// ── Images ──────────────────────────────────────────────────────────

/// Image dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageType {
    Image1D,
    Image2D,
    Image3D,
    Image1DArray,
    Image2DArray,
    Cubemap,
}

/// Shape of an image allocation.
///
/// Pitches of zero mean tightly packed rows and slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageDesc {
    pub image_type: ImageType,
    pub width: u64,
    pub height: u64,
    pub depth: u64,
    pub array_size: u64,
    pub row_pitch: u64,
    pub slice_pitch: u64,
    /// Bytes per pixel.
    pub element_size: u64,
}

impl ImageDesc {
    /// A 1D image `width` pixels wide.
    pub const fn image_1d(width: u64, element_size: u64) -> Self {
        Self::with_shape(ImageType::Image1D, width, 1, 1, 1, element_size)
    }

    /// A 2D image.
    pub const fn image_2d(width: u64, height: u64, element_size: u64) -> Self {
        Self::with_shape(ImageType::Image2D, width, height, 1, 1, element_size)
    }

    /// A 3D image.
    pub const fn image_3d(width: u64, height: u64, depth: u64, element_size: u64) -> Self {
        Self::with_shape(ImageType::Image3D, width, height, depth, 1, element_size)
    }

    /// An array of `layers` 1D images.
    pub const fn image_1d_array(width: u64, layers: u64, element_size: u64) -> Self {
        Self::with_shape(ImageType::Image1DArray, width, 1, 1, layers, element_size)
    }

    /// An array of `layers` 2D images.
    pub const fn image_2d_array(width: u64, height: u64, layers: u64, element_size: u64) -> Self {
        Self::with_shape(ImageType::Image2DArray, width, height, 1, layers, element_size)
    }

    /// A cubemap with six square faces.
    pub const fn cubemap(edge: u64, element_size: u64) -> Self {
        Self::with_shape(ImageType::Cubemap, edge, edge, 1, 6, element_size)
    }

    const fn with_shape(
        image_type: ImageType,
        width: u64,
        height: u64,
        depth: u64,
        array_size: u64,
        element_size: u64,
    ) -> Self {
        Self {
            image_type,
            width,
            height,
            depth,
            array_size,
            row_pitch: 0,
            slice_pitch: 0,
            element_size,
        }
    }

    /// Override row and slice pitch.
    #[must_use]
    pub const fn pitched(mut self, row_pitch: u64, slice_pitch: u64) -> Self {
        self.row_pitch = row_pitch;
        self.slice_pitch = slice_pitch;
        self
    }

    /// Addressable extent along x, y, and z.
    ///
    /// Array layers and cube faces occupy the first axis the image type
    /// leaves free. Unused axes have an extent of one.
    pub const fn extents(&self) -> [u64; 3] {
        match self.image_type {
            ImageType::Image1D => [self.width, 1, 1],
            ImageType::Image2D => [self.width, self.height, 1],
            ImageType::Image3D => [self.width, self.height, self.depth],
            ImageType::Image1DArray => [self.width, self.array_size, 1],
            ImageType::Image2DArray => [self.width, self.height, self.array_size],
            ImageType::Cubemap => [self.width, self.height, 6],
        }
    }

    /// Whether any extent is zero.
    pub fn is_degenerate(&self) -> bool {
        self.element_size == 0 || self.extents().contains(&0)
    }

    /// Row pitch in bytes with the zero default applied.
    pub const fn resolved_row_pitch(&self) -> u64 {
        if self.row_pitch == 0 { self.width.saturating_mul(self.element_size) } else { self.row_pitch }
    }

    /// Slice (or layer) pitch in bytes with the zero default applied.
    pub const fn resolved_slice_pitch(&self) -> u64 {
        if self.slice_pitch != 0 {
            return self.slice_pitch;
        }
        let rows = match self.image_type {
            ImageType::Image1D | ImageType::Image1DArray => 1,
            _ => self.height,
        };
        self.resolved_row_pitch().saturating_mul(rows)
    }

    /// Total bytes backing the image.
    pub const fn byte_length(&self) -> u64 {
        let [_, y, z] = self.extents();
        match self.image_type {
            ImageType::Image1D => self.resolved_row_pitch(),
            ImageType::Image2D => self.resolved_row_pitch().saturating_mul(y),
            ImageType::Image1DArray => self.resolved_slice_pitch().saturating_mul(y),
            ImageType::Image3D | ImageType::Image2DArray | ImageType::Cubemap => {
                self.resolved_slice_pitch().saturating_mul(z)
            }
        }
    }
}

// ── Allocation ──────────────────────────────────────────────────────

/// One tracked memory region.
///
/// USM allocations are keyed by `base_address`; buffers, sub-buffers and
/// images by `owner` and have a base of zero. A sub-buffer keeps its parent
/// alive through `parent`, so the parent's extent stays resolvable even
/// after the parent handle itself is unregistered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    pub base_address: u64,
    pub byte_length: u64,
    pub context: Handle,
    pub device: Option<Handle>,
    pub kind: AllocationKind,
    pub owner: Option<Handle>,
    pub parent: Option<Arc<Allocation>>,
    /// Start of a sub-buffer within its parent.
    pub parent_offset: u64,
    pub image: Option<ImageDesc>,
}

impl Allocation {
    /// A buffer object of `byte_length` bytes.
    pub const fn buffer(owner: Handle, context: Handle, byte_length: u64) -> Self {
        Self {
            base_address: 0,
            byte_length,
            context,
            device: None,
            kind: AllocationKind::Buffer,
            owner: Some(owner),
            parent: None,
            parent_offset: 0,
            image: None,
        }
    }

    /// A sub-buffer aliasing `[origin, origin + size)` of `parent`.
    pub fn sub_buffer(owner: Handle, parent: Arc<Allocation>, origin: u64, size: u64) -> Self {
        Self {
            base_address: 0,
            byte_length: size,
            context: parent.context,
            device: parent.device,
            kind: AllocationKind::SubBuffer,
            owner: Some(owner),
            parent: Some(parent),
            parent_offset: origin,
            image: None,
        }
    }

    /// An image object described by `desc`.
    pub const fn image(owner: Handle, context: Handle, desc: ImageDesc) -> Self {
        Self {
            base_address: 0,
            byte_length: desc.byte_length(),
            context,
            device: None,
            kind: AllocationKind::Image,
            owner: Some(owner),
            parent: None,
            parent_offset: 0,
            image: Some(desc),
        }
    }

    /// A USM allocation at `base_address`.
    pub fn usm(
        base_address: u64,
        byte_length: u64,
        context: Handle,
        device: Option<Handle>,
        kind: UsmKind,
    ) -> Self {
        Self {
            base_address,
            byte_length,
            context,
            device,
            kind: kind.into(),
            owner: None,
            parent: None,
            parent_offset: 0,
            image: None,
        }
    }

    /// One past the last byte, as an address. Saturates at `u64::MAX`.
    pub const fn end_address(&self) -> u64 {
        self.base_address.saturating_add(self.byte_length)
    }

    /// Whether `addr` falls inside `[base, base + len)`.
    pub const fn contains_address(&self, addr: u64) -> bool {
        addr >= self.base_address && addr < self.end_address()
    }

    /// Follow parent links to the allocation that owns the memory,
    /// returning it with the accumulated offset of `self` inside it.
    pub fn resolve(&self) -> (&Allocation, u64) {
        let mut current = self;
        let mut offset = 0u64;
        while let Some(parent) = current.parent.as_deref() {
            offset = offset.saturating_add(current.parent_offset);
            current = parent;
        }
        (current, offset)
    }

    /// Human-readable name used in diagnostics.
    pub fn describe(&self) -> String {
        match self.owner {
            Some(owner) => format!("{} {owner}", self.kind),
            None => format!("{} {:#x}", self.kind, self.base_address),
        }
    }
}
