//! The driver interface the layer wraps.

use accelguard_bounds::{ImageDesc, Origin, Region, UsmKind};
use accelguard_common::{Handle, HandleKind};

/// Failure reported by the underlying driver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("driver call failed with code {code}: {message}")]
pub struct DriverError {
    pub code: i32,
    pub message: String,
}

impl DriverError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Parameters of a rectangular buffer transfer.
///
/// Pitches of zero mean tightly packed rows and slices on that side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RectCopy {
    pub buffer_origin: Origin,
    pub host_origin: Origin,
    pub region: Region,
    pub buffer_row_pitch: u64,
    pub buffer_slice_pitch: u64,
    pub host_row_pitch: u64,
    pub host_slice_pitch: u64,
}

impl RectCopy {
    /// A tightly packed copy of `region` from the start of both sides.
    pub const fn packed(region: Region) -> Self {
        Self {
            buffer_origin: Origin::ZERO,
            host_origin: Origin::ZERO,
            region,
            buffer_row_pitch: 0,
            buffer_slice_pitch: 0,
            host_row_pitch: 0,
            host_slice_pitch: 0,
        }
    }

    #[must_use]
    pub const fn at(mut self, buffer_origin: Origin) -> Self {
        self.buffer_origin = buffer_origin;
        self
    }

    #[must_use]
    pub const fn buffer_pitch(mut self, row_pitch: u64, slice_pitch: u64) -> Self {
        self.buffer_row_pitch = row_pitch;
        self.buffer_slice_pitch = slice_pitch;
        self
    }

    #[must_use]
    pub const fn host_pitch(mut self, row_pitch: u64, slice_pitch: u64) -> Self {
        self.host_row_pitch = row_pitch;
        self.host_slice_pitch = slice_pitch;
        self
    }
}

/// A compute driver.
///
/// Abstracted so the layer can sit in front of any backend and be tested
/// without hardware. Enqueue calls return the event they produced, if any.
pub trait Driver: Send + Sync {
    fn adapter_get(&self) -> DriverResult<Vec<Handle>>;

    fn device_get(&self, adapter: Handle) -> DriverResult<Vec<Handle>>;

    fn context_create(&self, devices: &[Handle]) -> DriverResult<Handle>;

    fn queue_create(&self, context: Handle, device: Handle) -> DriverResult<Handle>;

    fn mem_buffer_create(&self, context: Handle, size: u64) -> DriverResult<Handle>;

    fn mem_buffer_partition(&self, buffer: Handle, origin: u64, size: u64) -> DriverResult<Handle>;

    fn mem_image_create(&self, context: Handle, desc: &ImageDesc) -> DriverResult<Handle>;

    /// Returns the base address of the new allocation.
    fn usm_alloc(
        &self,
        context: Handle,
        device: Option<Handle>,
        kind: UsmKind,
        size: u64,
    ) -> DriverResult<u64>;

    fn usm_free(&self, context: Handle, ptr: u64) -> DriverResult<()>;

    fn retain(&self, kind: HandleKind, handle: Handle) -> DriverResult<()>;

    fn release(&self, kind: HandleKind, handle: Handle) -> DriverResult<()>;

    fn enqueue_buffer_read(
        &self,
        queue: Handle,
        buffer: Handle,
        offset: u64,
        dst: &mut [u8],
    ) -> DriverResult<Option<Handle>>;

    fn enqueue_buffer_write(
        &self,
        queue: Handle,
        buffer: Handle,
        offset: u64,
        src: &[u8],
    ) -> DriverResult<Option<Handle>>;

    fn enqueue_buffer_copy(
        &self,
        queue: Handle,
        src: Handle,
        dst: Handle,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    ) -> DriverResult<Option<Handle>>;

    fn enqueue_buffer_read_rect(
        &self,
        queue: Handle,
        buffer: Handle,
        rect: &RectCopy,
        dst: &mut [u8],
    ) -> DriverResult<Option<Handle>>;

    fn enqueue_image_read(
        &self,
        queue: Handle,
        image: Handle,
        origin: Origin,
        region: Region,
        dst: &mut [u8],
    ) -> DriverResult<Option<Handle>>;

    fn enqueue_usm_fill(
        &self,
        queue: Handle,
        ptr: u64,
        pattern: &[u8],
        size: u64,
    ) -> DriverResult<Option<Handle>>;

    fn enqueue_usm_memcpy(
        &self,
        queue: Handle,
        dst: u64,
        src: u64,
        size: u64,
    ) -> DriverResult<Option<Handle>>;

    fn enqueue_usm_prefetch(&self, queue: Handle, ptr: u64, size: u64) -> DriverResult<Option<Handle>>;

    fn enqueue_usm_fill_2d(
        &self,
        queue: Handle,
        ptr: u64,
        pitch: u64,
        pattern: &[u8],
        width: u64,
        height: u64,
    ) -> DriverResult<Option<Handle>>;
}
