//! Wrapped driver entry points.

use accelguard_bounds::{AllocationKey, ImageDesc, Origin, RectSpan, Region, Scope, UsmKind};
use accelguard_common::{Handle, HandleKind, ValidationError};
use tracing::debug;

use crate::driver::{Driver, RectCopy};
use crate::error::Result;
use crate::layer::ValidationLayer;

impl<D: Driver> ValidationLayer<D> {
    // ── Discovery ───────────────────────────────────────────────────

    pub fn adapter_get(&self) -> Result<Vec<Handle>> {
        let adapters = self.forward("adapter_get", |d| d.adapter_get())?;
        for &adapter in &adapters {
            self.record_discover(adapter, HandleKind::Adapter)?;
        }
        Ok(adapters)
    }

    pub fn device_get(&self, adapter: Handle) -> Result<Vec<Handle>> {
        self.require_handle("adapter", adapter)?;
        self.check_handles(&[adapter])?;
        let devices = self.forward("device_get", |d| d.device_get(adapter))?;
        for &device in &devices {
            self.record_discover(device, HandleKind::Device)?;
        }
        Ok(devices)
    }

    // ── Object creation ─────────────────────────────────────────────

    pub fn context_create(&self, devices: &[Handle]) -> Result<Handle> {
        self.require_argument("devices", !devices.is_empty(), "device list is empty")?;
        for &device in devices {
            self.require_handle("device", device)?;
        }
        self.check_handles(devices)?;
        let context = self.forward("context_create", |d| d.context_create(devices))?;
        let _lifecycle = self.lifecycle();
        self.record_create(context, HandleKind::Context)?;
        Ok(context)
    }

    pub fn queue_create(&self, context: Handle, device: Handle) -> Result<Handle> {
        self.require_handle("context", context)?;
        self.require_handle("device", device)?;
        self.check_handles(&[context, device])?;
        let queue = self.forward("queue_create", |d| d.queue_create(context, device))?;
        let _lifecycle = self.lifecycle();
        self.record_create(queue, HandleKind::Queue)?;
        if self.config().bounds_checking {
            self.registry_update("queue_create", self.registry().bind_queue(queue, context))?;
        }
        Ok(queue)
    }

    pub fn mem_buffer_create(&self, context: Handle, size: u64) -> Result<Handle> {
        self.require_handle("context", context)?;
        self.require_size("buffer size", size)?;
        self.check_handles(&[context])?;
        let buffer = self.forward("mem_buffer_create", |d| d.mem_buffer_create(context, size))?;
        let _lifecycle = self.lifecycle();
        self.record_create(buffer, HandleKind::Buffer)?;
        if self.config().bounds_checking {
            self.registry_update(
                "mem_buffer_create",
                self.registry().register_buffer(buffer, context, size),
            )?;
        }
        Ok(buffer)
    }

    /// Create a sub-buffer aliasing `[origin, origin + size)` of `buffer`.
    pub fn mem_buffer_partition(&self, buffer: Handle, origin: u64, size: u64) -> Result<Handle> {
        self.require_handle("buffer", buffer)?;
        self.require_size("sub-buffer size", size)?;
        self.check_handles(&[buffer])?;
        self.check_linear(buffer, origin, size)?;
        let sub_buffer =
            self.forward("mem_buffer_partition", |d| d.mem_buffer_partition(buffer, origin, size))?;
        let _lifecycle = self.lifecycle();
        self.record_create(sub_buffer, HandleKind::Buffer)?;
        if self.config().bounds_checking {
            self.registry_update(
                "mem_buffer_partition",
                self.registry().register_sub_buffer(sub_buffer, buffer, origin, size),
            )?;
        }
        Ok(sub_buffer)
    }

    pub fn mem_image_create(&self, context: Handle, desc: &ImageDesc) -> Result<Handle> {
        self.require_handle("context", context)?;
        self.require_region("image extent", Region::from(desc.extents()))?;
        self.require_size("image element size", desc.element_size)?;
        self.check_handles(&[context])?;
        let image = self.forward("mem_image_create", |d| d.mem_image_create(context, desc))?;
        let _lifecycle = self.lifecycle();
        self.record_create(image, HandleKind::Image)?;
        if self.config().bounds_checking {
            self.registry_update(
                "mem_image_create",
                self.registry().register_image(image, context, *desc),
            )?;
        }
        Ok(image)
    }

    // ── USM ─────────────────────────────────────────────────────────

    pub fn usm_alloc(
        &self,
        context: Handle,
        device: Option<Handle>,
        kind: UsmKind,
        size: u64,
    ) -> Result<u64> {
        self.require_handle("context", context)?;
        if let Some(device) = device {
            self.require_handle("device", device)?;
        }
        self.require_size("allocation size", size)?;
        self.check_handles(&[context, device.unwrap_or(Handle::NULL)])?;
        let ptr = self.forward("usm_alloc", |d| d.usm_alloc(context, device, kind, size))?;
        if self.config().bounds_checking {
            let _lifecycle = self.lifecycle();
            self.registry_update(
                "usm_alloc",
                self.registry().register_usm(ptr, size, context, device, kind),
            )?;
        }
        Ok(ptr)
    }

    /// Free a USM allocation. `ptr` must be the base the driver returned.
    pub fn usm_free(&self, context: Handle, ptr: u64) -> Result<()> {
        self.require_handle("context", context)?;
        self.require_pointer("pointer", ptr)?;
        self.check_handles(&[context])?;
        let _lifecycle = self.lifecycle();
        if self.config().bounds_checking {
            let is_base = self.registry().lookup_pointer(ptr).is_some_and(|a| a.base_address == ptr);
            if !is_base {
                return self.bounds(Err(ValidationError::UnregisteredAllocation {
                    target: format!("pointer {ptr:#x}"),
                }));
            }
        }
        self.forward("usm_free", |d| d.usm_free(context, ptr))?;
        if self.config().bounds_checking {
            self.registry_update(
                "usm_free",
                self.registry().unregister_allocation(AllocationKey::Address(ptr)).map(drop),
            )?;
        }
        Ok(())
    }

    // ── Reference counting ──────────────────────────────────────────

    pub fn retain(&self, kind: HandleKind, handle: Handle) -> Result<()> {
        self.require_handle(kind.as_str(), handle)?;
        self.check_handles(&[handle])?;
        self.forward("retain", |d| d.retain(kind, handle))?;
        self.record_retain(handle)
    }

    /// Release one reference. Dropping the last reference to a memory
    /// object removes its allocation; for a queue, its context binding.
    pub fn release(&self, kind: HandleKind, handle: Handle) -> Result<()> {
        self.require_handle(kind.as_str(), handle)?;
        self.check_handles(&[handle])?;
        let _lifecycle = self.lifecycle();
        self.forward("release", |d| d.release(kind, handle))?;
        let remaining = self.record_release(handle)?;

        if remaining == Some(0) && self.config().bounds_checking {
            match kind {
                HandleKind::Buffer | HandleKind::Image => {
                    if let Err(err) = self.registry().unregister_allocation(AllocationKey::Handle(handle)) {
                        debug!(handle = %handle, error = %err, "released memory object had no allocation");
                    }
                }
                HandleKind::Queue => {
                    self.registry_update("release", self.registry().unbind_queue(handle).map(drop))?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    // ── Buffer transfers ────────────────────────────────────────────

    pub fn enqueue_buffer_read(
        &self,
        queue: Handle,
        buffer: Handle,
        offset: u64,
        dst: &mut [u8],
    ) -> Result<Option<Handle>> {
        let size = dst.len() as u64;
        self.require_handle("queue", queue)?;
        self.require_handle("buffer", buffer)?;
        self.require_size("read size", size)?;
        self.check_handles(&[queue, buffer])?;
        self.check_linear(buffer, offset, size)?;
        let event = self.forward("enqueue_buffer_read", |d| {
            d.enqueue_buffer_read(queue, buffer, offset, dst)
        })?;
        self.record_event(event)
    }

    pub fn enqueue_buffer_write(
        &self,
        queue: Handle,
        buffer: Handle,
        offset: u64,
        src: &[u8],
    ) -> Result<Option<Handle>> {
        let size = src.len() as u64;
        self.require_handle("queue", queue)?;
        self.require_handle("buffer", buffer)?;
        self.require_size("write size", size)?;
        self.check_handles(&[queue, buffer])?;
        self.check_linear(buffer, offset, size)?;
        let event = self.forward("enqueue_buffer_write", |d| {
            d.enqueue_buffer_write(queue, buffer, offset, src)
        })?;
        self.record_event(event)
    }

    pub fn enqueue_buffer_copy(
        &self,
        queue: Handle,
        src: Handle,
        dst: Handle,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    ) -> Result<Option<Handle>> {
        self.require_handle("queue", queue)?;
        self.require_handle("source buffer", src)?;
        self.require_handle("destination buffer", dst)?;
        self.require_size("copy size", size)?;
        self.check_handles(&[queue, src, dst])?;
        self.check_linear(src, src_offset, size)?;
        self.check_linear(dst, dst_offset, size)?;
        let event = self.forward("enqueue_buffer_copy", |d| {
            d.enqueue_buffer_copy(queue, src, dst, src_offset, dst_offset, size)
        })?;
        self.record_event(event)
    }

    /// Rectangular read. Both the buffer side and the host side are checked.
    pub fn enqueue_buffer_read_rect(
        &self,
        queue: Handle,
        buffer: Handle,
        rect: &RectCopy,
        dst: &mut [u8],
    ) -> Result<Option<Handle>> {
        self.require_handle("queue", queue)?;
        self.require_handle("buffer", buffer)?;
        self.require_region("rect region", rect.region)?;
        self.check_handles(&[queue, buffer])?;
        self.check_rect(
            buffer,
            rect.buffer_origin,
            rect.region,
            rect.buffer_row_pitch,
            rect.buffer_slice_pitch,
        )?;
        if self.config().bounds_checking {
            self.bounds(check_host_span(
                rect.host_origin,
                rect.region,
                rect.host_row_pitch,
                rect.host_slice_pitch,
                dst.len() as u64,
            ))?;
        }
        let event = self.forward("enqueue_buffer_read_rect", |d| {
            d.enqueue_buffer_read_rect(queue, buffer, rect, dst)
        })?;
        self.record_event(event)
    }

    // ── Images ──────────────────────────────────────────────────────

    /// Read `region` of `image` at `origin` into tightly packed host memory.
    pub fn enqueue_image_read(
        &self,
        queue: Handle,
        image: Handle,
        origin: Origin,
        region: Region,
        dst: &mut [u8],
    ) -> Result<Option<Handle>> {
        self.require_handle("queue", queue)?;
        self.require_handle("image", image)?;
        self.require_region("image region", region)?;
        self.check_handles(&[queue, image])?;
        self.check_image(image, origin, region)?;
        let desc = if self.config().bounds_checking {
            self.registry().lookup(image).and_then(|a| a.image)
        } else {
            None
        };
        if let Some(desc) = desc {
            let packed = Region { width: region.width.saturating_mul(desc.element_size), ..region };
            self.bounds(check_host_span(Origin::ZERO, packed, 0, 0, dst.len() as u64))?;
        }
        let event = self.forward("enqueue_image_read", |d| {
            d.enqueue_image_read(queue, image, origin, region, dst)
        })?;
        self.record_event(event)
    }

    // ── USM transfers ───────────────────────────────────────────────

    /// Fill `size` bytes at `ptr` with a repeating `pattern`.
    pub fn enqueue_usm_fill(
        &self,
        queue: Handle,
        ptr: u64,
        pattern: &[u8],
        size: u64,
    ) -> Result<Option<Handle>> {
        self.require_handle("queue", queue)?;
        self.require_pointer("pointer", ptr)?;
        self.require_size("pattern", pattern.len() as u64)?;
        self.require_size("fill size", size)?;
        self.require_argument(
            "fill size",
            pattern.is_empty() || size % pattern.len() as u64 == 0,
            "fill size is not a multiple of the pattern size",
        )?;
        self.check_handles(&[queue])?;
        self.check_pointer(Scope::Queue(queue), ptr, 0, size)?;
        let event = self.forward("enqueue_usm_fill", |d| d.enqueue_usm_fill(queue, ptr, pattern, size))?;
        self.record_event(event)
    }

    /// Copy between USM allocations. Both ranges must be tracked.
    pub fn enqueue_usm_memcpy(
        &self,
        queue: Handle,
        dst: u64,
        src: u64,
        size: u64,
    ) -> Result<Option<Handle>> {
        self.require_handle("queue", queue)?;
        self.require_pointer("destination", dst)?;
        self.require_pointer("source", src)?;
        self.require_size("copy size", size)?;
        self.check_handles(&[queue])?;
        self.check_pointer(Scope::Queue(queue), src, 0, size)?;
        self.check_pointer(Scope::Queue(queue), dst, 0, size)?;
        let event = self.forward("enqueue_usm_memcpy", |d| d.enqueue_usm_memcpy(queue, dst, src, size))?;
        self.record_event(event)
    }

    pub fn enqueue_usm_prefetch(&self, queue: Handle, ptr: u64, size: u64) -> Result<Option<Handle>> {
        self.require_handle("queue", queue)?;
        self.require_pointer("pointer", ptr)?;
        self.require_size("prefetch size", size)?;
        self.check_handles(&[queue])?;
        self.check_pointer(Scope::Queue(queue), ptr, 0, size)?;
        let event = self.forward("enqueue_usm_prefetch", |d| d.enqueue_usm_prefetch(queue, ptr, size))?;
        self.record_event(event)
    }

    /// Fill a pitched 2D region of `height` rows, `width` bytes each.
    pub fn enqueue_usm_fill_2d(
        &self,
        queue: Handle,
        ptr: u64,
        pitch: u64,
        pattern: &[u8],
        width: u64,
        height: u64,
    ) -> Result<Option<Handle>> {
        self.require_handle("queue", queue)?;
        self.require_pointer("pointer", ptr)?;
        self.require_size("pattern", pattern.len() as u64)?;
        self.require_region("fill region", Region::new(width, height, 1))?;
        self.require_argument(
            "fill width",
            pattern.is_empty() || width % pattern.len() as u64 == 0,
            "fill width is not a multiple of the pattern size",
        )?;
        self.check_handles(&[queue])?;
        self.check_pointer_2d(Scope::Queue(queue), ptr, pitch, width, height)?;
        let event = self.forward("enqueue_usm_fill_2d", |d| {
            d.enqueue_usm_fill_2d(queue, ptr, pitch, pattern, width, height)
        })?;
        self.record_event(event)
    }
}

/// Check that a rect on the host side fits in `available` bytes.
fn check_host_span(
    origin: Origin,
    region: Region,
    row_pitch: u64,
    slice_pitch: u64,
    available: u64,
) -> accelguard_common::Result<()> {
    if region.has_zero() {
        return Err(ValidationError::ZeroSizedRegion {
            target: "host memory".into(),
            region: region.as_array(),
        });
    }
    let span = RectSpan::compute(origin, region, row_pitch, slice_pitch)?;
    if span.end > u128::from(available) {
        return Err(ValidationError::OutOfBounds {
            target: "host memory".into(),
            end: u64::try_from(span.end).unwrap_or(u64::MAX),
            limit: available,
        });
    }
    Ok(())
}
