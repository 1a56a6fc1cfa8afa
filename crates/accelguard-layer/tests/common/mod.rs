//! Shared mock driver for layer integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Barrier, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use accelguard_layer::{
    Driver, DriverError, DriverResult, Handle, HandleKind, ImageDesc, Origin, RectCopy, Region,
    UsmKind, ValidationConfig, ValidationLayer,
};

/// In-memory driver that hands out sequential handles and bump-allocated
/// USM pointers and counts every call it receives.
pub struct MockDriver {
    next_handle: AtomicU64,
    next_ptr: AtomicU64,
    calls: AtomicU64,
    emit_events: AtomicBool,
    fail_on: Mutex<Option<&'static str>>,
    reuse_handle: Mutex<Option<Handle>>,
    release_gate: Mutex<Option<Arc<Barrier>>>,
    log: Mutex<Vec<&'static str>>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self {
            next_handle: AtomicU64::new(0x100),
            next_ptr: AtomicU64::new(0x10_0000),
            calls: AtomicU64::new(0),
            emit_events: AtomicBool::new(false),
            fail_on: Mutex::new(None),
            reuse_handle: Mutex::new(None),
            release_gate: Mutex::new(None),
            log: Mutex::new(Vec::new()),
        }
    }
}

pub const ADAPTER: Handle = Handle::from_raw(0xa0);
pub const DEVICE: Handle = Handle::from_raw(0xd0);

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the named operation fail with a driver error.
    pub fn fail_on(&self, op: &'static str) {
        *self.fail_on.lock().unwrap() = Some(op);
    }

    /// Return `handle` from the next create call.
    pub fn reuse_next(&self, handle: Handle) {
        *self.reuse_handle.lock().unwrap() = Some(handle);
    }

    /// Park the next `release` inside the driver: it waits on `gate` once
    /// on entry and once more before returning.
    pub fn gate_next_release(&self, gate: Arc<Barrier>) {
        *self.release_gate.lock().unwrap() = Some(gate);
    }

    /// Make enqueue calls return an event handle.
    pub fn emit_events(&self) {
        self.emit_events.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn called(&self, op: &str) -> bool {
        self.log.lock().unwrap().iter().any(|o| *o == op)
    }

    fn enter(&self, op: &'static str) -> DriverResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(op);
        if *self.fail_on.lock().unwrap() == Some(op) {
            return Err(DriverError::new(-5, format!("mock failure in {op}")));
        }
        Ok(())
    }

    fn fresh(&self) -> Handle {
        if let Some(h) = self.reuse_handle.lock().unwrap().take() {
            return h;
        }
        Handle::from_raw(self.next_handle.fetch_add(1, Ordering::SeqCst))
    }

    fn event(&self) -> Option<Handle> {
        self.emit_events.load(Ordering::SeqCst).then(|| self.fresh())
    }
}

impl Driver for MockDriver {
    fn adapter_get(&self) -> DriverResult<Vec<Handle>> {
        self.enter("adapter_get")?;
        Ok(vec![ADAPTER])
    }

    fn device_get(&self, _adapter: Handle) -> DriverResult<Vec<Handle>> {
        self.enter("device_get")?;
        Ok(vec![DEVICE])
    }

    fn context_create(&self, _devices: &[Handle]) -> DriverResult<Handle> {
        self.enter("context_create")?;
        Ok(self.fresh())
    }

    fn queue_create(&self, _context: Handle, _device: Handle) -> DriverResult<Handle> {
        self.enter("queue_create")?;
        Ok(self.fresh())
    }

    fn mem_buffer_create(&self, _context: Handle, _size: u64) -> DriverResult<Handle> {
        self.enter("mem_buffer_create")?;
        Ok(self.fresh())
    }

    fn mem_buffer_partition(&self, _buffer: Handle, _origin: u64, _size: u64) -> DriverResult<Handle> {
        self.enter("mem_buffer_partition")?;
        Ok(self.fresh())
    }

    fn mem_image_create(&self, _context: Handle, _desc: &ImageDesc) -> DriverResult<Handle> {
        self.enter("mem_image_create")?;
        Ok(self.fresh())
    }

    fn usm_alloc(
        &self,
        _context: Handle,
        _device: Option<Handle>,
        _kind: UsmKind,
        size: u64,
    ) -> DriverResult<u64> {
        self.enter("usm_alloc")?;
        let aligned = size.div_ceil(0x1000) * 0x1000;
        Ok(self.next_ptr.fetch_add(aligned, Ordering::SeqCst))
    }

    fn usm_free(&self, _context: Handle, _ptr: u64) -> DriverResult<()> {
        self.enter("usm_free")
    }

    fn retain(&self, _kind: HandleKind, _handle: Handle) -> DriverResult<()> {
        self.enter("retain")
    }

    fn release(&self, _kind: HandleKind, _handle: Handle) -> DriverResult<()> {
        self.enter("release")?;
        let gate = self.release_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.wait();
            gate.wait();
        }
        Ok(())
    }

    fn enqueue_buffer_read(
        &self,
        _queue: Handle,
        _buffer: Handle,
        _offset: u64,
        dst: &mut [u8],
    ) -> DriverResult<Option<Handle>> {
        self.enter("enqueue_buffer_read")?;
        dst.fill(0xab);
        Ok(self.event())
    }

    fn enqueue_buffer_write(
        &self,
        _queue: Handle,
        _buffer: Handle,
        _offset: u64,
        _src: &[u8],
    ) -> DriverResult<Option<Handle>> {
        self.enter("enqueue_buffer_write")?;
        Ok(self.event())
    }

    fn enqueue_buffer_copy(
        &self,
        _queue: Handle,
        _src: Handle,
        _dst: Handle,
        _src_offset: u64,
        _dst_offset: u64,
        _size: u64,
    ) -> DriverResult<Option<Handle>> {
        self.enter("enqueue_buffer_copy")?;
        Ok(self.event())
    }

    fn enqueue_buffer_read_rect(
        &self,
        _queue: Handle,
        _buffer: Handle,
        _rect: &RectCopy,
        _dst: &mut [u8],
    ) -> DriverResult<Option<Handle>> {
        self.enter("enqueue_buffer_read_rect")?;
        Ok(self.event())
    }

    fn enqueue_image_read(
        &self,
        _queue: Handle,
        _image: Handle,
        _origin: Origin,
        _region: Region,
        _dst: &mut [u8],
    ) -> DriverResult<Option<Handle>> {
        self.enter("enqueue_image_read")?;
        Ok(self.event())
    }

    fn enqueue_usm_fill(
        &self,
        _queue: Handle,
        _ptr: u64,
        _pattern: &[u8],
        _size: u64,
    ) -> DriverResult<Option<Handle>> {
        self.enter("enqueue_usm_fill")?;
        Ok(self.event())
    }

    fn enqueue_usm_memcpy(
        &self,
        _queue: Handle,
        _dst: u64,
        _src: u64,
        _size: u64,
    ) -> DriverResult<Option<Handle>> {
        self.enter("enqueue_usm_memcpy")?;
        Ok(self.event())
    }

    fn enqueue_usm_prefetch(&self, _queue: Handle, _ptr: u64, _size: u64) -> DriverResult<Option<Handle>> {
        self.enter("enqueue_usm_prefetch")?;
        Ok(self.event())
    }

    fn enqueue_usm_fill_2d(
        &self,
        _queue: Handle,
        _ptr: u64,
        _pitch: u64,
        _pattern: &[u8],
        _width: u64,
        _height: u64,
    ) -> DriverResult<Option<Handle>> {
        self.enter("enqueue_usm_fill_2d")?;
        Ok(self.event())
    }
}

/// A layer with every check on plus a context and queue ready for use.
pub struct Fixture {
    pub layer: ValidationLayer<MockDriver>,
    pub context: Handle,
    pub queue: Handle,
}

impl Fixture {
    pub fn new(config: ValidationConfig) -> Self {
        let layer = ValidationLayer::new(MockDriver::new(), config).unwrap();
        let adapter = layer.adapter_get().unwrap()[0];
        let device = layer.device_get(adapter).unwrap()[0];
        let context = layer.context_create(&[device]).unwrap();
        let queue = layer.queue_create(context, device).unwrap();
        Self { layer, context, queue }
    }

    pub fn full() -> Self {
        Self::new(ValidationConfig::full())
    }

    pub fn strict() -> Self {
        Self::new(ValidationConfig { strict: true, ..ValidationConfig::full() })
    }

    /// Release the queue, context and discovered handles.
    pub fn release_base(&self) {
        self.layer.release(HandleKind::Queue, self.queue).unwrap();
        self.layer.release(HandleKind::Context, self.context).unwrap();
        self.layer.release(HandleKind::Device, DEVICE).unwrap();
        self.layer.release(HandleKind::Adapter, ADAPTER).unwrap();
    }
}

/// Route layer diagnostics to the test harness output.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("accelguard_layer=debug,accelguard_refcount=debug,accelguard_bounds=debug")
        .with_test_writer()
        .try_init();
}
