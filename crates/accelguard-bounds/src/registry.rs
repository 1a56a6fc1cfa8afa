//! Keyed store of live allocations and the bounds checks run against it.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use accelguard_common::{Handle, Result, SubBufferBounds, ValidationError};
use tracing::{debug, info};

use crate::allocation::{Allocation, AllocationKind, ImageDesc, UsmKind};
use crate::region::{Origin, RectSpan, Region};

/// How an allocation is looked up: by object handle or by USM base address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocationKey {
    Handle(Handle),
    Address(u64),
}

impl std::fmt::Display for AllocationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Handle(h) => write!(f, "handle {h}"),
            Self::Address(a) => write!(f, "pointer {a:#x}"),
        }
    }
}

/// Where a pointer operation executes. Queues resolve to the context they
/// were bound to with [`AllocationRegistry::bind_queue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Context(Handle),
    Queue(Handle),
}

/// Snapshot of registry counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Live buffers, sub-buffers and images.
    pub handle_allocations: usize,
    /// Live USM allocations.
    pub usm_allocations: usize,
    /// Queues with a known context.
    pub bound_queues: usize,
    /// Checks rejected with a bounds violation.
    pub bounds_violations: u64,
    /// Checks that named memory the registry does not track.
    pub unregistered_accesses: u64,
}

#[derive(Debug, Default)]
struct RegistryState {
    by_handle: HashMap<Handle, Arc<Allocation>>,
    by_address: BTreeMap<u64, Arc<Allocation>>,
    queues: HashMap<Handle, Handle>,
}

impl RegistryState {
    /// The USM allocation whose `[base, base + len)` contains `addr`.
    fn containing(&self, addr: u64) -> Option<&Arc<Allocation>> {
        self.by_address
            .range(..=addr)
            .next_back()
            .map(|(_, alloc)| alloc)
            .filter(|alloc| alloc.contains_address(addr))
    }

    fn context_of(&self, scope: Scope) -> Result<Handle> {
        match scope {
            Scope::Context(ctx) => Ok(ctx),
            Scope::Queue(queue) => self
                .queues
                .get(&queue)
                .copied()
                .ok_or(ValidationError::InvalidReference { handle: queue }),
        }
    }

    /// First live USM allocation that intersects `[base, end)`.
    fn overlapping(&self, base: u64, end: u64) -> Option<u64> {
        let before = self
            .by_address
            .range(..base)
            .next_back()
            .filter(|(_, a)| a.end_address() > base)
            .map(|(b, _)| *b);
        let after = self.by_address.range(base..end).next().map(|(b, _)| *b);
        before.or(after)
    }
}

/// Registry of every addressable memory region for one layer instance.
///
/// Registration and removal take the write lock; all `validate_*` checks and
/// lookups share the read lock. Each check is a hash lookup or one ordered
/// range lookup.
#[derive(Debug, Default)]
pub struct AllocationRegistry {
    state: RwLock<RegistryState>,
    sub_buffer_bounds: SubBufferBounds,
    bounds_violations: AtomicU64,
    unregistered_accesses: AtomicU64,
}

impl AllocationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry enforcing the given sub-buffer policy.
    pub fn with_sub_buffer_bounds(policy: SubBufferBounds) -> Self {
        Self { sub_buffer_bounds: policy, ..Self::default() }
    }

    pub const fn sub_buffer_bounds(&self) -> SubBufferBounds {
        self.sub_buffer_bounds
    }

    // ── Registration ────────────────────────────────────────────────

    /// Insert an allocation under `key`.
    ///
    /// Handle keys must be non-null and match the allocation's owner.
    /// Address keys must equal the allocation's nonzero base and may not
    /// intersect any live USM allocation.
    pub fn register_allocation(&self, key: AllocationKey, allocation: Allocation) -> Result<()> {
        if allocation.byte_length == 0 {
            return Err(ValidationError::ZeroSizedRegion {
                target: key.to_string(),
                region: [0, 1, 1],
            });
        }

        let mut state = self.write()?;
        match key {
            AllocationKey::Handle(handle) => {
                if handle.is_null() {
                    return Err(ValidationError::InvalidArgument("null allocation handle".into()));
                }
                if allocation.owner.is_some_and(|owner| owner != handle) {
                    return Err(ValidationError::InvalidArgument(format!(
                        "allocation owned by {} registered under {handle}",
                        allocation.describe()
                    )));
                }
                if state.by_handle.contains_key(&handle) {
                    return Err(ValidationError::DuplicateAllocation { target: key.to_string() });
                }
                state.by_handle.insert(handle, Arc::new(allocation));
            }
            AllocationKey::Address(base) => {
                if base == 0 {
                    return Err(ValidationError::InvalidArgument("null USM base address".into()));
                }
                if allocation.base_address != base {
                    return Err(ValidationError::InvalidArgument(format!(
                        "allocation based at {:#x} registered under {base:#x}",
                        allocation.base_address
                    )));
                }
                if state.by_address.contains_key(&base) {
                    return Err(ValidationError::DuplicateAllocation { target: key.to_string() });
                }
                let end = allocation.end_address();
                if let Some(existing) = state.overlapping(base, end) {
                    return Err(ValidationError::OverlappingAllocation { base, end, existing });
                }
                state.by_address.insert(base, Arc::new(allocation));
            }
        }
        drop(state);

        debug!(key = %key, "registered allocation");
        Ok(())
    }

    /// Track a buffer of `size` bytes.
    pub fn register_buffer(&self, buffer: Handle, context: Handle, size: u64) -> Result<()> {
        self.register_allocation(
            AllocationKey::Handle(buffer),
            Allocation::buffer(buffer, context, size),
        )
    }

    /// Track a sub-buffer covering `[origin, origin + size)` of `parent`.
    ///
    /// The parent must be a tracked buffer; sub-buffers of sub-buffers are
    /// rejected.
    pub fn register_sub_buffer(
        &self,
        sub_buffer: Handle,
        parent: Handle,
        origin: u64,
        size: u64,
    ) -> Result<()> {
        let parent_alloc = self.lookup(parent).ok_or_else(|| {
            self.unregistered_accesses.fetch_add(1, Ordering::Relaxed);
            ValidationError::UnregisteredAllocation { target: format!("parent buffer {parent}") }
        })?;
        if parent_alloc.kind != AllocationKind::Buffer {
            return Err(ValidationError::InvalidArgument(format!(
                "sub-buffer parent {} is not a buffer",
                parent_alloc.describe()
            )));
        }
        if size == 0 {
            return Err(ValidationError::ZeroSizedRegion {
                target: format!("sub-buffer of {}", parent_alloc.describe()),
                region: [0, 1, 1],
            });
        }
        let end = u128::from(origin) + u128::from(size);
        if end > u128::from(parent_alloc.byte_length) {
            return Err(self.out_of_bounds(parent_alloc.describe(), end, parent_alloc.byte_length));
        }

        self.register_allocation(
            AllocationKey::Handle(sub_buffer),
            Allocation::sub_buffer(sub_buffer, parent_alloc, origin, size),
        )
    }

    /// Track an image; its byte length is derived from `desc`.
    pub fn register_image(&self, image: Handle, context: Handle, desc: ImageDesc) -> Result<()> {
        if desc.is_degenerate() {
            return Err(ValidationError::ZeroSizedRegion {
                target: format!("image {image}"),
                region: desc.extents(),
            });
        }
        self.register_allocation(AllocationKey::Handle(image), Allocation::image(image, context, desc))
    }

    /// Track a USM allocation returned by the driver.
    pub fn register_usm(
        &self,
        ptr: u64,
        size: u64,
        context: Handle,
        device: Option<Handle>,
        kind: UsmKind,
    ) -> Result<()> {
        self.register_allocation(
            AllocationKey::Address(ptr),
            Allocation::usm(ptr, size, context, device, kind),
        )
    }

    /// Stop tracking an allocation and hand back its metadata.
    ///
    /// Live sub-buffers keep their own reference to a removed parent.
    pub fn unregister_allocation(&self, key: AllocationKey) -> Result<Arc<Allocation>> {
        let removed = {
            let mut state = self.write()?;
            match key {
                AllocationKey::Handle(h) => state.by_handle.remove(&h),
                AllocationKey::Address(a) => state.by_address.remove(&a),
            }
        };
        match removed {
            Some(alloc) => {
                debug!(key = %key, length = alloc.byte_length, "unregistered allocation");
                Ok(alloc)
            }
            None => {
                self.unregistered_accesses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "unregister of untracked allocation");
                Err(ValidationError::UnregisteredAllocation { target: key.to_string() })
            }
        }
    }

    /// Record which context a queue belongs to.
    pub fn bind_queue(&self, queue: Handle, context: Handle) -> Result<()> {
        self.write()?.queues.insert(queue, context);
        debug!(queue = %queue, context = %context, "bound queue");
        Ok(())
    }

    /// Forget a queue binding, returning the context it was bound to.
    pub fn unbind_queue(&self, queue: Handle) -> Result<Option<Handle>> {
        Ok(self.write()?.queues.remove(&queue))
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Allocation registered under a handle.
    pub fn lookup(&self, handle: Handle) -> Option<Arc<Allocation>> {
        self.state.read().ok().and_then(|s| s.by_handle.get(&handle).cloned())
    }

    /// USM allocation containing `ptr`.
    pub fn lookup_pointer(&self, ptr: u64) -> Option<Arc<Allocation>> {
        self.state.read().ok().and_then(|s| s.containing(ptr).cloned())
    }

    /// Number of tracked allocations of either key type.
    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.by_handle.len() + s.by_address.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> RegistryStats {
        let (handle_allocations, usm_allocations, bound_queues) = self
            .state
            .read()
            .map(|s| (s.by_handle.len(), s.by_address.len(), s.queues.len()))
            .unwrap_or_default();
        RegistryStats {
            handle_allocations,
            usm_allocations,
            bound_queues,
            bounds_violations: self.bounds_violations.load(Ordering::Relaxed),
            unregistered_accesses: self.unregistered_accesses.load(Ordering::Relaxed),
        }
    }

    /// Drop every allocation and queue binding. Returns how many allocations
    /// were still tracked.
    pub fn clear(&self) -> usize {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let remaining = state.by_handle.len() + state.by_address.len();
        state.by_handle.clear();
        state.by_address.clear();
        state.queues.clear();
        drop(state);
        info!(remaining, "allocation registry cleared");
        remaining
    }

    // ── Checks ──────────────────────────────────────────────────────

    /// Check a `[offset, offset + length)` access to a buffer or sub-buffer.
    ///
    /// Sub-buffer offsets are rebased onto the root buffer. A zero-length
    /// access passes once the target is known.
    pub fn validate_linear(&self, target: Handle, offset: u64, length: u64) -> Result<()> {
        let alloc = self.require(target)?;
        if length == 0 {
            return Ok(());
        }
        self.check_span(&alloc, u128::from(offset) + u128::from(length))
    }

    /// Check a rectangular access against a buffer.
    pub fn validate_rect(
        &self,
        target: Handle,
        origin: Origin,
        region: Region,
        row_pitch: u64,
        slice_pitch: u64,
    ) -> Result<()> {
        if region.has_zero() {
            return Err(ValidationError::ZeroSizedRegion {
                target: format!("buffer {target}"),
                region: region.as_array(),
            });
        }
        let alloc = self.require(target)?;
        let span = RectSpan::compute(origin, region, row_pitch, slice_pitch)?;
        self.check_span(&alloc, span.end)
    }

    /// Check an image access axis by axis against the image's extents.
    pub fn validate_image(&self, target: Handle, origin: Origin, region: Region) -> Result<()> {
        if region.has_zero() {
            return Err(ValidationError::ZeroSizedRegion {
                target: format!("image {target}"),
                region: region.as_array(),
            });
        }
        let alloc = self.require(target)?;
        let desc = alloc.image.ok_or(ValidationError::NotAnImage { handle: target })?;

        let extents = desc.extents();
        let origin = origin.as_array();
        let region = region.as_array();
        for (axis, name) in ["x", "y", "z"].iter().enumerate() {
            let end = u128::from(origin[axis]) + u128::from(region[axis]);
            if end > u128::from(extents[axis]) {
                return Err(self.out_of_bounds(
                    format!("{} axis {name}", alloc.describe()),
                    end,
                    extents[axis],
                ));
            }
        }
        Ok(())
    }

    /// Check a `[ptr + offset, ptr + offset + length)` USM access.
    ///
    /// `ptr` must lie inside an allocation of the scope's context, and the
    /// whole span must stay inside that same allocation.
    pub fn validate_pointer(&self, scope: Scope, ptr: u64, offset: u64, length: u64) -> Result<()> {
        self.check_pointer(scope, ptr, offset, u128::from(length))
    }

    /// Check a pitched 2D USM access of `height` rows, `width` bytes each.
    pub fn validate_pointer_2d(
        &self,
        scope: Scope,
        ptr: u64,
        pitch: u64,
        width: u64,
        height: u64,
    ) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(ValidationError::ZeroSizedRegion {
                target: format!("pointer {ptr:#x}"),
                region: [width, height, 1],
            });
        }
        if width > pitch {
            return Err(ValidationError::InvalidPitch { pitch, required: width });
        }
        let length = u128::from(pitch) * u128::from(height - 1) + u128::from(width);
        self.check_pointer(scope, ptr, 0, length)
    }

    // ── Internals ───────────────────────────────────────────────────

    fn require(&self, target: Handle) -> Result<Arc<Allocation>> {
        let state = self.read()?;
        match state.by_handle.get(&target) {
            Some(alloc) => Ok(Arc::clone(alloc)),
            None => {
                drop(state);
                self.unregistered_accesses.fetch_add(1, Ordering::Relaxed);
                debug!(target = %target, "access to untracked memory object");
                Err(ValidationError::UnregisteredAllocation { target: format!("handle {target}") })
            }
        }
    }

    /// `end` is relative to the start of `alloc`.
    fn check_span(&self, alloc: &Allocation, end: u128) -> Result<()> {
        if alloc.kind == AllocationKind::SubBuffer
            && self.sub_buffer_bounds == SubBufferBounds::Strict
            && end > u128::from(alloc.byte_length)
        {
            return Err(self.out_of_bounds(alloc.describe(), end, alloc.byte_length));
        }

        let (root, base) = alloc.resolve();
        let end = end.saturating_add(u128::from(base));
        if end > u128::from(root.byte_length) {
            return Err(self.out_of_bounds(root.describe(), end, root.byte_length));
        }
        Ok(())
    }

    /// `ptr` selects the allocation; `offset + length` must stay inside it.
    fn check_pointer(&self, scope: Scope, ptr: u64, offset: u64, length: u128) -> Result<()> {
        let state = self.read()?;
        let context = state.context_of(scope)?;
        let found = state.containing(ptr).filter(|alloc| alloc.context == context).cloned();
        drop(state);

        let Some(alloc) = found else {
            let target = format!("pointer {ptr:#x}");
            self.unregistered_accesses.fetch_add(1, Ordering::Relaxed);
            debug!(target = %target, context = %context, "pointer outside every tracked allocation");
            return Err(ValidationError::UnregisteredAllocation { target });
        };

        let rel_end = u128::from(ptr - alloc.base_address)
            .saturating_add(u128::from(offset))
            .saturating_add(length);
        if rel_end > u128::from(alloc.byte_length) {
            return Err(self.out_of_bounds(alloc.describe(), rel_end, alloc.byte_length));
        }
        Ok(())
    }

    fn out_of_bounds(&self, target: String, end: u128, limit: u64) -> ValidationError {
        self.bounds_violations.fetch_add(1, Ordering::Relaxed);
        let end = u64::try_from(end).unwrap_or(u64::MAX);
        debug!(target = %target, end, limit, "out of bounds access");
        ValidationError::OutOfBounds { target, end, limit }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, RegistryState>> {
        self.state.read().map_err(|e| ValidationError::LockPoisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, RegistryState>> {
        self.state.write().map_err(|e| ValidationError::LockPoisoned(e.to_string()))
    }
}
