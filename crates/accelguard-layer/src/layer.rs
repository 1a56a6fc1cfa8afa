//! The validation layer and the contract every wrapped entry point follows.
//!
//! Each entry point runs, in order: parameter checks, lifetime checks,
//! bounds checks, the driver call, one ledger mutation, and finally any
//! registry update. A bounds failure stops the call before the driver sees
//! it. Lifetime problems are logged and the call proceeds, unless the layer
//! is strict.
//!
//! Handle values can be reused by the driver as soon as it frees an object.
//! A release therefore holds the lifecycle lock from before its driver call
//! until its ledger and registry cleanup is done, and every call that
//! records a new handle takes the same lock around the recording step. A
//! reused handle is only recorded after the release that freed it finished.

use std::sync::{Mutex, MutexGuard, PoisonError};

use accelguard_bounds::{AllocationRegistry, Origin, Region, Scope};
use accelguard_common::{Handle, HandleKind, ValidationConfig, ValidationError};
use accelguard_refcount::{LeakReport, RefCountLedger};
use tracing::{debug, error, info, warn};

use crate::diagnostics::{DiagnosticCounters, Diagnostics};
use crate::driver::{Driver, DriverResult};
use crate::error::{LayerError, Result};

/// Interposes validation between an application and a [`Driver`].
pub struct ValidationLayer<D: Driver> {
    config: ValidationConfig,
    driver: D,
    ledger: RefCountLedger,
    registry: AllocationRegistry,
    counters: DiagnosticCounters,
    lifecycle: Mutex<()>,
}

impl<D: Driver> ValidationLayer<D> {
    /// Wrap `driver` with the checks enabled in `config`.
    ///
    /// Lifetime validation implies leak checking.
    pub fn new(driver: D, config: ValidationConfig) -> Result<Self> {
        config.validate()?;
        let config = config.effective();
        info!(
            parameter = config.parameter_validation,
            leak = config.leak_checking,
            lifetime = config.lifetime_validation,
            bounds = config.bounds_checking,
            strict = config.strict,
            sub_buffer_bounds = %config.sub_buffer_bounds,
            "validation layer enabled"
        );
        Ok(Self {
            registry: AllocationRegistry::with_sub_buffer_bounds(config.sub_buffer_bounds),
            ledger: RefCountLedger::new(),
            counters: DiagnosticCounters::default(),
            lifecycle: Mutex::new(()),
            config,
            driver,
        })
    }

    /// Wrap `driver` with a config read from `ACCELGUARD_*` variables.
    pub fn from_env(driver: D) -> Result<Self> {
        Self::new(driver, ValidationConfig::from_env()?)
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn ledger(&self) -> &RefCountLedger {
        &self.ledger
    }

    pub fn registry(&self) -> &AllocationRegistry {
        &self.registry
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.counters.snapshot()
    }

    /// Whether handles are reference counted. Bounds checking needs the
    /// counts to know when a memory object's last reference goes away.
    pub(crate) fn tracks_handles(&self) -> bool {
        self.config.tracks_references() || self.config.bounds_checking
    }

    // ── Parameter checks ────────────────────────────────────────────

    pub(crate) fn require_handle(&self, name: &str, handle: Handle) -> Result<()> {
        if self.config.parameter_validation && handle.is_null() {
            self.counters.parameter_error();
            return Err(self.block(name, ValidationError::InvalidArgument(format!("{name} is null"))));
        }
        Ok(())
    }

    pub(crate) fn require_pointer(&self, name: &str, ptr: u64) -> Result<()> {
        if self.config.parameter_validation && ptr == 0 {
            self.counters.parameter_error();
            return Err(self.block(name, ValidationError::InvalidArgument(format!("{name} is null"))));
        }
        Ok(())
    }

    pub(crate) fn require_size(&self, name: &str, size: u64) -> Result<()> {
        if self.config.parameter_validation && size == 0 {
            self.counters.parameter_error();
            return Err(self.block(
                name,
                ValidationError::ZeroSizedRegion { target: name.to_string(), region: [0, 1, 1] },
            ));
        }
        Ok(())
    }

    pub(crate) fn require_region(&self, name: &str, region: Region) -> Result<()> {
        if self.config.parameter_validation && region.has_zero() {
            self.counters.parameter_error();
            return Err(self.block(
                name,
                ValidationError::ZeroSizedRegion { target: name.to_string(), region: region.as_array() },
            ));
        }
        Ok(())
    }

    pub(crate) fn require_argument(&self, name: &str, ok: bool, message: &str) -> Result<()> {
        if self.config.parameter_validation && !ok {
            self.counters.parameter_error();
            return Err(self.block(name, ValidationError::InvalidArgument(message.to_string())));
        }
        Ok(())
    }

    // ── Lifetime checks ─────────────────────────────────────────────

    /// Check that every handle is live.
    ///
    /// Unknown handles are reported; in strict mode the first one fails the
    /// call with [`ValidationError::InvalidReference`].
    pub fn check_handles(&self, handles: &[Handle]) -> Result<()> {
        if !self.config.lifetime_validation {
            return Ok(());
        }
        for &handle in handles.iter().filter(|h| !h.is_null()) {
            if !self.ledger.is_valid(handle) {
                self.ledger.log_invalid(handle);
                self.counters.lifetime_diagnostic();
                if self.config.strict {
                    return Err(self.block("handle check", ValidationError::InvalidReference { handle }));
                }
            }
        }
        Ok(())
    }

    // ── Bounds checks ───────────────────────────────────────────────

    pub fn check_linear(&self, buffer: Handle, offset: u64, length: u64) -> Result<()> {
        if !self.config.bounds_checking {
            return Ok(());
        }
        self.bounds(self.registry.validate_linear(buffer, offset, length))
    }

    pub fn check_rect(
        &self,
        buffer: Handle,
        origin: Origin,
        region: Region,
        row_pitch: u64,
        slice_pitch: u64,
    ) -> Result<()> {
        if !self.config.bounds_checking {
            return Ok(());
        }
        self.bounds(self.registry.validate_rect(buffer, origin, region, row_pitch, slice_pitch))
    }

    pub fn check_image(&self, image: Handle, origin: Origin, region: Region) -> Result<()> {
        if !self.config.bounds_checking {
            return Ok(());
        }
        self.bounds(self.registry.validate_image(image, origin, region))
    }

    pub fn check_pointer(&self, scope: Scope, ptr: u64, offset: u64, length: u64) -> Result<()> {
        if !self.config.bounds_checking {
            return Ok(());
        }
        self.bounds(self.registry.validate_pointer(scope, ptr, offset, length))
    }

    pub fn check_pointer_2d(
        &self,
        scope: Scope,
        ptr: u64,
        pitch: u64,
        width: u64,
        height: u64,
    ) -> Result<()> {
        if !self.config.bounds_checking {
            return Ok(());
        }
        self.bounds(self.registry.validate_pointer_2d(scope, ptr, pitch, width, height))
    }

    /// Record a bounds check's outcome. Any failure blocks the call.
    pub(crate) fn bounds(&self, outcome: accelguard_common::Result<()>) -> Result<()> {
        outcome.map_err(|err| {
            self.counters.bounds_violation();
            self.block("bounds check", err)
        })
    }

    // ── Ledger updates ──────────────────────────────────────────────

    /// Start tracking a handle returned by a create call.
    pub fn record_create(&self, handle: Handle, kind: HandleKind) -> Result<()> {
        if !self.tracks_handles() {
            return Ok(());
        }
        self.lifetime(self.ledger.create_record(handle, kind))
    }

    /// Track a handle returned by an enumeration call.
    pub fn record_discover(&self, handle: Handle, kind: HandleKind) -> Result<()> {
        if !self.tracks_handles() {
            return Ok(());
        }
        self.lifetime(self.ledger.create_or_increment(handle, kind).map(drop))
    }

    pub fn record_retain(&self, handle: Handle) -> Result<()> {
        if !self.tracks_handles() {
            return Ok(());
        }
        self.lifetime(self.ledger.increment(handle).map(drop))
    }

    /// Drop one reference. Returns the remaining count, or `None` when the
    /// release could not be matched to a live record.
    pub fn record_release(&self, handle: Handle) -> Result<Option<u32>> {
        if !self.tracks_handles() {
            return Ok(None);
        }
        match self.ledger.decrement(handle) {
            Ok(count) => Ok(Some(count)),
            Err(err) => self.lifetime(Err(err)).map(|()| None),
        }
    }

    /// Lifetime violations are advisory outside strict mode; everything
    /// else propagates.
    fn lifetime(&self, outcome: accelguard_common::Result<()>) -> Result<()> {
        match outcome {
            Ok(()) => Ok(()),
            Err(err) if err.is_lifetime_violation() => {
                self.counters.lifetime_diagnostic();
                if self.config.strict { Err(LayerError::Validation(err)) } else { Ok(()) }
            }
            Err(err) => Err(LayerError::Validation(err)),
        }
    }

    /// Report a registry update that failed after the driver succeeded.
    pub(crate) fn registry_update(&self, op: &str, outcome: accelguard_common::Result<()>) -> Result<()> {
        match outcome {
            Ok(()) => Ok(()),
            Err(err) => {
                error!(op, error = %err, "allocation registry update failed");
                if self.config.strict { Err(LayerError::Validation(err)) } else { Ok(()) }
            }
        }
    }

    // ── Dispatch ────────────────────────────────────────────────────

    /// Call the driver. No layer lock is held here.
    pub(crate) fn forward<T>(&self, op: &'static str, call: impl FnOnce(&D) -> DriverResult<T>) -> Result<T> {
        self.counters.forwarded();
        call(&self.driver).map_err(|err| {
            self.counters.driver_failure();
            debug!(op, code = err.code, message = %err.message, "driver call failed");
            LayerError::Driver(err)
        })
    }

    /// Record an event produced by an enqueue call.
    pub(crate) fn record_event(&self, event: Option<Handle>) -> Result<Option<Handle>> {
        if let Some(event) = event {
            let _lifecycle = self.lifecycle();
            self.record_create(event, HandleKind::Event)?;
        }
        Ok(event)
    }

    /// Serializes handle recording against releases. The guarded state is
    /// `()`, so a poisoned lock is still usable.
    pub(crate) fn lifecycle(&self) -> MutexGuard<'_, ()> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn block(&self, op: &str, err: ValidationError) -> LayerError {
        self.counters.blocked();
        if err.is_lifetime_violation() {
            warn!(op, error = %err, "call blocked");
        } else {
            error!(op, error = %err, "call blocked");
        }
        LayerError::Validation(err)
    }

    // ── Teardown ────────────────────────────────────────────────────

    /// Shut the layer down and report every handle still holding references.
    ///
    /// The report is empty when leak checking is off.
    pub fn teardown(self) -> LeakReport {
        let report = if self.config.leak_checking {
            self.ledger.report_leaks_at_teardown()
        } else {
            LeakReport::default()
        };
        let remaining_allocations = self.registry.clear();
        let diagnostics = self.counters.snapshot();
        info!(
            leaks = report.len(),
            remaining_allocations,
            forwarded = diagnostics.forwarded,
            blocked = diagnostics.blocked,
            lifetime_diagnostics = diagnostics.lifetime_diagnostics,
            bounds_violations = diagnostics.bounds_violations,
            "validation layer torn down"
        );
        report
    }
}

impl<D: Driver> std::fmt::Debug for ValidationLayer<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationLayer")
            .field("config", &self.config)
            .field("ledger", &self.ledger.stats())
            .field("registry", &self.registry.stats())
            .field("diagnostics", &self.counters.snapshot())
            .finish_non_exhaustive()
    }
}
