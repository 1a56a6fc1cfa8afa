//! Per-layer diagnostic counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of [`DiagnosticCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Diagnostics {
    /// Calls passed through to the driver.
    pub forwarded: u64,
    /// Calls refused before reaching the driver.
    pub blocked: u64,
    /// Calls the driver itself failed.
    pub driver_failures: u64,
    /// Null or zero-sized arguments.
    pub parameter_errors: u64,
    /// Invalid references, double releases and duplicate records.
    pub lifetime_diagnostics: u64,
    /// Out-of-bounds, unregistered and pitch errors from bounds checks.
    pub bounds_violations: u64,
}

#[derive(Debug, Default)]
pub(crate) struct DiagnosticCounters {
    forwarded: AtomicU64,
    blocked: AtomicU64,
    driver_failures: AtomicU64,
    parameter_errors: AtomicU64,
    lifetime_diagnostics: AtomicU64,
    bounds_violations: AtomicU64,
}

impl DiagnosticCounters {
    pub(crate) fn forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn blocked(&self) {
        self.blocked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn driver_failure(&self) {
        self.driver_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn parameter_error(&self) {
        self.parameter_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn lifetime_diagnostic(&self) {
        self.lifetime_diagnostics.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn bounds_violation(&self) {
        self.bounds_violations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> Diagnostics {
        Diagnostics {
            forwarded: self.forwarded.load(Ordering::Relaxed),
            blocked: self.blocked.load(Ordering::Relaxed),
            driver_failures: self.driver_failures.load(Ordering::Relaxed),
            parameter_errors: self.parameter_errors.load(Ordering::Relaxed),
            lifetime_diagnostics: self.lifetime_diagnostics.load(Ordering::Relaxed),
            bounds_violations: self.bounds_violations.load(Ordering::Relaxed),
        }
    }
}
