//! The process-scoped reference-count ledger.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use accelguard_common::{Handle, HandleKind, Result, ValidationError};
use tracing::{debug, error, info, warn};

use crate::leak::{LeakEntry, LeakReport};
use crate::record::RefCountRecord;

/// Snapshot of ledger counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerStats {
    /// Records with a nonzero count.
    pub live_records: usize,
    /// Live records created by enumeration.
    pub indirect_records: usize,
    /// Sum of all live counts.
    pub total_references: u64,
    /// Uses or retains of handles the ledger does not know.
    pub invalid_references: u64,
    /// Releases of handles that were already at zero.
    pub double_releases: u64,
    /// Create calls for a handle that was already live.
    pub duplicate_records: u64,
}

/// Lifetime tracking for every driver handle seen by one layer instance.
///
/// Mutations take the write lock, queries the read lock. No method calls out
/// while holding the lock.
#[derive(Debug, Default)]
pub struct RefCountLedger {
    records: RwLock<HashMap<Handle, RefCountRecord>>,
    invalid_references: AtomicU64,
    double_releases: AtomicU64,
    duplicate_records: AtomicU64,
}

impl RefCountLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly created object with a count of one.
    ///
    /// Fails if the handle is already live.
    pub fn create_record(&self, handle: Handle, kind: HandleKind) -> Result<()> {
        let mut records = self.write()?;
        let existing = records.get(&handle).copied();
        if existing.is_none() {
            records.insert(handle, RefCountRecord::created(handle, kind));
        }
        drop(records);

        match existing {
            Some(existing) => {
                self.duplicate_records.fetch_add(1, Ordering::Relaxed);
                warn!(
                    handle = %handle,
                    kind = %kind,
                    existing_kind = %existing.kind,
                    count = existing.count,
                    "create returned a handle that is already tracked"
                );
                Err(ValidationError::DuplicateRecord { handle, kind })
            }
            None => {
                debug!(handle = %handle, kind = %kind, "tracking new handle");
                Ok(())
            }
        }
    }

    /// Track a handle returned by an enumeration call.
    ///
    /// The first sighting creates an indirect record; later sightings add a
    /// reference. Returns the new count.
    pub fn create_or_increment(&self, handle: Handle, kind: HandleKind) -> Result<u32> {
        let mut records = self.write()?;
        let count = match records.get_mut(&handle) {
            Some(rec) => rec.retain(),
            None => {
                records.insert(handle, RefCountRecord::discovered(handle, kind));
                Ok(1)
            }
        };
        drop(records);
        match count {
            Ok(count) => {
                debug!(handle = %handle, kind = %kind, count, "discovered handle");
                Ok(count)
            }
            Err(err) => {
                warn!(handle = %handle, kind = %kind, "reference count overflow on discovery");
                Err(err)
            }
        }
    }

    /// Explicit retain. Returns the new count.
    pub fn increment(&self, handle: Handle) -> Result<u32> {
        let retained = self.write()?.get_mut(&handle).map(|rec| (rec.retain(), rec.kind));
        match retained {
            Some((Ok(count), kind)) => {
                debug!(handle = %handle, kind = %kind, count, "retained handle");
                Ok(count)
            }
            Some((Err(err), kind)) => {
                warn!(handle = %handle, kind = %kind, "reference count overflow on retain");
                Err(err)
            }
            None => {
                self.invalid_references.fetch_add(1, Ordering::Relaxed);
                warn!(handle = %handle, "attempting to retain nonexistent handle");
                Err(ValidationError::InvalidReference { handle })
            }
        }
    }

    /// Explicit release. Returns the new count; the record is dropped at zero.
    ///
    /// Releasing a handle that is not tracked (never created, or already
    /// released to zero) is a double release.
    pub fn decrement(&self, handle: Handle) -> Result<u32> {
        let released = {
            let mut records = self.write()?;
            let outcome = match records.get_mut(&handle) {
                Some(rec) => rec.release().map(|count| (count, rec.kind)),
                None => Err(ValidationError::DoubleRelease { handle }),
            };
            if let Ok((0, _)) = outcome {
                records.remove(&handle);
            }
            outcome
        };

        match released {
            Ok((0, kind)) => {
                debug!(handle = %handle, kind = %kind, "released last reference");
                Ok(0)
            }
            Ok((count, kind)) => {
                debug!(handle = %handle, kind = %kind, count, "released handle");
                Ok(count)
            }
            Err(err) => {
                self.double_releases.fetch_add(1, Ordering::Relaxed);
                warn!(handle = %handle, "attempting to release nonexistent or released handle");
                Err(err)
            }
        }
    }

    /// Whether the handle is tracked with a nonzero count.
    pub fn is_valid(&self, handle: Handle) -> bool {
        self.records
            .read()
            .map(|r| r.get(&handle).is_some_and(RefCountRecord::is_live))
            .unwrap_or(false)
    }

    /// Report use of a handle that failed [`is_valid`](Self::is_valid).
    pub fn log_invalid(&self, handle: Handle) {
        self.invalid_references.fetch_add(1, Ordering::Relaxed);
        warn!(handle = %handle, "use of invalid or released handle");
    }

    /// Current count for a handle, if tracked.
    pub fn count(&self, handle: Handle) -> Option<u32> {
        self.record(handle).map(|r| r.count)
    }

    /// Copy of a handle's record, if tracked.
    pub fn record(&self, handle: Handle) -> Option<RefCountRecord> {
        self.records.read().ok().and_then(|r| r.get(&handle).copied())
    }

    /// Number of tracked handles.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Whether no handles are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the ledger's counters.
    pub fn stats(&self) -> LedgerStats {
        let (live_records, indirect_records, total_references) = self
            .records
            .read()
            .map(|r| {
                r.values().fold((0, 0, 0u64), |(live, indirect, total), rec| {
                    (live + 1, indirect + usize::from(rec.indirect), total + u64::from(rec.count))
                })
            })
            .unwrap_or_default();
        LedgerStats {
            live_records,
            indirect_records,
            total_references,
            invalid_references: self.invalid_references.load(Ordering::Relaxed),
            double_releases: self.double_releases.load(Ordering::Relaxed),
            duplicate_records: self.duplicate_records.load(Ordering::Relaxed),
        }
    }

    /// Emit one leak diagnostic per live record and clear the ledger.
    ///
    /// Takes the write lock for the whole sweep, so it waits for in-flight
    /// mutations and no new ones can interleave. A poisoned lock is
    /// recovered: teardown still reports what was recorded.
    pub fn report_leaks_at_teardown(&self) -> LeakReport {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<LeakEntry> = records
            .drain()
            .map(|(_, rec)| rec)
            .filter(RefCountRecord::is_live)
            .map(LeakEntry::from)
            .collect();
        drop(records);

        entries.sort_by_key(|e| e.handle);
        for leak in &entries {
            error!(
                handle = %leak.handle,
                kind = %leak.kind,
                count = leak.count,
                indirect = leak.indirect,
                "retained {} reference(s) to {} handle {}",
                leak.count,
                leak.kind,
                leak.handle
            );
        }
        let report = LeakReport::new(entries);
        info!(leaks = report.len(), "reference-count ledger torn down");
        report
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<Handle, RefCountRecord>>> {
        self.records.write().map_err(|e| ValidationError::LockPoisoned(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn h(raw: u64) -> Handle {
        Handle::from_raw(raw)
    }

    #[test]
    fn create_then_valid_with_count_one() {
        let ledger = RefCountLedger::new();
        ledger.create_record(h(1), HandleKind::Context).unwrap();
        assert!(ledger.is_valid(h(1)));
        assert_eq!(ledger.count(h(1)), Some(1));
    }

    #[test]
    fn duplicate_create_fails_and_keeps_original() {
        let ledger = RefCountLedger::new();
        ledger.create_record(h(1), HandleKind::Buffer).unwrap();
        ledger.increment(h(1)).unwrap();
        let err = ledger.create_record(h(1), HandleKind::Buffer).unwrap_err();
        assert_eq!(err, ValidationError::DuplicateRecord { handle: h(1), kind: HandleKind::Buffer });
        assert_eq!(ledger.count(h(1)), Some(2));
        assert_eq!(ledger.stats().duplicate_records, 1);
    }

    #[test]
    fn increment_unknown_is_invalid_reference() {
        let ledger = RefCountLedger::new();
        assert_eq!(
            ledger.increment(h(9)).unwrap_err(),
            ValidationError::InvalidReference { handle: h(9) }
        );
        assert_eq!(ledger.stats().invalid_references, 1);
    }

    #[test]
    fn retain_past_max_is_reported_and_count_is_kept() {
        let ledger = RefCountLedger::new();
        ledger.create_record(h(3), HandleKind::Kernel).unwrap();
        ledger.records.write().unwrap().get_mut(&h(3)).unwrap().count = u32::MAX;

        assert_eq!(
            ledger.increment(h(3)).unwrap_err(),
            ValidationError::ReferenceOverflow { handle: h(3) }
        );
        assert_eq!(ledger.count(h(3)), Some(u32::MAX));
        assert_eq!(ledger.decrement(h(3)).unwrap(), u32::MAX - 1);
        assert_eq!(ledger.stats().double_releases, 0);
    }

    #[test]
    fn final_release_drops_record() {
        let ledger = RefCountLedger::new();
        ledger.create_record(h(2), HandleKind::Event).unwrap();
        assert_eq!(ledger.decrement(h(2)).unwrap(), 0);
        assert!(!ledger.is_valid(h(2)));
        assert!(ledger.is_empty());
        assert_eq!(ledger.decrement(h(2)).unwrap_err(), ValidationError::DoubleRelease { handle: h(2) });
        assert_eq!(ledger.stats().double_releases, 1);
    }

    #[test]
    fn recreate_after_release_is_allowed() {
        let ledger = RefCountLedger::new();
        ledger.create_record(h(3), HandleKind::Kernel).unwrap();
        ledger.decrement(h(3)).unwrap();
        ledger.create_record(h(3), HandleKind::Kernel).unwrap();
        assert_eq!(ledger.count(h(3)), Some(1));
    }

    #[test]
    fn log_invalid_bumps_counter() {
        let ledger = RefCountLedger::new();
        ledger.log_invalid(h(4));
        ledger.log_invalid(h(4));
        assert_eq!(ledger.stats().invalid_references, 2);
    }

    #[test]
    fn stats_sum_live_references() {
        let ledger = RefCountLedger::new();
        ledger.create_record(h(1), HandleKind::Context).unwrap();
        ledger.increment(h(1)).unwrap();
        ledger.create_or_increment(h(2), HandleKind::Adapter).unwrap();
        let stats = ledger.stats();
        assert_eq!(stats.live_records, 2);
        assert_eq!(stats.indirect_records, 1);
        assert_eq!(stats.total_references, 3);
    }

    #[test]
    fn teardown_clears_and_second_report_is_clean() {
        let ledger = RefCountLedger::new();
        ledger.create_record(h(5), HandleKind::Program).unwrap();
        let first = ledger.report_leaks_at_teardown();
        assert_eq!(first.len(), 1);
        assert!(ledger.is_empty());
        assert!(ledger.report_leaks_at_teardown().is_clean());
    }

    #[test]
    fn concurrent_retain_release_balances() {
        let ledger = Arc::new(RefCountLedger::new());
        ledger.create_record(h(7), HandleKind::Queue).unwrap();

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || {
                    for _ in 0..500 {
                        ledger.increment(h(7)).unwrap();
                        ledger.decrement(h(7)).unwrap();
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        assert_eq!(ledger.count(h(7)), Some(1));
        assert_eq!(ledger.stats().double_releases, 0);
    }
}
