use accelguard_common::{Handle, HandleKind, ValidationError};
use accelguard_refcount::RefCountLedger;
use proptest::prelude::*;

fn arb_kind() -> impl Strategy<Value = HandleKind> {
    (0..HandleKind::ALL.len()).prop_map(|i| HandleKind::ALL[i])
}

proptest! {
    /// A freshly created record is valid with count one.
    #[test]
    fn create_yields_count_one(raw in 1u64.., kind in arb_kind()) {
        let ledger = RefCountLedger::new();
        ledger.create_record(Handle::from_raw(raw), kind).unwrap();
        prop_assert!(ledger.is_valid(Handle::from_raw(raw)));
        prop_assert_eq!(ledger.count(Handle::from_raw(raw)), Some(1));
    }

    /// n retains followed by n releases restore the count; releasing past
    /// zero is a double release.
    #[test]
    fn balanced_retain_release(n in 1u32..64, kind in arb_kind()) {
        let ledger = RefCountLedger::new();
        let h = Handle::from_raw(0x1000);
        ledger.create_record(h, kind).unwrap();
        for _ in 0..n {
            ledger.increment(h).unwrap();
        }
        for _ in 0..n {
            ledger.decrement(h).unwrap();
        }
        prop_assert_eq!(ledger.count(h), Some(1));
        prop_assert_eq!(ledger.decrement(h).unwrap(), 0);
        prop_assert_eq!(
            ledger.decrement(h).unwrap_err(),
            ValidationError::DoubleRelease { handle: h }
        );
    }

    /// k discoveries of the same handle give one record with count k.
    #[test]
    fn discovery_counts_sightings(k in 1u32..32) {
        let ledger = RefCountLedger::new();
        let h = Handle::from_raw(0xa0);
        for _ in 0..k {
            ledger.create_or_increment(h, HandleKind::Adapter).unwrap();
        }
        prop_assert_eq!(ledger.len(), 1);
        prop_assert_eq!(ledger.count(h), Some(k));
    }

    /// Teardown reports exactly the handles that were never fully released.
    #[test]
    fn teardown_reports_exactly_unreleased(released in proptest::collection::vec(any::<bool>(), 1..40)) {
        let ledger = RefCountLedger::new();
        for (i, _) in released.iter().enumerate() {
            ledger.create_record(Handle::from_raw(i as u64 + 1), HandleKind::Buffer).unwrap();
        }
        for (i, done) in released.iter().enumerate() {
            if *done {
                ledger.decrement(Handle::from_raw(i as u64 + 1)).unwrap();
            }
        }
        let report = ledger.report_leaks_at_teardown();
        let expected = released.iter().filter(|d| !**d).count();
        prop_assert_eq!(report.len(), expected);
        for (i, done) in released.iter().enumerate() {
            prop_assert_eq!(report.find(Handle::from_raw(i as u64 + 1)).is_some(), !*done);
        }
    }
}
