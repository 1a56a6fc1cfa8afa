//! Lifecycle scenarios for the reference-count ledger.

use accelguard_common::{Handle, HandleKind, ValidationError};
use accelguard_refcount::RefCountLedger;
use anyhow::Result;

fn h(raw: u64) -> Handle {
    Handle::from_raw(raw)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().with_env_filter("debug").try_init();
}

// ── create / retain / release ───────────────────────────────────────

#[test]
fn created_handle_is_valid_with_count_one() -> Result<()> {
    let ledger = RefCountLedger::new();
    ledger.create_record(h(0x100), HandleKind::Buffer)?;
    assert!(ledger.is_valid(h(0x100)));
    assert_eq!(ledger.count(h(0x100)), Some(1));
    let rec = ledger.record(h(0x100)).unwrap();
    assert!(!rec.indirect);
    assert_eq!(rec.kind, HandleKind::Buffer);
    Ok(())
}

#[test]
fn retains_and_releases_balance_then_double_release() -> Result<()> {
    init_tracing();
    let ledger = RefCountLedger::new();
    ledger.create_record(h(0x200), HandleKind::Context)?;

    for _ in 0..5 {
        ledger.increment(h(0x200))?;
    }
    assert_eq!(ledger.count(h(0x200)), Some(6));
    for _ in 0..5 {
        ledger.decrement(h(0x200))?;
    }
    assert_eq!(ledger.count(h(0x200)), Some(1));

    assert_eq!(ledger.decrement(h(0x200))?, 0);
    let err = ledger.decrement(h(0x200)).unwrap_err();
    assert_eq!(err, ValidationError::DoubleRelease { handle: h(0x200) });
    Ok(())
}

#[test]
fn release_of_never_created_handle_is_double_release() {
    let ledger = RefCountLedger::new();
    let err = ledger.decrement(h(0xdead)).unwrap_err();
    assert!(matches!(err, ValidationError::DoubleRelease { .. }));
    assert_eq!(ledger.stats().double_releases, 1);
}

#[test]
fn released_handle_is_not_valid() -> Result<()> {
    let ledger = RefCountLedger::new();
    ledger.create_record(h(0x300), HandleKind::Event)?;
    ledger.decrement(h(0x300))?;
    assert!(!ledger.is_valid(h(0x300)));
    assert_eq!(ledger.count(h(0x300)), None);
    Ok(())
}

// ── discovery ───────────────────────────────────────────────────────

#[test]
fn repeated_discovery_increments_single_record() -> Result<()> {
    let ledger = RefCountLedger::new();
    assert_eq!(ledger.create_or_increment(h(0xa0), HandleKind::Adapter)?, 1);
    assert_eq!(ledger.create_or_increment(h(0xa0), HandleKind::Adapter)?, 2);
    assert_eq!(ledger.len(), 1);

    assert_eq!(ledger.decrement(h(0xa0))?, 1);
    assert!(ledger.is_valid(h(0xa0)));
    assert!(ledger.record(h(0xa0)).unwrap().indirect);
    Ok(())
}

#[test]
fn discovery_of_created_handle_keeps_direct_flag() -> Result<()> {
    let ledger = RefCountLedger::new();
    ledger.create_record(h(0xd0), HandleKind::Device)?;
    ledger.create_or_increment(h(0xd0), HandleKind::Device)?;
    let rec = ledger.record(h(0xd0)).unwrap();
    assert_eq!(rec.count, 2);
    assert!(!rec.indirect);
    Ok(())
}

// ── teardown ────────────────────────────────────────────────────────

#[test]
fn unreleased_buffer_is_reported_once() -> Result<()> {
    init_tracing();
    let ledger = RefCountLedger::new();
    ledger.create_record(h(0x400), HandleKind::Buffer)?;

    let report = ledger.report_leaks_at_teardown();
    assert_eq!(report.len(), 1);
    let leak = report.find(h(0x400)).unwrap();
    assert_eq!(leak.kind, HandleKind::Buffer);
    assert_eq!(leak.count, 1);
    Ok(())
}

#[test]
fn balanced_program_has_clean_teardown() -> Result<()> {
    let ledger = RefCountLedger::new();
    ledger.create_record(h(1), HandleKind::Context)?;
    ledger.create_record(h(2), HandleKind::Queue)?;
    ledger.increment(h(2))?;
    ledger.decrement(h(2))?;
    ledger.decrement(h(2))?;
    ledger.decrement(h(1))?;

    assert!(ledger.report_leaks_at_teardown().is_clean());
    Ok(())
}

#[test]
fn leaks_are_ordered_by_handle() -> Result<()> {
    let ledger = RefCountLedger::new();
    for raw in [0x30, 0x10, 0x20] {
        ledger.create_record(h(raw), HandleKind::Kernel)?;
    }
    let report = ledger.report_leaks_at_teardown();
    let order: Vec<u64> = report.leaks().iter().map(|l| l.handle.raw()).collect();
    assert_eq!(order, vec![0x10, 0x20, 0x30]);
    Ok(())
}
