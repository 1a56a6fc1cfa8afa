use accelguard_common::{Handle, HandleKind};
use accelguard_refcount::RefCountLedger;

fn h(raw: u64) -> Handle {
    Handle::from_raw(raw)
}

#[test]
fn leak_report_text_is_stable() {
    // Regression: the teardown summary format must never change.
    let ledger = RefCountLedger::new();
    ledger.create_record(h(0x10), HandleKind::Context).unwrap();
    ledger.increment(h(0x10)).unwrap();
    ledger.create_record(h(0x20), HandleKind::Queue).unwrap();
    ledger.create_or_increment(h(0xa0), HandleKind::Adapter).unwrap();
    ledger.create_or_increment(h(0xa0), HandleKind::Adapter).unwrap();

    let report = ledger.report_leaks_at_teardown();
    insta::assert_snapshot!("leak_report_text", report.to_string());
}

#[test]
fn clean_report_text_is_stable() {
    let ledger = RefCountLedger::new();
    ledger.create_record(h(0x10), HandleKind::Sampler).unwrap();
    ledger.decrement(h(0x10)).unwrap();
    insta::assert_snapshot!("clean_report_text", ledger.report_leaks_at_teardown().to_string());
}

#[test]
fn leak_report_json_is_stable() {
    let ledger = RefCountLedger::new();
    ledger.create_record(h(0x1000), HandleKind::Buffer).unwrap();
    let json = ledger.report_leaks_at_teardown().to_json().unwrap();
    insta::assert_snapshot!("leak_report_json", json);
}
