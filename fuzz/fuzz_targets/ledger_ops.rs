#![no_main]

use std::collections::HashMap;

use accelguard_common::{Handle, HandleKind};
use accelguard_refcount::RefCountLedger;
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
enum Op {
    Create(u8),
    Discover(u8),
    Retain(u8),
    Release(u8),
}

fuzz_target!(|ops: Vec<Op>| {
    let ledger = RefCountLedger::new();
    let mut model: HashMap<u64, u32> = HashMap::new();

    for op in ops.into_iter().take(512) {
        match op {
            Op::Create(h) => {
                let raw = u64::from(h) + 1;
                let ok = ledger.create_record(Handle::from_raw(raw), HandleKind::Buffer).is_ok();
                assert_eq!(ok, !model.contains_key(&raw));
                model.entry(raw).or_insert(1);
            }
            Op::Discover(h) => {
                let raw = u64::from(h) + 1;
                let count = ledger.create_or_increment(Handle::from_raw(raw), HandleKind::Device).unwrap();
                let expected = model.entry(raw).and_modify(|c| *c += 1).or_insert(1);
                assert_eq!(count, *expected);
            }
            Op::Retain(h) => {
                let raw = u64::from(h) + 1;
                let got = ledger.increment(Handle::from_raw(raw)).ok();
                let expected = model.get_mut(&raw).map(|c| {
                    *c += 1;
                    *c
                });
                assert_eq!(got, expected);
            }
            Op::Release(h) => {
                let raw = u64::from(h) + 1;
                let got = ledger.decrement(Handle::from_raw(raw)).ok();
                let expected = model.get_mut(&raw).map(|c| {
                    *c -= 1;
                    *c
                });
                if expected == Some(0) {
                    model.remove(&raw);
                }
                assert_eq!(got, expected);
            }
        }
    }

    let report = ledger.report_leaks_at_teardown();
    assert_eq!(report.len(), model.len());
});
