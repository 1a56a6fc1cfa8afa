#![no_main]

use accelguard_bounds::{AllocationKey, AllocationRegistry, Scope, UsmKind};
use accelguard_common::Handle;
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

const CTX: Handle = Handle::from_raw(0xc0);

#[derive(Arbitrary, Debug)]
enum Op {
    Alloc { base: u16, len: u16 },
    Free { base: u16 },
    Check { ptr: u16, len: u16 },
}

fuzz_target!(|ops: Vec<Op>| {
    let reg = AllocationRegistry::new();
    // Shadow model: live intervals by base.
    let mut live: Vec<(u64, u64)> = Vec::new();

    for op in ops.into_iter().take(256) {
        match op {
            Op::Alloc { base, len } => {
                let (base, len) = (u64::from(base), u64::from(len));
                let ok = reg.register_usm(base, len, CTX, None, UsmKind::Device).is_ok();
                let expected = base != 0
                    && len != 0
                    && live.iter().all(|&(b, l)| base + len <= b || b + l <= base);
                assert_eq!(ok, expected);
                if ok {
                    live.push((base, len));
                }
            }
            Op::Free { base } => {
                let base = u64::from(base);
                let ok = reg.unregister_allocation(AllocationKey::Address(base)).is_ok();
                let idx = live.iter().position(|&(b, _)| b == base);
                assert_eq!(ok, idx.is_some());
                if let Some(idx) = idx {
                    live.swap_remove(idx);
                }
            }
            Op::Check { ptr, len } => {
                let (ptr, len) = (u64::from(ptr), u64::from(len));
                let ok = reg.validate_pointer(Scope::Context(CTX), ptr, 0, len).is_ok();
                let expected =
                    live.iter().any(|&(b, l)| ptr >= b && ptr < b + l && ptr + len <= b + l);
                assert_eq!(ok, expected);
            }
        }
    }
});
