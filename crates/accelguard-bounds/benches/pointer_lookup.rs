//! Criterion benchmarks for registry lookups.
//!
//! Measures pointer containment queries and handle-keyed linear checks as
//! the number of live allocations grows.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use accelguard_bounds::{AllocationRegistry, Scope, UsmKind};
use accelguard_common::Handle;

const CTX: Handle = Handle::from_raw(0xc0);
const STRIDE: u64 = 0x1_0000;

fn populated(n: u64) -> AllocationRegistry {
    let reg = AllocationRegistry::new();
    for i in 0..n {
        let base = 0x1000_0000 + i * STRIDE;
        reg.register_usm(base, STRIDE / 2, CTX, None, UsmKind::Device)
            .expect("non-overlapping allocation");
        reg.register_buffer(Handle::from_raw(i + 1), CTX, 4096).expect("fresh handle");
    }
    reg
}

fn bench_validate_pointer(c: &mut Criterion) {
    let mut group = c.benchmark_group("validate_pointer");

    for n in [16u64, 1_024, 65_536] {
        let reg = populated(n);
        let ptr = 0x1000_0000 + (n / 2) * STRIDE + 64;
        group.bench_with_input(BenchmarkId::from_parameter(n), &ptr, |b, &ptr| {
            b.iter(|| reg.validate_pointer(black_box(Scope::Context(CTX)), black_box(ptr), 0, 256))
        });
    }

    group.finish();
}

fn bench_lookup_miss(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup_pointer_miss");

    for n in [16u64, 1_024, 65_536] {
        let reg = populated(n);
        // Lands in the gap after the middle allocation.
        let ptr = 0x1000_0000 + (n / 2) * STRIDE + STRIDE / 2 + 8;
        group.bench_with_input(BenchmarkId::from_parameter(n), &ptr, |b, &ptr| {
            b.iter(|| reg.lookup_pointer(black_box(ptr)))
        });
    }

    group.finish();
}

fn bench_validate_linear(c: &mut Criterion) {
    let reg = populated(1_024);
    c.bench_function("validate_linear", |b| {
        b.iter(|| reg.validate_linear(black_box(Handle::from_raw(512)), black_box(1000), black_box(24)))
    });
}

criterion_group!(benches, bench_validate_pointer, bench_lookup_miss, bench_validate_linear);
criterion_main!(benches);
