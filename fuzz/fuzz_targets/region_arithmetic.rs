#![no_main]

use accelguard_bounds::{AllocationRegistry, Origin, RectSpan, Region};
use accelguard_common::{Handle, ValidationError};
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct RectInput {
    size: u64,
    origin: [u64; 3],
    region: [u64; 3],
    row_pitch: u64,
    slice_pitch: u64,
}

fuzz_target!(|input: RectInput| {
    let reg = AllocationRegistry::new();
    let buffer = Handle::from_raw(1);
    if reg.register_buffer(buffer, Handle::from_raw(2), input.size).is_err() {
        assert_eq!(input.size, 0);
        return;
    }

    let origin = Origin::from(input.origin);
    let region = Region::from(input.region);
    let verdict = reg.validate_rect(buffer, origin, region, input.row_pitch, input.slice_pitch);

    if region.has_zero() {
        assert!(matches!(verdict, Err(ValidationError::ZeroSizedRegion { .. })));
        return;
    }

    // No input may panic or wrap; the verdict must agree with the span.
    match RectSpan::compute(origin, region, input.row_pitch, input.slice_pitch) {
        Ok(span) => {
            assert!(span.start <= span.end);
            assert_eq!(verdict.is_ok(), span.end <= u128::from(input.size));
        }
        Err(err) => assert_eq!(verdict, Err(err)),
    }
});
