//! Fuzz target for delta application.
//!
//! Tests that malformed deltas are rejected without panicking or
//! allocating unbounded memory.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input<'a> {
    base: &'a [u8],
    delta: &'a [u8],
}

fuzz_target!(|input: Input<'_>| {
    if let Ok(target) = gitipfs_pack::apply_delta(input.base, input.delta) {
        let per_op = input.base.len().max(0x10000);
        assert!(target.len() <= input.delta.len().saturating_mul(per_op));
    }
});
