//! Fuzz target for loose object decoding.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(object) = gitipfs_storage::decode_loose(data) {
        let _ = object.links();
    }
});
