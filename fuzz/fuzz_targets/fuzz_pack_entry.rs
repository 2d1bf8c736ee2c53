//! Fuzz target for pack entry header and body decoding.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = gitipfs_pack::parse_entry(data);
});
