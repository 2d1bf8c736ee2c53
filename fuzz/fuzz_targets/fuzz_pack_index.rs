//! Fuzz target for pack index parsing.
//!
//! Any index that parses must answer lookups for its own ids.

#![no_main]

use gitipfs_pack::PackIndex;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(index) = PackIndex::parse(data) {
        for id in index.ids() {
            let offset = index.lookup(id);
            assert!(offset.is_some());
            let _ = index.entry_len(offset.unwrap_or(0), u64::MAX);
        }
    }
});
