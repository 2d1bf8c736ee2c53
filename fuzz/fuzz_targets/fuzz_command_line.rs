//! Fuzz target for remote-helper command lines.

#![no_main]

use gitipfs_remote::Command;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(line) = std::str::from_utf8(data) {
        let _ = Command::parse(line);
        let _ = line.parse::<gitipfs_remote::PushCommand>();
    }
});
