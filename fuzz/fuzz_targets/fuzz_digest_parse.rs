#![no_main]

use libfuzzer_sys::fuzz_target;
use revhash::utils::Digest;

fuzz_target!(|data: &[u8]| {
    let _ = Digest::from_bytes(data);
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(digest) = Digest::from_hex(text) {
            // Canonical form parses back to the same digest
            assert_eq!(Digest::from_hex(&digest.to_hex()).ok(), Some(digest));
        }
    }
});
