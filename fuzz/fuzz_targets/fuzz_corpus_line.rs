#![no_main]

use libfuzzer_sys::fuzz_target;
use revhash::corpus::{resolve_line, CorpusLine};

fuzz_target!(|data: &[u8]| {
    // Arbitrary corpus lines must never panic, and an accepted line must
    // always resolve to the digest of its word
    if let Ok((digest, word)) = resolve_line(data) {
        assert_eq!(digest, revhash::utils::digest(word.as_bytes()));
    }
    if let Ok(line) = CorpusLine::parse_bytes(data) {
        let _ = line.word();
        let _ = line.resolve();
    }
});
