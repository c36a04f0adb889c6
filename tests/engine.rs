//! End-to-end tests for the lookup engine over a real corpus file.

use revhash::engine::{EngineConfig, EngineError, HashEngine, InvalidPlaintext};
use revhash::index::IndexUpdate;
use revhash::utils::Digest;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;

const PASSWORD: &str = "5f4dcc3b5aa765d61d8327deb882cf99";
const NUMBERS: &str = "e10adc3949ba59abbe56e057f20f883e";
const LETMEIN: &str = "0d107d09f5bbe40cade3de5c71e9e9b7";
const HUNTER2: &str = "2ab96390c7dbe3439de74d0c9b0b1767";

fn small_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.build.shards = 8;
    config.build.chunk_lines = 2;
    config
}

fn write_corpus(dir: &Path, content: &str) -> std::path::PathBuf {
    let path = dir.join("words.txt");
    fs::write(&path, content).unwrap();
    path
}

fn count_lines(path: &Path, word: &str) -> usize {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .filter(|line| line.trim() == word)
        .count()
}

#[test]
fn lookup_then_ingest_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = write_corpus(dir.path(), "password\n123456\nletmein\n");
    let engine = HashEngine::open(&corpus, small_config()).unwrap();

    assert_eq!(engine.lookup_hex(NUMBERS).unwrap().as_deref(), Some("123456"));
    assert_eq!(engine.lookup_hex(PASSWORD).unwrap().as_deref(), Some("password"));
    assert_eq!(engine.lookup_hex(LETMEIN).unwrap().as_deref(), Some("letmein"));
    assert_eq!(engine.lookup_hex(HUNTER2).unwrap(), None);

    let first = engine.ingest("hunter2").unwrap();
    assert_eq!(first.digest.to_hex(), HUNTER2);
    assert_eq!(first.index, IndexUpdate::Inserted);
    assert_eq!(engine.lookup_hex(HUNTER2).unwrap().as_deref(), Some("hunter2"));

    let second = engine.ingest("hunter2").unwrap();
    assert_eq!(second.digest, first.digest);
    assert_eq!(second.index, IndexUpdate::AlreadyPresent);

    // Both appends are durable, one index entry
    assert_eq!(count_lines(&corpus, "hunter2"), 2);
    assert_eq!(engine.len(), 4);
}

#[test]
fn uppercase_digest_matches() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = write_corpus(dir.path(), "password\n");
    let engine = HashEngine::open(&corpus, small_config()).unwrap();

    let upper = PASSWORD.to_uppercase();
    assert_eq!(engine.lookup_hex(&upper).unwrap().as_deref(), Some("password"));
}

#[test]
fn not_found_is_distinct_from_malformed() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = write_corpus(dir.path(), "password\n");
    let engine = HashEngine::open(&corpus, small_config()).unwrap();

    assert_eq!(engine.lookup_hex(HUNTER2).unwrap(), None);

    for bad in ["", "xyz", "5f4dcc3b5aa765d61d8327deb882cf9", "zz4dcc3b5aa765d61d8327deb882cf99"] {
        assert!(
            matches!(engine.lookup_hex(bad), Err(EngineError::MalformedDigest(_))),
            "{:?} should be malformed",
            bad
        );
    }
}

#[test]
fn first_occurrence_wins_on_collision() {
    // Same plaintext twice maps to one digest; the index keeps the first
    let dir = tempfile::tempdir().unwrap();
    let corpus = write_corpus(dir.path(), "alpha\nbeta\nalpha\n");
    let engine = HashEngine::open(&corpus, small_config()).unwrap();

    assert_eq!(engine.len(), 2);
    let stats = engine.stats();
    assert_eq!(stats.last_build.lines, 3);
    assert_eq!(stats.last_build.duplicates, 1);
}

#[test]
fn legacy_lines_are_indexed_by_their_word() {
    let dir = tempfile::tempdir().unwrap();
    let content = format!(
        "password {}\nletmein 00000000000000000000000000000000\n123456\n",
        PASSWORD
    );
    let corpus = write_corpus(dir.path(), &content);
    let engine = HashEngine::open(&corpus, small_config()).unwrap();

    assert_eq!(engine.lookup_hex(PASSWORD).unwrap().as_deref(), Some("password"));
    assert_eq!(engine.lookup_hex(NUMBERS).unwrap().as_deref(), Some("123456"));
    // Mismatched embedded digest: the line is skipped
    assert_eq!(engine.lookup_hex(LETMEIN).unwrap(), None);
    assert_eq!(engine.stats().last_build.mismatched, 1);
}

#[test]
fn blank_lines_and_whitespace_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = write_corpus(dir.path(), "\n   \n  password  \r\n\n123456");
    let engine = HashEngine::open(&corpus, small_config()).unwrap();

    assert_eq!(engine.len(), 2);
    assert_eq!(engine.lookup_hex(PASSWORD).unwrap().as_deref(), Some("password"));
    assert_eq!(engine.lookup_hex(NUMBERS).unwrap().as_deref(), Some("123456"));
}

#[test]
fn ingested_words_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = write_corpus(dir.path(), "password\n");

    {
        let engine = HashEngine::open(&corpus, small_config()).unwrap();
        engine.ingest("hunter2").unwrap();
        engine.ingest("letmein").unwrap();
    }

    let engine = HashEngine::open(&corpus, small_config()).unwrap();
    assert_eq!(engine.len(), 3);
    assert_eq!(engine.lookup_hex(HUNTER2).unwrap().as_deref(), Some("hunter2"));
    assert_eq!(engine.lookup_hex(LETMEIN).unwrap().as_deref(), Some("letmein"));
}

#[test]
fn ingest_after_unterminated_last_line() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = write_corpus(dir.path(), "password");
    let engine = HashEngine::open(&corpus, small_config()).unwrap();

    engine.ingest("hunter2").unwrap();
    assert_eq!(fs::read_to_string(&corpus).unwrap(), "password\nhunter2\n");
    assert_eq!(engine.lookup_hex(PASSWORD).unwrap().as_deref(), Some("password"));
}

#[test]
fn rejected_plaintexts_leave_corpus_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = write_corpus(dir.path(), "password\n");
    let engine = HashEngine::open(&corpus, small_config()).unwrap();

    let ambiguous = format!("word {}", HUNTER2);
    let cases = [
        ("", InvalidPlaintext::Empty),
        ("   ", InvalidPlaintext::Empty),
        ("two\nlines", InvalidPlaintext::ContainsNewline),
        (ambiguous.as_str(), InvalidPlaintext::AmbiguousLegacyPair),
    ];
    for (input, expected) in cases {
        match engine.ingest(input) {
            Err(EngineError::InvalidPlaintext(reason)) => assert_eq!(reason, expected),
            other => panic!("{:?} gave {:?}", input, other),
        }
    }

    assert_eq!(fs::read_to_string(&corpus).unwrap(), "password\n");
    assert_eq!(engine.len(), 1);
}

#[test]
fn missing_corpus_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let result = HashEngine::open(&dir.path().join("absent.txt"), small_config());
    assert!(matches!(result, Err(EngineError::CorpusUnavailable { .. })));
}

#[test]
fn concurrent_ingest_and_lookup() {
    const WRITERS: usize = 4;
    const PER_WRITER: usize = 100;

    let dir = tempfile::tempdir().unwrap();
    let corpus = write_corpus(dir.path(), "password\n");
    let mut config = small_config();
    config.sync_on_append = false;
    let engine = Arc::new(HashEngine::open(&corpus, config).unwrap());

    let mut handles = Vec::new();
    for w in 0..WRITERS {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            for i in 0..PER_WRITER {
                let word = format!("writer{}-word{}", w, i);
                let ingested = engine.ingest(&word).unwrap();
                // Visible as soon as ingest returns
                assert_eq!(engine.lookup(&ingested.digest), Some(word));
            }
        }));
    }
    for _ in 0..2 {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            let digest = Digest::from_hex(PASSWORD).unwrap();
            for _ in 0..500 {
                assert_eq!(engine.lookup(&digest).as_deref(), Some("password"));
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(engine.len(), 1 + WRITERS * PER_WRITER);

    // Every line in the corpus is intact
    let content = fs::read_to_string(&corpus).unwrap();
    assert_eq!(content.lines().count(), 1 + WRITERS * PER_WRITER);
    for line in content.lines().skip(1) {
        assert!(line.starts_with("writer"), "torn line {:?}", line);
    }

    let stats = engine.reload().unwrap();
    assert_eq!(stats.indexed as usize, 1 + WRITERS * PER_WRITER);
    assert_eq!(stats.duplicates, 0);
}
