//! Lookup and ingestion services over a corpus + index pair.

use crate::corpus::line::CorpusLine;
use crate::corpus::store::{CorpusStore, Position};
use crate::engine::error::{EngineError, InvalidPlaintext, Result};
use crate::index::build::{self, BuildOptions};
use crate::index::types::{BuildStats, DigestIndex, IndexUpdate};
use crate::utils::app_data::AppConfig;
use crate::utils::digest::Digest;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

/// Engine settings
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub build: BuildOptions,
    pub sync_on_append: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            build: BuildOptions::default(),
            sync_on_append: true,
        }
    }
}

impl EngineConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            build: BuildOptions {
                shards: config.effective_shard_count(),
                chunk_lines: config.effective_build_chunk_lines(),
                threads: config.build_threads,
                silent: true,
            },
            sync_on_append: config.sync_on_append,
        }
    }

    /// Show a progress bar during builds
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.build.silent = !progress;
        self
    }
}

/// Result of a successful ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ingested {
    pub digest: Digest,
    /// Where the plaintext landed in the corpus
    pub position: Position,
    pub index: IndexUpdate,
}

/// Point-in-time engine counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStats {
    pub corpus_path: PathBuf,
    pub corpus_lines: u64,
    pub corpus_bytes: u64,
    /// Distinct digests in the index
    pub entries: u64,
    pub shards: usize,
    pub lookups: u64,
    pub hits: u64,
    pub ingested: u64,
    /// Some ingested entries are durable but not yet indexed
    pub degraded: bool,
    pub memory_bytes: u64,
    pub uptime_secs: u64,
    pub last_build: BuildStats,
}

#[derive(Default)]
struct Counters {
    lookups: AtomicU64,
    hits: AtomicU64,
    ingested: AtomicU64,
    degraded: AtomicBool,
}

/// Reverse MD5 lookup engine.
///
/// Owns the corpus and the index built from it. Lookups are lock-free with
/// respect to ingestion except for a per-shard read lock held for one `get`.
/// Ingestions are serialized: append durably, then index.
pub struct HashEngine {
    store: CorpusStore,
    index: RwLock<Arc<DigestIndex>>,
    /// Serializes the write path (append + index insert, and reloads)
    write_lock: Mutex<()>,
    build_options: BuildOptions,
    last_build: Mutex<BuildStats>,
    counters: Counters,
    started: Instant,
}

impl HashEngine {
    /// Open a corpus and build its index. Returns once the index is complete.
    pub fn open(path: &Path, config: EngineConfig) -> Result<Self> {
        let store = CorpusStore::open(path)?;
        Self::from_store(store, config)
    }

    /// Build the index over an already-open corpus
    pub fn from_store(mut store: CorpusStore, config: EngineConfig) -> Result<Self> {
        store.set_sync_on_append(config.sync_on_append);

        tracing::info!(path = %store.path().display(), "building index");
        let (index, stats) = build::build_from_store(&store, &config.build)?;

        Ok(Self {
            store,
            index: RwLock::new(Arc::new(index)),
            write_lock: Mutex::new(()),
            build_options: config.build,
            last_build: Mutex::new(stats),
            counters: Counters::default(),
            started: Instant::now(),
        })
    }

    pub fn corpus(&self) -> &CorpusStore {
        &self.store
    }

    fn current_index(&self) -> Arc<DigestIndex> {
        // The guarded value is an Arc that is only ever replaced whole
        Arc::clone(&self.index.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Resolve a digest to its plaintext. Not found is `None`, not an error.
    pub fn lookup(&self, digest: &Digest) -> Option<String> {
        let found = self.current_index().get(digest);
        self.counters.lookups.fetch_add(1, Ordering::Relaxed);
        if found.is_some() {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Resolve a hex digest (case-insensitive)
    pub fn lookup_hex(&self, hex: &str) -> Result<Option<String>> {
        let digest = Digest::from_hex(hex)?;
        Ok(self.lookup(&digest))
    }

    /// Resolve a raw 16-byte digest
    pub fn lookup_bytes(&self, bytes: &[u8]) -> Result<Option<String>> {
        let digest = Digest::from_bytes(bytes)?;
        Ok(self.lookup(&digest))
    }

    /// Add a plaintext to the corpus and make it queryable.
    ///
    /// The index is only touched after the append is durable. If the append
    /// fails nothing is indexed and `WriteFailed` is returned.
    pub fn ingest(&self, plaintext: &str) -> Result<Ingested> {
        let word = validate_plaintext(plaintext)?;

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let position = self.store.append(word)?;

        let index = self.current_index();
        let (digest, update) = match build::update(&index, word) {
            Ok(result) => result,
            Err(rejection) => {
                // validate_plaintext guarantees a Plain line; keep the corpus
                // authoritative and let a reload sort it out
                tracing::warn!(?rejection, "ingested line did not re-parse");
                (Digest::of(word.as_bytes()), IndexUpdate::Deferred)
            }
        };

        if update == IndexUpdate::Deferred {
            self.counters.degraded.store(true, Ordering::Relaxed);
        }
        self.counters.ingested.fetch_add(1, Ordering::Relaxed);

        tracing::debug!(%digest, line = position.line, ?update, "ingested plaintext");

        Ok(Ingested {
            digest,
            position,
            index: update,
        })
    }

    /// Rebuild the index from the corpus and swap it in.
    ///
    /// Ingestion waits for the rebuild; lookups keep using the old index until
    /// the swap.
    pub fn reload(&self) -> Result<BuildStats> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let (index, stats) = build::build_from_store(&self.store, &self.build_options)?;
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(index);
        *self.last_build.lock().unwrap_or_else(PoisonError::into_inner) = stats.clone();
        self.counters.degraded.store(false, Ordering::Relaxed);

        tracing::info!(entries = stats.indexed, "index reloaded");
        Ok(stats)
    }

    pub fn is_degraded(&self) -> bool {
        self.counters.degraded.load(Ordering::Relaxed)
    }

    /// Number of distinct digests currently indexed
    pub fn len(&self) -> usize {
        self.current_index().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> EngineStats {
        let index = self.current_index();
        EngineStats {
            corpus_path: self.store.path().to_path_buf(),
            corpus_lines: self.store.line_count(),
            corpus_bytes: self.store.len_bytes(),
            entries: index.len() as u64,
            shards: index.shard_count(),
            lookups: self.counters.lookups.load(Ordering::Relaxed),
            hits: self.counters.hits.load(Ordering::Relaxed),
            ingested: self.counters.ingested.load(Ordering::Relaxed),
            degraded: self.is_degraded(),
            memory_bytes: index.approx_memory_bytes(),
            uptime_secs: self.started.elapsed().as_secs(),
            last_build: self
                .last_build
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}

/// Trim and check a plaintext for ingestion.
///
/// Accepts exactly what a rebuild would read back as the same plain entry.
pub fn validate_plaintext(plaintext: &str) -> Result<&str> {
    let word = plaintext.trim();
    if word.is_empty() {
        return Err(EngineError::InvalidPlaintext(InvalidPlaintext::Empty));
    }
    if word.contains(['\n', '\r']) {
        return Err(EngineError::InvalidPlaintext(InvalidPlaintext::ContainsNewline));
    }
    match CorpusLine::parse(word) {
        Ok(CorpusLine::Plain(parsed)) if parsed == word => Ok(word),
        _ => Err(EngineError::InvalidPlaintext(InvalidPlaintext::AmbiguousLegacyPair)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn engine_with(text: &str) -> (tempfile::TempDir, HashEngine) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("words.txt");
        fs::write(&path, text).unwrap();
        let config = EngineConfig {
            sync_on_append: false,
            ..EngineConfig::default()
        };
        let engine = HashEngine::open(&path, config).unwrap();
        (dir, engine)
    }

    #[test]
    fn test_open_missing_corpus() {
        let dir = tempdir().unwrap();
        let err = HashEngine::open(&dir.path().join("none.txt"), EngineConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::CorpusUnavailable { .. }));
    }

    #[test]
    fn test_lookup_hex() {
        let (_dir, engine) = engine_with("password\n123456\nletmein\n");
        assert_eq!(
            engine.lookup_hex("E10ADC3949BA59ABBE56E057F20F883E").unwrap().as_deref(),
            Some("123456")
        );
        assert_eq!(engine.lookup_hex(&Digest::of(b"hunter2").to_hex()).unwrap(), None);
    }

    #[test]
    fn test_lookup_malformed() {
        let (_dir, engine) = engine_with("password\n");
        for bad in ["", "abc", "5f4dcc3b5aa765d61d8327deb882cf9z", "5f4dcc3b5aa765d61d8327deb882cf990"] {
            assert!(
                matches!(engine.lookup_hex(bad), Err(EngineError::MalformedDigest(_))),
                "accepted {:?}",
                bad
            );
        }
        assert!(matches!(engine.lookup_bytes(&[1, 2, 3]), Err(EngineError::MalformedDigest(_))));
    }

    #[test]
    fn test_lookup_bytes() {
        let (_dir, engine) = engine_with("letmein\n");
        let digest = Digest::of(b"letmein");
        assert_eq!(
            engine.lookup_bytes(digest.as_bytes()).unwrap().as_deref(),
            Some("letmein")
        );
    }

    #[test]
    fn test_ingest_then_lookup() {
        let (_dir, engine) = engine_with("password\n");
        let ingested = engine.ingest(" hunter2 ").unwrap();
        assert_eq!(ingested.digest, Digest::of(b"hunter2"));
        assert_eq!(ingested.index, IndexUpdate::Inserted);
        assert_eq!(ingested.position.line, 1);
        assert_eq!(engine.lookup(&ingested.digest).as_deref(), Some("hunter2"));
    }

    #[test]
    fn test_ingest_twice_is_idempotent_for_lookup() {
        let (dir, engine) = engine_with("");
        let first = engine.ingest("hunter2").unwrap();
        let second = engine.ingest("hunter2").unwrap();
        assert_eq!(first.digest, second.digest);
        assert_eq!(second.index, IndexUpdate::AlreadyPresent);
        assert_eq!(engine.len(), 1);

        let content = fs::read_to_string(dir.path().join("words.txt")).unwrap();
        assert_eq!(content, "hunter2\nhunter2\n");
    }

    #[test]
    fn test_ingest_rejects_invalid() {
        let (dir, engine) = engine_with("");
        let cases = [
            ("", InvalidPlaintext::Empty),
            ("   \t", InvalidPlaintext::Empty),
            ("two\nlines", InvalidPlaintext::ContainsNewline),
            ("carriage\rreturn", InvalidPlaintext::ContainsNewline),
        ];
        for (input, reason) in cases {
            match engine.ingest(input) {
                Err(EngineError::InvalidPlaintext(r)) => assert_eq!(r, reason),
                other => panic!("unexpected result for {:?}: {:?}", input, other),
            }
        }

        let pair = format!("password {}", Digest::of(b"password"));
        assert!(matches!(
            engine.ingest(&pair),
            Err(EngineError::InvalidPlaintext(InvalidPlaintext::AmbiguousLegacyPair))
        ));

        // Nothing reached the corpus
        assert_eq!(fs::read_to_string(dir.path().join("words.txt")).unwrap(), "");
    }

    #[test]
    fn test_ingest_trailing_newline_is_trimmed() {
        let (_dir, engine) = engine_with("");
        let ingested = engine.ingest("hunter2\n").unwrap();
        assert_eq!(ingested.digest, Digest::of(b"hunter2"));
    }

    #[test]
    fn test_reload_rebuilds_from_corpus() {
        let (_dir, engine) = engine_with("password\n");
        engine.ingest("hunter2").unwrap();
        engine.ingest("hunter2").unwrap();

        let stats = engine.reload().unwrap();
        assert_eq!(stats.lines, 3);
        assert_eq!(stats.indexed, 2);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(engine.lookup(&Digest::of(b"hunter2")).as_deref(), Some("hunter2"));
        assert!(!engine.is_degraded());
        assert_eq!(engine.stats().last_build.lines, 3);
    }

    #[test]
    fn test_reload_keeps_lines_from_another_writer() {
        let (dir, engine) = engine_with("password\n");
        let path = dir.path().join("words.txt");

        let other = CorpusStore::open(&path).unwrap();
        other.append("external").unwrap();

        let ingested = engine.ingest("hunter2").unwrap();
        assert_eq!(ingested.index, IndexUpdate::Inserted);
        assert_eq!(ingested.position.line, 2);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "password\nexternal\nhunter2\n"
        );

        let stats = engine.reload().unwrap();
        assert_eq!(stats.lines, 3);
        assert_eq!(stats.indexed, 3);
        assert_eq!(engine.lookup(&Digest::of(b"hunter2")).as_deref(), Some("hunter2"));
        assert_eq!(engine.lookup(&Digest::of(b"external")).as_deref(), Some("external"));
    }

    #[test]
    fn test_ingest_write_failure_leaves_index_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("words.txt");
        fs::write(&path, "password\n").unwrap();
        let store = CorpusStore::open_read_only(&path).unwrap();
        let engine = HashEngine::from_store(store, EngineConfig::default()).unwrap();

        let err = engine.ingest("hunter2").err().unwrap();
        assert!(matches!(err, EngineError::WriteFailed(_)));
        assert!(err.is_retryable());

        assert_eq!(engine.lookup(&Digest::of(b"hunter2")), None);
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.stats().ingested, 0);
        assert!(!engine.is_degraded());
        assert_eq!(fs::read_to_string(&path).unwrap(), "password\n");
    }

    #[test]
    fn test_poisoned_shard_defers_until_reload() {
        let (dir, engine) = engine_with("password\n");
        let digest = Digest::of(b"hunter2");
        engine.current_index().poison_shard_of(&digest);

        let ingested = engine.ingest("hunter2").unwrap();
        assert_eq!(ingested.digest, digest);
        assert_eq!(ingested.index, IndexUpdate::Deferred);
        assert!(engine.is_degraded());
        assert!(engine.stats().degraded);

        // Durable even though not yet visible
        let content = fs::read_to_string(dir.path().join("words.txt")).unwrap();
        assert_eq!(content, "password\nhunter2\n");
        assert_eq!(engine.lookup(&digest), None);

        engine.reload().unwrap();
        assert!(!engine.is_degraded());
        assert_eq!(engine.lookup(&digest).as_deref(), Some("hunter2"));
    }

    #[test]
    fn test_config_from_app_config() {
        let app = AppConfig {
            shard_count: usize::MAX,
            build_chunk_lines: 0,
            build_threads: 3,
            sync_on_append: false,
            ..AppConfig::default()
        };
        let config = EngineConfig::from_app_config(&app).with_progress(false);
        assert_eq!(config.build.shards, 65536);
        assert_eq!(config.build.chunk_lines, 1);
        assert_eq!(config.build.threads, 3);
        assert!(config.build.silent);
        assert!(!config.sync_on_append);
    }

    #[test]
    fn test_stats_counters() {
        let (_dir, engine) = engine_with("password\n123456\n");
        engine.lookup(&Digest::of(b"password"));
        engine.lookup(&Digest::of(b"missing"));
        engine.ingest("letmein").unwrap();

        let stats = engine.stats();
        assert_eq!(stats.entries, 3);
        assert_eq!(stats.lookups, 2);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.ingested, 1);
        assert_eq!(stats.corpus_lines, 3);
        assert_eq!(stats.last_build.indexed, 2);
        assert!(!stats.degraded);
    }

    #[test]
    fn test_validate_plaintext() {
        assert_eq!(validate_plaintext("  a b c ").unwrap(), "a b c");
        assert!(validate_plaintext("x 5f4dcc3b5aa765d61d8327deb882cf99").is_err());
        // A digest-looking token alone is a plain word
        assert!(validate_plaintext("5f4dcc3b5aa765d61d8327deb882cf99").is_ok());
    }
}
