use crate::utils::digest::Digest;
use ahash::RandomState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard};
use std::time::Duration;

/// Default number of index shards
pub const DEFAULT_SHARDS: usize = 64;

/// Upper bound on shards; `Digest::shard` keys on the leading 16 bits
pub const MAX_SHARDS: usize = 1 << 16;

/// Round a requested shard count to a power of two in `1..=MAX_SHARDS`
pub fn clamp_shard_count(requested: usize) -> usize {
    requested.clamp(1, MAX_SHARDS).next_power_of_two()
}

type Shard = HashMap<Digest, Box<str>, RandomState>;

/// Outcome of a single-entry index update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexUpdate {
    /// The digest was new and now maps to this plaintext
    Inserted,
    /// An earlier plaintext already owns the digest; nothing changed
    AlreadyPresent,
    /// The entry is durable in the corpus but could not be indexed.
    /// A reload will pick it up.
    Deferred,
}

impl IndexUpdate {
    /// Whether a lookup for the digest resolves after this update
    pub fn is_visible(&self) -> bool {
        !matches!(self, IndexUpdate::Deferred)
    }
}

/// Shard lock was poisoned by a panicking writer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardPoisoned;

/// In-memory digest -> plaintext map.
///
/// Sharded by the leading digest bytes. A shard lock is held only for the
/// duration of a single `get` or `insert`, so readers never wait on corpus I/O.
pub struct DigestIndex {
    shards: Box<[RwLock<Shard>]>,
}

impl DigestIndex {
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    /// Create an index with `shard_count` shards (rounded up to a power of two,
    /// at most [`MAX_SHARDS`])
    pub fn with_shards(shard_count: usize) -> Self {
        let shard_count = clamp_shard_count(shard_count);
        let shards = (0..shard_count)
            .map(|_| RwLock::new(Shard::default()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self { shards }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn shard_for(&self, digest: &Digest) -> &RwLock<Shard> {
        &self.shards[digest.shard(self.shards.len())]
    }

    fn read_shard(&self, digest: &Digest) -> RwLockReadGuard<'_, Shard> {
        // Inserts are single HashMap operations; a poisoned shard is still readable
        self.shard_for(digest)
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up the plaintext for a digest
    pub fn get(&self, digest: &Digest) -> Option<String> {
        self.read_shard(digest).get(digest).map(|p| p.to_string())
    }

    /// Insert unless the digest is already present. First plaintext wins.
    pub fn insert_if_absent(
        &self,
        digest: Digest,
        plaintext: &str,
    ) -> Result<IndexUpdate, ShardPoisoned> {
        let mut shard = self.shard_for(&digest).write().map_err(|_| ShardPoisoned)?;
        if shard.contains_key(&digest) {
            return Ok(IndexUpdate::AlreadyPresent);
        }
        shard.insert(digest, plaintext.into());
        Ok(IndexUpdate::Inserted)
    }

    /// Insert a batch into one shard under a single lock acquisition.
    ///
    /// Entries must already be in corpus order; earlier ones win.
    pub(crate) fn insert_batch_into_shard<'a>(
        &self,
        shard_idx: usize,
        entries: impl Iterator<Item = (Digest, &'a str)>,
    ) -> (u64, u64) {
        let mut shard = self.shards[shard_idx]
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut inserted = 0u64;
        let mut duplicates = 0u64;
        for (digest, plaintext) in entries {
            match shard.entry(digest) {
                std::collections::hash_map::Entry::Occupied(_) => duplicates += 1,
                std::collections::hash_map::Entry::Vacant(slot) => {
                    slot.insert(plaintext.into());
                    inserted += 1;
                }
            }
        }
        (inserted, duplicates)
    }

    /// Leave the shard holding `digest` poisoned, as a panicking writer would
    #[cfg(test)]
    pub(crate) fn poison_shard_of(&self, digest: &Digest) {
        std::thread::scope(|scope| {
            let _ = scope
                .spawn(|| {
                    let _guard = self.shard_for(digest).write();
                    panic!("writer died holding the shard lock");
                })
                .join();
        });
    }

    /// Number of distinct digests
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.read().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rough heap usage in bytes
    pub fn approx_memory_bytes(&self) -> u64 {
        self.shards
            .iter()
            .map(|s| {
                let shard = s.read().unwrap_or_else(PoisonError::into_inner);
                let entry = std::mem::size_of::<(Digest, Box<str>)>() + 8;
                let text: usize = shard.values().map(|p| p.len()).sum();
                (shard.capacity() * entry + text) as u64
            })
            .sum()
    }
}

impl Default for DigestIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters collected while replaying the corpus
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStats {
    /// Physical lines scanned
    pub lines: u64,
    /// Entries added to the index
    pub indexed: u64,
    /// Lines whose digest was already indexed
    pub duplicates: u64,
    /// Empty or whitespace-only lines
    pub blank: u64,
    /// Lines that were not valid UTF-8
    pub malformed: u64,
    /// Legacy pairs whose embedded digest did not match
    pub mismatched: u64,
    /// Corpus bytes covered by the build
    pub bytes: u64,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

impl BuildStats {
    /// Lines that were skipped rather than indexed or deduplicated
    pub fn skipped(&self) -> u64 {
        self.blank + self.malformed + self.mismatched
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
