use crate::corpus::line::{resolve_line, CorpusLine, LineRejection};
use crate::corpus::store::{CorpusSnapshot, CorpusStore};
use crate::engine::Result;
use crate::index::types::{BuildStats, DigestIndex, IndexUpdate, DEFAULT_SHARDS};
use crate::utils::digest::Digest;
use crate::utils::progress::bytes_bar;
use rayon::prelude::*;
use std::time::Instant;

/// Knobs for a full index build
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Number of index shards
    pub shards: usize,
    /// Lines digested per parallel batch
    pub chunk_lines: usize,
    /// Worker threads. 0 uses the global rayon pool.
    pub threads: usize,
    /// Suppress the progress bar
    pub silent: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            shards: DEFAULT_SHARDS,
            chunk_lines: 64 * 1024,
            threads: 0,
            silent: true,
        }
    }
}

/// Result of digesting one raw line (computed in parallel)
type LineResult<'a> = std::result::Result<(Digest, &'a str), LineRejection>;

/// Snapshot the corpus and build an index over it
pub fn build_from_store(
    store: &CorpusStore,
    options: &BuildOptions,
) -> Result<(DigestIndex, BuildStats)> {
    let snapshot = store.scan()?;
    Ok(build(&snapshot, options))
}

/// Replay a corpus snapshot into a fresh index.
///
/// Digests are computed in parallel per chunk, then inserted shard by shard in
/// corpus order, so the first plaintext seen for a digest always wins.
pub fn build(snapshot: &CorpusSnapshot, options: &BuildOptions) -> (DigestIndex, BuildStats) {
    if options.threads > 0 {
        match rayon::ThreadPoolBuilder::new()
            .num_threads(options.threads)
            .build()
        {
            Ok(pool) => return pool.install(|| build_inner(snapshot, options)),
            Err(e) => {
                tracing::warn!(error = %e, "could not create build pool, using global pool");
            }
        }
    }
    build_inner(snapshot, options)
}

fn build_inner(snapshot: &CorpusSnapshot, options: &BuildOptions) -> (DigestIndex, BuildStats) {
    let start = Instant::now();
    let index = DigestIndex::with_shards(options.shards);
    let shard_count = index.shard_count();
    let chunk_lines = options.chunk_lines.max(1);

    let mut stats = BuildStats {
        bytes: snapshot.len_bytes(),
        ..BuildStats::default()
    };

    let progress_bar = bytes_bar(snapshot.len_bytes(), "Indexing corpus...", options.silent);

    let mut lines = snapshot.raw_lines();
    let mut chunk: Vec<&[u8]> = Vec::with_capacity(chunk_lines);
    let mut buckets: Vec<Vec<(Digest, &str)>> = vec![Vec::new(); shard_count];

    loop {
        chunk.clear();
        chunk.extend(lines.by_ref().take(chunk_lines));
        if chunk.is_empty() {
            break;
        }

        let chunk_bytes: u64 = chunk.iter().map(|l| l.len() as u64 + 1).sum();
        stats.lines += chunk.len() as u64;

        // Phase 1: digest in parallel, order preserved by collect
        let results: Vec<LineResult<'_>> = chunk.par_iter().map(|raw| resolve_line(*raw)).collect();

        // Phase 2: tally and bucket by shard
        for result in results {
            match result {
                Ok((digest, word)) => buckets[digest.shard(shard_count)].push((digest, word)),
                Err(LineRejection::Blank) => stats.blank += 1,
                Err(LineRejection::NotUtf8) => stats.malformed += 1,
                Err(LineRejection::Mismatch) => stats.mismatched += 1,
            }
        }

        // Phase 3: shards are disjoint, so they can be filled in parallel
        let (inserted, duplicates) = buckets
            .par_iter_mut()
            .enumerate()
            .map(|(shard_idx, bucket)| index.insert_batch_into_shard(shard_idx, bucket.drain(..)))
            .reduce(|| (0, 0), |a, b| (a.0 + b.0, a.1 + b.1));
        stats.indexed += inserted;
        stats.duplicates += duplicates;

        if let Some(ref pb) = progress_bar {
            pb.inc(chunk_bytes);
        }
    }

    stats.elapsed = start.elapsed();

    if let Some(pb) = progress_bar {
        pb.finish_with_message(format!("Indexed {} entries", stats.indexed));
    }

    if stats.skipped() > 0 {
        tracing::warn!(
            blank = stats.blank,
            malformed = stats.malformed,
            mismatched = stats.mismatched,
            "skipped unusable corpus lines"
        );
    }
    tracing::info!(
        lines = stats.lines,
        indexed = stats.indexed,
        duplicates = stats.duplicates,
        elapsed_ms = stats.elapsed.as_millis() as u64,
        "index built"
    );

    (index, stats)
}

/// Index a single new plaintext with the same trim/parse/digest rules as a build
pub fn update(
    index: &DigestIndex,
    plaintext: &str,
) -> std::result::Result<(Digest, IndexUpdate), LineRejection> {
    let (digest, word) = CorpusLine::parse(plaintext)?.resolve()?;
    let outcome = match index.insert_if_absent(digest, word) {
        Ok(outcome) => outcome,
        Err(_) => {
            tracing::warn!(%digest, "index shard poisoned, entry deferred until reload");
            IndexUpdate::Deferred
        }
    };
    Ok((digest, outcome))
}
