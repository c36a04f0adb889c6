//! Terminal output for lookup, ingestion and stats results

use crate::engine::EngineStats;
use crate::index::types::{BuildStats, IndexUpdate};
use std::io::{self, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

fn stdout(color: bool) -> StandardStream {
    let choice = if color {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    StandardStream::stdout(choice)
}

/// Print one lookup result as `digest  plaintext` or `digest  (not found)`
pub fn print_lookup(digest: &str, plaintext: Option<&str>, color: bool) -> io::Result<()> {
    let mut out = stdout(color);
    write_lookup(&mut out, digest, plaintext)
}

fn write_lookup<W: WriteColor>(out: &mut W, digest: &str, plaintext: Option<&str>) -> io::Result<()> {
    out.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)))?;
    write!(out, "{}", digest)?;
    out.reset()?;
    write!(out, "  ")?;

    match plaintext {
        Some(word) => {
            out.set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true))?;
            write!(out, "{}", word)?;
        }
        None => {
            out.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)))?;
            write!(out, "(not found)")?;
        }
    }
    out.reset()?;
    writeln!(out)
}

/// Print the digest of an ingested plaintext
pub fn print_ingested(
    digest: &str,
    plaintext: &str,
    update: Option<IndexUpdate>,
    color: bool,
) -> io::Result<()> {
    let mut out = stdout(color);

    out.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)))?;
    write!(out, "{}", digest)?;
    out.reset()?;
    write!(out, "  {}", plaintext)?;

    let note = match update {
        Some(IndexUpdate::AlreadyPresent) => Some(("already indexed", Color::Cyan)),
        Some(IndexUpdate::Deferred) => Some(("stored, index deferred until reload", Color::Red)),
        Some(IndexUpdate::Inserted) | None => None,
    };
    if let Some((text, fg)) = note {
        out.set_color(ColorSpec::new().set_fg(Some(fg)))?;
        write!(out, "  ({})", text)?;
        out.reset()?;
    }
    writeln!(out)
}

/// Print build counters
pub fn print_build_stats(stats: &BuildStats) {
    println!("Index build:");
    println!("  Lines scanned: {}", stats.lines);
    println!("  Entries indexed: {}", stats.indexed);
    println!("  Duplicate digests: {}", stats.duplicates);
    println!(
        "  Skipped: {} (blank {}, not UTF-8 {}, digest mismatch {})",
        stats.skipped(),
        stats.blank,
        stats.malformed,
        stats.mismatched
    );
    println!("  Corpus bytes: {}", stats.bytes);
    println!("  Took: {:.1}s", stats.elapsed.as_secs_f64());
}

/// Print engine counters
pub fn print_engine_stats(stats: &EngineStats) {
    println!("Corpus: {}", stats.corpus_path.display());
    println!("  Lines: {}", stats.corpus_lines);
    println!("  Size: {:.1} MB", stats.corpus_bytes as f64 / 1024.0 / 1024.0);
    println!("Index:");
    println!("  Entries: {}", stats.entries);
    println!("  Shards: {}", stats.shards);
    println!("  Memory (approx): {:.1} MB", stats.memory_bytes as f64 / 1024.0 / 1024.0);
    println!("  Lookups: {} ({} hits)", stats.lookups, stats.hits);
    println!("  Ingested: {}", stats.ingested);
    if stats.degraded {
        println!("  Degraded: yes (run 'revhash reload')");
    }
    println!("  Uptime: {}s", stats.uptime_secs);
}
