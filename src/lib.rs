//! # revhash - Reverse MD5 Dictionary Lookup
//!
//! revhash answers "which known word hashes to this MD5 digest?" against a
//! word-list corpus of millions of lines, and lets new words be appended at
//! any time without taking lookups offline.
//!
//! ## Architecture
//!
//! - [`utils`] - MD5 digest type, config, progress bars
//! - [`corpus`] - Append-only word list with durable, line-atomic appends
//! - [`index`] - Sharded in-memory digest index and its parallel builder
//! - [`engine`] - Lookup and ingestion services, error kinds
//! - [`server`] - Unix socket daemon keeping the index warm
//! - [`output`] - Terminal formatting
//!
//! ## Quick Start
//!
//! ```ignore
//! use revhash::engine::{EngineConfig, HashEngine};
//! use std::path::Path;
//!
//! let engine = HashEngine::open(Path::new("words.txt"), EngineConfig::default())?;
//!
//! match engine.lookup_hex("e10adc3949ba59abbe56e057f20f883e")? {
//!     Some(word) => println!("{}", word),
//!     None => println!("not found"),
//! }
//!
//! let ingested = engine.ingest("hunter2")?;
//! println!("{}", ingested.digest);
//! ```
//!
//! ## Design
//!
//! Every corpus line is hashed exactly once, when the index is built at
//! startup or when the line is ingested. Lookups are a single hash map probe.
//! The corpus is the source of truth: ingestion appends and syncs the line
//! before touching the index, and the index can always be rebuilt from the
//! corpus. The first plaintext seen for a digest wins.

pub mod corpus;
pub mod engine;
pub mod index;
pub mod output;
pub mod server;
pub mod utils;
