//! Lookup and ingestion services.
//!
//! [`HashEngine`] owns a [`CorpusStore`](crate::corpus::CorpusStore) and the
//! [`DigestIndex`](crate::index::DigestIndex) built from it:
//!
//! - [`HashEngine::lookup`] / [`HashEngine::lookup_hex`] - read path
//! - [`HashEngine::ingest`] - serialized write path (append durably, then index)
//! - [`HashEngine::reload`] - full rebuild from the corpus

pub mod error;
pub mod service;

pub use error::{EngineError, ErrorKind, InvalidPlaintext, Result};
pub use service::{validate_plaintext, EngineConfig, EngineStats, HashEngine, Ingested};
