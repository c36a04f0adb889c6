//! Durable word list backing the engine.
//!
//! - [`store`] - append-only file with durable, line-atomic appends and snapshots
//! - [`line`] - parser for plain and legacy `word digest` lines

pub mod line;
pub mod store;

pub use line::{resolve_line, CorpusLine, LineRejection};
pub use store::{CorpusSnapshot, CorpusStore, Position};
