//! In-memory digest index.
//!
//! - [`types`] - sharded first-wins [`DigestIndex`] and [`BuildStats`]
//! - [`build`](mod@build) - parallel replay of a corpus snapshot, single-entry updates

pub mod build;
pub mod types;

pub use build::{build, build_from_store, update, BuildOptions};
pub use types::*;
