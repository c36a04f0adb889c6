//! Utility functions and data structures.
//!
//! ## Modules
//!
//! - [`app_data`] - Application data directory and config file (XDG-compliant)
//! - [`digest`] - MD5 digest type, hex parsing and formatting
//! - [`progress`] - Progress bar that compiles away without the `progress` feature
//!
//! ```no_run
//! use revhash::utils::digest;
//!
//! let d = digest(b"123456");
//! assert_eq!(d.to_hex(), "e10adc3949ba59abbe56e057f20f883e");
//! ```

pub mod app_data;
pub mod digest;
pub mod progress;

pub use app_data::*;
pub use digest::{digest, Digest, DIGEST_HEX_LEN, DIGEST_LEN};
