//! Error types for the lookup engine.
//!
//! Callers at the process boundary should branch on [`EngineError::kind`]
//! rather than on messages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Result type defaulting to [`EngineError`]
pub type Result<T, E = EngineError> = std::result::Result<T, E>;

/// Errors raised by the corpus store, index and services
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The corpus file is missing or unreadable. Fatal at startup.
    #[error("corpus unavailable at {}: {source}", path.display())]
    CorpusUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Appending to the corpus failed. Nothing was indexed; the caller may retry.
    #[error("corpus append failed: {0}")]
    WriteFailed(#[source] std::io::Error),

    /// Plaintext rejected by ingestion
    #[error("invalid plaintext: {0}")]
    InvalidPlaintext(InvalidPlaintext),

    /// Query input is not a well-formed digest
    #[error("malformed digest: {0:?}")]
    MalformedDigest(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::CorpusUnavailable { .. } => ErrorKind::CorpusUnavailable,
            EngineError::WriteFailed(_) => ErrorKind::WriteFailed,
            EngineError::InvalidPlaintext(_) => ErrorKind::InvalidPlaintext,
            EngineError::MalformedDigest(_) => ErrorKind::MalformedDigest,
        }
    }

    /// Whether retrying the same call can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::WriteFailed(_))
    }
}

/// Why a plaintext was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidPlaintext {
    Empty,
    ContainsNewline,
    /// Would be read back as a legacy `word digest` pair
    AmbiguousLegacyPair,
}

impl fmt::Display for InvalidPlaintext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidPlaintext::Empty => write!(f, "empty after trimming"),
            InvalidPlaintext::ContainsNewline => write!(f, "contains a line terminator"),
            InvalidPlaintext::AmbiguousLegacyPair => {
                write!(f, "ends with a hex digest token and would be read as a legacy pair")
            }
        }
    }
}

/// Structured error kind reported across process boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    CorpusUnavailable,
    WriteFailed,
    InvalidPlaintext,
    MalformedDigest,
    /// Request could not be decoded or served (server-side plumbing)
    BadRequest,
    Internal,
}
