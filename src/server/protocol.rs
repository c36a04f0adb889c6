//! Protocol messages for client-server communication
//!
//! Uses a simple length-prefixed JSON protocol:
//! - 4 bytes (little-endian u32): message length
//! - N bytes: JSON-encoded message

use crate::engine::{EngineError, EngineStats, ErrorKind};
use crate::index::types::{BuildStats, IndexUpdate};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Largest message either side will accept
pub const MAX_MESSAGE_LEN: usize = 1024 * 1024;

/// Request from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Resolve a hex digest
    Lookup { digest: String },

    /// Add a plaintext to the corpus
    Ingest { plaintext: String },

    /// Engine and server counters
    Status,

    /// Rebuild the index from the corpus
    Reload,

    /// Graceful shutdown request
    Shutdown,

    /// Ping for connection testing
    Ping,
}

/// Response from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Lookup(LookupResponse),

    Ingested(IngestResponse),

    Status(StatusResponse),

    Reloaded(BuildStats),

    /// Shutdown acknowledged
    ShuttingDown,

    /// Pong response
    Pong,

    /// Error response
    Error { kind: ErrorKind, message: String },
}

impl From<EngineError> for Response {
    fn from(e: EngineError) -> Self {
        Response::Error {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupResponse {
    /// Normalized (lowercase) digest that was looked up
    pub digest: String,
    /// `None` when the digest is not in the index
    pub plaintext: Option<String>,
    pub duration_us: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestResponse {
    pub digest: String,
    /// 0-based corpus line the plaintext was written to
    pub line: u64,
    pub update: IndexUpdate,
}

/// Server status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub engine: EngineStats,
    /// Total requests served
    pub requests_served: u64,
    /// Connections accepted since startup
    pub connections: u64,
}

/// Write a message to a stream with length prefix
pub fn write_message<W: Write>(writer: &mut W, msg: &impl Serialize) -> std::io::Result<()> {
    let json = serde_json::to_vec(msg).map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, e)
    })?;

    if json.len() > MAX_MESSAGE_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Message too large",
        ));
    }

    let len = json.len() as u32;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&json)?;
    writer.flush()?;

    Ok(())
}

/// Read a message from a stream with length prefix
pub fn read_message<R: Read, T: for<'de> Deserialize<'de>>(reader: &mut R) -> std::io::Result<T> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_le_bytes(len_buf) as usize;

    if len > MAX_MESSAGE_LEN {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Message too large",
        ));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;

    serde_json::from_slice(&buf).map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::InvalidData, e)
    })
}
