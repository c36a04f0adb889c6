//! Client for connecting to the index server daemon

use crate::engine::ErrorKind;
use crate::index::types::BuildStats;
use crate::server::protocol::{
    read_message, write_message, IngestResponse, LookupResponse, Request, Response,
    StatusResponse,
};
use std::io::{BufReader, BufWriter};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

/// Read/write timeout
const IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in client operations
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Server is not running
    #[error("Index server is not running")]
    NotRunning,
    /// Communication error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    /// Server rejected the request
    #[error("{message}")]
    Server { kind: ErrorKind, message: String },
    /// Invalid response
    #[error("Invalid response from server")]
    InvalidResponse,
}

impl ClientError {
    /// Structured kind for server-side rejections
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ClientError::Server { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Client for the index server
pub struct IndexClient {
    reader: BufReader<UnixStream>,
    writer: BufWriter<UnixStream>,
}

impl IndexClient {
    /// Try to connect to the running daemon
    /// Returns None if daemon is not running (allowing fallback to direct mode)
    pub fn connect(socket_path: &Path) -> Option<Self> {
        // Quick check if socket exists
        if !socket_path.exists() {
            return None;
        }

        let stream = UnixStream::connect(socket_path).ok()?;

        // Set timeouts
        let _ = stream.set_read_timeout(Some(IO_TIMEOUT));
        let _ = stream.set_write_timeout(Some(IO_TIMEOUT));

        let reader = BufReader::new(stream.try_clone().ok()?);
        let writer = BufWriter::new(stream);

        Some(Self { reader, writer })
    }

    /// Connect or return an error (for when daemon is required)
    pub fn connect_required(socket_path: &Path) -> ClientResult<Self> {
        Self::connect(socket_path).ok_or(ClientError::NotRunning)
    }

    fn call(&mut self, request: &Request) -> ClientResult<Response> {
        write_message(&mut self.writer, request)?;
        let response: Response = read_message(&mut self.reader)?;
        match response {
            Response::Error { kind, message } => Err(ClientError::Server { kind, message }),
            other => Ok(other),
        }
    }

    /// Resolve a hex digest
    pub fn lookup(&mut self, digest: &str) -> ClientResult<LookupResponse> {
        let request = Request::Lookup {
            digest: digest.to_string(),
        };

        match self.call(&request)? {
            Response::Lookup(found) => Ok(found),
            _ => Err(ClientError::InvalidResponse),
        }
    }

    /// Add a plaintext to the corpus
    pub fn ingest(&mut self, plaintext: &str) -> ClientResult<IngestResponse> {
        let request = Request::Ingest {
            plaintext: plaintext.to_string(),
        };

        match self.call(&request)? {
            Response::Ingested(ingested) => Ok(ingested),
            _ => Err(ClientError::InvalidResponse),
        }
    }

    /// Get server status
    pub fn status(&mut self) -> ClientResult<StatusResponse> {
        match self.call(&Request::Status)? {
            Response::Status(status) => Ok(status),
            _ => Err(ClientError::InvalidResponse),
        }
    }

    /// Request index reload
    pub fn reload(&mut self) -> ClientResult<BuildStats> {
        match self.call(&Request::Reload)? {
            Response::Reloaded(stats) => Ok(stats),
            _ => Err(ClientError::InvalidResponse),
        }
    }

    /// Request graceful shutdown
    pub fn shutdown(&mut self) -> ClientResult<()> {
        match self.call(&Request::Shutdown)? {
            Response::ShuttingDown => Ok(()),
            _ => Err(ClientError::InvalidResponse),
        }
    }

    /// Ping the server
    pub fn ping(&mut self) -> ClientResult<()> {
        match self.call(&Request::Ping)? {
            Response::Pong => Ok(()),
            _ => Err(ClientError::InvalidResponse),
        }
    }
}
