//! Unix index server daemon
//!
//! Keeps the digest index loaded in memory and serves lookup and ingest
//! requests over a Unix socket. The socket is bound only after the index is
//! built, so no request ever sees a partial index.

use crate::engine::{ErrorKind, HashEngine};
use crate::server::pid_path_for;
use crate::server::protocol::{
    read_message, write_message, IngestResponse, LookupResponse, Request, Response,
    StatusResponse,
};
use crate::utils::digest::Digest;
use anyhow::{Context, Result};
use std::fs;
use std::io::{BufReader, BufWriter};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Connection timeout
const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Statistics for the server
struct ServerStats {
    requests_served: AtomicU64,
    connections: AtomicU64,
}

/// The index server daemon
pub struct IndexServer {
    engine: Arc<HashEngine>,
    socket_path: PathBuf,
    stats: ServerStats,
    /// Shutdown flag
    shutdown: AtomicBool,
}

impl IndexServer {
    /// Create a new index server wrapped in Arc
    pub fn new(engine: Arc<HashEngine>, socket_path: PathBuf) -> Arc<Self> {
        Arc::new(Self {
            engine,
            socket_path,
            stats: ServerStats {
                requests_served: AtomicU64::new(0),
                connections: AtomicU64::new(0),
            },
            shutdown: AtomicBool::new(false),
        })
    }

    /// Bind the socket. Call `serve` with the returned listener.
    pub fn bind(&self) -> Result<UnixListener> {
        let socket_path = &self.socket_path;

        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Remove stale socket file
        if socket_path.exists() {
            fs::remove_file(socket_path)?;
        }

        let listener = UnixListener::bind(socket_path)
            .with_context(|| format!("Failed to bind to {}", socket_path.display()))?;

        // Set socket permissions (user only)
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(socket_path, fs::Permissions::from_mode(0o600))?;
        }

        fs::write(pid_path_for(socket_path), format!("{}", std::process::id()))?;

        tracing::info!(socket = %socket_path.display(), "listening");
        Ok(listener)
    }

    /// Start the server (blocking)
    pub fn run(self: &Arc<Self>) -> Result<()> {
        let listener = self.bind()?;
        self.serve(listener)
    }

    /// Accept connections until a shutdown request arrives
    pub fn serve(self: &Arc<Self>, listener: UnixListener) -> Result<()> {
        for stream in listener.incoming() {
            if self.shutdown.load(Ordering::Relaxed) {
                break;
            }

            match stream {
                Ok(stream) => {
                    self.stats.connections.fetch_add(1, Ordering::Relaxed);
                    let _ = stream.set_read_timeout(Some(CONNECTION_TIMEOUT));
                    let _ = stream.set_write_timeout(Some(CONNECTION_TIMEOUT));

                    // Handle in new thread
                    let server = Arc::clone(self);
                    thread::spawn(move || {
                        if let Err(e) = server.handle_connection(stream) {
                            tracing::warn!(error = %e, "connection error");
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept error");
                }
            }
        }

        // Cleanup
        let _ = fs::remove_file(&self.socket_path);
        let _ = fs::remove_file(pid_path_for(&self.socket_path));
        tracing::info!("server stopped");

        Ok(())
    }

    /// Handle a single client connection
    fn handle_connection(&self, stream: UnixStream) -> Result<()> {
        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = BufWriter::new(stream);

        loop {
            let request: Request = match read_message(&mut reader) {
                Ok(req) => req,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    // Client disconnected
                    break;
                }
                Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                    let resp = Response::Error {
                        kind: ErrorKind::BadRequest,
                        message: format!("Invalid request: {}", e),
                    };
                    write_message(&mut writer, &resp)?;
                    // Framing may be lost; drop the connection
                    break;
                }
                Err(e) => return Err(e.into()),
            };

            let response = self.handle_request(request);
            self.stats.requests_served.fetch_add(1, Ordering::Relaxed);

            write_message(&mut writer, &response)?;

            if matches!(response, Response::ShuttingDown) {
                self.wake_listener();
                break;
            }
        }

        Ok(())
    }

    /// Handle a single request
    fn handle_request(&self, request: Request) -> Response {
        match request {
            Request::Lookup { digest } => self.handle_lookup(&digest),

            Request::Ingest { plaintext } => match self.engine.ingest(&plaintext) {
                Ok(ingested) => Response::Ingested(IngestResponse {
                    digest: ingested.digest.to_hex(),
                    line: ingested.position.line,
                    update: ingested.index,
                }),
                Err(e) => e.into(),
            },

            Request::Status => Response::Status(StatusResponse {
                engine: self.engine.stats(),
                requests_served: self.stats.requests_served.load(Ordering::Relaxed),
                connections: self.stats.connections.load(Ordering::Relaxed),
            }),

            Request::Reload => match self.engine.reload() {
                Ok(stats) => Response::Reloaded(stats),
                Err(e) => e.into(),
            },

            Request::Shutdown => {
                self.shutdown.store(true, Ordering::Relaxed);
                Response::ShuttingDown
            }

            Request::Ping => Response::Pong,
        }
    }

    fn handle_lookup(&self, digest: &str) -> Response {
        let start = Instant::now();

        let digest = match Digest::from_hex(digest) {
            Ok(d) => d,
            Err(e) => return e.into(),
        };

        let plaintext = self.engine.lookup(&digest);

        Response::Lookup(LookupResponse {
            digest: digest.to_hex(),
            plaintext,
            duration_us: start.elapsed().as_micros() as u64,
        })
    }

    /// The accept loop only checks the shutdown flag between connections
    fn wake_listener(&self) {
        let _ = UnixStream::connect(&self.socket_path);
    }
}

/// Open the engine and serve in the foreground until shut down
pub fn run_foreground(engine: HashEngine, socket_path: PathBuf) -> Result<()> {
    let server = IndexServer::new(Arc::new(engine), socket_path);
    server.run()
}
