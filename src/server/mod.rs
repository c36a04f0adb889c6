//! Persistent index server for warm lookups
//!
//! Building the index means hashing every corpus line, so a long-lived
//! process keeps it in memory and serves requests over a Unix socket.
//!
//! Architecture:
//! - daemon: builds the index, listens on the socket, one thread per connection
//! - client: connects to the socket, sends lookups and ingestions
//! - fallback: if the daemon is unavailable, the CLI opens the corpus directly

mod client;
pub mod daemon;
pub mod protocol;

pub use client::{ClientError, ClientResult, IndexClient};
pub use daemon::IndexServer;

use std::path::{Path, PathBuf};

/// Get the socket path for the index server
/// Uses a per-user runtime directory for security
pub fn get_socket_path() -> PathBuf {
    // Try XDG_RUNTIME_DIR first (most secure, tmpfs-backed)
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join("revhash.sock");
    }

    // Fall back to user's home directory
    if let Some(home) = dirs::home_dir() {
        return home.join(".local").join("run").join("revhash.sock");
    }

    // Last resort: /tmp with user ID
    let uid = unsafe { libc::getuid() };
    PathBuf::from(format!("/tmp/revhash-{}.sock", uid))
}

/// PID file that sits next to a socket
pub fn pid_path_for(socket_path: &Path) -> PathBuf {
    socket_path.with_extension("pid")
}

/// Check if a daemon owning `socket_path` is running
pub fn is_daemon_running(socket_path: &Path) -> bool {
    let pid_path = pid_path_for(socket_path);

    // Read PID and check if process exists
    if let Ok(pid_str) = std::fs::read_to_string(&pid_path)
        && let Ok(pid) = pid_str.trim().parse::<i32>()
    {
        // Check if process exists using kill(pid, 0)
        return unsafe { libc::kill(pid, 0) == 0 };
    }

    false
}
