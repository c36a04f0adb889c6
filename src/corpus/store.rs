//! Append-only corpus file.
//!
//! One plaintext per line, UTF-8, no header. Lines are only ever appended.
//! Appends go through a single mutex so concurrent writers in this process
//! cannot interleave bytes within a line. Readers work on a
//! [`CorpusSnapshot`], a memory map of the prefix that existed when the
//! snapshot was taken.
//!
//! Other processes may append to the same file (`revhash add --no-daemon`
//! next to a running server). The store re-reads the file length under the
//! append mutex before every append and snapshot, so their lines are counted
//! and never cut off a snapshot.

use crate::engine::{EngineError, InvalidPlaintext, Result};
use memchr::{memchr, memchr_iter};
use memmap2::{Mmap, MmapOptions};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Where an appended line landed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// 0-based physical line number
    pub line: u64,
    /// Byte offset of the first byte of the line
    pub offset: u64,
}

/// Writer-side state, guarded by the append mutex
struct AppendState {
    file: File,
    len: u64,
    lines: u64,
    /// The file does not end with `\n`, so the next append must add one first
    needs_terminator: bool,
}

/// Durable, append-only word list
pub struct CorpusStore {
    path: PathBuf,
    state: Mutex<AppendState>,
    sync_on_append: bool,
}

impl CorpusStore {
    /// Open an existing corpus for scanning and appending
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, OpenOptions::new().read(true).append(true))
    }

    /// Open without write access, so every append fails
    #[cfg(test)]
    pub(crate) fn open_read_only(path: &Path) -> Result<Self> {
        Self::open_with(path, OpenOptions::new().read(true))
    }

    fn open_with(path: &Path, options: &OpenOptions) -> Result<Self> {
        let unavailable = |source: io::Error| EngineError::CorpusUnavailable {
            path: path.to_path_buf(),
            source,
        };

        let metadata = fs::metadata(path).map_err(unavailable)?;
        if !metadata.is_file() {
            return Err(unavailable(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a regular file",
            )));
        }

        let file = options.open(path).map_err(unavailable)?;

        let mut state = AppendState {
            file,
            len: 0,
            lines: 0,
            needs_terminator: false,
        };
        state.sync_with_disk().map_err(unavailable)?;

        tracing::debug!(
            path = %path.display(),
            bytes = state.len,
            lines = state.lines,
            "opened corpus"
        );

        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(state),
            sync_on_append: true,
        })
    }

    /// Create a new corpus, empty or seeded from an existing word list.
    ///
    /// Refuses to overwrite an existing file.
    pub fn create(path: &Path, seed: Option<&Path>) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(EngineError::WriteFailed)?;
        }

        let mut seed_file = match seed {
            Some(seed_path) => Some(File::open(seed_path).map_err(|source| {
                EngineError::CorpusUnavailable {
                    path: seed_path.to_path_buf(),
                    source,
                }
            })?),
            None => None,
        };

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(EngineError::WriteFailed)?;

        if let Some(ref mut seed_file) = seed_file {
            io::copy(seed_file, &mut file).map_err(EngineError::WriteFailed)?;
        }
        file.sync_all().map_err(EngineError::WriteFailed)?;
        drop(file);

        tracing::info!(path = %path.display(), seeded = seed.is_some(), "created corpus");
        Self::open(path)
    }

    /// Control whether each append is followed by `sync_data`
    pub fn set_sync_on_append(&mut self, sync: bool) {
        self.sync_on_append = sync;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes in the corpus file
    pub fn len_bytes(&self) -> u64 {
        self.synced().len
    }

    /// Physical lines in the corpus file, blank ones included
    pub fn line_count(&self) -> u64 {
        self.synced().lines
    }

    /// Append one plaintext line and make it durable before returning
    pub fn append(&self, plaintext: &str) -> Result<Position> {
        if plaintext.contains(['\n', '\r']) {
            return Err(EngineError::InvalidPlaintext(InvalidPlaintext::ContainsNewline));
        }

        let mut state = self.lock();
        state.sync_with_disk().map_err(EngineError::WriteFailed)?;

        let mut buf = Vec::with_capacity(plaintext.len() + 2);
        if state.needs_terminator {
            buf.push(b'\n');
        }
        let line_offset = state.len + buf.len() as u64;
        buf.extend_from_slice(plaintext.as_bytes());
        buf.push(b'\n');

        if let Err(e) = write_durably(&mut state.file, &buf, self.sync_on_append) {
            // Some bytes may have reached the file. Resync from disk so the
            // next append starts on a fresh line.
            if let Err(resync) = state.sync_with_disk() {
                tracing::warn!(error = %resync, "failed to resync corpus after write error");
            }
            return Err(EngineError::WriteFailed(e));
        }

        let position = Position {
            line: state.lines,
            offset: line_offset,
        };
        state.len += buf.len() as u64;
        state.lines += 1;
        state.needs_terminator = false;

        Ok(position)
    }

    /// Snapshot the current contents for scanning.
    ///
    /// Covers everything in the file when called, including lines appended
    /// by other processes. Lines appended later are not visible.
    pub fn scan(&self) -> Result<CorpusSnapshot> {
        let unavailable = |source: io::Error| EngineError::CorpusUnavailable {
            path: self.path.clone(),
            source,
        };

        let len = {
            let mut state = self.lock();
            state.sync_with_disk().map_err(unavailable)?;
            state.len
        };

        if len == 0 {
            return Ok(CorpusSnapshot { map: None });
        }

        let file = File::open(&self.path).map_err(unavailable)?;
        let map = unsafe {
            MmapOptions::new()
                .len(len as usize)
                .map(&file)
                .map_err(unavailable)?
        };

        Ok(CorpusSnapshot { map: Some(map) })
    }

    fn lock(&self) -> MutexGuard<'_, AppendState> {
        // Every mutation of AppendState completes before the guard drops,
        // so a poisoned lock still holds consistent data.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock and catch up with the file, keeping the last known state on error
    fn synced(&self) -> MutexGuard<'_, AppendState> {
        let mut state = self.lock();
        if let Err(e) = state.sync_with_disk() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to stat corpus");
        }
        state
    }
}

fn write_durably(file: &mut File, buf: &[u8], sync: bool) -> io::Result<()> {
    file.write_all(buf)?;
    file.flush()?;
    if sync {
        file.sync_data()?;
    }
    Ok(())
}

impl AppendState {
    /// Count bytes that reached the file without going through this state:
    /// appends from other processes, or the tail of a failed write.
    fn sync_with_disk(&mut self) -> io::Result<()> {
        let disk_len = self.file.metadata()?.len();
        if disk_len == self.len {
            return Ok(());
        }

        if disk_len < self.len {
            tracing::warn!(
                expected = self.len,
                found = disk_len,
                "corpus shrank on disk, recounting lines"
            );
            self.len = 0;
            self.lines = 0;
            self.needs_terminator = false;
            if disk_len == 0 {
                return Ok(());
            }
        }

        let map = unsafe { Mmap::map(&self.file)? };
        let start = (self.len as usize).min(map.len());
        let new_newlines = memchr_iter(b'\n', &map[start..]).count() as u64;

        // A dangling last line counts as a line until it is terminated
        let complete = self.lines - self.needs_terminator as u64 + new_newlines;
        let needs_terminator = map.last().is_some_and(|&b| b != b'\n');

        self.len = map.len() as u64;
        self.lines = complete + needs_terminator as u64;
        self.needs_terminator = needs_terminator;
        Ok(())
    }
}

/// Read-only view of a corpus prefix
pub struct CorpusSnapshot {
    map: Option<Mmap>,
}

impl CorpusSnapshot {
    pub fn as_bytes(&self) -> &[u8] {
        self.map.as_deref().unwrap_or(&[])
    }

    pub fn len_bytes(&self) -> u64 {
        self.as_bytes().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Every physical line, blank ones included, without terminators
    pub fn raw_lines(&self) -> RawLines<'_> {
        RawLines {
            rest: self.as_bytes(),
        }
    }

    /// Lines carrying content. Blank and whitespace-only lines are skipped.
    ///
    /// The iterator is lazy and can be restarted by calling this again.
    pub fn lines(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.raw_lines()
            .filter(|line| !line.iter().all(|b| b.is_ascii_whitespace()))
    }
}

/// Iterator over newline-separated lines of a byte buffer
pub struct RawLines<'a> {
    rest: &'a [u8],
}

impl<'a> RawLines<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { rest: bytes }
    }
}

impl<'a> Iterator for RawLines<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        if self.rest.is_empty() {
            return None;
        }

        match memchr(b'\n', self.rest) {
            Some(pos) => {
                let line = &self.rest[..pos];
                self.rest = &self.rest[pos + 1..];
                Some(line)
            }
            None => {
                let line = self.rest;
                self.rest = &[];
                Some(line)
            }
        }
    }
}
