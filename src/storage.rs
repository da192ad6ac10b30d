//! Durable substrate helpers
//!
//! Directory layout:
//! ```text
//! ~/.safeclaw/memory/
//! ├── .lock            # held while a store is open
//! ├── episodic.jsonl   # one Memory per line, append-only
//! └── core.json        # whole fact tree, replaced atomically
//! ```
//!
//! Every write here is flushed to disk before it returns.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// A JSON document replaced atomically on every save.
#[derive(Debug, Clone)]
pub struct JsonDocument {
    path: PathBuf,
}

impl JsonDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document, or `None` if the file doesn't exist yet.
    pub async fn load<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let value = serde_json::from_slice(&bytes).map_err(|e| {
                    Error::Storage(format!("corrupt document {}: {}", self.path.display(), e))
                })?;
                Ok(Some(value))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write to a sibling temp file, sync it, then rename over the target.
    pub async fn save<T: Serialize>(&self, value: &T) -> Result<()> {
        let json = serde_json::to_vec_pretty(value)?;
        write_atomic(&self.path, &json).await
    }
}

/// Replace `path` with `bytes` via temp file + rename.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = tmp_path(path);
    {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
    }
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// An append-only JSON-lines log.
#[derive(Debug, Clone)]
pub struct JsonLog {
    path: PathBuf,
}

/// Result of reading a log: parsed records plus lines that failed to parse.
pub struct LogContents<T> {
    pub records: Vec<T>,
    pub skipped: usize,
}

impl JsonLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record. Malformed lines are skipped and counted.
    pub async fn load<T: DeserializeOwned>(&self) -> Result<LogContents<T>> {
        let data = match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(LogContents {
                    records: Vec::new(),
                    skipped: 0,
                })
            }
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        let mut skipped = 0;
        for (lineno, line) in data.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(
                        path = %self.path.display(),
                        line = lineno + 1,
                        "Skipping malformed log line: {}",
                        e
                    );
                }
            }
        }
        Ok(LogContents { records, skipped })
    }

    /// Append one record and sync it to disk.
    pub async fn append<T: Serialize>(&self, record: &T) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.sync_data().await?;
        Ok(())
    }

    /// Rewrite the whole log from `records`, atomically.
    pub async fn rewrite<'a, T, I>(&self, records: I) -> Result<()>
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let mut buf = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
        }
        write_atomic(&self.path, &buf).await
    }
}

/// Exclusive ownership of a data directory.
///
/// Acquired with create-new semantics on open; the lock file holds the
/// owner's pid and is removed when the guard drops, whichever path (close,
/// error, unwind) gets there. A lock file whose owner is no longer running
/// is taken over.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    /// Acquire the lock, creating the parent directory if needed.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match Self::create(&path) {
            Err(Error::Locked(_)) if is_stale(&path) => {
                tracing::warn!(path = %path.display(), "Taking over stale store lock");
                match std::fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                // Another process may win the takeover; create-new decides.
                Self::create(&path)
            }
            other => other,
        }
    }

    fn create(path: &Path) -> Result<Self> {
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(mut file) => {
                use std::io::Write;
                writeln!(file, "{}", std::process::id())?;
                file.sync_all()?;
                Ok(Self {
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(Error::Locked(path.to_path_buf()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Whether an existing lock file was left behind by a dead owner.
///
/// An empty file counts as held: its owner may be between create and write.
fn is_stale(path: &Path) -> bool {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return false;
    };
    let contents = contents.trim();
    if contents.is_empty() {
        return false;
    }
    match contents.parse::<u32>() {
        Ok(pid) => !is_process_alive(pid),
        Err(_) => true,
    }
}

/// Check if a process is alive by sending signal 0
#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    // EPERM: the process exists but belongs to someone else.
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    true
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), "Failed to release store lock: {}", e);
        }
    }
}
