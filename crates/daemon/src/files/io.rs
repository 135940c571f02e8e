//! Byte-level IO facade: chunked reads, upload sinks, and timestamps.
//!
//! Downloads are client-driven chunk pulls against an open offset. Uploads
//! write straight to the destination file with create/truncate semantics;
//! readers racing an in-progress upload see partial content, and an
//! abandoned upload leaves a partial file behind.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, Instant, SystemTime};

use protocol::messages::MAX_CHUNK_SIZE;
use tracing::warn;

use super::sandbox::Sandbox;
use super::OpError;

/// Convert a modification timestamp to Unix epoch seconds.
///
/// Timestamps before the epoch clamp to 0.
pub fn modified_secs(modified: SystemTime) -> u64 {
    modified
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Infer a download filename from a path.
pub fn infer_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string())
}

/// Read one chunk of a file for download.
///
/// Returns the chunk bytes, the total file size, and whether the chunk
/// reaches the end of the file. An offset at or past the end yields an
/// empty final chunk rather than an error.
pub fn read_chunk(
    path: &Path,
    offset: u64,
    chunk_size: u32,
) -> Result<(Vec<u8>, u64, bool), OpError> {
    let metadata = std::fs::metadata(path)?;
    if metadata.is_dir() {
        return Err(OpError::InvalidPath(format!(
            "not a file: {}",
            path.display()
        )));
    }

    let total_size = metadata.len();
    let remaining = total_size.saturating_sub(offset);
    let len = (chunk_size.min(MAX_CHUNK_SIZE) as u64).min(remaining) as usize;

    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset.min(total_size)))?;

    let mut buffer = vec![0u8; len];
    let bytes_read = file.read(&mut buffer)?;
    buffer.truncate(bytes_read);

    let is_last = offset + bytes_read as u64 >= total_size;
    Ok((buffer, total_size, is_last))
}

/// An in-progress upload writing directly to its destination.
#[derive(Debug)]
struct UploadSink {
    /// Open destination file (created with truncate).
    file: File,
    /// Bytes written so far; doubles as the expected next offset.
    received: u64,
    /// Size the client declared at start.
    declared_size: u64,
    /// Last append time, for stale-sink cleanup.
    last_activity: Instant,
}

impl UploadSink {
    fn create(path: &Path, declared_size: u64) -> Result<Self, OpError> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            file,
            received: 0,
            declared_size,
            last_activity: Instant::now(),
        })
    }

    fn append(&mut self, offset: u64, data: &[u8]) -> Result<u64, OpError> {
        if offset != self.received {
            return Err(OpError::ChunkMismatch {
                expected: self.received,
                got: offset,
            });
        }
        self.file.write_all(data)?;
        self.received += data.len() as u64;
        self.last_activity = Instant::now();
        Ok(self.received)
    }

    fn finish(mut self) -> Result<u64, OpError> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(self.received)
    }
}

/// Registry of in-flight uploads, keyed by destination path.
///
/// Starting a second upload for the same destination replaces the first;
/// the replaced sink closes and the file is truncated again by the new one.
pub struct UploadTracker {
    /// Sandbox for destination validation.
    sandbox: Sandbox,
    /// In-progress uploads.
    uploads: RwLock<HashMap<PathBuf, UploadSink>>,
}

impl UploadTracker {
    /// Create a new upload tracker.
    pub fn new(sandbox: Sandbox) -> Self {
        Self {
            sandbox,
            uploads: RwLock::new(HashMap::new()),
        }
    }

    /// Open a destination for upload and register the sink.
    ///
    /// An empty `directory` means the sandbox root. The directory must
    /// already exist inside the root; `name` must be a plain file name.
    /// Returns the resolved destination path, which keys later chunks.
    pub fn start(&self, directory: &str, name: &str, size: u64) -> Result<PathBuf, OpError> {
        let dir = if directory.trim().is_empty() {
            self.sandbox.root().to_path_buf()
        } else {
            self.sandbox.resolve_dir(directory)?
        };
        let dest = self.sandbox.resolve_child(&dir, name)?;

        let sink = UploadSink::create(&dest, size)?;

        let mut uploads = self.lock_write()?;
        if uploads.insert(dest.clone(), sink).is_some() {
            warn!(path = %dest.display(), "replaced in-flight upload for same destination");
        }

        Ok(dest)
    }

    /// Append one chunk to an in-progress upload.
    ///
    /// Chunks must arrive in order. A failed append drops the sink; the
    /// partially written destination file remains.
    pub fn append(&self, path: &str, offset: u64, data: &[u8]) -> Result<u64, OpError> {
        let key = PathBuf::from(path);
        let mut uploads = self.lock_write()?;

        let sink = uploads
            .get_mut(&key)
            .ok_or_else(|| OpError::NotFound(key.clone()))?;

        match sink.append(offset, data) {
            Ok(received) => Ok(received),
            Err(e) => {
                uploads.remove(&key);
                Err(e)
            }
        }
    }

    /// Finish an upload, flushing the destination file.
    ///
    /// Returns the final byte count. A size different from the declared
    /// one is logged but not rejected; the bytes on disk are what arrived.
    pub fn finish(&self, path: &str) -> Result<u64, OpError> {
        let key = PathBuf::from(path);
        let sink = {
            let mut uploads = self.lock_write()?;
            uploads
                .remove(&key)
                .ok_or_else(|| OpError::NotFound(key.clone()))?
        };

        let declared = sink.declared_size;
        let size = sink.finish()?;
        if size != declared {
            warn!(
                path = %key.display(),
                declared,
                received = size,
                "upload finished with size different from declared"
            );
        }
        Ok(size)
    }

    /// Number of uploads currently in flight.
    pub fn in_flight(&self) -> usize {
        self.uploads
            .read()
            .map(|uploads| uploads.len())
            .unwrap_or(0)
    }

    /// Drop sinks that have seen no chunk for longer than `max_idle`.
    ///
    /// Their partial destination files remain on disk. Returns how many
    /// sinks were dropped.
    pub fn drop_stale(&self, max_idle: Duration) -> usize {
        let Ok(mut uploads) = self.uploads.write() else {
            return 0;
        };

        let stale: Vec<PathBuf> = uploads
            .iter()
            .filter(|(_, sink)| sink.last_activity.elapsed() > max_idle)
            .map(|(path, _)| path.clone())
            .collect();

        for path in &stale {
            warn!(path = %path.display(), "dropping stale upload; partial file remains");
            uploads.remove(path);
        }
        stale.len()
    }

    fn lock_write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<PathBuf, UploadSink>>, OpError> {
        self.uploads
            .write()
            .map_err(|_| OpError::Io(std::io::Error::other("upload registry lock poisoned")))
    }
}
