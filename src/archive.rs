//! Random-access reader over a `.modpak` archive.
//!
//! ```no_run
//! use modpak::archive::ArchiveReader;
//! use modpak::ContentSource;
//!
//! let ar = ArchiveReader::open("base.modpak")?;
//! let manifest = ar.manifest()?;
//! let data = ar.read_file("data/maps/route101.json")?;
//! # Ok::<(), modpak::ContentError>(())
//! ```
//!
//! # Locking
//!
//! Two independent critical sections:
//!
//! - `lifecycle` guards the one-time table-of-contents load and `release`.
//!   Concurrent first callers block on it and all observe the same outcome,
//!   success or failure.  Once loaded the table is immutable and read
//!   without any lock.
//! - `handle` guards the backing file's cursor: one seek-and-read per
//!   entry read, and nothing else.  Nothing called while it is held takes
//!   another lock.
//!
//! Lock order is always `manifest` → `lifecycle` → `handle`.  The manifest
//! is read through the same private [`ArchiveReader::read_entry`] primitive
//! as every other entry, never through the public read path.

use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

use crate::codec;
use crate::error::{ContentError, Result};
use crate::glob::{within_depth, Pattern};
use crate::header::{Header, HEADER_SIZE};
use crate::index::{Toc, TocEntry};
use crate::manifest::{Manifest, MANIFEST_PATH};
use crate::path::{normalize_path, resolve_relative};
use crate::pool::{BufferPool, PoolConfig};
use crate::source::{ContentSource, FileIter};

/// File extension identifying the container format.
pub const ARCHIVE_EXTENSION: &str = "modpak";

// ── EntryInfo ─────────────────────────────────────────────────────────────────

/// Lightweight descriptor returned by [`ArchiveReader::entries`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub path:              String,
    pub uncompressed_size: u64,
    pub compressed_size:   u64,
    pub offset:            u64,
}

impl From<&TocEntry> for EntryInfo {
    fn from(e: &TocEntry) -> Self {
        EntryInfo {
            path:              e.path.clone(),
            uncompressed_size: e.uncompressed_size,
            compressed_size:   e.compressed_size,
            offset:            e.offset,
        }
    }
}

/// Diagnostic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    /// Times the table-of-contents load actually ran.
    pub toc_loads:    u64,
    /// Seek-and-read operations against the backing handle for entry data.
    pub handle_reads: u64,
}

// ── ArchiveReader ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Lifecycle {
    released:   bool,
    load_error: Option<ContentError>,
}

#[derive(Debug)]
struct Handle {
    file: File,
}

pub struct ArchiveReader {
    path:         PathBuf,
    toc:          OnceLock<Arc<Toc>>,
    lifecycle:    Mutex<Lifecycle>,
    handle:       Mutex<Option<Handle>>,
    manifest:     Mutex<Option<Arc<Manifest>>>,
    released:     AtomicBool,
    pool:         BufferPool,
    toc_loads:    AtomicU64,
    handle_reads: AtomicU64,
}

impl ArchiveReader {
    // ── Constructors ─────────────────────────────────────────────────────────

    /// Lazy reader: nothing is opened until the first operation.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self::with_pool_config(path, PoolConfig::default())
    }

    pub fn with_pool_config<P: AsRef<Path>>(path: P, pool: PoolConfig) -> Self {
        Self {
            path:         path.as_ref().to_owned(),
            toc:          OnceLock::new(),
            lifecycle:    Mutex::new(Lifecycle::default()),
            handle:       Mutex::new(None),
            manifest:     Mutex::new(None),
            released:     AtomicBool::new(false),
            pool:         BufferPool::with_config(pool),
            toc_loads:    AtomicU64::new(0),
            handle_reads: AtomicU64::new(0),
        }
    }

    /// Open and validate immediately.  A corrupt archive fails here.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = Self::new(path);
        reader.load()?;
        Ok(reader)
    }

    /// Trigger the table-of-contents load if it has not happened yet.
    pub fn load(&self) -> Result<()> {
        self.toc().map(|_| ())
    }

    // ── Table of contents ────────────────────────────────────────────────────

    fn ensure_live(&self) -> Result<()> {
        if self.released.load(Ordering::Acquire) {
            return Err(ContentError::AlreadyReleased);
        }
        Ok(())
    }

    fn toc(&self) -> Result<Arc<Toc>> {
        self.ensure_live()?;
        if let Some(toc) = self.toc.get() {
            return Ok(Arc::clone(toc));
        }

        let mut life = self.lifecycle.lock();
        if life.released {
            return Err(ContentError::AlreadyReleased);
        }
        if let Some(toc) = self.toc.get() {
            return Ok(Arc::clone(toc));
        }
        if let Some(err) = &life.load_error {
            return Err(err.clone());
        }

        match self.load_toc() {
            Ok(toc) => {
                let toc = Arc::new(toc);
                let _ = self.toc.set(Arc::clone(&toc));
                Ok(toc)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "rejecting archive");
                life.load_error = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Runs with `lifecycle` held.
    fn load_toc(&self) -> Result<Toc> {
        self.toc_loads.fetch_add(1, Ordering::Relaxed);

        let mut file = File::open(&self.path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ContentError::NotFound(self.path.display().to_string()),
            _ => ContentError::from(e),
        })?;
        let archive_len = file.metadata()?.len();

        let header = Header::read(&mut file)?;
        if header.toc_offset >= archive_len || header.toc_offset < HEADER_SIZE {
            return Err(ContentError::Integrity(format!(
                "table of contents offset {} is outside the archive ({archive_len} bytes)",
                header.toc_offset
            )));
        }

        file.seek(SeekFrom::Start(header.toc_offset))?;
        let mut toc_bytes = Vec::new();
        file.by_ref()
            .take(archive_len - header.toc_offset)
            .read_to_end(&mut toc_bytes)?;
        let toc = Toc::parse(&toc_bytes, header.toc_offset, archive_len)?;

        debug!(
            path = %self.path.display(),
            entries = toc.len(),
            toc_offset = header.toc_offset,
            "loaded table of contents"
        );
        *self.handle.lock() = Some(Handle { file });
        Ok(toc)
    }

    // ── Entry reads ──────────────────────────────────────────────────────────

    /// The single primitive every read goes through.  The handle lock covers
    /// exactly one seek plus one read and calls nothing that locks.
    fn read_entry(&self, entry: &TocEntry) -> Result<Vec<u8>> {
        if entry.uncompressed_size == 0 {
            return Ok(Vec::new());
        }
        let compressed_len = usize::try_from(entry.compressed_size)
            .map_err(|_| ContentError::Integrity(format!("entry {} is too large", entry.path)))?;
        let uncompressed_len = usize::try_from(entry.uncompressed_size)
            .map_err(|_| ContentError::Integrity(format!("entry {} is too large", entry.path)))?;

        let mut payload = self.pool.acquire(compressed_len);
        {
            let mut guard = self.handle.lock();
            let handle = guard.as_mut().ok_or(ContentError::AlreadyReleased)?;
            handle.file.seek(SeekFrom::Start(entry.offset))?;
            handle.file.read_exact(&mut payload)?;
            self.handle_reads.fetch_add(1, Ordering::Relaxed);
        }

        let mut out = vec![0u8; uncompressed_len];
        codec::decompress_into(&payload, &mut out).map_err(|e| {
            ContentError::Integrity(format!("entry {}: {e}", entry.path))
        })?;
        debug!(path = %entry.path, bytes = uncompressed_len, "read entry");
        Ok(out)
    }

    fn lookup(&self, toc: &Toc, path: &str) -> Result<TocEntry> {
        toc.get(&normalize_path(path))
            .cloned()
            .ok_or_else(|| ContentError::NotFound(path.to_owned()))
    }

    // ── Listing / extraction ─────────────────────────────────────────────────

    pub fn entries(&self) -> Result<Vec<EntryInfo>> {
        Ok(self.toc()?.entries().iter().map(EntryInfo::from).collect())
    }

    /// Write every entry under `dest`, creating directories as needed.
    /// Returns the number of files written.
    pub fn extract_all<P: AsRef<Path>>(&self, dest: P) -> Result<usize> {
        let dest = dest.as_ref();
        fs::create_dir_all(dest)?;
        let toc = self.toc()?;
        for entry in toc.entries() {
            let relative = resolve_relative(&entry.path)
                .filter(|p| !p.is_empty())
                .ok_or_else(|| ContentError::Security(entry.path.clone()))?;
            let target = dest.join(relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, self.read_entry(entry)?)?;
        }
        Ok(toc.len())
    }

    // ── Metadata ─────────────────────────────────────────────────────────────

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stats(&self) -> ReaderStats {
        ReaderStats {
            toc_loads:    self.toc_loads.load(Ordering::Relaxed),
            handle_reads: self.handle_reads.load(Ordering::Relaxed),
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

impl ContentSource for ArchiveReader {
    fn source_path(&self) -> &Path {
        &self.path
    }

    fn is_compressed(&self) -> bool {
        true
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let toc = self.toc()?;
        let entry = self.lookup(&toc, path)?;
        self.read_entry(&entry)
    }

    fn file_exists(&self, path: &str) -> Result<bool> {
        Ok(self.toc()?.get(&normalize_path(path)).is_some())
    }

    fn enumerate_files(&self, pattern: &str, recursive: bool) -> Result<FileIter> {
        let pattern = Pattern::new(pattern)?;
        let toc = self.toc()?;
        Ok(Box::new((0..toc.len()).filter_map(move |i| {
            let path = &toc.entries()[i].path;
            (within_depth(path, recursive) && pattern.matches(path)).then(|| path.clone())
        })))
    }

    fn manifest(&self) -> Result<Arc<Manifest>> {
        self.ensure_live()?;
        let mut cached = self.manifest.lock();
        if let Some(manifest) = cached.as_ref() {
            return Ok(Arc::clone(manifest));
        }
        let toc = self.toc()?;
        let entry = self.lookup(&toc, MANIFEST_PATH)?;
        let manifest = Arc::new(Manifest::from_bytes(&self.read_entry(&entry)?)?);
        *cached = Some(Arc::clone(&manifest));
        Ok(manifest)
    }

    fn release(&self) {
        let mut life = self.lifecycle.lock();
        if life.released {
            return;
        }
        life.released = true;
        self.released.store(true, Ordering::Release);
        // Blocks until an in-flight read has finished with the handle.
        drop(self.handle.lock().take());
        self.pool.close();
        drop(life);

        self.manifest.lock().take();
        debug!(path = %self.path.display(), "released archive");
    }
}
