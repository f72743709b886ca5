//! Archive construction, the inverse of [`crate::archive::ArchiveReader`].
//!
//! # Writer
//! [`ArchiveWriter`] reserves the fixed header, appends each file as an
//! independently compressed LZ4 block, and on `finalize()` writes the table
//! of contents and patches the header's TOC offset in place.
//!
//! # Directory builds
//! [`build`] walks a directory tree in sorted order (so identical trees give
//! identical archives) and feeds every regular file to an `ArchiveWriter`
//! backed by a temporary file next to the destination.  The temporary file
//! is renamed over the destination only after `finalize()` succeeds; any
//! failure leaves no file under the final name.
//!
//! With the `parallel` feature, files are compressed on the Rayon pool and
//! written sequentially afterwards.

use std::collections::HashSet;
use std::fs;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::codec;
use crate::error::{ContentError, Result};
use crate::glob::Pattern;
use crate::header::{Header, HEADER_SIZE};
use crate::index::{write_toc, TocEntry};
use crate::path::normalize_path;

// ── Writer ───────────────────────────────────────────────────────────────────

pub struct ArchiveWriter<W: Write + Seek> {
    writer:   W,
    entries:  Vec<TocEntry>,
    paths:    HashSet<String>,
    position: u64,
}

impl<W: Write + Seek> ArchiveWriter<W> {
    pub fn new(mut writer: W) -> io::Result<Self> {
        writer.seek(SeekFrom::Start(0))?;
        writer.write_all(&[0u8; HEADER_SIZE as usize])?; // patched on finalize
        Ok(Self {
            writer,
            entries:  Vec::new(),
            paths:    HashSet::new(),
            position: HEADER_SIZE,
        })
    }

    /// Compress `data` and append it under `path`.
    pub fn add_file(&mut self, path: &str, data: &[u8]) -> Result<()> {
        let payload = codec::compress(data);
        self.add_compressed(path, data.len() as u64, &payload)
    }

    /// Append an already compressed payload.
    pub fn add_compressed(&mut self, path: &str, uncompressed_size: u64, payload: &[u8]) -> Result<()> {
        let path = normalize_path(path);
        if path.is_empty() {
            return Err(ContentError::Format("cannot store an entry with an empty path".into()));
        }
        if path.len() > usize::from(u16::MAX) {
            return Err(ContentError::Format(format!(
                "path is {} bytes, the format allows at most {}: {path}",
                path.len(),
                u16::MAX
            )));
        }
        if !self.paths.insert(path.clone()) {
            return Err(ContentError::Integrity(format!("duplicate entry path: {path}")));
        }

        let offset = self.position;
        self.writer.write_all(payload)?;
        self.position += payload.len() as u64;
        self.entries.push(TocEntry {
            path,
            uncompressed_size,
            compressed_size: payload.len() as u64,
            offset,
        });
        Ok(())
    }

    pub fn entries(&self) -> &[TocEntry] {
        &self.entries
    }

    /// Write the table of contents and patch the header.  Returns the inner
    /// writer and the total archive length.
    pub fn finalize(mut self) -> Result<(W, u64)> {
        let toc_offset = self.position;
        let mut toc = Vec::new();
        write_toc(&mut toc, &self.entries)?;
        self.writer.write_all(&toc)?;
        let total = toc_offset + toc.len() as u64;

        self.writer.seek(SeekFrom::Start(0))?;
        Header::new(toc_offset).write(&mut self.writer)?;
        self.writer.flush()?;
        Ok((self.writer, total))
    }
}

// ── Directory builds ─────────────────────────────────────────────────────────

/// Configuration for [`build_with_options`].
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Follow symbolic links while walking the source tree.
    pub follow_links: bool,
    /// Glob patterns; matching files are left out of the archive.
    pub exclude:      Vec<String>,
}

/// Result of a successful build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildSummary {
    pub files:              usize,
    pub uncompressed_bytes: u64,
    pub archive_bytes:      u64,
}

pub fn build<S: AsRef<Path>, O: AsRef<Path>>(source: S, output: O) -> Result<BuildSummary> {
    build_with_options(source, output, &BuildOptions::default())
}

pub fn build_with_options<S: AsRef<Path>, O: AsRef<Path>>(
    source:  S,
    output:  O,
    options: &BuildOptions,
) -> Result<BuildSummary> {
    let source = source.as_ref();
    let output = output.as_ref();
    if !source.is_dir() {
        return Err(ContentError::NotFound(format!("{} is not a directory", source.display())));
    }

    let files = collect_files(source, output, options)?;
    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_owned(),
        _ => PathBuf::from("."),
    };
    let temp = NamedTempFile::new_in(&parent)?;
    let mut writer = ArchiveWriter::new(BufWriter::new(temp))?;

    let uncompressed_bytes = write_files(&mut writer, &files)?;
    let file_count = writer.entries().len();
    let (buffered, archive_bytes) = writer.finalize()?;
    let temp = buffered.into_inner().map_err(|e| ContentError::from(e.into_error()))?;
    temp.as_file().sync_all()?;
    temp.persist(output).map_err(|e| ContentError::from(e.error))?;

    info!(
        source = %source.display(),
        output = %output.display(),
        files = file_count,
        uncompressed_bytes,
        archive_bytes,
        "built archive"
    );
    Ok(BuildSummary { files: file_count, uncompressed_bytes, archive_bytes })
}

/// `(logical path, absolute path)` of every file to pack, in sorted order.
fn collect_files(source: &Path, output: &Path, options: &BuildOptions) -> Result<Vec<(String, PathBuf)>> {
    let exclude = options
        .exclude
        .iter()
        .map(|p| Pattern::new(p))
        .collect::<Result<Vec<_>>>()?;
    let output_abs = fs::canonicalize(output).ok();

    let mut files = Vec::new();
    for entry in WalkDir::new(source).follow_links(options.follow_links).sort_by_file_name() {
        let entry = entry.map_err(|e| ContentError::from(io::Error::from(e)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        // A previous build of the same tree into itself.
        if output_abs.is_some() && fs::canonicalize(entry.path()).ok() == output_abs {
            continue;
        }
        let relative = entry.path().strip_prefix(source).map_err(|_| {
            ContentError::Security(entry.path().display().to_string())
        })?;
        let logical = relative
            .to_str()
            .map(normalize_path)
            .ok_or_else(|| ContentError::Format(format!("non UTF-8 path: {}", relative.display())))?;
        if exclude.iter().any(|p| p.matches(&logical)) {
            debug!(path = %logical, "excluded");
            continue;
        }
        files.push((logical, entry.into_path()));
    }
    Ok(files)
}

#[cfg(not(feature = "parallel"))]
fn write_files<W: Write + Seek>(writer: &mut ArchiveWriter<W>, files: &[(String, PathBuf)]) -> Result<u64> {
    let mut total = 0u64;
    for (logical, path) in files {
        let data = fs::read(path)?;
        writer.add_file(logical, &data)?;
        total += data.len() as u64;
        debug!(path = %logical, bytes = data.len(), "packed");
    }
    Ok(total)
}

#[cfg(feature = "parallel")]
fn write_files<W: Write + Seek>(writer: &mut ArchiveWriter<W>, files: &[(String, PathBuf)]) -> Result<u64> {
    use rayon::prelude::*;

    let compressed: Vec<(u64, Vec<u8>)> = files
        .par_iter()
        .map(|(_, path)| -> Result<(u64, Vec<u8>)> {
            let data = fs::read(path)?;
            Ok((data.len() as u64, codec::compress(&data)))
        })
        .collect::<Result<_>>()?;

    let mut total = 0u64;
    for ((logical, _), (size, payload)) in files.iter().zip(compressed) {
        writer.add_compressed(logical, size, &payload)?;
        total += size;
        debug!(path = %logical, bytes = size, "packed");
    }
    Ok(total)
}
