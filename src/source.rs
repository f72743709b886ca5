//! The capability every mod content provider exposes.
//!
//! Downstream loaders only ever see a [`ContentSource`]; whether the bytes
//! come out of a `.modpak` archive or a plain directory is invisible to them
//! apart from [`ContentSource::is_compressed`].

use std::path::Path;
use std::sync::Arc;

use crate::archive::{ArchiveReader, ARCHIVE_EXTENSION};
use crate::directory::DirectorySource;
use crate::error::{ContentError, Result};
use crate::manifest::{decode_text, Manifest};

/// Lazily produced sequence of logical paths.  Calling `enumerate_files`
/// again restarts the enumeration.
pub type FileIter = Box<dyn Iterator<Item = String> + Send>;

pub trait ContentSource: Send + Sync {
    /// Archive file or root directory this source reads from.
    fn source_path(&self) -> &Path;

    fn is_compressed(&self) -> bool;

    fn read_file(&self, path: &str) -> Result<Vec<u8>>;

    fn read_text_file(&self, path: &str) -> Result<String> {
        let bytes = self.read_file(path)?;
        decode_text(&bytes, path)
    }

    /// `Ok(false)` for a missing file; `Err` only when the source itself is
    /// unusable.
    fn file_exists(&self, path: &str) -> Result<bool>;

    /// Paths whose file name matches `pattern`.  With `recursive == false`
    /// only top-level entries are produced.
    fn enumerate_files(&self, pattern: &str, recursive: bool) -> Result<FileIter>;

    /// Decoded manifest, loaded once and cached.
    fn manifest(&self) -> Result<Arc<Manifest>>;

    fn mod_id(&self) -> Result<String> {
        Ok(self.manifest()?.id.clone())
    }

    /// Release backing resources.  Idempotent; every later operation fails
    /// with [`ContentError::AlreadyReleased`].
    fn release(&self);
}

/// Open whatever lives at `path` as a content source.
///
/// Archives are validated eagerly so a corrupt file is rejected here, at
/// discovery time, rather than on its first read.
pub fn open_content_source<P: AsRef<Path>>(path: P) -> Result<Box<dyn ContentSource>> {
    let path = path.as_ref();
    if path.is_dir() {
        return Ok(Box::new(DirectorySource::new(path)?));
    }
    let is_archive = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ARCHIVE_EXTENSION));
    if is_archive && path.is_file() {
        return Ok(Box::new(ArchiveReader::open(path)?));
    }
    Err(ContentError::NotFound(format!(
        "{} is neither a mod directory nor a .{ARCHIVE_EXTENSION} archive",
        path.display()
    )))
}
