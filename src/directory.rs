//! A plain mod directory behind the [`ContentSource`] interface.
//!
//! Every logical path is folded lexically first and then, once the target
//! exists, canonicalized and checked against the canonical root.  A path
//! that would leave the root, through `..`, a rooted or drive-prefixed
//! spelling, or a symlink, fails with [`ContentError::Security`] before the
//! target is opened.

use parking_lot::Mutex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{ContentError, Result};
use crate::glob::{within_depth, Pattern};
use crate::manifest::{Manifest, MANIFEST_PATH};
use crate::path::{is_rooted, resolve_relative};
use crate::source::{ContentSource, FileIter};

pub struct DirectorySource {
    root:     PathBuf,
    manifest: Mutex<Option<Arc<Manifest>>>,
    released: AtomicBool,
}

impl DirectorySource {
    /// `root` must exist and be a directory.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref();
        let canonical = fs::canonicalize(root).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ContentError::NotFound(root.display().to_string()),
            _ => ContentError::from(e),
        })?;
        if !canonical.is_dir() {
            return Err(ContentError::NotFound(format!("{} is not a directory", root.display())));
        }
        Ok(Self {
            root:     canonical,
            manifest: Mutex::new(None),
            released: AtomicBool::new(false),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_live(&self) -> Result<()> {
        if self.released.load(Ordering::Acquire) {
            return Err(ContentError::AlreadyReleased);
        }
        Ok(())
    }

    /// Lexical containment only; no file-system access.
    fn join_lexically(&self, path: &str) -> Result<PathBuf> {
        let relative = resolve_relative(path).filter(|_| !is_rooted(path)).ok_or_else(|| {
            warn!(path, root = %self.root.display(), "rejected path outside content root");
            ContentError::Security(path.to_owned())
        })?;
        Ok(self.root.join(relative))
    }

    /// Full resolution of an existing regular file.
    fn resolve_file(&self, path: &str) -> Result<PathBuf> {
        let joined = self.join_lexically(path)?;
        let canonical = match fs::canonicalize(&joined) {
            Ok(p) => p,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ContentError::NotFound(path.to_owned()))
            }
            Err(e) => return Err(e.into()),
        };
        if !canonical.starts_with(&self.root) {
            warn!(path, target = %canonical.display(), "rejected link outside content root");
            return Err(ContentError::Security(path.to_owned()));
        }
        if !canonical.is_file() {
            return Err(ContentError::NotFound(path.to_owned()));
        }
        Ok(canonical)
    }

    /// A walked symlink counts as a file when its target is a regular file
    /// inside the root, the same rule `resolve_file` applies.
    fn is_listed_file(&self, entry: &walkdir::DirEntry) -> bool {
        let kind = entry.file_type();
        if kind.is_file() {
            return true;
        }
        if !kind.is_symlink() {
            return false;
        }
        match fs::canonicalize(entry.path()) {
            Ok(target) => target.starts_with(&self.root) && target.is_file(),
            Err(_) => false,
        }
    }

    /// Logical path of a walked file, or `None` for anything not expressible
    /// as one (non-UTF-8 names).
    fn logical_path(root: &Path, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(root).ok()?;
        let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
        Some(parts?.join("/"))
    }
}

impl ContentSource for DirectorySource {
    fn source_path(&self) -> &Path {
        &self.root
    }

    fn is_compressed(&self) -> bool {
        false
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.ensure_live()?;
        let target = self.resolve_file(path)?;
        debug!(path, "read directory file");
        Ok(fs::read(target)?)
    }

    fn file_exists(&self, path: &str) -> Result<bool> {
        self.ensure_live()?;
        match self.resolve_file(path) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn enumerate_files(&self, pattern: &str, recursive: bool) -> Result<FileIter> {
        self.ensure_live()?;
        let pattern = Pattern::new(pattern)?;
        let max_depth = if recursive { usize::MAX } else { 1 };

        // Walked up front so any walk error fails the call.
        let mut paths = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(max_depth).sort_by_file_name() {
            let entry = entry.map_err(|e| ContentError::from(io::Error::from(e)))?;
            if !self.is_listed_file(&entry) {
                continue;
            }
            if let Some(path) = Self::logical_path(&self.root, entry.path()) {
                if within_depth(&path, recursive) && pattern.matches(&path) {
                    paths.push(path);
                }
            }
        }
        Ok(Box::new(paths.into_iter()))
    }

    fn manifest(&self) -> Result<Arc<Manifest>> {
        self.ensure_live()?;
        let mut cached = self.manifest.lock();
        if let Some(manifest) = cached.as_ref() {
            return Ok(Arc::clone(manifest));
        }
        let manifest = Arc::new(Manifest::from_bytes(&self.read_file(MANIFEST_PATH)?)?);
        *cached = Some(Arc::clone(&manifest));
        Ok(manifest)
    }

    fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.manifest.lock().take();
            debug!(root = %self.root.display(), "released directory source");
        }
    }
}
