use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Every failure a content source can report.
///
/// Cloneable: a failed table-of-contents load is replayed to every later
/// caller of the same reader.
#[derive(Error, Debug, Clone)]
pub enum ContentError {
    /// Bad magic, unsupported version, or undecodable content.
    #[error("Format error: {0}")]
    Format(String),
    /// Structurally corrupt archive: bounds, sizes, duplicates.
    #[error("Integrity error: {0}")]
    Integrity(String),
    #[error("Not found: {0}")]
    NotFound(String),
    /// A path resolved outside the content root.
    #[error("Path escapes content root: {0}")]
    Security(String),
    #[error("IO error: {0}")]
    Io(Arc<io::Error>),
    #[error("Content source has already been released")]
    AlreadyReleased,
    #[error("Invalid search pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

impl ContentError {
    /// `NotFound`, and `Security` which callers treat the same way.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ContentError::NotFound(_) | ContentError::Security(_))
    }
}

impl From<io::Error> for ContentError {
    fn from(e: io::Error) -> Self {
        ContentError::Io(Arc::new(e))
    }
}

pub type Result<T> = std::result::Result<T, ContentError>;
