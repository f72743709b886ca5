pub mod path;
pub mod error;
pub mod header;
pub mod codec;
pub mod index;
pub mod pool;
pub mod glob;
pub mod manifest;
pub mod source;
pub mod archive;
pub mod directory;
pub mod builder;

pub use error::{ContentError, Result};
pub use header::Header;
pub use index::{Toc, TocEntry};
pub use manifest::{Manifest, MANIFEST_PATH};
pub use source::{open_content_source, ContentSource, FileIter};
pub use archive::{ArchiveReader, EntryInfo, ARCHIVE_EXTENSION};
pub use directory::DirectorySource;
pub use builder::{build, build_with_options, ArchiveWriter, BuildOptions, BuildSummary};
pub use path::normalize_path;
