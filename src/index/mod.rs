//! Table of contents: the binary index at the tail of every archive.
//!
//! ```text
//! u32            entry count
//! per entry:
//!   u16          path length in bytes
//!   [u8]         UTF-8 path, no terminator
//!   u64          uncompressed size
//!   u64          compressed size
//!   u64          data offset
//! ```
//!
//! A table is validated entry by entry while it is parsed and is never
//! mutated afterwards.  There is no partially valid table: the first bad
//! entry rejects the whole archive.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::io::{self, Cursor, Read, Write};

use crate::error::{ContentError, Result};
use crate::header::HEADER_SIZE;
use crate::path::normalize_path;

/// Smallest possible serialized entry: empty path plus three u64 fields.
pub const MIN_ENTRY_SIZE: u64 = 2 + 8 + 8 + 8;

/// An LZ4 block never expands its input by more than this factor.
pub const MAX_EXPANSION: u64 = 255;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocEntry {
    pub path:              String,
    pub uncompressed_size: u64,
    pub compressed_size:   u64,
    pub offset:            u64,
}

impl TocEntry {
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        let path_len = u16::try_from(self.path.len()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("path longer than {} bytes: {}", u16::MAX, self.path),
            )
        })?;
        writer.write_u16::<LittleEndian>(path_len)?;
        writer.write_all(self.path.as_bytes())?;
        writer.write_u64::<LittleEndian>(self.uncompressed_size)?;
        writer.write_u64::<LittleEndian>(self.compressed_size)?;
        writer.write_u64::<LittleEndian>(self.offset)?;
        Ok(())
    }

    fn read<R: Read>(mut reader: R) -> io::Result<Self> {
        let path_len = reader.read_u16::<LittleEndian>()? as usize;
        let mut path = vec![0u8; path_len];
        reader.read_exact(&mut path)?;
        let path = String::from_utf8(path)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Self {
            path,
            uncompressed_size: reader.read_u64::<LittleEndian>()?,
            compressed_size:   reader.read_u64::<LittleEndian>()?,
            offset:            reader.read_u64::<LittleEndian>()?,
        })
    }
}

/// Validated, immutable table of contents.
#[derive(Debug, Default)]
pub struct Toc {
    entries: Vec<TocEntry>,
    by_path: HashMap<String, usize>,
}

impl Toc {
    /// Parse and validate `bytes`, the region from `toc_offset` to the end of
    /// an archive that is `archive_len` bytes long.
    pub fn parse(bytes: &[u8], toc_offset: u64, archive_len: u64) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let count = cursor.read_u32::<LittleEndian>().map_err(|_| {
            ContentError::Integrity("table of contents is truncated before its entry count".into())
        })?;

        let remaining = bytes.len() as u64 - 4;
        if u64::from(count) * MIN_ENTRY_SIZE > remaining {
            return Err(ContentError::Integrity(format!(
                "table of contents declares {count} entries but only {remaining} bytes follow"
            )));
        }

        let mut toc = Toc {
            entries: Vec::with_capacity(count as usize),
            by_path: HashMap::with_capacity(count as usize),
        };
        for i in 0..count {
            let mut entry = TocEntry::read(&mut cursor).map_err(|e| {
                ContentError::Integrity(format!("table of contents entry {i} is unreadable: {e}"))
            })?;
            entry.path = normalize_path(&entry.path);
            validate_entry(&entry, toc_offset, archive_len)?;
            toc.insert(entry)?;
        }
        Ok(toc)
    }

    fn insert(&mut self, entry: TocEntry) -> Result<()> {
        if self.by_path.contains_key(&entry.path) {
            return Err(ContentError::Integrity(format!("duplicate entry path: {}", entry.path)));
        }
        self.by_path.insert(entry.path.clone(), self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    /// Look up a path that is already normalized.
    pub fn get(&self, path: &str) -> Option<&TocEntry> {
        self.by_path.get(path).map(|&i| &self.entries[i])
    }

    pub fn entries(&self) -> &[TocEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn validate_entry(entry: &TocEntry, toc_offset: u64, archive_len: u64) -> Result<()> {
    if entry.path.is_empty() {
        return Err(ContentError::Integrity("entry with an empty path".into()));
    }
    let end = entry.offset.checked_add(entry.compressed_size).ok_or_else(|| {
        ContentError::Integrity(format!("entry {} offset overflows", entry.path))
    })?;
    if end > archive_len {
        return Err(ContentError::Integrity(format!(
            "entry {} ends at {end}, past the archive length {archive_len}",
            entry.path
        )));
    }
    if entry.uncompressed_size == 0 && entry.compressed_size != 0 {
        return Err(ContentError::Integrity(format!(
            "entry {} is empty but declares {} compressed bytes",
            entry.path, entry.compressed_size
        )));
    }
    if entry.compressed_size != 0 && (entry.offset < HEADER_SIZE || end > toc_offset) {
        return Err(ContentError::Integrity(format!(
            "entry {} data {}..{end} lies outside the data region {HEADER_SIZE}..{toc_offset}",
            entry.path, entry.offset
        )));
    }
    if entry.uncompressed_size != 0 && entry.compressed_size == 0 {
        return Err(ContentError::Integrity(format!(
            "entry {} declares {} bytes but stores none",
            entry.path, entry.uncompressed_size
        )));
    }
    if entry.uncompressed_size > entry.compressed_size.saturating_mul(MAX_EXPANSION) {
        return Err(ContentError::Integrity(format!(
            "entry {} claims {} bytes from a {}-byte payload",
            entry.path, entry.uncompressed_size, entry.compressed_size
        )));
    }
    Ok(())
}

/// Serialize a table of contents.
pub fn write_toc<W: Write>(mut writer: W, entries: &[TocEntry]) -> io::Result<()> {
    let count = u32::try_from(entries.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "too many entries"))?;
    writer.write_u32::<LittleEndian>(count)?;
    for entry in entries {
        entry.write(&mut writer)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, uncompressed: u64, compressed: u64, offset: u64) -> TocEntry {
        TocEntry {
            path: path.into(),
            uncompressed_size: uncompressed,
            compressed_size: compressed,
            offset,
        }
    }

    fn encode(entries: &[TocEntry]) -> Vec<u8> {
        let mut buf = Vec::new();
        write_toc(&mut buf, entries).unwrap();
        buf
    }

    #[test]
    fn parses_valid_table() {
        let bytes = encode(&[entry("mod.json", 42, 30, 18), entry("data/a.bin", 0, 0, 48)]);
        let toc = Toc::parse(&bytes, 48, 48 + bytes.len() as u64).unwrap();
        assert_eq!(toc.len(), 2);
        assert_eq!(toc.get("mod.json").unwrap().compressed_size, 30);
        assert_eq!(toc.get("data/a.bin").unwrap().uncompressed_size, 0);
        assert!(toc.get("missing").is_none());
    }

    #[test]
    fn stored_paths_are_normalized() {
        let bytes = encode(&[entry("\\data\\a.bin", 0, 0, 18)]);
        let toc = Toc::parse(&bytes, 18, 18 + bytes.len() as u64).unwrap();
        assert!(toc.get("data/a.bin").is_some());
    }

    #[test]
    fn rejects_out_of_bounds_entry() {
        let bytes = encode(&[entry("a", 10, 10, 1_000)]);
        let err = Toc::parse(&bytes, 18, 18 + bytes.len() as u64).unwrap_err();
        assert!(matches!(err, ContentError::Integrity(_)));
    }

    #[test]
    fn rejects_empty_entry_with_payload() {
        let bytes = encode(&[entry("a", 0, 4, 18)]);
        let err = Toc::parse(&bytes, 22, 22 + bytes.len() as u64).unwrap_err();
        assert!(matches!(err, ContentError::Integrity(m) if m.contains("is empty")));
    }

    #[test]
    fn rejects_duplicate_paths_after_normalization() {
        let bytes = encode(&[entry("data/a", 0, 0, 18), entry("/data\\a", 0, 0, 18)]);
        let err = Toc::parse(&bytes, 18, 18 + bytes.len() as u64).unwrap_err();
        assert!(matches!(err, ContentError::Integrity(m) if m.contains("duplicate")));
    }

    #[test]
    fn rejects_inflated_entry_count() {
        let bytes = u32::MAX.to_le_bytes().to_vec();
        let err = Toc::parse(&bytes, 18, 22).unwrap_err();
        assert!(matches!(err, ContentError::Integrity(m) if m.contains("declares")));
    }

    #[test]
    fn rejects_truncated_entry() {
        let mut bytes = encode(&[entry("mod.json", 42, 30, 18)]);
        bytes.truncate(bytes.len() - 3);
        let err = Toc::parse(&bytes, 48, 48 + bytes.len() as u64).unwrap_err();
        assert!(matches!(err, ContentError::Integrity(_)));
    }

    #[test]
    fn rejects_data_overlapping_the_table() {
        let bytes = encode(&[entry("a", 10, 10, 40)]);
        let err = Toc::parse(&bytes, 45, 45 + bytes.len() as u64).unwrap_err();
        assert!(matches!(err, ContentError::Integrity(m) if m.contains("data region")));
    }

    #[test]
    fn rejects_impossible_expansion() {
        let bytes = encode(&[entry("a", u64::MAX, 4, 18)]);
        let err = Toc::parse(&bytes, 22, 22 + bytes.len() as u64).unwrap_err();
        assert!(matches!(err, ContentError::Integrity(m) if m.contains("claims")));
    }

    #[test]
    fn overlong_path_cannot_be_written() {
        let long = "x".repeat(u16::MAX as usize + 1);
        let mut buf = Vec::new();
        assert!(entry(&long, 0, 0, 18).write(&mut buf).is_err());
    }
}
