use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};
use thiserror::Error;

use crate::error::ContentError;

pub const MAGIC: &[u8; 8] = b"MODPAK\0\x1A";
pub const VERSION: u16 = 1;
/// magic (8) + version (2) + toc offset (8).
pub const HEADER_SIZE: u64 = 18;

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("Invalid magic number {0:02x?}")]
    InvalidMagic([u8; 8]),
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u16),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<HeaderError> for ContentError {
    fn from(e: HeaderError) -> Self {
        match e {
            HeaderError::Io(io) if io.kind() == io::ErrorKind::UnexpectedEof => {
                ContentError::Format("archive is shorter than its header".into())
            }
            HeaderError::Io(io) => ContentError::from(io),
            other => ContentError::Format(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u16,
    pub toc_offset: u64,
}

impl Header {
    pub fn new(toc_offset: u64) -> Self {
        Self { version: VERSION, toc_offset }
    }

    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_all(MAGIC)?;
        writer.write_u16::<LittleEndian>(self.version)?;
        writer.write_u64::<LittleEndian>(self.toc_offset)?;
        Ok(())
    }

    /// Magic and version are checked before the offset is even read.
    pub fn read<R: Read>(mut reader: R) -> Result<Self, HeaderError> {
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(HeaderError::InvalidMagic(magic));
        }
        let version = reader.read_u16::<LittleEndian>()?;
        if version != VERSION {
            return Err(HeaderError::UnsupportedVersion(version));
        }
        let toc_offset = reader.read_u64::<LittleEndian>()?;
        Ok(Self { version, toc_offset })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn header_layout_is_eighteen_bytes() {
        let mut buf = Vec::new();
        Header::new(0x0102).write(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, HEADER_SIZE);
        assert_eq!(&buf[..8], MAGIC);
        assert_eq!(&buf[8..10], &[1, 0]);
        assert_eq!(&buf[10..18], &[0x02, 0x01, 0, 0, 0, 0, 0, 0]);
        assert_eq!(Header::read(Cursor::new(&buf)).unwrap(), Header::new(0x0102));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = b"BADMAGIC".to_vec();
        buf.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        let err = Header::read(Cursor::new(&buf)).unwrap_err();
        assert!(matches!(err, HeaderError::InvalidMagic(m) if &m == b"BADMAGIC"));
        assert!(matches!(ContentError::from(err), ContentError::Format(_)));
    }

    #[test]
    fn rejects_future_version() {
        let mut buf = MAGIC.to_vec();
        buf.extend_from_slice(&[2, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert!(matches!(
            Header::read(Cursor::new(&buf)),
            Err(HeaderError::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn truncated_header_is_a_format_error() {
        let err = Header::read(Cursor::new(&MAGIC[..5])).unwrap_err();
        assert!(matches!(ContentError::from(err), ContentError::Format(_)));
    }
}
