//! Per-entry compression.
//!
//! Every stored file is one raw LZ4 block: no frame, no size prefix, no
//! dictionary shared with any other entry.  The table of contents carries
//! both sizes, so a reader can decompress any single entry into an
//! exactly-sized buffer without looking at its neighbours.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Decompression error: {0}")]
    Decompression(String),
    #[error("Decompressed length {actual} does not match declared size {declared}")]
    LengthMismatch { declared: u64, actual: u64 },
}

/// Compress one file's bytes as an independent block.
///
/// Empty input yields an empty payload; empty entries are never actually
/// compressed.
pub fn compress(data: &[u8]) -> Vec<u8> {
    if data.is_empty() {
        return Vec::new();
    }
    lz4_flex::block::compress(data)
}

/// Decompress `payload` into `out`, which must be exactly the declared
/// uncompressed size.  Anything other than a complete fill is an error.
pub fn decompress_into(payload: &[u8], out: &mut [u8]) -> Result<(), CodecError> {
    let written = lz4_flex::block::decompress_into(payload, out)
        .map_err(|e| CodecError::Decompression(e.to_string()))?;
    if written != out.len() {
        return Err(CodecError::LengthMismatch {
            declared: out.len() as u64,
            actual:   written as u64,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_roundtrip() {
        let data: Vec<u8> = b"tileset ".iter().copied().cycle().take(4096).collect();
        let payload = compress(&data);
        assert!(payload.len() < data.len());
        let mut out = vec![0u8; data.len()];
        decompress_into(&payload, &mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn empty_input_stays_empty() {
        assert!(compress(&[]).is_empty());
    }

    #[test]
    fn oversized_declaration_is_a_length_mismatch() {
        let payload = compress(b"short payload");
        let mut out = vec![0u8; 64];
        assert!(matches!(
            decompress_into(&payload, &mut out),
            Err(CodecError::LengthMismatch { declared: 64, actual: 13 })
        ));
    }

    #[test]
    fn undersized_declaration_fails() {
        let payload = compress(b"this will not fit in four bytes");
        let mut out = vec![0u8; 4];
        assert!(decompress_into(&payload, &mut out).is_err());
    }

    #[test]
    fn garbage_payload_fails_cleanly() {
        let mut out = vec![0u8; 32];
        assert!(decompress_into(&[0xFF, 0xFF, 0xFF], &mut out).is_err());
    }
}
