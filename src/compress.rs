//! Compression mode selection and codecs.
//!
//! Compression is chosen per write, not per archive. The zip backend maps
//! the mode onto deflate entry methods, the tar backend wraps compressed
//! payloads in a small self-describing zlib frame (tar headers have no
//! method field), and the sqlite backend stores an LZ4 block with a codec
//! tag column. Decompression is always transparent on read.

use std::io::{Read, Write};

use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::{DeflateEncoder, ZlibEncoder};
use flate2::Compression;

use crate::util::{Error, Result};

/// Frame marker for compressed tar payloads. Eight bytes of
/// non-printable-prefixed magic keep accidental collisions with raw
/// payloads out of the question in practice.
const FRAME_MAGIC: &[u8; 8] = b"\x89GTARZ\r\n";

/// Per-write compression mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CompressMode {
    /// Store the payload verbatim
    None,
    /// Cheap compression (deflate level 1 / LZ4)
    #[default]
    Fast,
    /// Balanced compression (deflate level 6 / LZ4)
    Medium,
    /// Best compression (deflate level 9 / LZ4)
    Slow,
}

impl CompressMode {
    /// The deflate level this mode selects, if any.
    pub fn deflate_level(&self) -> Option<Compression> {
        match self {
            CompressMode::None => None,
            CompressMode::Fast => Some(Compression::fast()),
            CompressMode::Medium => Some(Compression::default()),
            CompressMode::Slow => Some(Compression::best()),
        }
    }
}

/// Compress a tar payload into the self-describing zlib frame:
/// `[magic: 8][uncompressed size: u64 LE][zlib stream]`.
///
/// Returns the payload unchanged for [`CompressMode::None`], and whenever
/// framing would not actually save space.
pub fn compress_framed(data: &[u8], mode: CompressMode) -> Result<Vec<u8>> {
    // raw bytes opening with the frame magic would be misparsed as a
    // frame on read, so they are always framed
    let collides = data.starts_with(FRAME_MAGIC);

    let level = match mode.deflate_level() {
        Some(level) => level,
        None if !collides => return Ok(data.to_vec()),
        None => Compression::none(),
    };

    let mut encoder = ZlibEncoder::new(Vec::new(), level);
    encoder.write_all(data)?;
    let compressed = encoder.finish()?;

    if !collides && compressed.len() + FRAME_MAGIC.len() + 8 >= data.len() {
        return Ok(data.to_vec());
    }

    let mut result = Vec::with_capacity(FRAME_MAGIC.len() + 8 + compressed.len());
    result.extend_from_slice(FRAME_MAGIC);
    result.extend_from_slice(&(data.len() as u64).to_le_bytes());
    result.extend_from_slice(&compressed);

    Ok(result)
}

/// Undo [`compress_framed`]: payloads without the frame magic pass through
/// untouched.
pub fn decompress_framed(data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < FRAME_MAGIC.len() + 8 || &data[..FRAME_MAGIC.len()] != FRAME_MAGIC {
        return Ok(data.to_vec());
    }

    let mut size_bytes = [0u8; 8];
    size_bytes.copy_from_slice(&data[FRAME_MAGIC.len()..FRAME_MAGIC.len() + 8]);
    let expected = u64::from_le_bytes(size_bytes) as usize;

    // the size prefix is container data; it validates the decode result
    // but never sizes an allocation
    let mut decoder = ZlibDecoder::new(&data[FRAME_MAGIC.len() + 8..]);
    let mut result = Vec::new();
    decoder
        .read_to_end(&mut result)
        .map_err(|e| Error::corrupt(format!("bad zlib frame: {e}")))?;

    if result.len() != expected {
        return Err(Error::corrupt(format!(
            "zlib frame decompressed to {} bytes, expected {expected}",
            result.len()
        )));
    }

    Ok(result)
}

/// Raw deflate for zip entry payloads (the zip entry records the method).
pub fn deflate(data: &[u8], level: Compression) -> Result<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), level);
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Inverse of [`deflate`], validating the expected uncompressed size.
pub fn inflate(data: &[u8], expected: usize) -> Result<Vec<u8>> {
    let mut decoder = DeflateDecoder::new(data);
    let mut result = Vec::new();
    decoder
        .read_to_end(&mut result)
        .map_err(|e| Error::corrupt(format!("bad deflate stream: {e}")))?;

    if result.len() != expected {
        return Err(Error::corrupt(format!(
            "deflate stream decompressed to {} bytes, expected {expected}",
            result.len()
        )));
    }

    Ok(result)
}

/// LZ4 block with a size prefix, for the sqlite backend.
pub fn lz4_compress(data: &[u8]) -> Vec<u8> {
    lz4_flex::compress_prepend_size(data)
}

/// Inverse of [`lz4_compress`].
pub fn lz4_decompress(data: &[u8]) -> Result<Vec<u8>> {
    lz4_flex::decompress_size_prepended(data)
        .map_err(|e| Error::corrupt(format!("bad LZ4 block: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framed_round_trip() {
        let original = b"repetitive trajectory data ".repeat(100);

        for mode in [
            CompressMode::Fast,
            CompressMode::Medium,
            CompressMode::Slow,
        ] {
            let framed = compress_framed(&original, mode).unwrap();
            assert!(framed.len() < original.len());
            assert_eq!(decompress_framed(&framed).unwrap(), original);
        }
    }

    #[test]
    fn test_framed_none_is_verbatim() {
        let original = b"some bytes";
        let stored = compress_framed(original, CompressMode::None).unwrap();
        assert_eq!(stored, original);
        assert_eq!(decompress_framed(&stored).unwrap(), original);
    }

    #[test]
    fn test_magic_prefixed_payload_round_trips() {
        // a payload that happens to begin with the frame magic must not be
        // misparsed as a frame (its next bytes are not a size)
        let mut original = FRAME_MAGIC.to_vec();
        original.extend(1..=10u8);

        for mode in [
            CompressMode::None,
            CompressMode::Fast,
            CompressMode::Slow,
        ] {
            let stored = compress_framed(&original, mode).unwrap();
            assert_ne!(stored, original, "colliding payload must be framed");
            assert_eq!(decompress_framed(&stored).unwrap(), original);
        }
    }

    #[test]
    fn test_framed_incompressible_stays_raw() {
        // two bytes cannot shrink past the frame header
        let stored = compress_framed(b"hi", CompressMode::Slow).unwrap();
        assert_eq!(stored, b"hi");
    }

    #[test]
    fn test_deflate_round_trip() {
        let original = b"0123456789".repeat(64);
        let packed = deflate(&original, Compression::best()).unwrap();
        assert_eq!(inflate(&packed, original.len()).unwrap(), original);
    }

    #[test]
    fn test_inflate_size_mismatch() {
        let packed = deflate(b"abcdef", Compression::fast()).unwrap();
        assert!(inflate(&packed, 3).is_err());
    }

    #[test]
    fn test_lz4_round_trip() {
        let original = b"lz4 lz4 lz4 lz4 lz4 ".repeat(32);
        let packed = lz4_compress(&original);
        assert_eq!(lz4_decompress(&packed).unwrap(), original);
    }
}
