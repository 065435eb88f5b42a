//! Tape-archive backend: a sequential, append-only chain of (ustar header,
//! payload) entries.
//!
//! There is no in-place overwrite; writing an existing path appends a newer
//! trailing entry which shadows the earlier one in the catalog. Reading an
//! archive requires a full header scan, cached at open time. Because tar
//! headers carry no compression method, compressed payloads use the
//! self-describing zlib frame from [`crate::compress`].

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::backend::{ContainerBackend, OpenMode};
use crate::compress::{compress_framed, decompress_framed, CompressMode};
use crate::util::{Error, Result};

const BLOCK: u64 = 512;
const NAME_LEN: usize = 100;
const PREFIX_LEN: usize = 155;

/// Round a payload length up to the next 512-byte block boundary.
#[inline]
fn padded(len: u64) -> u64 {
    len.div_ceil(BLOCK) * BLOCK
}

struct EntryMeta {
    /// Payload offset (just past the header block)
    offset: u64,
    size: u64,
}

pub(crate) struct TarBackend {
    file: File,
    mode: OpenMode,
    /// Entry names in storage order, shadowed duplicates included
    names: Vec<String>,
    /// Last entry per path
    entries: HashMap<String, EntryMeta>,
    /// Where the next entry (or the end-of-archive trailer) goes
    end: u64,
    finalized: bool,
}

impl TarBackend {
    pub fn open(path: &Path, mode: OpenMode) -> Result<Self> {
        let file = match mode {
            OpenMode::Read => OpenOptions::new().read(true).open(path)?,
            OpenMode::Write => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?,
            OpenMode::Append => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(path)?,
        };

        let mut backend = Self {
            file,
            mode,
            names: Vec::new(),
            entries: HashMap::new(),
            end: 0,
            finalized: false,
        };

        backend.scan()?;
        debug!(
            path = %path.display(),
            entries = backend.names.len(),
            "opened tar archive"
        );

        Ok(backend)
    }

    /// Walk the header chain, populating the entry maps. Stops at the
    /// end-of-archive zero block, so appends overwrite the old trailer.
    fn scan(&mut self) -> Result<()> {
        let len = self.file.metadata()?.len();
        let mut offset = 0u64;
        let mut header = [0u8; BLOCK as usize];

        while offset + BLOCK <= len {
            self.file.seek(SeekFrom::Start(offset))?;
            self.file.read_exact(&mut header)?;

            if header.iter().all(|b| *b == 0) {
                break;
            }

            if &header[257..262] != b"ustar" {
                let msg = format!(
                    "tar record at offset {offset}: magic mismatch (is this actually a tar file?)"
                );
                // A bad header mid-file truncates the scan; at offset zero
                // the whole container is unusable.
                if offset == 0 {
                    return Err(Error::corrupt(msg));
                }
                warn!("{msg}");
                break;
            }

            let mut name = trimmed_str(&header[345..345 + PREFIX_LEN])?;
            name.push_str(&trimmed_str(&header[0..NAME_LEN])?);

            let size = parse_octal(&header[124..136])
                .ok_or_else(|| Error::corrupt(format!("bad size field for entry {name:?}")))?;

            // a size past the end of the file is container damage, not an
            // allocation request
            if size > len.saturating_sub(offset + BLOCK) {
                return Err(Error::corrupt(format!(
                    "entry {name:?} reports {size} bytes past the end of a {len}-byte archive"
                )));
            }

            self.entries.insert(
                name.clone(),
                EntryMeta {
                    offset: offset + BLOCK,
                    size,
                },
            );
            self.names.push(name);

            offset += BLOCK + padded(size);
        }

        self.end = offset;
        Ok(())
    }

    fn build_header(path: &str, size: u64) -> Result<[u8; BLOCK as usize]> {
        let bytes = path.as_bytes();
        let (prefix, name) = if bytes.len() > NAME_LEN {
            let split = bytes.len() - NAME_LEN;
            if split > PREFIX_LEN {
                return Err(Error::other(format!(
                    "record path of {} bytes does not fit in a tar header",
                    bytes.len()
                )));
            }
            (&bytes[..split], &bytes[split..])
        } else {
            (&[][..], bytes)
        };

        let mut header = [0u8; BLOCK as usize];
        header[..name.len()].copy_from_slice(name);
        header[100..108].copy_from_slice(b"0000644\0");
        header[108..116].copy_from_slice(b"0000000\0");
        header[116..124].copy_from_slice(b"0000000\0");
        write_octal(&mut header[124..136], size);
        header[136..148].copy_from_slice(b"00000000000\0");
        header[156] = b'0'; // typeflag: regular file
        header[257..263].copy_from_slice(b"ustar\0");
        header[263..265].copy_from_slice(b"00");
        header[345..345 + prefix.len()].copy_from_slice(prefix);

        // checksum is computed with the checksum field filled with spaces
        header[148..156].copy_from_slice(b"        ");
        let checksum: u64 = header.iter().map(|b| *b as u64).sum();
        let formatted = format!("{checksum:06o}\0 ");
        header[148..156].copy_from_slice(formatted.as_bytes());

        Ok(header)
    }
}

impl ContainerBackend for TarBackend {
    fn write(&mut self, path: &str, payload: &[u8], mode: CompressMode) -> Result<()> {
        let stored = compress_framed(payload, mode)?;
        let header = Self::build_header(path, stored.len() as u64)?;

        self.file.seek(SeekFrom::Start(self.end))?;
        self.file.write_all(&header)?;
        self.file.write_all(&stored)?;

        let pad = (padded(stored.len() as u64) - stored.len() as u64) as usize;
        if pad > 0 {
            self.file.write_all(&[0u8; BLOCK as usize][..pad])?;
        }

        self.entries.insert(
            path.to_owned(),
            EntryMeta {
                offset: self.end + BLOCK,
                size: stored.len() as u64,
            },
        );
        self.names.push(path.to_owned());
        self.end += BLOCK + padded(stored.len() as u64);

        Ok(())
    }

    fn read(&mut self, path: &str) -> Result<Option<Vec<u8>>> {
        let meta = match self.entries.get(path) {
            Some(meta) => meta,
            None => return Ok(None),
        };

        self.file.seek(SeekFrom::Start(meta.offset))?;
        let mut stored = vec![0u8; meta.size as usize];
        self.file.read_exact(&mut stored).map_err(|e| {
            Error::corrupt(format!("truncated tar entry {path:?}: {e}"))
        })?;

        decompress_framed(&stored).map(Some)
    }

    fn entry_paths(&self) -> Vec<String> {
        self.names.clone()
    }

    fn end_bulk_writes(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;

        if self.mode.writable() {
            // end-of-archive trailer: two 512-byte zero blocks
            self.file.seek(SeekFrom::Start(self.end))?;
            self.file.write_all(&[0u8; 2 * BLOCK as usize])?;
            self.file.flush()?;
        }

        Ok(())
    }
}

/// NUL-trimmed string from a fixed header field.
fn trimmed_str(field: &[u8]) -> Result<String> {
    let end = field.iter().position(|b| *b == 0).unwrap_or(field.len());
    Ok(String::from_utf8(field[..end].to_vec())?)
}

/// Parse a NUL/space-terminated octal field.
fn parse_octal(field: &[u8]) -> Option<u64> {
    let mut value = 0u64;
    let mut seen = false;

    for b in field {
        match b {
            b'0'..=b'7' => {
                value = value.checked_mul(8)?.checked_add((b - b'0') as u64)?;
                seen = true;
            }
            b' ' if !seen => continue,
            b'\0' | b' ' => break,
            _ => return None,
        }
    }

    seen.then_some(value)
}

/// Format an 11-digit octal value with a NUL terminator.
fn write_octal(field: &mut [u8], value: u64) {
    let formatted = format!("{value:011o}\0");
    field.copy_from_slice(formatted.as_bytes());
}
