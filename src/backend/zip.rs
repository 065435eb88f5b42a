//! Zip backend: local file entries plus a central directory, with zip64
//! size/offset extension records.
//!
//! ## Container structure
//!
//! ```text
//! +----------------------+
//! | local header + data  |  per entry, deflate or stored
//! +----------------------+
//! | ...                  |
//! +----------------------+
//! | central directory    |  one header per entry, rewritten on close
//! +----------------------+
//! | zip64 EOCD record    |  always written, so archives can grow
//! | zip64 EOCD locator   |  past the 4 GiB limits without conversion
//! | EOCD                 |
//! +----------------------+
//! ```
//!
//! A 32-bit size or offset field holding `0xFFFF_FFFF` defers to the zip64
//! extra field (id `0x0001`); the same value appearing *without* a zip64
//! extra is the sentinel a corrupt entry reports, and such entries are
//! refused unless explicitly excluded (see [`crate::repair`]).

use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::{debug, warn};

use crate::backend::{ContainerBackend, OpenMode};
use crate::compress::{deflate, inflate, CompressMode};
use crate::util::{Error, Result};

const LOCAL_SIG: u32 = 0x0403_4b50;
const CENTRAL_SIG: u32 = 0x0201_4b50;
const EOCD_SIG: u32 = 0x0605_4b50;
const ZIP64_EOCD_SIG: u32 = 0x0606_4b50;
const ZIP64_LOCATOR_SIG: u32 = 0x0706_4b50;

const ZIP64_EXTRA_ID: u16 = 0x0001;
const U32_SENTINEL: u32 = 0xFFFF_FFFF;
const U16_SENTINEL: u16 = 0xFFFF;

/// Version needed to extract, pinned to 4.5 (zip64).
const VERSION_ZIP64: u16 = 45;

const METHOD_STORE: u16 = 0;
const METHOD_DEFLATE: u16 = 8;

const LOCAL_HEADER_LEN: u64 = 30;
const EOCD_LEN: usize = 22;
const ZIP64_LOCATOR_LEN: usize = 20;

#[derive(Clone)]
struct EntryMeta {
    path: String,
    header_offset: u64,
    method: u16,
    crc: u32,
    comp_size: u64,
    uncomp_size: u64,
}

/// Result of a central-directory scan.
pub(crate) struct ScanReport {
    entries: Vec<EntryMeta>,
    /// Paths of entries reporting the corrupt-size sentinel
    corrupt: Vec<String>,
    /// Start of the central directory (where appends resume)
    cd_offset: u64,
    zip64: bool,
}

pub(crate) struct ZipBackend {
    file: File,
    mode: OpenMode,
    entries: Vec<EntryMeta>,
    /// Last entry index per path
    index: HashMap<String, usize>,
    /// Where the next local entry (and ultimately the central directory) goes
    write_pos: u64,
    finalized: bool,
}

impl ZipBackend {
    pub fn open(path: &Path, mode: OpenMode, excluded: &HashSet<String>) -> Result<Self> {
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
            entries: Vec::new(),
            index: HashMap::new(),
            write_pos: 0,
            finalized: false,
        };

        let fresh = backend.file.metadata()?.len() == 0;
        if !matches!(mode, OpenMode::Write) && !fresh {
            let report = scan_container(&mut backend.file)?;

            if let Some(bad) = report.corrupt.iter().find(|p| !excluded.contains(*p)) {
                return Err(Error::corrupt(format!(
                    "entry {bad:?} reports the corrupt-size sentinel; run repair to drop it"
                )));
            }
            if !report.corrupt.is_empty() {
                warn!(
                    dropped = report.corrupt.len(),
                    "excluded corrupt entries from catalog"
                );
            }

            if matches!(mode, OpenMode::Append) && !report.zip64 {
                return Err(Error::corrupt(format!(
                    "{} is not in zip64 format, but we will only append to \
                     zip64-format archives; copy it into a zip64 archive first",
                    path.display()
                )));
            }

            for meta in report.entries {
                if excluded.contains(&meta.path) {
                    continue;
                }
                backend.index.insert(meta.path.clone(), backend.entries.len());
                backend.entries.push(meta);
            }
            backend.write_pos = report.cd_offset;
        }

        debug!(
            path = %path.display(),
            entries = backend.entries.len(),
            "opened zip archive"
        );

        Ok(backend)
    }
}

impl ContainerBackend for ZipBackend {
    fn write(&mut self, path: &str, payload: &[u8], mode: CompressMode) -> Result<()> {
        if path.len() > u16::MAX as usize {
            return Err(Error::other(format!(
                "record path of {} bytes does not fit in a zip header",
                path.len()
            )));
        }

        let crc = crc32fast::hash(payload);

        let (method, stored) = match mode.deflate_level() {
            Some(level) => {
                let packed = deflate(payload, level)?;
                if packed.len() < payload.len() {
                    (METHOD_DEFLATE, packed)
                } else {
                    (METHOD_STORE, payload.to_vec())
                }
            }
            None => (METHOD_STORE, payload.to_vec()),
        };

        let meta = EntryMeta {
            path: path.to_owned(),
            header_offset: self.write_pos,
            method,
            crc,
            comp_size: stored.len() as u64,
            uncomp_size: payload.len() as u64,
        };

        let large = meta.comp_size >= U32_SENTINEL as u64
            || meta.uncomp_size >= U32_SENTINEL as u64;
        let extra_len: u16 = if large { 4 + 16 } else { 0 };

        self.file.seek(SeekFrom::Start(self.write_pos))?;
        let mut header = Vec::with_capacity(LOCAL_HEADER_LEN as usize + path.len() + 20);
        header.write_u32::<LittleEndian>(LOCAL_SIG)?;
        header.write_u16::<LittleEndian>(VERSION_ZIP64)?;
        header.write_u16::<LittleEndian>(0)?; // general purpose flags
        header.write_u16::<LittleEndian>(method)?;
        header.write_u16::<LittleEndian>(0)?; // mod time
        header.write_u16::<LittleEndian>(0)?; // mod date
        header.write_u32::<LittleEndian>(crc)?;
        header.write_u32::<LittleEndian>(clamp32(meta.comp_size))?;
        header.write_u32::<LittleEndian>(clamp32(meta.uncomp_size))?;
        header.write_u16::<LittleEndian>(path.len() as u16)?;
        header.write_u16::<LittleEndian>(extra_len)?;
        header.extend_from_slice(path.as_bytes());
        if large {
            header.write_u16::<LittleEndian>(ZIP64_EXTRA_ID)?;
            header.write_u16::<LittleEndian>(16)?;
            header.write_u64::<LittleEndian>(meta.uncomp_size)?;
            header.write_u64::<LittleEndian>(meta.comp_size)?;
        }

        self.file.write_all(&header)?;
        self.file.write_all(&stored)?;

        self.write_pos += header.len() as u64 + stored.len() as u64;
        self.index.insert(meta.path.clone(), self.entries.len());
        self.entries.push(meta);

        Ok(())
    }

    fn read(&mut self, path: &str) -> Result<Option<Vec<u8>>> {
        let meta = match self.index.get(path) {
            Some(idx) => self.entries[*idx].clone(),
            None => return Ok(None),
        };

        self.file.seek(SeekFrom::Start(meta.header_offset))?;
        let mut local = [0u8; LOCAL_HEADER_LEN as usize];
        self.file
            .read_exact(&mut local)
            .map_err(|e| Error::corrupt(format!("truncated local header for {path:?}: {e}")))?;

        let mut cursor = Cursor::new(&local[..]);
        if cursor.read_u32::<LittleEndian>()? != LOCAL_SIG {
            return Err(Error::corrupt(format!(
                "bad local header signature for {path:?}"
            )));
        }
        cursor.set_position(26);
        let name_len = cursor.read_u16::<LittleEndian>()? as u64;
        let extra_len = cursor.read_u16::<LittleEndian>()? as u64;

        self.file.seek(SeekFrom::Start(
            meta.header_offset + LOCAL_HEADER_LEN + name_len + extra_len,
        ))?;
        let mut stored = vec![0u8; meta.comp_size as usize];
        self.file
            .read_exact(&mut stored)
            .map_err(|e| Error::corrupt(format!("truncated entry {path:?}: {e}")))?;

        let payload = match meta.method {
            METHOD_STORE => stored,
            METHOD_DEFLATE => inflate(&stored, meta.uncomp_size as usize)?,
            other => {
                return Err(Error::corrupt(format!(
                    "entry {path:?} uses unsupported compression method {other}"
                )))
            }
        };

        if crc32fast::hash(&payload) != meta.crc {
            return Err(Error::corrupt(format!("crc mismatch for entry {path:?}")));
        }

        Ok(Some(payload))
    }

    fn entry_paths(&self) -> Vec<String> {
        self.entries.iter().map(|m| m.path.clone()).collect()
    }

    fn close(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;

        if !self.mode.writable() {
            return Ok(());
        }

        let cd_offset = self.write_pos;
        self.file.seek(SeekFrom::Start(cd_offset))?;

        let mut cd = Vec::new();
        for meta in &self.entries {
            let mut extra = Vec::new();
            if meta.uncomp_size >= U32_SENTINEL as u64 {
                extra.write_u64::<LittleEndian>(meta.uncomp_size)?;
            }
            if meta.comp_size >= U32_SENTINEL as u64 {
                extra.write_u64::<LittleEndian>(meta.comp_size)?;
            }
            if meta.header_offset >= U32_SENTINEL as u64 {
                extra.write_u64::<LittleEndian>(meta.header_offset)?;
            }
            let extra_len: u16 = if extra.is_empty() {
                0
            } else {
                4 + extra.len() as u16
            };

            cd.write_u32::<LittleEndian>(CENTRAL_SIG)?;
            cd.write_u16::<LittleEndian>(VERSION_ZIP64)?; // version made by
            cd.write_u16::<LittleEndian>(VERSION_ZIP64)?; // version needed
            cd.write_u16::<LittleEndian>(0)?; // flags
            cd.write_u16::<LittleEndian>(meta.method)?;
            cd.write_u16::<LittleEndian>(0)?; // mod time
            cd.write_u16::<LittleEndian>(0)?; // mod date
            cd.write_u32::<LittleEndian>(meta.crc)?;
            cd.write_u32::<LittleEndian>(clamp32(meta.comp_size))?;
            cd.write_u32::<LittleEndian>(clamp32(meta.uncomp_size))?;
            cd.write_u16::<LittleEndian>(meta.path.len() as u16)?;
            cd.write_u16::<LittleEndian>(extra_len)?;
            cd.write_u16::<LittleEndian>(0)?; // comment length
            cd.write_u16::<LittleEndian>(0)?; // disk number start
            cd.write_u16::<LittleEndian>(0)?; // internal attributes
            cd.write_u32::<LittleEndian>(0)?; // external attributes
            cd.write_u32::<LittleEndian>(clamp32(meta.header_offset))?;
            cd.extend_from_slice(meta.path.as_bytes());
            if extra_len > 0 {
                cd.write_u16::<LittleEndian>(ZIP64_EXTRA_ID)?;
                cd.write_u16::<LittleEndian>(extra.len() as u16)?;
                cd.extend_from_slice(&extra);
            }
        }
        self.file.write_all(&cd)?;

        let cd_size = cd.len() as u64;
        let n = self.entries.len() as u64;
        let zip64_eocd_offset = cd_offset + cd_size;

        let mut trailer = Vec::with_capacity(56 + ZIP64_LOCATOR_LEN + EOCD_LEN);
        // zip64 end of central directory record
        trailer.write_u32::<LittleEndian>(ZIP64_EOCD_SIG)?;
        trailer.write_u64::<LittleEndian>(44)?; // size of remaining record
        trailer.write_u16::<LittleEndian>(VERSION_ZIP64)?;
        trailer.write_u16::<LittleEndian>(VERSION_ZIP64)?;
        trailer.write_u32::<LittleEndian>(0)?; // this disk
        trailer.write_u32::<LittleEndian>(0)?; // disk with CD
        trailer.write_u64::<LittleEndian>(n)?;
        trailer.write_u64::<LittleEndian>(n)?;
        trailer.write_u64::<LittleEndian>(cd_size)?;
        trailer.write_u64::<LittleEndian>(cd_offset)?;
        // zip64 end of central directory locator
        trailer.write_u32::<LittleEndian>(ZIP64_LOCATOR_SIG)?;
        trailer.write_u32::<LittleEndian>(0)?; // disk with zip64 EOCD
        trailer.write_u64::<LittleEndian>(zip64_eocd_offset)?;
        trailer.write_u32::<LittleEndian>(1)?; // total disks
        // classic end of central directory
        trailer.write_u32::<LittleEndian>(EOCD_SIG)?;
        trailer.write_u16::<LittleEndian>(0)?; // this disk
        trailer.write_u16::<LittleEndian>(0)?; // disk with CD
        trailer.write_u16::<LittleEndian>(clamp16(n))?;
        trailer.write_u16::<LittleEndian>(clamp16(n))?;
        trailer.write_u32::<LittleEndian>(clamp32(cd_size))?;
        trailer.write_u32::<LittleEndian>(clamp32(cd_offset))?;
        trailer.write_u16::<LittleEndian>(0)?; // comment length
        self.file.write_all(&trailer)?;

        // appends may shrink the trailer region; drop any stale bytes
        let end = zip64_eocd_offset + trailer.len() as u64;
        self.file.set_len(end)?;
        self.file.flush()?;

        debug!(entries = self.entries.len(), bytes = end, "finalized zip archive");
        Ok(())
    }
}

#[inline]
fn clamp32(value: u64) -> u32 {
    if value >= U32_SENTINEL as u64 {
        U32_SENTINEL
    } else {
        value as u32
    }
}

#[inline]
fn clamp16(value: u64) -> u16 {
    if value >= U16_SENTINEL as u64 {
        U16_SENTINEL
    } else {
        value as u16
    }
}

/// Locate the end-of-central-directory record by scanning backward from
/// the end of the file. Returns the absolute offset and the tail buffer
/// position of the record.
fn find_eocd(file: &mut File) -> Result<(u64, Vec<u8>, usize)> {
    let len = file.metadata()?.len();
    if len < EOCD_LEN as u64 {
        return Err(Error::corrupt("file too small to be a zip archive"));
    }

    // EOCD may be followed by up to 64 KiB of archive comment
    let tail_len = len.min(EOCD_LEN as u64 + u16::MAX as u64 + 128);
    let tail_start = len - tail_len;
    file.seek(SeekFrom::Start(tail_start))?;
    let mut tail = vec![0u8; tail_len as usize];
    file.read_exact(&mut tail)?;

    for pos in (0..=tail.len() - 4).rev() {
        if tail[pos..pos + 4] == EOCD_SIG.to_le_bytes() {
            return Ok((tail_start + pos as u64, tail, pos));
        }
    }

    Err(Error::corrupt("no end-of-central-directory record found"))
}

/// Parse the central directory, tolerating sentinel-size entries (they are
/// reported in [`ScanReport::corrupt`] instead of failing the scan).
pub(crate) fn scan_container(file: &mut File) -> Result<ScanReport> {
    let file_len = file.metadata()?.len();
    let (eocd_offset, tail, tail_pos) = find_eocd(file)?;

    let mut cursor = Cursor::new(&tail[tail_pos..]);
    cursor.set_position(4 + 2 + 2 + 2); // sig, disk numbers, entries this disk
    let mut n_total = cursor.read_u16::<LittleEndian>()? as u64;
    let mut cd_size = cursor.read_u32::<LittleEndian>()? as u64;
    let mut cd_offset = cursor.read_u32::<LittleEndian>()? as u64;

    // a zip64 locator sits immediately before the EOCD when present
    let locator_start = eocd_offset.checked_sub(ZIP64_LOCATOR_LEN as u64);
    let mut zip64 = false;

    if let Some(locator_start) = locator_start {
        file.seek(SeekFrom::Start(locator_start))?;
        let mut locator = [0u8; ZIP64_LOCATOR_LEN];
        if file.read_exact(&mut locator).is_ok() {
            let mut cursor = Cursor::new(&locator[..]);
            if cursor.read_u32::<LittleEndian>()? == ZIP64_LOCATOR_SIG {
                cursor.set_position(8);
                let zip64_eocd_offset = cursor.read_u64::<LittleEndian>()?;

                file.seek(SeekFrom::Start(zip64_eocd_offset))?;
                let mut record = [0u8; 56];
                file.read_exact(&mut record).map_err(|e| {
                    Error::corrupt(format!("truncated zip64 EOCD record: {e}"))
                })?;
                let mut cursor = Cursor::new(&record[..]);
                if cursor.read_u32::<LittleEndian>()? != ZIP64_EOCD_SIG {
                    return Err(Error::corrupt("bad zip64 EOCD record signature"));
                }
                cursor.set_position(32);
                n_total = cursor.read_u64::<LittleEndian>()?;
                cd_size = cursor.read_u64::<LittleEndian>()?;
                cd_offset = cursor.read_u64::<LittleEndian>()?;
                zip64 = true;
            }
        }
    }

    if !zip64
        && (n_total == U16_SENTINEL as u64
            || cd_size == U32_SENTINEL as u64
            || cd_offset == U32_SENTINEL as u64)
    {
        return Err(Error::corrupt(
            "central directory reports zip64 sizes but no zip64 record is present",
        ));
    }

    // metadata sizes bound allocations only after they are shown to fit
    // inside the container
    if cd_offset.checked_add(cd_size).map_or(true, |end| end > file_len) {
        return Err(Error::corrupt(format!(
            "central directory of {cd_size} bytes at offset {cd_offset} \
             extends past the end of a {file_len}-byte archive"
        )));
    }

    file.seek(SeekFrom::Start(cd_offset))?;
    let mut cd = vec![0u8; cd_size as usize];
    file.read_exact(&mut cd)
        .map_err(|e| Error::corrupt(format!("truncated central directory: {e}")))?;

    let mut cursor = Cursor::new(&cd[..]);
    let mut entries = Vec::with_capacity(n_total as usize);
    let mut corrupt = Vec::new();

    for _ in 0..n_total {
        if cursor.read_u32::<LittleEndian>()? != CENTRAL_SIG {
            return Err(Error::corrupt("bad central directory entry signature"));
        }
        cursor.set_position(cursor.position() + 2 + 2 + 2); // versions, flags
        let method = cursor.read_u16::<LittleEndian>()?;
        cursor.set_position(cursor.position() + 2 + 2); // time, date
        let crc = cursor.read_u32::<LittleEndian>()?;
        let mut comp_size = cursor.read_u32::<LittleEndian>()? as u64;
        let mut uncomp_size = cursor.read_u32::<LittleEndian>()? as u64;
        let name_len = cursor.read_u16::<LittleEndian>()? as usize;
        let extra_len = cursor.read_u16::<LittleEndian>()? as usize;
        let comment_len = cursor.read_u16::<LittleEndian>()? as usize;
        cursor.set_position(cursor.position() + 2 + 2 + 4); // disk, attributes
        let mut header_offset = cursor.read_u32::<LittleEndian>()? as u64;

        let mut name = vec![0u8; name_len];
        cursor.read_exact(&mut name)?;
        let path = String::from_utf8(name)?;

        let mut extra = vec![0u8; extra_len];
        cursor.read_exact(&mut extra)?;
        cursor.set_position(cursor.position() + comment_len as u64);

        let mut zip64_fields = false;
        let mut extra_cursor = Cursor::new(&extra[..]);
        while (extra_cursor.position() as usize) + 4 <= extra.len() {
            let id = extra_cursor.read_u16::<LittleEndian>()?;
            let size = extra_cursor.read_u16::<LittleEndian>()? as u64;
            let field_end = extra_cursor.position() + size;

            if id == ZIP64_EXTRA_ID {
                zip64_fields = true;
                if uncomp_size == U32_SENTINEL as u64 {
                    uncomp_size = extra_cursor.read_u64::<LittleEndian>()?;
                }
                if comp_size == U32_SENTINEL as u64 {
                    comp_size = extra_cursor.read_u64::<LittleEndian>()?;
                }
                if header_offset == U32_SENTINEL as u64 {
                    header_offset = extra_cursor.read_u64::<LittleEndian>()?;
                }
            }

            extra_cursor.set_position(field_end);
        }

        // The sentinel surviving past extra-field resolution is how a
        // truncated write manifests in the catalog.
        if comp_size == U32_SENTINEL as u64 || uncomp_size == U32_SENTINEL as u64 {
            warn!(path = %path, zip64_fields, "entry reports corrupt-size sentinel");
            corrupt.push(path);
            continue;
        }

        if header_offset
            .checked_add(LOCAL_HEADER_LEN)
            .and_then(|pos| pos.checked_add(comp_size))
            .map_or(true, |end| end > file_len)
        {
            return Err(Error::corrupt(format!(
                "entry {path:?} reports {comp_size} bytes at offset \
                 {header_offset}, past the end of a {file_len}-byte archive"
            )));
        }

        entries.push(EntryMeta {
            path,
            header_offset,
            method,
            crc,
            comp_size,
            uncomp_size,
        });
    }

    Ok(ScanReport {
        entries,
        corrupt,
        cd_offset,
        zip64,
    })
}

/// Is the archive at `path` using zip64 extensions?
///
/// External repair/upgrade tooling uses this predicate to decide whether a
/// container still needs conversion before it can be appended to.
pub fn is_zip64(path: &Path) -> Result<bool> {
    let mut file = File::open(path)?;
    let (eocd_offset, _, _) = find_eocd(&mut file)?;

    let locator_start = match eocd_offset.checked_sub(ZIP64_LOCATOR_LEN as u64) {
        Some(start) => start,
        None => return Ok(false),
    };

    file.seek(SeekFrom::Start(locator_start))?;
    let mut sig = [0u8; 4];
    file.read_exact(&mut sig)?;
    Ok(sig == ZIP64_LOCATOR_SIG.to_le_bytes())
}

/// Tolerant scan used by the repair layer: returns (valid paths, corrupt
/// paths) without refusing sentinel entries.
pub(crate) fn scan_paths(path: &Path) -> Result<(Vec<String>, Vec<String>)> {
    let mut file = File::open(path)?;
    let report = scan_container(&mut file)?;
    let valid = report.entries.into_iter().map(|m| m.path).collect();
    Ok((valid, report.corrupt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn empty_excluded() -> HashSet<String> {
        HashSet::new()
    }

    #[test]
    fn test_write_read_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dump.zip");

        let mut backend = ZipBackend::open(&path, OpenMode::Write, &empty_excluded()).unwrap();
        let big = b"compressible compressible ".repeat(500);
        backend
            .write("frames/0/position.f32.ind", &big, CompressMode::Medium)
            .unwrap();
        backend
            .write("test.txt", b"hello getar", CompressMode::None)
            .unwrap();
        assert_eq!(backend.read("test.txt").unwrap().unwrap(), b"hello getar");
        backend.close().unwrap();

        let mut backend = ZipBackend::open(&path, OpenMode::Read, &empty_excluded()).unwrap();
        assert_eq!(
            backend.read("frames/0/position.f32.ind").unwrap().unwrap(),
            big
        );
        assert_eq!(backend.read("test.txt").unwrap().unwrap(), b"hello getar");
        assert!(backend.read("missing").unwrap().is_none());
    }

    #[test]
    fn test_written_archives_are_zip64() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dump.zip");

        let mut backend = ZipBackend::open(&path, OpenMode::Write, &empty_excluded()).unwrap();
        backend.write("a.txt", b"abc", CompressMode::None).unwrap();
        backend.close().unwrap();

        assert!(is_zip64(&path).unwrap());
    }

    #[test]
    fn test_append_preserves_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dump.zip");

        {
            let mut backend =
                ZipBackend::open(&path, OpenMode::Write, &empty_excluded()).unwrap();
            backend.write("a.txt", b"first", CompressMode::None).unwrap();
            backend.close().unwrap();
        }
        {
            let mut backend =
                ZipBackend::open(&path, OpenMode::Append, &empty_excluded()).unwrap();
            backend.write("b.txt", b"second", CompressMode::Fast).unwrap();
            backend.close().unwrap();
        }

        let mut backend = ZipBackend::open(&path, OpenMode::Read, &empty_excluded()).unwrap();
        assert_eq!(backend.entry_paths(), ["a.txt", "b.txt"]);
        assert_eq!(backend.read("a.txt").unwrap().unwrap(), b"first");
        assert_eq!(backend.read("b.txt").unwrap().unwrap(), b"second");
    }

    #[test]
    fn test_overwrite_shadows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dump.zip");

        let mut backend = ZipBackend::open(&path, OpenMode::Write, &empty_excluded()).unwrap();
        backend.write("x.txt", b"old", CompressMode::None).unwrap();
        backend.write("x.txt", b"new", CompressMode::None).unwrap();
        backend.close().unwrap();

        let mut backend = ZipBackend::open(&path, OpenMode::Read, &empty_excluded()).unwrap();
        assert_eq!(backend.read("x.txt").unwrap().unwrap(), b"new");
    }

    #[test]
    fn test_oversized_entry_size_is_corrupt() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dump.zip");

        let entry = "frames/0/position.f32.ind";
        {
            let mut backend =
                ZipBackend::open(&path, OpenMode::Write, &empty_excluded()).unwrap();
            backend.write(entry, b"\0\0\0\0", CompressMode::None).unwrap();
            backend.close().unwrap();
        }

        // patch the central-directory compressed size to a huge
        // non-sentinel value; sizes sit 26 bytes before the entry name
        let mut bytes = std::fs::read(&path).unwrap();
        let needle = entry.as_bytes();
        let name_pos = (0..bytes.len() - needle.len())
            .rev()
            .find(|&i| &bytes[i..i + needle.len()] == needle)
            .unwrap();
        bytes[name_pos - 26..name_pos - 22].copy_from_slice(&0xFFFF_FFFEu32.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(
            ZipBackend::open(&path, OpenMode::Read, &empty_excluded()),
            Err(Error::CorruptContainer(_))
        ));
    }

    #[test]
    fn test_oversized_path_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dump.zip");

        let mut backend = ZipBackend::open(&path, OpenMode::Write, &empty_excluded()).unwrap();
        let long = "g/".repeat(40_000);
        assert!(backend.write(&long, b"x", CompressMode::None).is_err());
    }

    #[test]
    fn test_not_a_zip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dump.zip");
        std::fs::write(&path, b"definitely not a zip archive, not at all").unwrap();

        assert!(matches!(
            ZipBackend::open(&path, OpenMode::Read, &empty_excluded()),
            Err(Error::CorruptContainer(_))
        ));
    }
}
