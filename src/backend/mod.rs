//! Container backends.
//!
//! Each backend maps the archive contract onto a different physical
//! encoding: a zip file with a central directory, a tape-archive header
//! chain, a sqlite database, or a plain directory tree. The backend is
//! selected once at open time from the path suffix; the facade never
//! inspects the container type again after that.

mod dir;
mod sqlite;
pub(crate) mod tar;
pub(crate) mod zip;

use std::collections::HashSet;
use std::path::Path;

use crate::compress::CompressMode;
use crate::query::RecordFilter;
use crate::record::Record;
use crate::util::{Error, Result};

pub(crate) use dir::DirBackend;
pub(crate) use sqlite::SqliteBackend;
pub(crate) use tar::TarBackend;
pub(crate) use zip::ZipBackend;

/// How an archive is opened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpenMode {
    /// Existing archive, catalog rebuilt from container metadata, no writes
    Read,
    /// Fresh archive, replacing any existing container
    Write,
    /// Existing (or new) archive, keeping existing entries
    Append,
}

impl OpenMode {
    /// Whether write operations are permitted in this mode.
    #[inline]
    pub fn writable(&self) -> bool {
        !matches!(self, OpenMode::Read)
    }
}

/// The contract every physical container implements.
///
/// Payload bytes passed to `write` are raw; each backend applies and
/// records its own compression so `read` can always return the original
/// bytes. Mode policing (read-only, closed) happens in the facade.
pub(crate) trait ContainerBackend {
    /// Store a payload at a path, replacing any previous entry with the
    /// same full path.
    fn write(&mut self, path: &str, payload: &[u8], mode: CompressMode) -> Result<()>;

    /// Fetch and decompress the payload at a path; `None` when absent.
    fn read(&mut self, path: &str) -> Result<Option<Vec<u8>>>;

    /// All entry paths currently known to the container, in storage order.
    /// A path shadowed by a later duplicate appears once per occurrence.
    fn entry_paths(&self) -> Vec<String>;

    /// Enter a bulk-write scope. Backends may defer container bookkeeping.
    fn begin_bulk_writes(&mut self) -> Result<()> {
        Ok(())
    }

    /// Leave a bulk-write scope, flushing deferred bookkeeping.
    fn end_bulk_writes(&mut self) -> Result<()> {
        Ok(())
    }

    /// Finalize the container trailer/commit and release the resource.
    fn close(&mut self) -> Result<()>;

    /// Relational query surface; only the sqlite backend implements it.
    fn query_records(&mut self, _filter: &RecordFilter) -> Result<Vec<(Record, Vec<u8>)>> {
        Err(Error::other(
            "relational record queries require a sqlite archive",
        ))
    }
}

/// Pick and open a backend from the path suffix.
///
/// Directory archives are detected by a trailing separator or by being an
/// existing directory; `.zip`/`.gtar` open the zip backend, `.tar` the
/// tape-archive backend, and `.sqlite` the relational backend. Anything
/// else is an unsupported backend.
pub(crate) fn open_backend(
    path: &Path,
    mode: OpenMode,
    excluded: &HashSet<String>,
) -> Result<Box<dyn ContainerBackend>> {
    let display = path.to_string_lossy();

    if display.ends_with('/') || display.ends_with(std::path::MAIN_SEPARATOR) || path.is_dir() {
        return Ok(Box::new(DirBackend::open(path, mode)?));
    }

    match path.extension().and_then(|e| e.to_str()) {
        Some("zip") | Some("gtar") => Ok(Box::new(ZipBackend::open(path, mode, excluded)?)),
        Some("tar") => Ok(Box::new(TarBackend::open(path, mode)?)),
        Some("sqlite") => Ok(Box::new(SqliteBackend::open(path, mode)?)),
        _ => Err(Error::UnsupportedBackend(path.to_owned())),
    }
}
