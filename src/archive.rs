//! The archive facade: one uniform read/write/query API over every
//! container backend.
//!
//! An [`Archive`] is bound to exactly one backend container and one open
//! mode. It keeps a catalog mapping each frame-independent record type to
//! the sorted set of frame indices known to exist; the catalog is rebuilt
//! from container metadata on open and updated incrementally on every
//! write. `close` finalizes the container trailer/commit and is the only
//! transition into the terminal closed state.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::mem;
use std::path::Path;

use tracing::{debug, warn};

use crate::backend::{open_backend, ContainerBackend, OpenMode};
use crate::compress::CompressMode;
use crate::query::RecordFilter;
use crate::record::{Format, Record};
use crate::util::{Error, FrameIndex, Result};

/// An element type that can be stored in Individual or Uniform records.
///
/// Payloads are little-endian on disk regardless of the host.
pub trait Element: Copy {
    /// The record format this element maps to.
    const FORMAT: Format;
    /// Element size in bytes.
    const SIZE: usize;

    fn encode_le(self, out: &mut Vec<u8>);
    fn decode_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_element {
    ($($t:ty => $fmt:expr),* $(,)?) => {
        $(impl Element for $t {
            const FORMAT: Format = $fmt;
            const SIZE: usize = mem::size_of::<$t>();

            #[inline]
            fn encode_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&<$t>::to_le_bytes(self));
            }

            #[inline]
            fn decode_le(bytes: &[u8]) -> Self {
                let mut buf = [0u8; mem::size_of::<$t>()];
                buf.copy_from_slice(bytes);
                <$t>::from_le_bytes(buf)
            }
        })*
    };
}

impl_element! {
    f32 => Format::Float32,
    f64 => Format::Float64,
    i32 => Format::Int32,
    i64 => Format::Int64,
    u8 => Format::UInt8,
    u32 => Format::UInt32,
    u64 => Format::UInt64,
}

/// Accessor for a trajectory archive.
pub struct Archive {
    backend: Option<Box<dyn ContainerBackend>>,
    mode: OpenMode,
    /// Record type (nullified index) -> sorted frame indices
    catalog: BTreeMap<Record, BTreeSet<FrameIndex>>,
    /// Nesting depth of bulk-write scopes
    bulk_depth: usize,
    /// Records written inside a bulk scope, merged at scope end
    bulk_pending: Vec<Record>,
}

impl Archive {
    /// Open the archive at `path` in the given mode. The backend is chosen
    /// from the path suffix (see [`crate::backend`]).
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        Self::open_excluding(path, mode, &[])
    }

    /// Open an archive while excluding the named entries from the catalog.
    ///
    /// This is the reopen half of the repair protocol: entries an external
    /// repair pass reported as unrecoverable are dropped instead of
    /// failing the open.
    pub fn open_excluding(
        path: impl AsRef<Path>,
        mode: OpenMode,
        excluded: &[String],
    ) -> Result<Self> {
        let path = path.as_ref();
        let excluded: HashSet<String> = excluded.iter().cloned().collect();
        let backend = open_backend(path, mode, &excluded)?;
        let entries = backend.entry_paths();

        let mut archive = Self {
            backend: Some(backend),
            mode,
            catalog: BTreeMap::new(),
            bulk_depth: 0,
            bulk_pending: Vec::new(),
        };

        for entry in entries {
            if excluded.contains(&entry) {
                continue;
            }
            match Record::parse(&entry) {
                Ok(record) => archive.insert_record(record),
                // foreign files (directory backends especially) may carry
                // names outside the grammar; they stay readable by path
                // but never enter the catalog
                Err(e) => warn!("skipping uncatalogable entry: {e}"),
            }
        }

        debug!(
            path = %path.display(),
            ?mode,
            types = archive.catalog.len(),
            "opened archive"
        );

        Ok(archive)
    }

    /// The mode this archive was opened with.
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Whether `close` has already run.
    pub fn is_closed(&self) -> bool {
        self.backend.is_none()
    }

    fn backend_mut(&mut self) -> Result<&mut dyn ContainerBackend> {
        match self.backend.as_deref_mut() {
            Some(backend) => Ok(backend),
            None => Err(Error::Closed),
        }
    }

    fn insert_record(&mut self, record: Record) {
        let index = FrameIndex::new(record.index());
        self.catalog
            .entry(record.with_nullified_index())
            .or_default()
            .insert(index);
    }

    /// Write a bytestring to the given record path.
    pub fn write_bytes(
        &mut self,
        path: &str,
        payload: &[u8],
        mode: CompressMode,
    ) -> Result<()> {
        let record = Record::parse(path)?;
        let full = record.build_path();
        self.write_parsed(record, &full, payload, mode)
    }

    /// Write a bytestring addressed by an already-built record.
    pub fn write_record(
        &mut self,
        record: &Record,
        payload: &[u8],
        mode: CompressMode,
    ) -> Result<()> {
        self.write_parsed(record.clone(), &record.build_path(), payload, mode)
    }

    fn write_parsed(
        &mut self,
        record: Record,
        path: &str,
        payload: &[u8],
        mode: CompressMode,
    ) -> Result<()> {
        if self.backend.is_none() {
            return Err(Error::Closed);
        }
        if !self.mode.writable() {
            return Err(Error::ReadOnly);
        }

        self.backend_mut()?.write(path, payload, mode)?;

        if self.bulk_depth > 0 {
            self.bulk_pending.push(record);
        } else {
            self.insert_record(record);
        }

        Ok(())
    }

    /// Read the bytestring at the given record path. Fails with
    /// [`Error::NotFound`] when the record is absent.
    pub fn read_bytes(&mut self, path: &str) -> Result<Vec<u8>> {
        let record = Record::parse(path)?;
        let path = record.build_path();
        self.backend_mut()?
            .read(&path)?
            .ok_or(Error::NotFound(path))
    }

    /// Non-failing lookup: the payload for `record` at `frame`, or `None`
    /// when that frame was never written.
    pub fn get_record(&mut self, record: &Record, frame: &str) -> Result<Option<Vec<u8>>> {
        let path = record.with_index(frame).build_path();
        self.backend_mut()?.read(&path)
    }

    /// All distinct record types currently known, with nullified indices,
    /// in catalog order.
    pub fn get_record_types(&self) -> Vec<Record> {
        self.catalog.keys().cloned().collect()
    }

    /// The frame indices present for the given record type, ascending by
    /// the archive's natural index ordering. The target record need not
    /// have a null index.
    pub fn query_frames(&self, target: &Record) -> Vec<String> {
        match self.catalog.get(&target.with_nullified_index()) {
            Some(indices) => indices.iter().map(|i| i.as_str().to_owned()).collect(),
            None => Vec::new(),
        }
    }

    /// Enter a bulk-write scope: catalog index maintenance is deferred to
    /// the matching [`Archive::end_bulk_writes`], amortizing bookkeeping
    /// over many writes. Each individual write still reaches the backend.
    pub fn begin_bulk_writes(&mut self) -> Result<()> {
        self.backend_mut()?.begin_bulk_writes()?;
        self.bulk_depth += 1;
        Ok(())
    }

    /// Leave a bulk-write scope, merging deferred catalog updates.
    pub fn end_bulk_writes(&mut self) -> Result<()> {
        if self.bulk_depth == 0 {
            return Err(Error::other("end_bulk_writes without a matching begin"));
        }

        self.bulk_depth -= 1;
        if self.bulk_depth == 0 {
            for record in mem::take(&mut self.bulk_pending) {
                self.insert_record(record);
            }
        }

        self.backend_mut()?.end_bulk_writes()
    }

    /// Run `f` inside a bulk-write scope, closing the scope on every exit
    /// path.
    pub fn bulk_writes<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.begin_bulk_writes()?;
        let result = f(self);
        let ended = self.end_bulk_writes();
        let value = result?;
        ended?;
        Ok(value)
    }

    /// Write an Individual or Uniform binary property, converting to
    /// little-endian if necessary.
    pub fn write_individual<T: Element>(
        &mut self,
        path: &str,
        values: &[T],
        mode: CompressMode,
    ) -> Result<()> {
        let mut payload = Vec::with_capacity(values.len() * T::SIZE);
        for value in values {
            value.encode_le(&mut payload);
        }
        self.write_bytes(path, &payload, mode)
    }

    /// Write a single shared (Uniform) value. Uniform records are small,
    /// so they are stored uncompressed.
    pub fn write_uniform<T: Element>(&mut self, path: &str, value: T) -> Result<()> {
        let mut payload = Vec::with_capacity(T::SIZE);
        value.encode_le(&mut payload);
        self.write_bytes(path, &payload, CompressMode::None)
    }

    /// Read an Individual binary property as a typed vector.
    pub fn read_individual<T: Element>(&mut self, path: &str) -> Result<Vec<T>> {
        let bytes = self.read_bytes(path)?;
        decode_slice(path, &bytes)
    }

    /// Read a single Uniform value; `None` when the record is absent.
    pub fn read_uniform<T: Element>(&mut self, path: &str) -> Result<Option<T>> {
        let record = Record::parse(path)?;
        let path = record.build_path();
        let bytes = match self.backend_mut()?.read(&path)? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };

        if bytes.len() != T::SIZE {
            return Err(Error::corrupt(format!(
                "uniform record {path:?} holds {} bytes, expected {}; \
                 use read_uniform_slice for fixed-size arrays",
                bytes.len(),
                T::SIZE
            )));
        }

        Ok(Some(T::decode_le(&bytes)))
    }

    /// Read a Uniform fixed-size array with an explicit element-count
    /// hint. The hint is per read; decode shape is never ambient state.
    pub fn read_uniform_slice<T: Element>(&mut self, path: &str, count: usize) -> Result<Vec<T>> {
        let bytes = self.read_bytes(path)?;

        if bytes.len() != count * T::SIZE {
            return Err(Error::corrupt(format!(
                "uniform record {path:?} holds {} bytes, expected {count} x {}",
                bytes.len(),
                T::SIZE
            )));
        }

        decode_slice(path, &bytes)
    }

    /// Filtered query over the records table (sqlite backend only).
    pub fn query_records(&mut self, filter: &RecordFilter) -> Result<Vec<(Record, Vec<u8>)>> {
        self.backend_mut()?.query_records(filter)
    }

    /// Finalize the container and release the underlying resource.
    /// Idempotent; any operation after this fails with [`Error::Closed`].
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut backend) = self.backend.take() {
            backend.close()?;
            debug!("closed archive");
        }
        Ok(())
    }
}

impl Drop for Archive {
    fn drop(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            if let Err(e) = backend.close() {
                warn!("error finalizing archive on drop: {e}");
            }
        }
    }
}

fn decode_slice<T: Element>(path: &str, bytes: &[u8]) -> Result<Vec<T>> {
    if bytes.len() % T::SIZE != 0 {
        return Err(Error::corrupt(format!(
            "record {path:?} holds {} bytes, not a multiple of element size {}",
            bytes.len(),
            T::SIZE
        )));
    }

    Ok(bytes.chunks_exact(T::SIZE).map(T::decode_le).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_closed_archive_rejects_everything() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dump.zip");

        let mut archive = Archive::open(&path, OpenMode::Write).unwrap();
        archive
            .write_bytes("test.txt", b"x", CompressMode::None)
            .unwrap();
        archive.close().unwrap();
        // idempotent
        archive.close().unwrap();

        assert!(matches!(
            archive.write_bytes("test.txt", b"y", CompressMode::None),
            Err(Error::Closed)
        ));
        assert!(matches!(archive.read_bytes("test.txt"), Err(Error::Closed)));
        let rec = Record::parse("test.txt").unwrap();
        assert!(matches!(archive.get_record(&rec, ""), Err(Error::Closed)));
    }

    #[test]
    fn test_read_mode_rejects_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dump.zip");

        {
            let mut archive = Archive::open(&path, OpenMode::Write).unwrap();
            archive
                .write_bytes("test.txt", b"x", CompressMode::None)
                .unwrap();
            archive.close().unwrap();
        }

        let mut archive = Archive::open(&path, OpenMode::Read).unwrap();
        assert!(matches!(
            archive.write_bytes("other.txt", b"y", CompressMode::None),
            Err(Error::ReadOnly)
        ));
        // reads are fine in read mode
        assert_eq!(archive.read_bytes("test.txt").unwrap(), b"x");
    }

    #[test]
    fn test_catalog_tracks_types_and_frames() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dump.zip");

        let mut archive = Archive::open(&path, OpenMode::Write).unwrap();
        for frame in ["0", "2", "10"] {
            let path = format!("frames/{frame}/position.f32.ind");
            archive
                .write_individual(&path, &[1.0f32, 2.0], CompressMode::Fast)
                .unwrap();
        }
        archive
            .write_individual("frames/0/mass.f64.uni", &[5.0f64], CompressMode::None)
            .unwrap();

        assert_eq!(archive.get_record_types().len(), 2);

        let target = Record::parse("frames/0/position.f32.ind").unwrap();
        assert_eq!(archive.query_frames(&target), ["0", "2", "10"]);
    }

    #[test]
    fn test_type_count_stable_on_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dump.zip");

        let mut archive = Archive::open(&path, OpenMode::Write).unwrap();
        archive
            .write_bytes("frames/0/position.f32.ind", b"\0\0\0\0", CompressMode::None)
            .unwrap();
        archive
            .write_bytes("frames/0/position.f32.ind", b"\x01\0\0\0", CompressMode::None)
            .unwrap();

        assert_eq!(archive.get_record_types().len(), 1);
        assert_eq!(
            archive.read_bytes("frames/0/position.f32.ind").unwrap(),
            b"\x01\0\0\0"
        );
    }

    #[test]
    fn test_typed_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dump.zip");

        let mut archive = Archive::open(&path, OpenMode::Write).unwrap();
        let values = [1.0f32, 2.0, 3.0];
        archive
            .write_individual("frames/0/position.f32.ind", &values, CompressMode::Fast)
            .unwrap();
        archive.write_uniform("frames/0/count.u32.uni", 7u32).unwrap();

        assert_eq!(
            archive
                .read_individual::<f32>("frames/0/position.f32.ind")
                .unwrap(),
            values
        );
        assert_eq!(
            archive.read_uniform::<u32>("frames/0/count.u32.uni").unwrap(),
            Some(7)
        );
        assert_eq!(
            archive.read_uniform::<u32>("frames/1/count.u32.uni").unwrap(),
            None
        );
    }

    #[test]
    fn test_uniform_slice_hint() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dump.zip");

        let mut archive = Archive::open(&path, OpenMode::Write).unwrap();
        archive
            .write_individual("frames/0/box.f64.uni", &[1.0f64, 2.0, 3.0], CompressMode::None)
            .unwrap();

        assert_eq!(
            archive
                .read_uniform_slice::<f64>("frames/0/box.f64.uni", 3)
                .unwrap(),
            [1.0, 2.0, 3.0]
        );
        // wrong hint is an error, not a silent reshape
        assert!(archive
            .read_uniform_slice::<f64>("frames/0/box.f64.uni", 4)
            .is_err());
        // scalar read refuses the array
        assert!(archive.read_uniform::<f64>("frames/0/box.f64.uni").is_err());
    }

    #[test]
    fn test_bulk_writes_defer_catalog() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dump.zip");

        let mut archive = Archive::open(&path, OpenMode::Write).unwrap();
        archive
            .bulk_writes(|archive| {
                for frame in 0..50 {
                    let path = format!("frames/{frame}/position.f32.ind");
                    archive.write_bytes(&path, b"\0\0\0\0", CompressMode::Fast)?;
                }
                // catalog updates are pending inside the scope
                assert!(archive.get_record_types().is_empty());
                Ok(())
            })
            .unwrap();

        assert_eq!(archive.get_record_types().len(), 1);
        let target = Record::parse("frames/0/position.f32.ind").unwrap();
        assert_eq!(archive.query_frames(&target).len(), 50);
    }

    #[test]
    fn test_missing_read_archive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.zip");
        assert!(Archive::open(&path, OpenMode::Read).is_err());
    }

    #[test]
    fn test_not_found() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dump.zip");

        let mut archive = Archive::open(&path, OpenMode::Write).unwrap();
        assert!(matches!(
            archive.read_bytes("frames/0/position.f32.ind"),
            Err(Error::NotFound(_))
        ));
    }
}
