//! Relational backend: a sqlite database with a `records` table mapping a
//! structured record key to an LZ4-compressed payload.
//!
//! Every write runs inside its own transaction, so a crash mid-write never
//! leaves a partially-applied record visible on reopen. The structured key
//! columns exist so the query surface ([`crate::query`]) can filter records
//! in SQL instead of enumerating them client-side.

use std::fs;
use std::io;
use std::path::Path;

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::debug;

use crate::backend::{ContainerBackend, OpenMode};
use crate::compress::{lz4_compress, lz4_decompress, CompressMode};
use crate::query::RecordFilter;
use crate::record::Record;
use crate::util::{Error, Result};

/// Codec tags stored in the `compress_level` column.
const LEVEL_NONE: i64 = 0;
const LEVEL_LZ4: i64 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS records (
    path TEXT PRIMARY KEY ON CONFLICT REPLACE NOT NULL,
    record_group TEXT NOT NULL,
    name TEXT NOT NULL,
    frame TEXT NOT NULL,
    format TEXT NOT NULL,
    resolution TEXT NOT NULL,
    uncompressed_size INTEGER NOT NULL,
    compress_level INTEGER NOT NULL,
    contents BLOB
);
";

pub(crate) struct SqliteBackend {
    conn: Connection,
    paths: Vec<String>,
}

impl SqliteBackend {
    pub fn open(path: &Path, mode: OpenMode) -> Result<Self> {
        if matches!(mode, OpenMode::Write) {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        let flags = match mode {
            OpenMode::Read => OpenFlags::SQLITE_OPEN_READ_ONLY,
            OpenMode::Write | OpenMode::Append => {
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
            }
        };

        let conn = Connection::open_with_flags(path, flags)?;

        if mode.writable() {
            conn.execute_batch(SCHEMA)?;
        }

        let paths = {
            let mut stmt = conn
                .prepare("SELECT path FROM records")
                .map_err(|e| Error::corrupt(format!("no records table: {e}")))?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<rusqlite::Result<Vec<String>>>()?
        };

        debug!(path = %path.display(), entries = paths.len(), "opened sqlite archive");

        Ok(Self { conn, paths })
    }
}

impl ContainerBackend for SqliteBackend {
    fn write(&mut self, path: &str, payload: &[u8], mode: CompressMode) -> Result<()> {
        let record = Record::parse(path)?;

        let (level, stored) = match mode {
            CompressMode::None => (LEVEL_NONE, payload.to_vec()),
            // lz4_flex exposes a single (fast) level; Medium/Slow share it
            _ => (LEVEL_LZ4, lz4_compress(payload)),
        };

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO records (path, record_group, name, frame, format, \
             resolution, uncompressed_size, compress_level, contents) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                path,
                record.group(),
                record.name(),
                record.index(),
                record.format().suffix(),
                record.resolution().suffix().unwrap_or("text"),
                payload.len() as i64,
                level,
                stored,
            ],
        )?;
        tx.commit()?;

        self.paths.push(path.to_owned());
        Ok(())
    }

    fn read(&mut self, path: &str) -> Result<Option<Vec<u8>>> {
        let row: Option<(i64, i64, Vec<u8>)> = self
            .conn
            .query_row(
                "SELECT uncompressed_size, compress_level, contents \
                 FROM records WHERE path = ?1",
                params![path],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let (size, level, stored) = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let payload = match level {
            LEVEL_NONE => stored,
            LEVEL_LZ4 => lz4_decompress(&stored)?,
            other => {
                return Err(Error::corrupt(format!(
                    "record {path:?} uses unknown compression tag {other}"
                )))
            }
        };

        if payload.len() as i64 != size {
            return Err(Error::corrupt(format!(
                "record {path:?} decompressed to {} bytes, expected {size}",
                payload.len()
            )));
        }

        Ok(Some(payload))
    }

    fn entry_paths(&self) -> Vec<String> {
        self.paths.clone()
    }

    fn close(&mut self) -> Result<()> {
        // every write committed its own transaction; the connection is
        // released when the backend drops
        Ok(())
    }

    fn query_records(&mut self, filter: &RecordFilter) -> Result<Vec<(Record, Vec<u8>)>> {
        let (clause, params) = filter.to_sql();
        let sql = format!(
            "SELECT path, uncompressed_size, compress_level, contents \
             FROM records{clause} ORDER BY path"
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, Vec<u8>>(3)?,
            ))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (path, size, level, stored) = row?;
            let record = Record::parse(&path)?;
            let payload = match level {
                LEVEL_NONE => stored,
                LEVEL_LZ4 => lz4_decompress(&stored)?,
                other => {
                    return Err(Error::corrupt(format!(
                        "record {path:?} uses unknown compression tag {other}"
                    )))
                }
            };
            if payload.len() as i64 != size {
                return Err(Error::corrupt(format!(
                    "record {path:?} decompressed to {} bytes, expected {size}",
                    payload.len()
                )));
            }
            results.push((record, payload));
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Format, Resolution};
    use tempfile::tempdir;

    #[test]
    fn test_write_read_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dump.sqlite");

        let mut backend = SqliteBackend::open(&path, OpenMode::Write).unwrap();
        let big = b"0123456789".repeat(400);
        backend
            .write("frames/0/position.f32.ind", &big, CompressMode::Fast)
            .unwrap();
        backend
            .write("test.txt", b"plain", CompressMode::None)
            .unwrap();
        backend.close().unwrap();
        drop(backend);

        let mut backend = SqliteBackend::open(&path, OpenMode::Read).unwrap();
        assert_eq!(
            backend.read("frames/0/position.f32.ind").unwrap().unwrap(),
            big
        );
        assert_eq!(backend.read("test.txt").unwrap().unwrap(), b"plain");
        assert!(backend.read("missing.txt").unwrap().is_none());
    }

    #[test]
    fn test_replace_on_conflict() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dump.sqlite");

        let mut backend = SqliteBackend::open(&path, OpenMode::Write).unwrap();
        backend.write("x.txt", b"old", CompressMode::None).unwrap();
        backend.write("x.txt", b"new", CompressMode::None).unwrap();
        assert_eq!(backend.read("x.txt").unwrap().unwrap(), b"new");
    }

    #[test]
    fn test_query_by_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dump.sqlite");

        let mut backend = SqliteBackend::open(&path, OpenMode::Write).unwrap();
        backend
            .write("frames/0/position.f32.ind", b"\0\0\0\0", CompressMode::None)
            .unwrap();
        backend
            .write("frames/0/mass.f64.ind", b"\0\0\0\0\0\0\0\0", CompressMode::None)
            .unwrap();

        let filter = RecordFilter::new().with_format(Format::Float32);
        let results = backend.query_records(&filter).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.name(), "position");
        assert_eq!(results[0].0.resolution(), Resolution::Individual);
        assert_eq!(results[0].1, b"\0\0\0\0");
    }

    #[test]
    fn test_not_an_archive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dump.sqlite");
        // a fresh read-only connection to a non-archive database has no
        // records table
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE other (x INTEGER);").unwrap();
        drop(conn);

        assert!(SqliteBackend::open(&path, OpenMode::Read).is_err());
    }
}
