//! Directory backend: each record path maps directly to a file under a
//! root directory. No compression is applied by this backend itself; the
//! payload bytes on disk are exactly the record bytes.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::backend::{ContainerBackend, OpenMode};
use crate::compress::CompressMode;
use crate::util::Result;

pub(crate) struct DirBackend {
    root: PathBuf,
    paths: Vec<String>,
}

impl DirBackend {
    pub fn open(root: &Path, mode: OpenMode) -> Result<Self> {
        let root = root.to_owned();

        match mode {
            OpenMode::Read => {
                if !root.is_dir() {
                    return Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("no archive directory at {}", root.display()),
                    )
                    .into());
                }
            }
            OpenMode::Write | OpenMode::Append => fs::create_dir_all(&root)?,
        }

        let mut paths = Vec::new();
        if !matches!(mode, OpenMode::Write) {
            scan(&root, &root, &mut paths)?;
            debug!(root = %root.display(), entries = paths.len(), "scanned directory archive");
        }

        Ok(Self { root, paths })
    }

    fn file_path(&self, path: &str) -> PathBuf {
        let mut result = self.root.clone();
        result.extend(path.split('/'));
        result
    }
}

impl ContainerBackend for DirBackend {
    fn write(&mut self, path: &str, payload: &[u8], _mode: CompressMode) -> Result<()> {
        let target = self.file_path(path);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(target, payload)?;
        self.paths.push(path.to_owned());
        Ok(())
    }

    fn read(&mut self, path: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.file_path(path)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn entry_paths(&self) -> Vec<String> {
        self.paths.clone()
    }

    fn close(&mut self) -> Result<()> {
        // nothing to finalize for a directory tree
        Ok(())
    }
}

/// Recursively collect regular files under `dir` as slash-separated paths
/// relative to `root`.
fn scan(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            scan(root, &path, out)?;
        } else if file_type.is_file() {
            let rel = match path.strip_prefix(root) {
                Ok(rel) => rel,
                // read_dir only yields children of root
                Err(_) => continue,
            };
            let segments: Vec<String> = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            out.push(segments.join("/"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_then_read() {
        let dir = tempdir().unwrap();
        let mut backend = DirBackend::open(dir.path(), OpenMode::Write).unwrap();

        backend
            .write("frames/0/position.f32.ind", b"abc", CompressMode::Fast)
            .unwrap();

        assert_eq!(
            backend.read("frames/0/position.f32.ind").unwrap().unwrap(),
            b"abc"
        );
        assert!(backend.read("frames/1/position.f32.ind").unwrap().is_none());
    }

    #[test]
    fn test_rescan_on_open() {
        let dir = tempdir().unwrap();
        {
            let mut backend = DirBackend::open(dir.path(), OpenMode::Write).unwrap();
            backend.write("a/b.txt", b"x", CompressMode::None).unwrap();
            backend.write("c.txt", b"y", CompressMode::None).unwrap();
            backend.close().unwrap();
        }

        let backend = DirBackend::open(dir.path(), OpenMode::Read).unwrap();
        let mut paths = backend.entry_paths();
        paths.sort();
        assert_eq!(paths, ["a/b.txt", "c.txt"]);
    }

    #[test]
    fn test_missing_dir_read() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(DirBackend::open(&missing, OpenMode::Read).is_err());
    }
}
