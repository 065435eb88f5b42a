//! Corruption scanning, repair hooks, and atomic publication.
//!
//! The recovery protocol has three phases, kept deliberately separate:
//!
//! 1. [`scan_corrupt_entries`] inspects a zip container tolerantly and
//!    reports entries whose central-directory metadata carries the
//!    overflow sentinel without a matching zip64 extra field.
//! 2. An external [`RepairTool`] rewrites the container (usually via an
//!    archiver that reconstructs the central directory) and reports the
//!    entries it could not save.
//! 3. [`crate::Archive::open_excluding`] reopens the repaired container
//!    with the unrecoverable entries dropped from the catalog.
//!
//! [`atomic_publish`] wraps destructive rewrites so readers only ever see
//! the old container or the finished new one.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::backend::zip;
use crate::util::{Error, Result};

pub use crate::backend::zip::is_zip64;

/// An external mechanism that rewrites a damaged container in place.
///
/// Implementations return the entry paths they had to discard; callers
/// pass that list to [`crate::Archive::open_excluding`].
pub trait RepairTool {
    fn repair(&self, path: &Path) -> Result<Vec<String>>;
}

/// Scan a zip container for entries whose recorded sizes overflowed the
/// classic 32-bit fields. Returns the damaged entry paths; an empty list
/// means the central directory is internally consistent.
pub fn scan_corrupt_entries(path: &Path) -> Result<Vec<String>> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("zip") | Some("gtar") => {}
        _ => return Err(Error::UnsupportedBackend(path.to_owned())),
    }

    let (_, corrupt) = zip::scan_paths(path)?;
    if !corrupt.is_empty() {
        debug!(
            path = %path.display(),
            damaged = corrupt.len(),
            "corruption scan found damaged entries"
        );
    }
    Ok(corrupt)
}

/// Run the full recovery pass: repair the container with `tool`, then
/// return the entries it reported unrecoverable, ready to feed to
/// [`crate::Archive::open_excluding`].
pub fn repair_with(tool: &dyn RepairTool, path: &Path) -> Result<Vec<String>> {
    let lost = tool.repair(path)?;
    debug!(
        path = %path.display(),
        lost = lost.len(),
        "repair tool finished"
    );
    Ok(lost)
}

/// Build the rewrite destination under `dest` by calling `f` with a
/// temporary sibling path, then atomically rename it over `dest`.
///
/// The temporary lives in the same directory so the final rename never
/// crosses a filesystem. On failure the temporary is removed and `dest`
/// is left untouched.
pub fn atomic_publish(dest: &Path, f: impl FnOnce(&Path) -> Result<()>) -> Result<()> {
    let temp = temp_sibling(dest)?;

    match f(&temp) {
        Ok(()) => {
            fs::rename(&temp, dest)?;
            Ok(())
        }
        Err(e) => {
            // the partial output must not survive
            let _ = fs::remove_file(&temp);
            Err(e)
        }
    }
}

/// A nonexistent sibling path, derived by prefixing the file name with
/// underscores until the name is free.
fn temp_sibling(dest: &Path) -> Result<PathBuf> {
    let name = dest
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::other(format!("cannot derive temp name for {dest:?}")))?;
    let parent = dest.parent().unwrap_or_else(|| Path::new(""));

    let mut candidate = format!("_{name}");
    loop {
        let path = parent.join(&candidate);
        if !path.exists() {
            return Ok(path);
        }
        candidate.insert(0, '_');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::OpenMode;
    use crate::compress::CompressMode;
    use crate::Archive;
    use tempfile::tempdir;

    #[test]
    fn test_clean_archive_scans_clean() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dump.zip");

        let mut archive = Archive::open(&path, OpenMode::Write).unwrap();
        archive
            .write_bytes("frames/0/position.f32.ind", b"\0\0\0\0", CompressMode::None)
            .unwrap();
        archive.close().unwrap();

        assert!(scan_corrupt_entries(&path).unwrap().is_empty());
        assert!(is_zip64(&path).unwrap());
    }

    #[test]
    fn test_scan_rejects_other_backends() {
        assert!(matches!(
            scan_corrupt_entries(Path::new("dump.sqlite")),
            Err(Error::UnsupportedBackend(_))
        ));
    }

    #[test]
    fn test_repair_tool_hook() {
        struct DropEverything;

        impl RepairTool for DropEverything {
            fn repair(&self, _path: &Path) -> Result<Vec<String>> {
                Ok(vec!["frames/7/position.f32.ind".to_owned()])
            }
        }

        let lost = repair_with(&DropEverything, Path::new("dump.zip")).unwrap();
        assert_eq!(lost, ["frames/7/position.f32.ind"]);
    }

    #[test]
    fn test_atomic_publish_success() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.zip");

        atomic_publish(&dest, |temp| {
            assert_ne!(temp, dest);
            assert_eq!(temp.parent(), dest.parent());
            fs::write(temp, b"done").map_err(Into::into)
        })
        .unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"done");
        // no temporary left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_atomic_publish_failure_cleans_up() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.zip");
        fs::write(&dest, b"original").unwrap();

        let result = atomic_publish(&dest, |temp| {
            fs::write(temp, b"partial")?;
            Err(Error::other("rewrite failed"))
        });

        assert!(result.is_err());
        assert_eq!(fs::read(&dest).unwrap(), b"original");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_temp_sibling_avoids_collisions() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("out.zip");
        fs::write(dir.path().join("_out.zip"), b"taken").unwrap();

        let temp = temp_sibling(&dest).unwrap();
        assert_eq!(temp, dir.path().join("__out.zip"));
    }
}
