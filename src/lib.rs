//! # getar
//!
//! Rust implementation of the getar trajectory archive format.
//!
//! A getar file is a container of many small, versioned binary records,
//! typically per-frame physical quantities from a simulation. Records are
//! addressed by a structured path (`frames/100/position.f32.ind`) that
//! encodes the property name, element format, and storage granularity.
//! Several physical containers can back the same API: zip files, tape (tar)
//! archives, sqlite databases, and plain directory trees.
//!
//! ## Modules
//!
//! - [`util`] - Error taxonomy, frame-index ordering
//! - [`record`] - Record path grammar (parser and builder)
//! - [`compress`] - Compression mode selection and codecs
//! - [`backend`] - Container backends (zip, tar, sqlite, directory)
//! - [`archive`] - The archive facade: open/read/write/query/close
//! - [`query`] - Relational query surface (sqlite backend only)
//! - [`repair`] - Corrupt-entry scanning, repair hooks, atomic publish
//!
//! ## Example
//!
//! ```ignore
//! use getar::prelude::*;
//!
//! let mut traj = Archive::open("dump.zip", OpenMode::Write)?;
//! traj.write_individual("frames/0/position.f32.ind", &[1.0f32, 2.0, 3.0],
//!                       CompressMode::Fast)?;
//! traj.close()?;
//! ```

pub mod util;
pub mod record;
pub mod compress;
pub mod backend;
pub mod archive;
pub mod query;
pub mod repair;

// Re-export commonly used types
pub use util::{Error, FrameIndex, Result};
pub use record::{Behavior, Format, Record, Resolution};
pub use compress::CompressMode;
pub use backend::OpenMode;
pub use archive::Archive;
pub use repair::is_zip64;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::archive::Archive;
    pub use crate::backend::OpenMode;
    pub use crate::compress::CompressMode;
    pub use crate::query::RecordFilter;
    pub use crate::record::{Behavior, Format, Record, Resolution};
    pub use crate::repair::{atomic_publish, is_zip64, RepairTool};
    pub use crate::util::{Error, FrameIndex, Result};
}
