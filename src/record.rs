//! Record - the structured path grammar for archive entries.
//!
//! Every entry in a trajectory archive is addressed by a path such as
//! `frames/100/position.f32.ind`. The path encodes the group prefix, the
//! time behavior (per-frame data lives under `frames/<index>/`, per-variable
//! data under `vars/<name>/<index>`), the property name, the element format
//! (`f32`, `i64`, ...) and the storage resolution (`ind` for one value per
//! entity, `uni` for one shared value). A path with no recognized suffix
//! pair is an uninterpreted text record.

use smallvec::SmallVec;
use std::fmt;

use crate::util::{Error, Result};

/// Time behavior of properties.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Behavior {
    /// Value does not vary with time; no index in the path
    #[default]
    Constant,
    /// One value per frame, stored under `frames/<index>/`
    Discrete,
    /// Continuously indexed quantity, stored under `vars/<name>/<index>`
    Continuous,
}

/// Binary formats in which properties can be stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Format {
    Float32,
    Float64,
    Int32,
    Int64,
    UInt8,
    UInt32,
    UInt64,
}

impl Default for Format {
    /// Text records are implicitly byte-valued.
    fn default() -> Self {
        Format::UInt8
    }
}

impl Format {
    /// Path suffix for this format.
    pub const fn suffix(&self) -> &'static str {
        match self {
            Format::Float32 => "f32",
            Format::Float64 => "f64",
            Format::Int32 => "i32",
            Format::Int64 => "i64",
            Format::UInt8 => "u8",
            Format::UInt32 => "u32",
            Format::UInt64 => "u64",
        }
    }

    /// Size of one element in bytes.
    pub const fn num_bytes(&self) -> usize {
        match self {
            Format::UInt8 => 1,
            Format::Float32 | Format::Int32 | Format::UInt32 => 4,
            Format::Float64 | Format::Int64 | Format::UInt64 => 8,
        }
    }

    fn from_suffix(s: &str) -> Option<Self> {
        Some(match s {
            "f32" => Format::Float32,
            "f64" => Format::Float64,
            "i32" => Format::Int32,
            "i64" => Format::Int64,
            "u8" => Format::UInt8,
            "u32" => Format::UInt32,
            "u64" => Format::UInt64,
            _ => return None,
        })
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Level of detail of property storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Resolution {
    /// Uninterpreted byte blob; no format/resolution suffix in the path
    #[default]
    Text,
    /// Single shared value (or small fixed array) per frame
    Uniform,
    /// Per-frame array with one value per entity
    Individual,
}

impl Resolution {
    /// Path suffix, if any (`Text` records carry none).
    pub const fn suffix(&self) -> Option<&'static str> {
        match self {
            Resolution::Text => None,
            Resolution::Uniform => Some("uni"),
            Resolution::Individual => Some("ind"),
        }
    }
}

/// A record which can be stored in an archive.
///
/// The frame-independent "type" of a record is (group, name, behavior,
/// format, resolution); the frame-dependent identity adds the index.
/// Equality and ordering cover the full field tuple; catalog keys use
/// [`Record::with_nullified_index`] so that type equality ignores the index.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Record {
    group: String,
    name: String,
    behavior: Behavior,
    format: Format,
    resolution: Resolution,
    index: String,
}

impl Record {
    /// Create a record directly from the full set of fields.
    pub fn new(
        group: impl Into<String>,
        name: impl Into<String>,
        index: impl Into<String>,
        behavior: Behavior,
        format: Format,
        resolution: Resolution,
    ) -> Self {
        Self {
            group: group.into(),
            name: name.into(),
            index: index.into(),
            behavior,
            format,
            resolution,
        }
    }

    /// Parse a path (inside an archive) into its record fields.
    ///
    /// A single leading slash is stripped before parsing. Fails with
    /// [`Error::MalformedPath`] on empty paths, empty segments, an
    /// unterminated `frames/` or `vars/` segment, or a recognized
    /// resolution suffix paired with an unknown format suffix.
    pub fn parse(path: &str) -> Result<Self> {
        let norm = path.strip_prefix('/').unwrap_or(path);

        if norm.is_empty() {
            return Err(Error::malformed(path, "empty path"));
        }

        let segs: SmallVec<[&str; 8]> = norm.split('/').collect();

        if segs.iter().any(|s| s.is_empty()) {
            return Err(Error::malformed(path, "empty path segment"));
        }

        let n = segs.len();

        if n >= 3 && segs[n - 3] == "frames" {
            let (name, format, resolution) = parse_name(path, segs[n - 1])?;
            return Ok(Self {
                group: segs[..n - 3].join("/"),
                name,
                index: segs[n - 2].to_owned(),
                behavior: Behavior::Discrete,
                format,
                resolution,
            });
        }

        if n >= 3 && segs[n - 3] == "vars" {
            let (name, format, resolution) = parse_name(path, segs[n - 2])?;
            return Ok(Self {
                group: segs[..n - 3].join("/"),
                name,
                index: segs[n - 1].to_owned(),
                behavior: Behavior::Continuous,
                format,
                resolution,
            });
        }

        // A reserved segment in the name or index slot means the frame
        // structure never completed ("frames/5", "a/vars", ...)
        let tail = &segs[n.saturating_sub(2)..];
        if tail.iter().any(|s| *s == "frames" || *s == "vars") {
            return Err(Error::malformed(path, "unterminated frame segment"));
        }

        let (name, format, resolution) = parse_name(path, segs[n - 1])?;

        Ok(Self {
            group: segs[..n - 1].join("/"),
            name,
            index: String::new(),
            behavior: Behavior::Constant,
            format,
            resolution,
        })
    }

    /// Construct the archive path for this record. Pure inverse of
    /// [`Record::parse`] over valid records.
    pub fn build_path(&self) -> String {
        let mut full = self.name.clone();

        if let Some(res) = self.resolution.suffix() {
            full.push('.');
            full.push_str(self.format.suffix());
            full.push('.');
            full.push_str(res);
        }

        let mut result = String::new();

        if !self.group.is_empty() {
            result.push_str(&self.group);
            result.push('/');
        }

        match self.behavior {
            Behavior::Continuous => {
                result.push_str("vars/");
                result.push_str(&full);
                result.push('/');
                result.push_str(&self.index);
            }
            Behavior::Discrete => {
                result.push_str("frames/");
                result.push_str(&self.index);
                result.push('/');
                result.push_str(&full);
            }
            Behavior::Constant => result.push_str(&full),
        }

        result
    }

    /// Return a copy of this record with a different index.
    pub fn with_index(&self, index: impl Into<String>) -> Self {
        let mut result = self.clone();
        result.index = index.into();
        result
    }

    /// Return a copy of this record with an empty index. Used as the
    /// frame-independent catalog key.
    pub fn with_nullified_index(&self) -> Self {
        self.with_index(String::new())
    }

    /// Replace the index in place.
    pub fn set_index(&mut self, index: impl Into<String>) {
        self.index = index.into();
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn behavior(&self) -> Behavior {
        self.behavior
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.build_path())
    }
}

/// Split the final path segment into (name, format, resolution).
///
/// The format/resolution suffix pair is recognized only when the segment
/// has at least three dot-separated pieces and the final piece is `ind` or
/// `uni`; anything else is a text record with the dots kept in the name.
fn parse_name(path: &str, seg: &str) -> Result<(String, Format, Resolution)> {
    let pieces: SmallVec<[&str; 4]> = seg.split('.').collect();
    let n = pieces.len();

    if n >= 3 {
        let resolution = match pieces[n - 1] {
            "ind" => Some(Resolution::Individual),
            "uni" => Some(Resolution::Uniform),
            _ => None,
        };

        if let Some(resolution) = resolution {
            let format = Format::from_suffix(pieces[n - 2]).ok_or_else(|| {
                Error::malformed(
                    path,
                    format!("unknown format suffix {:?}", pieces[n - 2]),
                )
            })?;
            return Ok((pieces[..n - 2].join("."), format, resolution));
        }
    }

    Ok((seg.to_owned(), Format::UInt8, Resolution::Text))
}
