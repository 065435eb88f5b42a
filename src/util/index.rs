//! Frame-index ordering.

use std::cmp::Ordering;
use std::fmt;

/// A frame index with the archive's natural ordering.
///
/// Indices are stored as strings but usually hold decimal frame numbers.
/// Two numeric indices compare numerically ("2" before "10"), everything
/// else compares lexicographically, with numeric indices sorting before
/// non-numeric ones so the order stays total.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct FrameIndex(pub String);

impl FrameIndex {
    pub fn new(index: impl Into<String>) -> Self {
        Self(index.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value of the index, if it parses as an unsigned integer.
    #[inline]
    pub fn as_number(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl Ord for FrameIndex {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.as_number(), other.as_number()) {
            // Tie-break on the raw string so "07" and "7" stay distinct
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for FrameIndex {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for FrameIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FrameIndex {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for FrameIndex {
    fn from(s: String) -> Self {
        Self(s)
    }
}
