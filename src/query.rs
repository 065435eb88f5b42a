//! Relational query surface.
//!
//! The sqlite backend exposes the records table through two logical
//! columns: the structured record key and the decompressed payload.
//! [`RecordFilter`] builds parameterized predicates over the key columns so
//! callers can select, say, every Float32 record without enumerating the
//! catalog first. Other backends reject these queries.

use rusqlite::types::Value;

use crate::record::{Format, Resolution};

/// A filter over the structured record key columns.
///
/// Empty filters match every record. Predicates are combined with AND and
/// always bound as SQL parameters, never formatted into the query text.
///
/// ```ignore
/// let positions = archive.query_records(
///     &RecordFilter::new()
///         .with_name("position")
///         .with_format(Format::Float32),
/// )?;
/// ```
#[derive(Clone, Debug, Default)]
pub struct RecordFilter {
    format: Option<Format>,
    resolution: Option<Resolution>,
    name: Option<String>,
    group: Option<String>,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep only records with this element format.
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    /// Keep only records with this storage resolution.
    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    /// Keep only records with this property name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Keep only records under this group prefix (exact match; the root
    /// group is the empty string).
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Render the filter as a WHERE clause plus bound parameter values.
    pub(crate) fn to_sql(&self) -> (String, Vec<Value>) {
        let mut clauses: Vec<&str> = Vec::new();
        let mut params: Vec<Value> = Vec::new();

        if let Some(format) = self.format {
            clauses.push("format = ?");
            params.push(Value::Text(format.suffix().to_owned()));
        }
        if let Some(resolution) = self.resolution {
            clauses.push("resolution = ?");
            params.push(Value::Text(
                resolution.suffix().unwrap_or("text").to_owned(),
            ));
        }
        if let Some(name) = &self.name {
            clauses.push("name = ?");
            params.push(Value::Text(name.clone()));
        }
        if let Some(group) = &self.group {
            clauses.push("record_group = ?");
            params.push(Value::Text(group.clone()));
        }

        if clauses.is_empty() {
            (String::new(), params)
        } else {
            (format!(" WHERE {}", clauses.join(" AND ")), params)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter() {
        let (clause, params) = RecordFilter::new().to_sql();
        assert!(clause.is_empty());
        assert!(params.is_empty());
    }

    #[test]
    fn test_combined_filter() {
        let (clause, params) = RecordFilter::new()
            .with_format(Format::Float32)
            .with_name("position")
            .to_sql();
        assert_eq!(clause, " WHERE format = ? AND name = ?");
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn test_text_resolution_tag() {
        let (clause, params) = RecordFilter::new()
            .with_resolution(Resolution::Text)
            .to_sql();
        assert_eq!(clause, " WHERE resolution = ?");
        assert_eq!(params, vec![Value::Text("text".to_owned())]);
    }
}
