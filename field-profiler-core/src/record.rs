//! Record model shared by the profiling pass and the selection pass.
//!
//! A source exposes an ordered list of fields and yields records whose
//! values are positionally aligned with that list. Record ids must be stable
//! across repeated calls to [`RecordSource::records`].

use chrono::{NaiveDate, NaiveDateTime};
use field_profiler_common::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A cell value exactly as the host source produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

static NULL_VALUE: RawValue = RawValue::Null;

impl RawValue {
    pub fn is_null(&self) -> bool {
        matches!(self, RawValue::Null)
    }

    /// String form used by text coercion and rule `LIKE` matching.
    pub fn to_text(&self) -> Option<String> {
        match self {
            RawValue::Null => None,
            RawValue::Bool(b) => Some(b.to_string()),
            RawValue::Int(i) => Some(i.to_string()),
            RawValue::Float(f) => Some(f.to_string()),
            RawValue::Text(s) => Some(s.clone()),
            RawValue::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            RawValue::DateTime(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_owned())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::Text(s)
    }
}

impl From<i64> for RawValue {
    fn from(v: i64) -> Self {
        RawValue::Int(v)
    }
}

impl From<i32> for RawValue {
    fn from(v: i32) -> Self {
        RawValue::Int(v as i64)
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Float(v)
    }
}

impl From<bool> for RawValue {
    fn from(v: bool) -> Self {
        RawValue::Bool(v)
    }
}

impl From<NaiveDate> for RawValue {
    fn from(v: NaiveDate) -> Self {
        RawValue::Date(v)
    }
}

impl From<NaiveDateTime> for RawValue {
    fn from(v: NaiveDateTime) -> Self {
        RawValue::DateTime(v)
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(RawValue::Null, Into::into)
    }
}

/// Type hint declared by the host for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclaredKind {
    Numeric,
    Text,
    Date,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: DeclaredKind,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, kind: DeclaredKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: RecordId,
    pub values: Vec<RawValue>,
}

impl Record {
    pub fn new(id: u64, values: Vec<RawValue>) -> Self {
        Self {
            id: RecordId(id),
            values,
        }
    }

    /// Value at a field position; short rows read as null.
    pub fn value(&self, position: usize) -> &RawValue {
        self.values.get(position).unwrap_or(&NULL_VALUE)
    }
}

pub type RecordIter<'a> = Box<dyn Iterator<Item = Result<Record>> + 'a>;

/// Host data source. Implementations must yield the same ids in the same
/// order every time `records` is called.
pub trait RecordSource {
    fn fields(&self) -> &[FieldSpec];

    /// Total record count, used only for progress reporting.
    fn record_count_hint(&self) -> Option<u64> {
        None
    }

    fn records(&self) -> Result<RecordIter<'_>>;

    fn field_position(&self, name: &str) -> Option<usize> {
        self.fields().iter().position(|f| f.name == name)
    }
}

/// Restricts a run to a caller-chosen subset of records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordFilter {
    ids: Option<BTreeSet<RecordId>>,
}

impl RecordFilter {
    pub fn all() -> Self {
        Self { ids: None }
    }

    pub fn only(ids: impl IntoIterator<Item = RecordId>) -> Self {
        Self {
            ids: Some(ids.into_iter().collect()),
        }
    }

    pub fn admits(&self, id: RecordId) -> bool {
        self.ids.as_ref().map_or(true, |ids| ids.contains(&id))
    }

    pub fn is_restricted(&self) -> bool {
        self.ids.is_some()
    }
}

/// In-memory source; record ids are row positions.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    fields: Vec<FieldSpec>,
    rows: Vec<Vec<RawValue>>,
}

impl MemorySource {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self {
            fields,
            rows: Vec::new(),
        }
    }

    /// Single-field source, handy for column-at-a-time profiling.
    pub fn single_column(
        name: &str,
        kind: DeclaredKind,
        values: impl IntoIterator<Item = RawValue>,
    ) -> Self {
        let mut src = Self::new(vec![FieldSpec::new(name, kind)]);
        for v in values {
            src.push(vec![v]);
        }
        src
    }

    pub fn push(&mut self, row: Vec<RawValue>) {
        self.rows.push(row);
    }
}

impl RecordSource for MemorySource {
    fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    fn record_count_hint(&self) -> Option<u64> {
        Some(self.rows.len() as u64)
    }

    fn records(&self) -> Result<RecordIter<'_>> {
        Ok(Box::new(
            self.rows
                .iter()
                .enumerate()
                .map(|(i, row)| Ok(Record::new(i as u64, row.clone()))),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_row_reads_null() {
        let r = Record::new(0, vec![RawValue::Int(1)]);
        assert_eq!(r.value(0), &RawValue::Int(1));
        assert!(r.value(3).is_null());
    }

    #[test]
    fn filter_admits_subset() {
        let f = RecordFilter::only([RecordId(1), RecordId(3)]);
        assert!(f.admits(RecordId(3)));
        assert!(!f.admits(RecordId(2)));
        assert!(RecordFilter::all().admits(RecordId(99)));
        assert!(f.is_restricted());
        assert!(!RecordFilter::all().is_restricted());
    }

    #[test]
    fn memory_source_ids_are_positions() {
        let src = MemorySource::single_column(
            "a",
            DeclaredKind::Numeric,
            vec![RawValue::from(1), RawValue::from(None::<i64>)],
        );
        let ids: Vec<u64> = src.records().unwrap().map(|r| r.unwrap().id.0).collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(src.field_position("a"), Some(0));
        assert_eq!(src.field_position("b"), None);
    }
}
