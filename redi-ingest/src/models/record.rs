//! Raw record type: the only loosely-keyed value in the pipeline
//!
//! A `RawRecord` is an ordered mapping of column name → cell value, the
//! shape a CSV row arrives in. It is consumed exclusively at the
//! normalizer/decomposer boundary; everything downstream is a typed
//! entity struct.

use serde::{Deserialize, Serialize};

/// One raw spreadsheet row: ordered (column, value) pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord(Vec<(String, String)>);

impl RawRecord {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        Self(pairs)
    }

    /// Value for a column, by exact name.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }

    /// Replace the value of a column, or append the column if absent.
    /// Used by the fallback cascade to write a resolved APN back into
    /// the original row before re-ingestion.
    pub fn set(&mut self, column: &str, value: String) {
        match self.0.iter_mut().find(|(c, _)| c == column) {
            Some((_, v)) => *v = value,
            None => self.0.push((column.to_string(), value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(c, v)| (c.as_str(), v.as_str()))
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(c, _)| c.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl FromIterator<(String, String)> for RawRecord {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
