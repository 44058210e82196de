use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Registration,
    Relationship,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Registration => "registration",
            RecordKind::Relationship => "relationship",
        }
    }

    /// Element that wraps one record in the registry's concatenated XML files.
    pub fn default_record_element(&self) -> &'static str {
        match self {
            RecordKind::Registration => "LEIRecord",
            RecordKind::Relationship => "RelationshipRecord",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded source record.
///
/// Fields are addressed by dotted paths relative to the record element, e.g.
/// `Entity.LegalAddress.City`, with attributes as `Entity.LegalName@lang`.
/// Repeated elements accumulate values in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    pub kind: RecordKind,
    pub ordinal: u64,
    fields: BTreeMap<String, Vec<String>>,
}

impl SourceRecord {
    pub fn new(kind: RecordKind, ordinal: u64) -> Self {
        Self {
            kind,
            ordinal,
            fields: BTreeMap::new(),
        }
    }

    /// Appends a value under `path`. Blank values are not recorded.
    pub fn push(&mut self, path: impl Into<String>, value: impl Into<String>) {
        let value = value.into();
        if value.trim().is_empty() {
            return;
        }
        self.fields.entry(path.into()).or_default().push(value);
    }

    pub fn with(mut self, path: &str, value: &str) -> Self {
        self.push(path, value);
        self
    }

    pub fn first(&self, path: &str) -> Option<&str> {
        self.fields
            .get(path)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn values(&self, path: &str) -> &[String] {
        self.fields.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, path: &str) -> bool {
        self.fields.contains_key(path)
    }
}
