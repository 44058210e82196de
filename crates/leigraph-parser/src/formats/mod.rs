mod csv_records;
mod xml_records;

use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::errors::ParserError;
use crate::model::{RecordKind, SourceRecord};

pub use csv_records::{CsvFormat, CsvRecords};
pub use xml_records::{XmlFormat, XmlRecords};

pub type RecordStream = Box<dyn Iterator<Item = Result<SourceRecord, ParserError>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderOptions {
    pub kind: RecordKind,
    /// Local name of the element wrapping one record (XML only).
    pub record_element: String,
    /// Field delimiter (CSV only).
    pub delimiter: u8,
}

impl ReaderOptions {
    pub fn for_kind(kind: RecordKind) -> Self {
        Self {
            kind,
            record_element: kind.default_record_element().to_string(),
            delimiter: b',',
        }
    }

    pub fn with_record_element(mut self, element: impl Into<String>) -> Self {
        self.record_element = element.into();
        self
    }
}

pub trait RecordFormat {
    fn name(&self) -> &'static str;

    /// Returns `FormatMismatch` when this format cannot read the file.
    fn accepts(&self, path: &Path, head: &[u8]) -> Result<(), ParserError>;

    fn records(
        &self,
        path: PathBuf,
        input: Box<dyn BufRead>,
        options: &ReaderOptions,
    ) -> RecordStream;
}

pub(crate) fn first_significant_byte(head: &[u8]) -> Option<u8> {
    let head = head.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(head);
    head.iter().copied().find(|byte| !byte.is_ascii_whitespace())
}
