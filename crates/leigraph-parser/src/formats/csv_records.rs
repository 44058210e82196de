use std::io::{BufRead, Read};
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord};

use crate::errors::ParserError;
use crate::formats::xml_records::extension;
use crate::formats::{first_significant_byte, ReaderOptions, RecordFormat, RecordStream};
use crate::model::{RecordKind, SourceRecord};

pub struct CsvFormat;

impl RecordFormat for CsvFormat {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn accepts(&self, path: &Path, head: &[u8]) -> Result<(), ParserError> {
        match extension(path).as_deref() {
            Some("csv") | Some("tsv") => Ok(()),
            Some("xml") => Err(self.mismatch("file extension names an XML file")),
            _ => match first_significant_byte(head) {
                Some(b'<') => Err(self.mismatch("content looks like markup")),
                Some(_) => Ok(()),
                None => Err(self.mismatch("file is empty")),
            },
        }
    }

    fn records(
        &self,
        path: PathBuf,
        input: Box<dyn BufRead>,
        options: &ReaderOptions,
    ) -> RecordStream {
        let delimiter = match extension(&path).as_deref() {
            Some("tsv") => b'\t',
            _ => options.delimiter,
        };
        Box::new(CsvRecords::new(path, input, options.kind, delimiter))
    }
}

impl CsvFormat {
    fn mismatch(&self, reason: &str) -> ParserError {
        ParserError::FormatMismatch {
            format: self.name(),
            reason: reason.to_string(),
        }
    }
}

/// Each row is one record; header cells become field paths verbatim.
pub struct CsvRecords<R: Read> {
    reader: csv::Reader<R>,
    path: PathBuf,
    kind: RecordKind,
    headers: Option<Vec<String>>,
    row: StringRecord,
    ordinal: u64,
    done: bool,
}

impl<R: Read> CsvRecords<R> {
    pub fn new(path: PathBuf, input: R, kind: RecordKind, delimiter: u8) -> Self {
        let reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(false)
            .from_reader(input);
        Self {
            reader,
            path,
            kind,
            headers: None,
            row: StringRecord::new(),
            ordinal: 0,
            done: false,
        }
    }

    fn csv_error(&self, source: csv::Error) -> ParserError {
        ParserError::Csv {
            path: self.path.clone(),
            source,
        }
    }

    fn next_record(&mut self) -> Result<Option<SourceRecord>, ParserError> {
        if self.headers.is_none() {
            let headers: Vec<String> = self
                .reader
                .headers()
                .map_err(|err| ParserError::Csv {
                    path: self.path.clone(),
                    source: err,
                })?
                .iter()
                .map(|header| header.trim_start_matches('\u{feff}').trim().to_string())
                .collect();
            self.headers = Some(headers);
        }

        let has_row = self
            .reader
            .read_record(&mut self.row)
            .map_err(|err| self.csv_error(err))?;
        if !has_row {
            return Ok(None);
        }

        self.ordinal += 1;
        let mut record = SourceRecord::new(self.kind, self.ordinal);
        if let Some(headers) = &self.headers {
            for (header, value) in headers.iter().zip(self.row.iter()) {
                record.push(header.as_str(), value);
            }
        }
        Ok(Some(record))
    }
}

impl<R: Read> Iterator for CsvRecords<R> {
    type Item = Result<SourceRecord, ParserError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
