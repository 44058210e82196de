use std::fmt;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::errors::ParserError;
use crate::formats::{first_significant_byte, ReaderOptions, RecordFormat, RecordStream};
use crate::model::{RecordKind, SourceRecord};

pub struct XmlFormat;

impl RecordFormat for XmlFormat {
    fn name(&self) -> &'static str {
        "xml"
    }

    fn accepts(&self, path: &Path, head: &[u8]) -> Result<(), ParserError> {
        match extension(path).as_deref() {
            Some("xml") => Ok(()),
            Some("csv") | Some("tsv") => Err(self.mismatch("file extension names a CSV file")),
            _ => match first_significant_byte(head) {
                Some(b'<') => Ok(()),
                Some(_) => Err(self.mismatch("content does not start with '<'")),
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
        Box::new(XmlRecords::new(path, input, options))
    }
}

impl XmlFormat {
    fn mismatch(&self, reason: &str) -> ParserError {
        ParserError::FormatMismatch {
            format: self.name(),
            reason: reason.to_string(),
        }
    }
}

pub(crate) fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Pull-parses one record element at a time; memory use is bounded by the
/// largest single record, not the file.
pub struct XmlRecords<R: BufRead> {
    reader: Reader<R>,
    path: PathBuf,
    kind: RecordKind,
    record_element: Vec<u8>,
    ordinal: u64,
    /// Open elements outside any record.
    depth: usize,
    seen_root: bool,
    done: bool,
}

impl<R: BufRead> XmlRecords<R> {
    pub fn new(path: PathBuf, input: R, options: &ReaderOptions) -> Self {
        let reader = Reader::from_reader(input);
        Self {
            reader,
            path,
            kind: options.kind,
            record_element: options.record_element.as_bytes().to_vec(),
            ordinal: 0,
            depth: 0,
            seen_root: false,
            done: false,
        }
    }

    fn xml_error(&self, err: impl fmt::Display) -> ParserError {
        ParserError::Xml {
            path: self.path.clone(),
            position: self.reader.buffer_position() as u64,
            message: err.to_string(),
        }
    }

    fn next_record(&mut self) -> Result<Option<SourceRecord>, ParserError> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let event = self
                .reader
                .read_event_into(&mut buf)
                .map_err(|err| self.xml_error(err))?;
            match event {
                Event::Start(start)
                    if start.local_name().as_ref() == self.record_element.as_slice() =>
                {
                    self.seen_root = true;
                    self.ordinal += 1;
                    let mut record = SourceRecord::new(self.kind, self.ordinal);
                    self.push_attributes(&mut record, "", &start)?;
                    return self.read_record_body(record).map(Some);
                }
                Event::Empty(start)
                    if start.local_name().as_ref() == self.record_element.as_slice() =>
                {
                    self.seen_root = true;
                    self.ordinal += 1;
                    let mut record = SourceRecord::new(self.kind, self.ordinal);
                    self.push_attributes(&mut record, "", &start)?;
                    return Ok(Some(record));
                }
                Event::Start(_) => {
                    self.seen_root = true;
                    self.depth += 1;
                }
                Event::Empty(_) => self.seen_root = true,
                Event::End(_) => self.depth = self.depth.saturating_sub(1),
                Event::Eof if !self.seen_root => {
                    return Err(self.xml_error("input contains no root element"));
                }
                Event::Eof if self.depth > 0 => {
                    return Err(self.xml_error(format!(
                        "input ended with {} unclosed element(s)",
                        self.depth
                    )));
                }
                Event::Eof => return Ok(None),
                _ => {}
            }
        }
    }

    /// Text is collected per element and recorded when the element closes, so
    /// comments and CDATA sections inside a value do not split it.
    fn read_record_body(&mut self, mut record: SourceRecord) -> Result<SourceRecord, ParserError> {
        let mut buf = Vec::new();
        let mut stack: Vec<String> = Vec::new();
        let mut texts: Vec<String> = Vec::new();
        loop {
            buf.clear();
            let event = self
                .reader
                .read_event_into(&mut buf)
                .map_err(|err| self.xml_error(err))?;
            match event {
                Event::Start(start) => {
                    let name = self.local_name(&start)?;
                    if name.as_bytes() == self.record_element.as_slice() {
                        return Err(ParserError::NestedRecord {
                            path: self.path.clone(),
                            element: name,
                            ordinal: self.ordinal,
                        });
                    }
                    stack.push(name);
                    texts.push(String::new());
                    let prefix = stack.join(".");
                    self.push_attributes(&mut record, &prefix, &start)?;
                }
                Event::Empty(start) => {
                    let name = self.local_name(&start)?;
                    let prefix = if stack.is_empty() {
                        name
                    } else {
                        format!("{}.{}", stack.join("."), name)
                    };
                    self.push_attributes(&mut record, &prefix, &start)?;
                }
                Event::Text(text) => {
                    let value = text.unescape().map_err(|err| self.xml_error(err))?;
                    if let Some(current) = texts.last_mut() {
                        current.push_str(&value);
                    }
                }
                Event::CData(cdata) => {
                    let value = String::from_utf8(cdata.into_inner().into_owned()).map_err(
                        |_| ParserError::Encoding {
                            path: self.path.clone(),
                            ordinal: self.ordinal,
                        },
                    )?;
                    if let Some(current) = texts.last_mut() {
                        current.push_str(&value);
                    }
                }
                Event::End(_) => {
                    let Some(name) = stack.pop() else {
                        return Ok(record);
                    };
                    let text = texts.pop().unwrap_or_default();
                    let path = if stack.is_empty() {
                        name
                    } else {
                        format!("{}.{}", stack.join("."), name)
                    };
                    record.push(path, text.trim());
                }
                Event::Eof => {
                    return Err(ParserError::TruncatedRecord {
                        path: self.path.clone(),
                        ordinal: self.ordinal,
                    });
                }
                _ => {}
            }
        }
    }

    fn local_name(&self, start: &BytesStart<'_>) -> Result<String, ParserError> {
        std::str::from_utf8(start.local_name().as_ref())
            .map(str::to_string)
            .map_err(|_| ParserError::Encoding {
                path: self.path.clone(),
                ordinal: self.ordinal,
            })
    }

    fn push_attributes(
        &self,
        record: &mut SourceRecord,
        prefix: &str,
        start: &BytesStart<'_>,
    ) -> Result<(), ParserError> {
        for attribute in start.attributes() {
            let attribute = attribute.map_err(|err| self.xml_error(err))?;
            if attribute.key.as_namespace_binding().is_some() {
                continue;
            }
            let name = std::str::from_utf8(attribute.key.local_name().as_ref())
                .map_err(|_| ParserError::Encoding {
                    path: self.path.clone(),
                    ordinal: self.ordinal,
                })?
                .to_string();
            let value = attribute
                .unescape_value()
                .map_err(|err| self.xml_error(err))?;
            record.push(format!("{prefix}@{name}"), value.into_owned());
        }
        Ok(())
    }
}

impl<R: BufRead> Iterator for XmlRecords<R> {
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
