use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::debug;

use crate::errors::{FormatAttempt, ParserError};
use crate::formats::{CsvFormat, ReaderOptions, RecordFormat, RecordStream, XmlFormat};

const READ_BUFFER_BYTES: usize = 256 * 1024;

/// Opens `path` and streams its records with the first format that accepts it.
///
/// Each call reopens the file, so a stream can be restarted by calling again.
pub fn open_source(path: &Path, options: &ReaderOptions) -> Result<RecordStream, ParserError> {
    let xml = XmlFormat;
    let csv = CsvFormat;
    let formats: [&dyn RecordFormat; 2] = [&xml, &csv];
    open_with_formats(path, options, &formats)
}

pub fn open_with_formats(
    path: &Path,
    options: &ReaderOptions,
    formats: &[&dyn RecordFormat],
) -> Result<RecordStream, ParserError> {
    let open_error = |source| ParserError::Open {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(open_error)?;
    let mut input = BufReader::with_capacity(READ_BUFFER_BYTES, file);
    let head = input.fill_buf().map_err(open_error)?.to_vec();

    let mut attempts = Vec::new();
    for format in formats {
        match format.accepts(path, &head) {
            Ok(()) => {
                debug!(
                    path = %path.display(),
                    format = format.name(),
                    kind = %options.kind,
                    "Opened record source"
                );
                let input: Box<dyn BufRead> = Box::new(input);
                return Ok(format.records(path.to_path_buf(), input, options));
            }
            Err(ParserError::FormatMismatch { reason, .. }) => {
                attempts.push(FormatAttempt::new(format.name(), reason));
            }
            Err(err) => return Err(err),
        }
    }

    Err(ParserError::NoMatchingFormat {
        path: path.to_path_buf(),
        attempts,
    })
}
