use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone)]
pub struct FormatAttempt {
    pub format: &'static str,
    pub message: String,
}

impl FormatAttempt {
    pub fn new(format: &'static str, message: impl Into<String>) -> Self {
        Self {
            format,
            message: message.into(),
        }
    }
}

impl fmt::Display for FormatAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.format, self.message)
    }
}

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("failed to open source {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{format} format mismatch: {reason}")]
    FormatMismatch {
        format: &'static str,
        reason: String,
    },

    #[error("no reader recognized {path}; attempts: {attempts:?}")]
    NoMatchingFormat {
        path: PathBuf,
        attempts: Vec<FormatAttempt>,
    },

    #[error("XML error in {path} at byte {position}: {message}")]
    Xml {
        path: PathBuf,
        position: u64,
        message: String,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path}: <{element}> opened inside record {ordinal}")]
    NestedRecord {
        path: PathBuf,
        element: String,
        ordinal: u64,
    },

    #[error("{path}: input ended inside record {ordinal}")]
    TruncatedRecord { path: PathBuf, ordinal: u64 },

    #[error("{path}: record {ordinal} is not valid UTF-8")]
    Encoding { path: PathBuf, ordinal: u64 },
}

impl ParserError {
    /// True when the input could not be fetched at all, as opposed to being
    /// readable but not matching the expected record shape.
    pub fn is_source_unavailable(&self) -> bool {
        match self {
            ParserError::Open { .. } => true,
            ParserError::Csv { source, .. } => source.is_io_error(),
            _ => false,
        }
    }
}
