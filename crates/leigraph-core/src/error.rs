use std::path::PathBuf;

use leigraph_parser::ParserError;
use thiserror::Error;

use crate::aggregate::AggregateError;
use crate::config::ConfigError;
use crate::fragments::FragmentError;
use crate::mapping::MappingError;
use crate::publish::PublishError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Source unavailable: {0}")]
    SourceUnavailable(#[source] ParserError),

    #[error("Source does not match the expected record format: {0}")]
    SchemaViolation(#[source] ParserError),

    #[error("Mapping failed in {path}: {source}")]
    Mapping {
        path: PathBuf,
        #[source]
        source: MappingError,
    },

    #[error("Fragment stream error: {0}")]
    Fragment(#[from] FragmentError),

    #[error("Aggregation failed: {0}")]
    Aggregate(#[from] AggregateError),

    #[error("Publishing failed: {0}")]
    Publish(#[from] PublishError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("File I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<ParserError> for PipelineError {
    fn from(err: ParserError) -> Self {
        if err.is_source_unavailable() {
            Self::SourceUnavailable(err)
        } else {
            Self::SchemaViolation(err)
        }
    }
}

impl PipelineError {
    /// Process exit status, following the BSD `sysexits` conventions.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::SourceUnavailable(_) => 66,
            Self::SchemaViolation(_) | Self::Mapping { .. } => 65,
            Self::Aggregate(
                AggregateError::Fragment(FragmentError::Io { .. }) | AggregateError::Io { .. },
            ) => 74,
            Self::Aggregate(_) => 70,
            Self::Publish(_) => 69,
            Self::Config(_) => 78,
            Self::Fragment(_) | Self::Io { .. } => 74,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
