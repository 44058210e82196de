use std::io::Write;
use std::path::{Path, PathBuf};

use leigraph_bucket::BucketStore;
use leigraph_parser::{open_source, ReaderOptions, RecordKind};
use tracing::info;

use crate::aggregate::AggregateSummary;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::fragments::{AtomicFragmentFile, FragmentSummary, FragmentWriter};
use crate::mapping::Mapper;
use crate::publish::{publish_directory, PublishSummary};

const PROGRESS_INTERVAL: u64 = 100_000;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MapSummary {
    pub files: Vec<PathBuf>,
    pub records: u64,
    pub fragments: FragmentSummary,
}

/// Maps every configured source file into the fragment file.
///
/// Registration sources are read before relationship sources. The fragment
/// file is replaced only when every source maps cleanly.
pub fn map_sources(config: &PipelineConfig, mapper: &Mapper) -> Result<MapSummary> {
    let mut output = AtomicFragmentFile::create(&config.output.fragments)?;
    let mut files = Vec::new();
    let mut records = 0;

    for kind in [RecordKind::Registration, RecordKind::Relationship] {
        let options = config.reader_options(kind);
        for path in config.sources(kind) {
            records += map_file(path, &options, mapper, output.writer_mut())?;
            files.push(path.clone());
        }
    }

    let fragments = output.finish()?;
    info!(
        files = files.len(),
        records,
        fragments = fragments.fragments,
        path = %config.output.fragments.display(),
        "Wrote fragment stream"
    );
    Ok(MapSummary {
        files,
        records,
        fragments,
    })
}

/// Streams one source file through the mapper; returns the records read.
pub fn map_file<W: Write>(
    path: &Path,
    options: &ReaderOptions,
    mapper: &Mapper,
    writer: &mut FragmentWriter<W>,
) -> Result<u64> {
    let mut records = 0u64;
    for record in open_source(path, options)? {
        let record = record?;
        let fragments = mapper
            .map(&record)
            .map_err(|source| PipelineError::Mapping {
                path: path.to_path_buf(),
                source,
            })?;
        writer.write_all(&fragments)?;

        records += 1;
        if records % PROGRESS_INTERVAL == 0 {
            info!(
                path = %path.display(),
                kind = %options.kind,
                records,
                fragments = writer.summary().fragments,
                "Mapping progress"
            );
        }
    }

    info!(path = %path.display(), kind = %options.kind, records, "Mapped source file");
    Ok(records)
}

pub fn aggregate(config: &PipelineConfig) -> Result<AggregateSummary> {
    let aggregator = config.aggregator()?;
    let summary = aggregator.aggregate(&config.output.fragments, &config.output.export_dir)?;
    Ok(summary)
}

pub async fn publish(config: &PipelineConfig, store: &dyn BucketStore) -> Result<PublishSummary> {
    let summary =
        publish_directory(store, &config.output.export_dir, &config.publish_options()).await?;
    Ok(summary)
}
