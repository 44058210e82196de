use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::info;

use crate::entity::{EntityKey, Fragment};
use crate::fragments::{read_fragments, AtomicFragmentFile, FragmentError};

pub const ENTITIES_FILE: &str = "entities.ftm.json";
pub const INDEX_FILE: &str = "index.json";

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error(transparent)]
    Fragment(#[from] FragmentError),

    #[error("conflicting fragments for {key}: {existing} vs {incoming}")]
    Conflict {
        key: String,
        existing: String,
        incoming: String,
    },

    #[error("export I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write dataset index: {0}")]
    Index(#[from] serde_json::Error),

    #[error("failed to start aggregator command {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("aggregator command {program} exited with {status}")]
    Command { program: String, status: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateSummary {
    pub aggregator: &'static str,
    pub export_dir: PathBuf,
    pub fragments_read: Option<u64>,
    pub records: Option<u64>,
    pub by_schema: BTreeMap<String, u64>,
}

/// Turns an unordered fragment stream into one consolidated record per key.
pub trait Aggregator {
    fn name(&self) -> &'static str;
    fn aggregate(
        &self,
        fragments: &Path,
        export_dir: &Path,
    ) -> Result<AggregateSummary, AggregateError>;
}

/// Written next to the consolidated records so downloaders can check what
/// they fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetIndex {
    pub dataset: String,
    pub entities_file: String,
    pub records: u64,
    pub schemata: BTreeMap<String, u64>,
    pub sha256: String,
    pub generated_at: String,
}

/// In-process sort and merge.
#[derive(Debug, Clone)]
pub struct MergeAggregator {
    dataset: String,
}

impl MergeAggregator {
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
        }
    }

    /// Merges fragments by key. The result is ordered by key and its
    /// property values are sorted, whatever order the input arrived in.
    pub fn merge<I>(fragments: I) -> Result<BTreeMap<EntityKey, Fragment>, AggregateError>
    where
        I: IntoIterator<Item = Result<Fragment, FragmentError>>,
    {
        let mut merged: BTreeMap<EntityKey, Fragment> = BTreeMap::new();
        for fragment in fragments {
            let fragment = fragment?;
            match merged.get_mut(fragment.key()) {
                Some(existing) => {
                    existing.merge(fragment).map_err(|incoming| {
                        AggregateError::Conflict {
                            key: incoming.key().to_string(),
                            existing: describe(existing),
                            incoming: describe(&incoming),
                        }
                    })?;
                }
                None => {
                    merged.insert(fragment.key().clone(), fragment);
                }
            }
        }
        for fragment in merged.values_mut() {
            fragment.normalize();
        }
        Ok(merged)
    }
}

fn describe(fragment: &Fragment) -> String {
    match fragment {
        Fragment::Entity(entity) => format!("entity {}", entity.schema),
        Fragment::Relationship(rel) => format!(
            "relationship {} {} -[{}]-> {}",
            rel.schema, rel.source, rel.label, rel.target
        ),
    }
}

impl Aggregator for MergeAggregator {
    fn name(&self) -> &'static str {
        "merge"
    }

    fn aggregate(
        &self,
        fragments: &Path,
        export_dir: &Path,
    ) -> Result<AggregateSummary, AggregateError> {
        let mut fragments_read = 0u64;
        let stream = read_fragments(fragments)?.inspect(|_| fragments_read += 1);
        let merged = Self::merge(stream)?;

        let entities_path = export_dir.join(ENTITIES_FILE);
        let mut output = AtomicFragmentFile::create(&entities_path)?;
        for fragment in merged.values() {
            output.write(fragment)?;
        }
        let summary = output.finish()?;

        let index = DatasetIndex {
            dataset: self.dataset.clone(),
            entities_file: ENTITIES_FILE.to_string(),
            records: summary.fragments,
            schemata: summary.by_schema.clone(),
            sha256: file_sha256(&entities_path)?,
            generated_at: Utc::now().to_rfc3339(),
        };
        write_index(&export_dir.join(INDEX_FILE), &index)?;

        info!(
            fragments = fragments_read,
            records = summary.fragments,
            path = %entities_path.display(),
            "Aggregated fragment stream"
        );

        Ok(AggregateSummary {
            aggregator: self.name(),
            export_dir: export_dir.to_path_buf(),
            fragments_read: Some(fragments_read),
            records: Some(summary.fragments),
            by_schema: summary.by_schema,
        })
    }
}

/// Replaces the index through a temporary file in the export directory.
fn write_index(path: &Path, index: &DatasetIndex) -> Result<(), AggregateError> {
    let io_error = |source| AggregateError::Io {
        path: path.to_path_buf(),
        source,
    };
    let content = serde_json::to_vec_pretty(index)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp_file = NamedTempFile::new_in(dir).map_err(io_error)?;
    temp_file.write_all(&content).map_err(io_error)?;
    temp_file.as_file().sync_all().map_err(io_error)?;
    temp_file.persist(path).map_err(|err| io_error(err.error))?;
    Ok(())
}

fn file_sha256(path: &Path) -> Result<String, AggregateError> {
    let io_error = |source| AggregateError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut file = File::open(path).map_err(io_error)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(io_error)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Delegates aggregation to an external program.
///
/// `{fragments}` and `{export}` in the arguments are replaced with the
/// fragment file and export directory.
#[derive(Debug, Clone)]
pub struct CommandAggregator {
    program: String,
    args: Vec<String>,
}

impl CommandAggregator {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn render_args(&self, fragments: &Path, export_dir: &Path) -> Vec<String> {
        let fragments = fragments.display().to_string();
        let export = export_dir.display().to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{fragments}", &fragments)
                    .replace("{export}", &export)
            })
            .collect()
    }
}

impl Aggregator for CommandAggregator {
    fn name(&self) -> &'static str {
        "command"
    }

    fn aggregate(
        &self,
        fragments: &Path,
        export_dir: &Path,
    ) -> Result<AggregateSummary, AggregateError> {
        fs::create_dir_all(export_dir).map_err(|source| AggregateError::Io {
            path: export_dir.to_path_buf(),
            source,
        })?;

        let args = self.render_args(fragments, export_dir);
        info!(program = %self.program, args = ?args, "Running external aggregator");
        let status = Command::new(&self.program)
            .args(&args)
            .status()
            .map_err(|source| AggregateError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if !status.success() {
            return Err(AggregateError::Command {
                program: self.program.clone(),
                status: status.to_string(),
            });
        }

        Ok(AggregateSummary {
            aggregator: self.name(),
            export_dir: export_dir.to_path_buf(),
            fragments_read: None,
            records: None,
            by_schema: BTreeMap::new(),
        })
    }
}
