use std::fs;
use std::path::{Path, PathBuf};

use leigraph_bucket::S3Config;
use leigraph_parser::{ReaderOptions, RecordKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::aggregate::{Aggregator, CommandAggregator, MergeAggregator};
use crate::mapping::{Mapper, MappingError, MappingTable};
use crate::publish::{PublishOptions, DEFAULT_CACHE_CONTROL};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Mapping(#[from] MappingError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub dataset: String,
    pub sources: SourcesConfig,
    pub output: OutputConfig,
    pub mapping: MappingConfig,
    pub aggregator: AggregatorConfig,
    pub publish: PublishConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourcesConfig {
    pub registration: Vec<PathBuf>,
    pub relationships: Vec<PathBuf>,
    pub registration_element: Option<String>,
    pub relationship_element: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub fragments: PathBuf,
    pub export_dir: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MappingConfig {
    /// Custom mapping table; the built-in GLEIF table is used when unset.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregatorKind {
    #[default]
    Merge,
    Command,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AggregatorConfig {
    pub kind: AggregatorKind,
    /// Program followed by its arguments, for `kind = "command"`.
    pub command: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublishConfig {
    pub bucket: Option<String>,
    pub region: String,
    pub endpoint: Option<String>,
    pub prefix: String,
    pub cache_control: String,
    pub force_path_style: bool,
    pub delete_stale: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dataset: "leidata".to_string(),
            sources: SourcesConfig::default(),
            output: OutputConfig::default(),
            mapping: MappingConfig::default(),
            aggregator: AggregatorConfig::default(),
            publish: PublishConfig::default(),
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            registration: vec![PathBuf::from("data/lei-records.xml")],
            relationships: vec![PathBuf::from("data/rr-records.xml")],
            registration_element: None,
            relationship_element: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            fragments: PathBuf::from("data/fragments.json"),
            export_dir: PathBuf::from("data/export"),
        }
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            region: "us-east-1".to_string(),
            endpoint: None,
            prefix: "leidata".to_string(),
            cache_control: DEFAULT_CACHE_CONTROL.to_string(),
            force_path_style: false,
            delete_stale: false,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: PipelineConfig =
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `LEIGRAPH_*` overrides from `lookup` (normally the process
    /// environment).
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bucket) = lookup("LEIGRAPH_BUCKET") {
            self.publish.bucket = Some(bucket);
        }
        if let Some(region) = lookup("LEIGRAPH_REGION") {
            self.publish.region = region;
        }
        if let Some(endpoint) = lookup("LEIGRAPH_ENDPOINT") {
            self.publish.endpoint = Some(endpoint);
        }
        if let Some(prefix) = lookup("LEIGRAPH_PREFIX") {
            self.publish.prefix = prefix;
        }
        self
    }

    pub fn with_process_env(self) -> Self {
        self.with_env_overrides(|name| std::env::var(name).ok())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dataset.trim().is_empty() {
            return Err(ConfigError::Invalid("dataset name is empty".into()));
        }
        if self.sources.registration.is_empty() && self.sources.relationships.is_empty() {
            return Err(ConfigError::Invalid("no source files configured".into()));
        }
        if self.aggregator.kind == AggregatorKind::Command && self.aggregator.command.is_empty()
        {
            return Err(ConfigError::Invalid(
                "aggregator.command is required when aggregator.kind = \"command\"".into(),
            ));
        }
        if self.publish.cache_control.trim().is_empty() {
            return Err(ConfigError::Invalid("publish.cache_control is empty".into()));
        }
        Ok(())
    }

    pub fn mapping_table(&self) -> Result<MappingTable, ConfigError> {
        let table = match &self.mapping.path {
            Some(path) => MappingTable::load(path)?,
            None => MappingTable::gleif()?,
        };
        Ok(table)
    }

    pub fn mapper(&self) -> Result<Mapper, ConfigError> {
        Ok(Mapper::new(self.mapping_table()?)?)
    }

    pub fn reader_options(&self, kind: RecordKind) -> ReaderOptions {
        let element = match kind {
            RecordKind::Registration => self.sources.registration_element.as_ref(),
            RecordKind::Relationship => self.sources.relationship_element.as_ref(),
        };
        let options = ReaderOptions::for_kind(kind);
        match element {
            Some(element) => options.with_record_element(element.as_str()),
            None => options,
        }
    }

    pub fn sources(&self, kind: RecordKind) -> &[PathBuf] {
        match kind {
            RecordKind::Registration => &self.sources.registration,
            RecordKind::Relationship => &self.sources.relationships,
        }
    }

    pub fn aggregator(&self) -> Result<Box<dyn Aggregator>, ConfigError> {
        match self.aggregator.kind {
            AggregatorKind::Merge => Ok(Box::new(MergeAggregator::new(self.dataset.as_str()))),
            AggregatorKind::Command => {
                let (program, args) = self.aggregator.command.split_first().ok_or_else(|| {
                    ConfigError::Invalid("aggregator.command is empty".into())
                })?;
                Ok(Box::new(CommandAggregator::new(program.as_str(), args.to_vec())))
            }
        }
    }

    pub fn publish_options(&self) -> PublishOptions {
        PublishOptions {
            prefix: self.publish.prefix.clone(),
            cache_control: self.publish.cache_control.clone(),
            delete_stale: self.publish.delete_stale,
        }
    }

    /// S3 settings; credentials come from the standard AWS provider chain.
    pub fn s3_config(&self) -> Result<S3Config, ConfigError> {
        let bucket = self.publish.bucket.clone().ok_or_else(|| {
            ConfigError::Invalid("publish.bucket (or LEIGRAPH_BUCKET) must be set".into())
        })?;
        Ok(S3Config {
            bucket,
            region: self.publish.region.clone(),
            endpoint: self.publish.endpoint.clone(),
            access_key_id: None,
            secret_access_key: None,
            force_path_style: self.publish.force_path_style,
        })
    }
}
