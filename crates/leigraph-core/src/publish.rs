use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use leigraph_bucket::{BucketError, BucketStore, ObjectMetadata};
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_CACHE_CONTROL: &str = "public, max-age=64600";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("export directory {0} does not exist")]
    MissingDirectory(PathBuf),

    #[error("cannot list export directory: {0}")]
    Walk(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Bucket(#[from] BucketError),
}

#[derive(Debug, Clone)]
pub struct PublishOptions {
    pub prefix: String,
    pub cache_control: String,
    /// Remove objects under the prefix that are not part of this export.
    pub delete_stale: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            cache_control: DEFAULT_CACHE_CONTROL.to_string(),
            delete_stale: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub uploaded: Vec<String>,
    pub deleted: Vec<String>,
    pub bytes: u64,
}

/// Syncs every file below `dir` to the store under `options.prefix`.
pub async fn publish_directory(
    store: &dyn BucketStore,
    dir: &Path,
    options: &PublishOptions,
) -> Result<PublishSummary, PublishError> {
    if !dir.is_dir() {
        return Err(PublishError::MissingDirectory(dir.to_path_buf()));
    }

    let mut summary = PublishSummary::default();
    for path in export_files(dir)? {
        let relative = path
            .strip_prefix(dir)
            .map_err(|err| PublishError::Walk(err.to_string()))?;
        let key = object_key(&options.prefix, relative);
        let contents = fs::read(&path).map_err(|source| PublishError::Io {
            path: path.clone(),
            source,
        })?;
        let metadata = ObjectMetadata::new(content_type(&path))
            .with_cache_control(options.cache_control.as_str());

        summary.bytes += contents.len() as u64;
        store
            .put_object(&key, Bytes::from(contents), &metadata)
            .await?;
        debug!(key = %key, "Published export file");
        summary.uploaded.push(key);
    }

    if options.delete_stale {
        let current: BTreeSet<&str> = summary.uploaded.iter().map(String::as_str).collect();
        let listing_prefix = match options.prefix.trim_matches('/') {
            "" => String::new(),
            prefix => format!("{prefix}/"),
        };
        for key in store.list_keys(&listing_prefix).await? {
            if !current.contains(key.as_str()) {
                store.delete_object(&key).await?;
                summary.deleted.push(key);
            }
        }
    }

    info!(
        uploaded = summary.uploaded.len(),
        deleted = summary.deleted.len(),
        bytes = summary.bytes,
        prefix = %options.prefix,
        "Published export directory"
    );
    Ok(summary)
}

fn export_files(dir: &Path) -> Result<Vec<PathBuf>, PublishError> {
    let root = dir
        .to_str()
        .ok_or_else(|| PublishError::Walk(format!("{} is not valid UTF-8", dir.display())))?;
    let pattern = format!("{}/**/*", glob::Pattern::escape(root));
    let mut files = Vec::new();
    for entry in glob::glob(&pattern).map_err(|err| PublishError::Walk(err.to_string()))? {
        let path = entry.map_err(|err| PublishError::Walk(err.to_string()))?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn object_key(prefix: &str, relative: &Path) -> String {
    let relative = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    match prefix.trim_matches('/') {
        "" => relative,
        prefix => format!("{prefix}/{relative}"),
    }
}

fn content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("json") => "application/json",
        Some("jsonl") | Some("ndjson") => "application/x-ndjson",
        Some("csv") => "text/csv",
        Some("txt") => "text/plain",
        Some("gz") => "application/gzip",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_keys_join_prefix_and_relative_path() {
        assert_eq!(
            object_key("/leidata/", Path::new("entities.ftm.json")),
            "leidata/entities.ftm.json"
        );
        assert_eq!(object_key("", Path::new("a/b.json")), "a/b.json");
    }

    #[test]
    fn content_types_follow_extension() {
        assert_eq!(content_type(Path::new("index.json")), "application/json");
        assert_eq!(content_type(Path::new("x.NDJSON")), "application/x-ndjson");
        assert_eq!(content_type(Path::new("blob")), "application/octet-stream");
    }
}
