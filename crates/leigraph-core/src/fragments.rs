//! The fragment stream: one JSON-serialized [`Fragment`] per line.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

use crate::entity::Fragment;

#[derive(Debug, Error)]
pub enum FragmentError {
    #[error("fragment file I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} line {line}: invalid fragment: {source}")]
    Decode {
        path: PathBuf,
        line: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize fragment {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentSummary {
    pub fragments: u64,
    pub by_schema: BTreeMap<String, u64>,
}

impl FragmentSummary {
    fn record(&mut self, fragment: &Fragment) {
        self.fragments += 1;
        *self.by_schema.entry(fragment.schema().to_string()).or_default() += 1;
    }
}

/// Appends fragments to any writer, one compact JSON object per line.
pub struct FragmentWriter<W: Write> {
    out: W,
    path: PathBuf,
    summary: FragmentSummary,
}

impl<W: Write> FragmentWriter<W> {
    pub fn new(out: W, path: impl Into<PathBuf>) -> Self {
        Self {
            out,
            path: path.into(),
            summary: FragmentSummary::default(),
        }
    }

    pub fn write(&mut self, fragment: &Fragment) -> Result<(), FragmentError> {
        serde_json::to_writer(&mut self.out, fragment).map_err(|source| {
            FragmentError::Encode {
                key: fragment.key().to_string(),
                source,
            }
        })?;
        self.out.write_all(b"\n").map_err(|source| self.io_error(source))?;
        self.summary.record(fragment);
        Ok(())
    }

    pub fn write_all(&mut self, fragments: &[Fragment]) -> Result<(), FragmentError> {
        for fragment in fragments {
            self.write(fragment)?;
        }
        Ok(())
    }

    pub fn summary(&self) -> &FragmentSummary {
        &self.summary
    }

    pub fn into_inner(mut self) -> Result<(W, FragmentSummary), FragmentError> {
        self.out.flush().map_err(|source| self.io_error(source))?;
        Ok((self.out, self.summary))
    }

    fn io_error(&self, source: std::io::Error) -> FragmentError {
        FragmentError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

/// Fragment file that only appears at its destination once complete.
///
/// Writes go to a temporary file in the destination directory; `finish`
/// renames it into place. Dropping without `finish` deletes the temporary file.
pub struct AtomicFragmentFile {
    writer: FragmentWriter<BufWriter<NamedTempFile>>,
    final_path: PathBuf,
}

impl AtomicFragmentFile {
    pub fn create(final_path: impl AsRef<Path>) -> Result<Self, FragmentError> {
        let final_path = final_path.as_ref().to_path_buf();
        let parent = match final_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let io_error = |source| FragmentError::Io {
            path: final_path.clone(),
            source,
        };

        fs::create_dir_all(&parent).map_err(io_error)?;
        let temp_file = NamedTempFile::new_in(&parent).map_err(io_error)?;
        let writer = FragmentWriter::new(BufWriter::new(temp_file), final_path.clone());

        Ok(Self { writer, final_path })
    }

    pub fn writer_mut(&mut self) -> &mut FragmentWriter<BufWriter<NamedTempFile>> {
        &mut self.writer
    }

    pub fn write(&mut self, fragment: &Fragment) -> Result<(), FragmentError> {
        self.writer.write(fragment)
    }

    pub fn path(&self) -> &Path {
        &self.final_path
    }

    pub fn finish(self) -> Result<FragmentSummary, FragmentError> {
        let final_path = self.final_path;
        let io_error = |source| FragmentError::Io {
            path: final_path.clone(),
            source,
        };

        let (buf_writer, summary) = self.writer.into_inner()?;
        let temp_file = buf_writer
            .into_inner()
            .map_err(|err| io_error(err.into_error()))?;
        temp_file.as_file().sync_all().map_err(io_error)?;
        temp_file
            .persist(&final_path)
            .map_err(|err| io_error(err.error))?;
        Ok(summary)
    }
}

/// Streams fragments back from a fragment file.
pub fn read_fragments(path: &Path) -> Result<FragmentReader, FragmentError> {
    let file = File::open(path).map_err(|source| FragmentError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(FragmentReader {
        lines: BufReader::new(file).lines(),
        path: path.to_path_buf(),
        line: 0,
    })
}

pub struct FragmentReader {
    lines: Lines<BufReader<File>>,
    path: PathBuf,
    line: u64,
}

impl Iterator for FragmentReader {
    type Item = Result<Fragment, FragmentError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(source) => {
                    return Some(Err(FragmentError::Io {
                        path: self.path.clone(),
                        source,
                    }))
                }
            };
            self.line += 1;
            if line.trim().is_empty() {
                continue;
            }
            return Some(serde_json::from_str(&line).map_err(|source| {
                FragmentError::Decode {
                    path: self.path.clone(),
                    line: self.line,
                    source,
                }
            }));
        }
    }
}
