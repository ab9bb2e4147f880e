//! No-clobber persistence for cleaned tables and reports.
//!
//! Everything is written to a temporary file next to the destination and
//! only moved into place once complete, so a failed run leaves nothing behind
//! and an existing file is never overwritten.

use csv::Writer;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::analysis::types::Dataset;
use crate::error::{PipelineError, Result};

/// Fails with [`PipelineError::AlreadyExists`] if `path` is taken.
pub fn ensure_absent(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(PipelineError::AlreadyExists {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

/// An output file under construction.
pub struct StagedFile {
    dest: PathBuf,
    temp: NamedTempFile,
}

impl StagedFile {
    pub fn create(dest: &Path) -> Result<Self> {
        ensure_absent(dest)?;

        let dir = match dest.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let temp = NamedTempFile::new_in(dir)?;
        debug!(dest = %dest.display(), temp = %temp.path().display(), "Staging output");

        Ok(Self {
            dest: dest.to_path_buf(),
            temp,
        })
    }

    pub fn file(&mut self) -> &mut File {
        self.temp.as_file_mut()
    }

    /// Moves the staged file to its destination without replacing anything.
    pub fn persist(self) -> Result<()> {
        let dest = self.dest;
        self.temp.persist_noclobber(&dest).map_err(|e| {
            if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                PipelineError::AlreadyExists { path: dest.clone() }
            } else {
                PipelineError::Io(e.error)
            }
        })?;
        Ok(())
    }
}

/// Writes a dataset as CSV: its columns as the header, missing values blank.
pub fn write_dataset(path: &Path, dataset: &Dataset) -> Result<()> {
    let mut staged = StagedFile::create(path)?;
    {
        let mut writer = Writer::from_writer(staged.file());
        write_dataset_to(&mut writer, dataset)?;
        writer.flush()?;
    }
    staged.persist()
}

pub fn write_dataset_to<W: Write>(writer: &mut Writer<W>, dataset: &Dataset) -> Result<()> {
    writer.write_record(&dataset.columns)?;
    for row in &dataset.rows {
        let values = dataset
            .columns
            .iter()
            .map(|c| row.get(c).map(ToString::to_string).unwrap_or_default());
        writer.write_record(values)?;
    }
    Ok(())
}

/// Writes `value` as pretty-printed JSON.
pub fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    let mut staged = StagedFile::create(path)?;
    serde_json::to_writer_pretty(&mut *staged.file(), value)?;
    staged.file().write_all(b"\n")?;
    staged.persist()
}
