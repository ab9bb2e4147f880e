//! Error kinds shared by the cleaning and analysis stages.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// The destination table is already on disk.
    #[error("{} already exists. Back it up or delete it.", path.display())]
    AlreadyExists { path: PathBuf },

    /// One or more required canonical fields are absent.
    #[error("required fields not found: {}", missing.join(", "))]
    SchemaMismatch { missing: Vec<String> },

    #[error("malformed row at line {line}: {detail}")]
    MalformedRow { line: u64, detail: String },

    #[error("field {field} holds non-integer value {value:?}")]
    NotNumeric { field: String, value: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn schema_mismatch<I, S>(missing: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PipelineError::SchemaMismatch {
            missing: missing.into_iter().map(Into::into).collect(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
