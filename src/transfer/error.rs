use std::{io, path::PathBuf};
use thiserror::Error;

use crate::{api::error::StorageError, backend::rest::RestError};

/// Problems with an export's CSV table or metadata document.
///
/// Any of these aborts an import before a single run is created.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("the table has no {0} column")]
    MissingColumn(&'static str),
    #[error("column {0:?} appears more than once")]
    DuplicateColumn(String),
    #[error("line {line}: expected {expected} fields as declared by the header, found {found}")]
    HeaderMismatch { line: u64, expected: usize, found: usize },
    #[error("line {line}: the run_id is empty")]
    EmptyRunId { line: u64 },
    #[error("line {line}: run_id {run_id:?} is not a plain directory name")]
    UnsafeRunId { line: u64, run_id: String },
    #[error("line {line}: run {run_id} appears more than once")]
    DuplicateRun { line: u64, run_id: String },
    #[error("line {line}: {column} holds {value:?}, which is not a number")]
    NotNumeric { line: u64, column: String, value: String },
    #[error("line {line}: unknown run status {value:?}")]
    InvalidStatus { line: u64, value: String },
    #[error("the metadata document has no entry for run {0}")]
    MissingMetadata(String),
    #[error("malformed metadata document {path}: {source}")]
    MalformedMetadata { path: PathBuf, source: serde_json::Error },
    #[error("malformed table: {0}")]
    Csv(#[from] csv::Error),
}

/// A single artifact file that could not be transferred.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("listing the artifacts failed: {0:#}")]
    List(StorageError),
    #[error("downloading {path} failed: {source:#}")]
    Download { path: String, source: StorageError },
    #[error("uploading {path} failed: {source:#}")]
    Upload { path: String, source: StorageError },
    #[error("{path}: {source}")]
    Io { path: String, source: io::Error },
    #[error("refusing to transfer {0}: the path leaves the artifact root")]
    UnsafePath(String),
    #[error("{0} is listed more than once")]
    DuplicatePath(String),
    #[error("{0} is in the manifest but missing on disk")]
    Missing(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("experiment {0:?} does not exist")]
    NotFound(String),
    #[error("experiment {0:?} already exists")]
    AlreadyExists(String),
    #[error("experiment {0:?} exists but is deleted; restore it instead of creating a new one")]
    NameCollision(String),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Transfer(#[from] ArtifactError),
    #[error("the tracking server is temporarily unavailable: {0:#}")]
    TransientService(StorageError),
    #[error("the tracking server failed: {0:#}")]
    PermanentService(StorageError),
    #[error("{context}: {source}")]
    Io { context: String, source: io::Error },
}

impl Error {
    /// Sorts a backend error into transient or permanent.
    pub fn service(error: StorageError) -> Self {
        let transient = error
            .downcast_ref::<RestError>()
            .map_or(false, RestError::is_transient);
        if transient {
            Error::TransientService(error)
        } else {
            Error::PermanentService(error)
        }
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Error::Io { context: context.into(), source }
    }
}

impl From<StorageError> for Error {
    fn from(error: StorageError) -> Self {
        Error::service(error)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
