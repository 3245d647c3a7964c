use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Caller misuse of the field lists. Not recoverable by retrying.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SchemaError {
    #[error("target field list is empty")]
    EmptyTargetFields,

    #[error("empty field name at position {position} in {list} list")]
    EmptyFieldName { list: &'static str, position: usize },

    #[error("duplicate field name '{name}' in {list} list")]
    DuplicateField { list: &'static str, name: String },
}

/// Failure talking to the suggestion oracle or reading its answer.
/// Recoverable by the caller retrying.
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("oracle transport failure: {0}")]
    Transport(String),

    #[error("oracle returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("oracle response is not a valid mapping document: {0}")]
    MalformedResponse(String),

    #[error("oracle did not answer within {0:?}")]
    Timeout(Duration),

    #[error("oracle request was cancelled")]
    Cancelled,
}

impl From<reqwest::Error> for OracleError {
    fn from(error: reqwest::Error) -> Self {
        Self::Transport(error.to_string())
    }
}

/// Failure reading a field list from disk.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("{path} has no '{column}' column")]
    MissingColumn {
        path: PathBuf,
        column: &'static str,
    },

    #[error("invalid field list in {path}: {source}")]
    Schema { path: PathBuf, source: SchemaError },
}

/// Anything that can stop one supplier from getting a mapping table.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("supplier task failed: {0}")]
    Task(String),
}
