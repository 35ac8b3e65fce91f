//! Error types for the query engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FilterError>;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Query needs the {0} index, but it was not loaded")]
    MissingIndex(&'static str),

    #[error("Query compares against related records, but no record store was supplied")]
    RecordStoreRequired,

    #[error("Query is empty: no condition survived parsing")]
    EmptyQuery,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Output file already exists: {0}")]
    OutputExists(String),
}
