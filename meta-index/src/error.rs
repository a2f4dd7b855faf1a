use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetaIndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Metadata index is empty")]
    EmptyIndex,

    #[error("No runs recorded in {0}")]
    NoRunsInYear(i32),

    #[error("No record for group {group_directory} and run {run}")]
    NotFound { group_directory: String, run: u32 },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid path pattern: {0}")]
    Pattern(String),

    #[error("Index build failed: {0}")]
    Build(String),

    #[error("Unsupported snapshot version: {found} (expected {expected})")]
    SnapshotVersion { found: u32, expected: u32 },
}

/// Why a single listed path could not become a record.
///
/// These are absorbed by the builder (skipped and counted), never surfaced as
/// a build failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("path does not match the DQM file pattern: {0}")]
    NoMatch(String),

    #[error("invalid {field} in {path}: {value}")]
    InvalidNumber {
        path: String,
        field: &'static str,
        value: String,
    },

    #[error("dataset label has no era in {0}")]
    MissingEra(String),
}

pub type Result<T> = std::result::Result<T, MetaIndexError>;
