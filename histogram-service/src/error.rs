use thiserror::Error;

#[derive(Error, Debug)]
pub enum HistogramError {
    #[error("Metadata index error: {0}")]
    MetaIndex(#[from] dqm_meta_index::MetaIndexError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Cache error: {0}")]
    Cache(String),
}

pub type Result<T> = std::result::Result<T, HistogramError>;
