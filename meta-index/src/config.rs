use crate::lister::{FsPathLister, ListingFileLister, PathLister};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Where the metadata index is rebuilt from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexSourceKind {
    /// Walk `base_dir/Run{year}` directly
    #[default]
    Crawl,
    /// Read a newline-separated listing written by an external `find`
    ListingFile,
    /// Load a JSON snapshot written by `dqm build-index`
    Snapshot,
}

/// Configuration of the metadata store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaStoreConfig {
    /// Base DQM directory holding the `RunYYYY` trees
    pub base_dir: PathBuf,

    /// Source used on every rebuild
    #[serde(default)]
    pub source: IndexSourceKind,

    /// Number of run years to crawl, current year included
    #[serde(default = "default_last_n_run_years")]
    pub last_n_run_years: u32,

    /// File name glob of stored files
    #[serde(default = "default_file_suffix_pattern")]
    pub file_suffix_pattern: String,

    /// Listing file, required by the `listing_file` source
    #[serde(default)]
    pub listing_file: Option<PathBuf>,

    /// Snapshot file, required by the `snapshot` source and written by
    /// `dqm build-index`
    #[serde(default)]
    pub snapshot_file: Option<PathBuf>,

    /// How long a built index is served before the next request rebuilds it
    #[serde(default = "default_cache_retention_secs")]
    pub cache_retention_secs: u64,
}

fn default_last_n_run_years() -> u32 {
    2
}

fn default_file_suffix_pattern() -> String {
    "*DQMIO.root".to_string()
}

fn default_cache_retention_secs() -> u64 {
    600
}

impl Default for MetaStoreConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("/eos/cms/store/group/comm_dqm/DQMGUI_data"),
            source: IndexSourceKind::default(),
            last_n_run_years: default_last_n_run_years(),
            file_suffix_pattern: default_file_suffix_pattern(),
            listing_file: None,
            snapshot_file: None,
            cache_retention_secs: default_cache_retention_secs(),
        }
    }
}

impl MetaStoreConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.last_n_run_years == 0 {
            return Err("last_n_run_years must be > 0".to_string());
        }

        if self.file_suffix_pattern.trim().is_empty() {
            return Err("file_suffix_pattern must not be empty".to_string());
        }

        if self.cache_retention_secs == 0 {
            return Err("cache_retention_secs must be > 0".to_string());
        }

        match self.source {
            IndexSourceKind::ListingFile if self.listing_file.is_none() => {
                Err("source `listing_file` requires listing_file".to_string())
            }
            IndexSourceKind::Snapshot if self.snapshot_file.is_none() => {
                Err("source `snapshot` requires snapshot_file".to_string())
            }
            _ => Ok(()),
        }
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.cache_retention_secs)
    }

    /// Lister walking the configured base directory.
    pub fn crawl_lister(&self) -> Arc<dyn PathLister> {
        Arc::new(FsPathLister::for_recent_years(
            self.base_dir.clone(),
            self.last_n_run_years,
            &self.file_suffix_pattern,
        ))
    }

    /// Lister for the configured source, `None` for the snapshot source.
    pub fn lister(&self) -> Option<Arc<dyn PathLister>> {
        match self.source {
            IndexSourceKind::Crawl => Some(self.crawl_lister()),
            IndexSourceKind::ListingFile => self
                .listing_file
                .clone()
                .map(|path| Arc::new(ListingFileLister::new(path)) as Arc<dyn PathLister>),
            IndexSourceKind::Snapshot => None,
        }
    }
}
