use crate::error::Result;
use crate::index::MetadataIndex;
use crate::lister::PathLister;
use crate::parser::PathParser;
use log::{info, warn};
use std::sync::Arc;
use std::time::Instant;

/// Statistics about one index build
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuildStats {
    pub paths_listed: usize,
    pub records_indexed: usize,
    pub parse_failures: usize,
    pub duplicates: usize,
    pub dirs_skipped: usize,
    pub elapsed_ms: u64,
}

/// Builds a [`MetadataIndex`] from a full listing of raw paths.
pub struct IndexBuilder {
    lister: Arc<dyn PathLister>,
    parser: PathParser,
}

impl IndexBuilder {
    pub fn new(lister: Arc<dyn PathLister>) -> Result<Self> {
        Ok(Self {
            lister,
            parser: PathParser::new()?,
        })
    }

    /// List, parse and index. Unparseable paths are skipped and counted; only
    /// a failure to obtain the listing itself is an error.
    pub fn build(&self) -> Result<(MetadataIndex, BuildStats)> {
        let start = Instant::now();
        info!("Building metadata index");

        let listing = self.lister.list()?;
        let mut stats = BuildStats {
            paths_listed: listing.paths.len(),
            dirs_skipped: listing.skipped_dirs.len(),
            ..Default::default()
        };

        let mut records = Vec::with_capacity(listing.paths.len());
        for path in &listing.paths {
            match self.parser.parse(path) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!("Skipping unparseable path: {e}");
                    stats.parse_failures += 1;
                }
            }
        }

        let (index, duplicates) = MetadataIndex::from_records(records);
        stats.duplicates = duplicates;
        stats.records_indexed = index.len();
        stats.elapsed_ms = start.elapsed().as_millis() as u64;

        if index.is_empty() {
            warn!("Metadata index build produced no records");
        }
        info!(
            "Metadata index built in {}ms: {} records from {} paths ({} unparseable, {} duplicates)",
            stats.elapsed_ms,
            stats.records_indexed,
            stats.paths_listed,
            stats.parse_failures,
            stats.duplicates
        );

        Ok((index, stats))
    }
}
