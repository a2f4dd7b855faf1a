/*!
# DQM Meta Index

In-memory index of stored DQM files, one record per (run, detector group).

## Features

- **Path parsing**: run year, run number, era, detector group and dataset are
  extracted from the storage layout of each file
- **Point and filtered queries**: O(1) `(group, run)` lookup, era listing,
  filter-and-cap resolution to `{group -> {run -> era}}`
- **Snapshot refresh**: the index is rebuilt wholesale once it is older than
  the retention period; readers always see a complete index
- **Snapshot persistence**: an index can be written to and loaded from JSON

## Example

```rust,no_run
use dqm_meta_index::{IndexRefreshScheduler, MetaStoreConfig, RecordFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = MetaStoreConfig::default();
    let scheduler = IndexRefreshScheduler::from_config(&config)?;

    let index = scheduler.current().await?;
    let latest = index.max_run()?;
    let selection = index.resolve(&RecordFilter::new().with_runs([latest]), 5);

    for (group, runs) in selection {
        println!("{group}: {runs:?}");
    }

    Ok(())
}
```
*/

mod builder;
mod config;
mod error;
mod index;
mod lister;
mod parser;
mod record;
mod scheduler;
mod snapshot;

pub use builder::{BuildStats, IndexBuilder};
pub use config::{IndexSourceKind, MetaStoreConfig};
pub use error::{MetaIndexError, ParseError, Result};
pub use index::{MetadataIndex, RecordFilter, ResolvedSelection, RunEraMap, resolve_records};
pub use lister::{FsPathLister, Listing, ListingFileLister, PathLister, StaticLister};
pub use parser::PathParser;
pub use record::{Record, RecordKey};
pub use scheduler::{IndexGeneration, IndexRefreshScheduler, IndexSource};
pub use snapshot::{IndexSnapshot, load_snapshot, save_snapshot};
