use crate::error::{MetaIndexError, Result};
use crate::index::MetadataIndex;
use crate::record::Record;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::SystemTime;

/// On-disk form of a metadata index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSnapshot {
    /// Version of the snapshot format
    pub version: u32,

    /// When the snapshot was written
    pub created_at: SystemTime,

    pub records: Vec<Record>,
}

impl IndexSnapshot {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn from_index(index: &MetadataIndex) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            created_at: SystemTime::now(),
            records: index.records().to_vec(),
        }
    }

    pub fn into_index(self) -> MetadataIndex {
        let (index, duplicates) = MetadataIndex::from_records(self.records);
        if duplicates > 0 {
            warn!("Snapshot contained {duplicates} duplicate records");
        }
        index
    }
}

/// Write `index` to `path` as JSON. The file is replaced atomically through a
/// sibling temp file, so readers see either the old or the new snapshot.
pub fn save_snapshot(path: &Path, index: &MetadataIndex) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let snapshot = IndexSnapshot::from_index(index);
    let data = serde_json::to_vec(&snapshot)?;

    let tmp_path = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;

    info!("Saved {} records to snapshot {:?}", index.len(), path);
    Ok(())
}

pub fn load_snapshot(path: &Path) -> Result<MetadataIndex> {
    let content = fs::read(path)?;
    let snapshot: IndexSnapshot = serde_json::from_slice(&content)?;

    if snapshot.version != IndexSnapshot::CURRENT_VERSION {
        return Err(MetaIndexError::SnapshotVersion {
            found: snapshot.version,
            expected: IndexSnapshot::CURRENT_VERSION,
        });
    }

    let index = snapshot.into_index();
    info!("Loaded {} records from snapshot {:?}", index.len(), path);
    Ok(index)
}
