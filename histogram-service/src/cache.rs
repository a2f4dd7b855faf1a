use crate::artifact::ArtifactSet;
use crate::config::PlotGroupConfig;
use crate::error::{HistogramError, Result};
use dqm_meta_index::Record;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Cache key of one group's artifacts for one record.
///
/// Covers every field of the group except its plot list, and the full record.
pub fn cache_key(group: &PlotGroupConfig, record: &Record) -> String {
    let mut hasher = Sha256::new();
    for field in [
        group.group_name.as_str(),
        group.group_directory.as_str(),
        group.tdirectory.as_str(),
        group.description.as_deref().unwrap_or_default(),
        record.group_directory.as_str(),
        record.era.as_str(),
        record.dataset.as_str(),
        record.location.as_str(),
    ] {
        hasher.update(field.as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(record.year.to_le_bytes());
    hasher.update(record.run.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

/// Bounded memo of per-(group, record) fetch results.
///
/// Lookups do not refresh recency, so a full cache evicts the entry inserted
/// first.
pub struct ResponseCache {
    entries: Mutex<LruCache<String, Arc<ArtifactSet>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| HistogramError::Cache("Invalid cache size".to_string()))?;
        Ok(Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    pub fn get(&self, key: &str) -> Option<Arc<ArtifactSet>> {
        let found = self.lock().peek(key).cloned();
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    pub fn insert(&self, key: String, artifacts: Arc<ArtifactSet>) {
        self.lock().put(key, artifacts);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.lock();
        CacheStats {
            size: entries.len(),
            capacity: entries.cap().get(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, Arc<ArtifactSet>>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
