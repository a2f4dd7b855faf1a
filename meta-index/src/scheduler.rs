use crate::builder::{BuildStats, IndexBuilder};
use crate::config::{IndexSourceKind, MetaStoreConfig};
use crate::error::{MetaIndexError, Result};
use crate::index::MetadataIndex;
use crate::lister::PathLister;
use crate::snapshot::load_snapshot;
use arc_swap::ArcSwapOption;
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// How a fresh index is produced on refresh
pub enum IndexSource {
    /// List raw paths and parse them
    Build(IndexBuilder),
    /// Load a previously saved snapshot
    Snapshot(PathBuf),
}

impl IndexSource {
    pub fn from_lister(lister: Arc<dyn PathLister>) -> Result<Self> {
        Ok(Self::Build(IndexBuilder::new(lister)?))
    }

    pub fn from_config(config: &MetaStoreConfig) -> Result<Self> {
        config.validate().map_err(MetaIndexError::Config)?;
        match (config.source, config.lister(), &config.snapshot_file) {
            (IndexSourceKind::Snapshot, _, Some(path)) => Ok(Self::Snapshot(path.clone())),
            (_, Some(lister), _) => Self::from_lister(lister),
            _ => Err(MetaIndexError::Config(
                "no usable index source configured".to_string(),
            )),
        }
    }

    fn load(&self) -> Result<(MetadataIndex, Option<BuildStats>)> {
        match self {
            Self::Build(builder) => {
                let (index, stats) = builder.build()?;
                Ok((index, Some(stats)))
            }
            Self::Snapshot(path) => Ok((load_snapshot(path)?, None)),
        }
    }
}

/// One built index together with when it was built
#[derive(Debug, Clone)]
pub struct IndexGeneration {
    pub index: Arc<MetadataIndex>,
    pub built_at: Instant,
    pub stats: Option<BuildStats>,
}

impl IndexGeneration {
    pub fn age(&self) -> Duration {
        self.built_at.elapsed()
    }
}

/// Owns the current metadata index and rebuilds it once it is older than the
/// retention period.
///
/// Readers get an `Arc` of an immutable index; a rebuild swaps the pointer and
/// never touches a published index. Rebuilds are single-flight: concurrent
/// callers wait for the one in progress and reuse its result. The rebuild
/// runs in its own blocking task, so a caller that gives up waiting does not
/// cancel it.
#[derive(Clone)]
pub struct IndexRefreshScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    source: IndexSource,
    retention: Duration,
    current: ArcSwapOption<IndexGeneration>,
    refresh_permit: Arc<tokio::sync::Mutex<()>>,
    finished_refreshes: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl IndexRefreshScheduler {
    pub fn new(source: IndexSource, retention: Duration) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                source,
                retention,
                current: ArcSwapOption::empty(),
                refresh_permit: Arc::new(tokio::sync::Mutex::new(())),
                finished_refreshes: AtomicU64::new(0),
                last_error: Mutex::new(None),
            }),
        }
    }

    pub fn from_config(config: &MetaStoreConfig) -> Result<Self> {
        Ok(Self::new(IndexSource::from_config(config)?, config.retention()))
    }

    /// Current index, rebuilt first when missing or older than the retention.
    pub async fn current(&self) -> Result<Arc<MetadataIndex>> {
        if let Some(generation) = self.fresh_generation() {
            return Ok(generation.index.clone());
        }

        let seen_refreshes = self.inner.finished_refreshes.load(Ordering::Acquire);
        let permit = self.inner.refresh_permit.clone().lock_owned().await;

        if let Some(generation) = self.fresh_generation() {
            debug!("Reusing index rebuilt by a concurrent caller");
            return Ok(generation.index.clone());
        }
        if self.inner.finished_refreshes.load(Ordering::Acquire) != seen_refreshes {
            if let Some(message) = self.inner.last_error() {
                return Err(MetaIndexError::Build(message));
            }
        }

        self.spawn_refresh(permit).await
    }

    /// Rebuild now regardless of age, still single-flight.
    pub async fn refresh(&self) -> Result<Arc<MetadataIndex>> {
        let permit = self.inner.refresh_permit.clone().lock_owned().await;
        self.spawn_refresh(permit).await
    }

    /// Last published generation, fresh or not.
    pub fn generation(&self) -> Option<Arc<IndexGeneration>> {
        self.inner.current.load_full()
    }

    pub fn retention(&self) -> Duration {
        self.inner.retention
    }

    fn fresh_generation(&self) -> Option<Arc<IndexGeneration>> {
        self.inner
            .current
            .load_full()
            .filter(|generation| generation.age() < self.inner.retention)
    }

    async fn spawn_refresh(
        &self,
        permit: tokio::sync::OwnedMutexGuard<()>,
    ) -> Result<Arc<MetadataIndex>> {
        let inner = self.inner.clone();
        let task = tokio::task::spawn_blocking(move || {
            let result = inner.rebuild();
            drop(permit);
            result
        });
        task.await
            .map_err(|e| MetaIndexError::Build(format!("index refresh task failed: {e}")))?
    }
}

impl SchedulerInner {
    fn rebuild(&self) -> Result<Arc<MetadataIndex>> {
        info!("Refreshing metadata index");
        let result = self.source.load();
        let outcome = match result {
            Ok((index, stats)) => {
                let index = Arc::new(index);
                self.current.store(Some(Arc::new(IndexGeneration {
                    index: index.clone(),
                    built_at: Instant::now(),
                    stats,
                })));
                self.set_last_error(None);
                info!("Metadata index refreshed: {} records", index.len());
                Ok(index)
            }
            Err(e) => {
                warn!("Metadata index refresh failed: {e}");
                self.set_last_error(Some(e.to_string()));
                Err(e)
            }
        };
        self.finished_refreshes.fetch_add(1, Ordering::AcqRel);
        outcome
    }

    fn last_error(&self) -> Option<String> {
        match self.last_error.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_last_error(&self, error: Option<String>) {
        match self.last_error.lock() {
            Ok(mut guard) => *guard = error,
            Err(poisoned) => *poisoned.into_inner() = error,
        }
    }
}
