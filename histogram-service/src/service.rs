use crate::assembler::{HistogramResponse, ResponseAssembler};
use crate::cache::CacheStats;
use crate::config::{PlotGroupConfig, PlotsConfig, ServerConfig};
use crate::error::{HistogramError, Result};
use crate::fetch::HistogramFetcher;
use crate::overlay::OverlayRenderer;
use crate::resolver::{HistogramRequest, QueryResolver};
use dqm_meta_index::{IndexRefreshScheduler, RecordFilter};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// A configured detector group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    pub group_name: String,
    pub group_directory: String,
    pub description: Option<String>,
    pub plot_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run: u32,
    pub era: String,
}

/// Available runs of one group, most recent first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRuns {
    pub group_name: String,
    pub group_directory: String,
    pub runs: Vec<RunInfo>,
}

/// Entry point of the histogram backend: owns the index scheduler, the
/// resolver and the response assembler.
pub struct HistogramService {
    config: Arc<PlotsConfig>,
    scheduler: IndexRefreshScheduler,
    resolver: QueryResolver,
    assembler: ResponseAssembler,
}

impl HistogramService {
    pub fn new(
        config: PlotsConfig,
        scheduler: IndexRefreshScheduler,
        fetcher: Arc<dyn HistogramFetcher>,
        renderer: Arc<dyn OverlayRenderer>,
    ) -> Result<Self> {
        config.validate().map_err(HistogramError::Config)?;

        info!(
            "Initializing histogram service with {} groups",
            config.groups.len()
        );

        let config = Arc::new(config);
        let resolver = QueryResolver::from_config(&config)?;
        let assembler = ResponseAssembler::new(config.clone(), fetcher, renderer)?;

        Ok(Self {
            config,
            scheduler,
            resolver,
            assembler,
        })
    }

    pub fn from_server_config(
        config: &ServerConfig,
        fetcher: Arc<dyn HistogramFetcher>,
        renderer: Arc<dyn OverlayRenderer>,
    ) -> Result<Self> {
        config.validate()?;
        let scheduler = IndexRefreshScheduler::from_config(&config.meta_store)?;
        Self::new(config.plots.clone(), scheduler, fetcher, renderer)
    }

    /// Distinct eras, optionally restricted to some groups (by name).
    pub async fn list_eras(&self, groups: Option<&[String]>) -> Result<Vec<String>> {
        let index = self.scheduler.current().await?;
        let directories = self.group_directories(groups);
        if directories.as_ref().is_some_and(Vec::is_empty) {
            return Ok(Vec::new());
        }
        Ok(index.eras(directories.as_deref()).into_iter().collect())
    }

    /// Distinct datasets, optionally restricted to some groups (by name).
    pub async fn list_datasets(&self, groups: Option<&[String]>) -> Result<Vec<String>> {
        let index = self.scheduler.current().await?;
        let directories = self.group_directories(groups);
        if directories.as_ref().is_some_and(Vec::is_empty) {
            return Ok(Vec::new());
        }
        Ok(index.datasets(directories.as_deref()).into_iter().collect())
    }

    pub fn list_groups(&self) -> Vec<GroupSummary> {
        self.config
            .groups
            .iter()
            .map(|group| GroupSummary {
                group_name: group.group_name.clone(),
                group_directory: group.group_directory.clone(),
                description: group.description.clone(),
                plot_count: group.plots.len(),
            })
            .collect()
    }

    /// Runs per configured group, most recent first and at most `limit` per
    /// era (`max_era_run_size` by default). Groups without runs are left out.
    /// A `limit` of 0 is rejected.
    pub async fn list_runs(
        &self,
        groups: Option<&[String]>,
        eras: Option<&[String]>,
        limit: Option<usize>,
    ) -> Result<Vec<GroupRuns>> {
        let cap = limit.unwrap_or(self.config.max_era_run_size);
        if cap == 0 {
            return Err(HistogramError::Config(
                "run limit must be at least 1".to_string(),
            ));
        }

        let index = self.scheduler.current().await?;

        let mut filter = RecordFilter::new();
        if let Some(directories) = self.group_directories(groups) {
            filter = filter.with_groups(directories);
        }
        if let Some(eras) = eras.filter(|eras| !eras.is_empty()) {
            filter = filter.with_eras(eras.iter().cloned());
        }

        let selection = index.resolve(&filter, cap);

        Ok(self
            .config
            .groups
            .iter()
            .filter_map(|group| {
                let runs = selection.get(&group.group_directory)?;
                Some(GroupRuns {
                    group_name: group.group_name.clone(),
                    group_directory: group.group_directory.clone(),
                    runs: runs
                        .iter()
                        .rev()
                        .map(|(run, era)| RunInfo {
                            run: *run,
                            era: era.clone(),
                        })
                        .collect(),
                })
            })
            .collect())
    }

    /// Resolve and assemble histograms for `request`.
    pub async fn get_histograms(&self, request: HistogramRequest) -> Result<HistogramResponse> {
        let start = Instant::now();
        let request = request.normalized();
        debug!("Histogram request: {request:?}");

        let index = self.scheduler.current().await?;
        // Without a group filter the configured groups bound the selection,
        // including the latest-run fallback.
        let directories = self
            .group_directories(request.groups.as_deref())
            .unwrap_or_else(|| {
                self.config
                    .groups
                    .iter()
                    .map(|group| group.group_directory.clone())
                    .collect()
            });
        let selection = self
            .resolver
            .resolve(&index, &request, Some(directories.as_slice()))?;
        debug!("Resolved selection: {selection:?}");

        let groups: Vec<&PlotGroupConfig> = self
            .config
            .groups
            .iter()
            .filter(|group| {
                request
                    .groups
                    .as_ref()
                    .is_none_or(|names| names.contains(&group.group_name))
            })
            .collect();
        let groups_data = self.assembler.assemble(&index, &selection, &groups).await;

        info!(
            "Histogram request served in {}ms: {} groups",
            start.elapsed().as_millis(),
            groups_data.len()
        );

        Ok(HistogramResponse {
            groups: request.groups,
            eras: request.eras,
            runs: request.runs,
            groups_data,
        })
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.assembler.cache_stats()
    }

    pub fn clear_cache(&self) {
        self.assembler.clear_cache();
        info!("Response cache cleared");
    }

    pub fn scheduler(&self) -> &IndexRefreshScheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &PlotsConfig {
        &self.config
    }

    fn group_directories(&self, groups: Option<&[String]>) -> Option<Vec<String>> {
        groups
            .filter(|names| !names.is_empty())
            .map(|names| self.config.group_directories(names))
    }
}
