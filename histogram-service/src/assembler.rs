use crate::artifact::{ArtifactSet, HistogramArtifact, SourceRun, plot_identity};
use crate::cache::{CacheStats, ResponseCache, cache_key};
use crate::config::{OVERLAY_DRAW_KEY, PlotDefinition, PlotGroupConfig, PlotsConfig};
use crate::error::Result;
use crate::fetch::{FetchError, FetchPolicy, HistogramFetcher, fetch_with_policy};
use crate::overlay::{OverlayCoordinator, OverlayRenderer};
use dqm_meta_index::{MetadataIndex, Record, ResolvedSelection, RunEraMap};
use futures::future::join_all;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Histograms of one detector group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupResponse {
    pub group_name: String,
    pub group_directory: String,
    pub description: Option<String>,
    /// Runs the plots were built from
    pub run_era_map: RunEraMap,
    /// One artifact per configured plot that produced data, in configured order
    pub plots: Vec<HistogramArtifact>,
}

/// Answer to a histogram request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramResponse {
    pub groups: Option<Vec<String>>,
    pub eras: Option<Vec<String>>,
    pub runs: Option<Vec<u32>>,
    pub groups_data: Vec<GroupResponse>,
}

/// Builds group responses from a resolved selection: fetches every plot of
/// every (group, run), memoized per (group, record), and overlays groups that
/// resolved to more than one run.
pub struct ResponseAssembler {
    config: Arc<PlotsConfig>,
    fetcher: Arc<dyn HistogramFetcher>,
    coordinator: OverlayCoordinator,
    cache: ResponseCache,
    policy: FetchPolicy,
}

impl ResponseAssembler {
    pub fn new(
        config: Arc<PlotsConfig>,
        fetcher: Arc<dyn HistogramFetcher>,
        renderer: Arc<dyn OverlayRenderer>,
    ) -> Result<Self> {
        let coordinator = OverlayCoordinator::new(renderer, config.draw_option(OVERLAY_DRAW_KEY));
        let cache = ResponseCache::new(config.response_cache_size)?;
        let policy = FetchPolicy::from_config(&config);
        Ok(Self {
            config,
            fetcher,
            coordinator,
            cache,
            policy,
        })
    }

    /// Group responses for `groups`, in the given order. Groups that are not in
    /// the selection or produced no plot are left out.
    pub async fn assemble(
        &self,
        index: &MetadataIndex,
        selection: &ResolvedSelection,
        groups: &[&PlotGroupConfig],
    ) -> Vec<GroupResponse> {
        let mut responses = Vec::new();
        for &group in groups {
            let Some(run_era_map) = selection.get(&group.group_directory) else {
                debug!("No runs resolved for group {}", group.group_name);
                continue;
            };
            if let Some(response) = self.group_response(index, group, run_era_map).await {
                responses.push(response);
            }
        }
        responses
    }

    /// Plots of one group over the runs of `run_era_map`, raw for a single run
    /// and overlaid otherwise.
    pub async fn group_response(
        &self,
        index: &MetadataIndex,
        group: &PlotGroupConfig,
        run_era_map: &RunEraMap,
    ) -> Option<GroupResponse> {
        if run_era_map.is_empty() {
            return None;
        }

        let records: Vec<&Record> = run_era_map
            .keys()
            .rev()
            .filter_map(|run| match index.lookup(&group.group_directory, *run) {
                Ok(record) => Some(record),
                Err(e) => {
                    debug!("Skipping run {run} of {}: {e}", group.group_name);
                    None
                }
            })
            .collect();

        let fetched = join_all(
            records
                .iter()
                .map(|record| self.artifacts_of_run(group, record)),
        )
        .await;
        let run_sets: Vec<(u32, ArtifactSet)> = records
            .iter()
            .zip(fetched)
            .map(|(record, artifacts)| (record.run, artifacts.as_ref().clone()))
            .collect();

        let plots = if run_era_map.len() == 1 {
            run_sets
                .into_iter()
                .flat_map(|(_, artifacts)| artifacts.into_iter().flatten())
                .collect()
        } else {
            self.coordinator
                .combine(&run_sets, run_era_map, group.plots.len())
        };

        if plots.is_empty() {
            warn!("Group {} produced no plots", group.group_name);
            return None;
        }

        Some(GroupResponse {
            group_name: group.group_name.clone(),
            group_directory: group.group_directory.clone(),
            description: group.description.clone(),
            run_era_map: run_era_map.clone(),
            plots,
        })
    }

    /// Artifacts of one group for one record, served from the cache when
    /// possible. Results containing a transient failure are not cached.
    async fn artifacts_of_run(&self, group: &PlotGroupConfig, record: &Record) -> Arc<ArtifactSet> {
        let key = cache_key(group, record);
        if let Some(cached) = self.cache.get(&key) {
            debug!("Cache hit for {} run {}", group.group_name, record.run);
            return cached;
        }

        let fetched = join_all(
            group
                .plots
                .iter()
                .map(|plot| self.fetch_plot(group, plot, record)),
        )
        .await;

        let transient = fetched.iter().any(|(_, transient)| *transient);
        let artifacts: Arc<ArtifactSet> =
            Arc::new(fetched.into_iter().map(|(artifact, _)| artifact).collect());
        if !transient {
            self.cache.insert(key, artifacts.clone());
        }
        artifacts
    }

    /// Fetch one plot. Returns the artifact, if any, and whether the failure
    /// was transient.
    async fn fetch_plot(
        &self,
        group: &PlotGroupConfig,
        plot: &PlotDefinition,
        record: &Record,
    ) -> (Option<HistogramArtifact>, bool) {
        let object_path = group.object_path(plot, record.run);
        let fetched = match fetch_with_policy(
            self.fetcher.as_ref(),
            &record.location,
            &object_path,
            &self.policy,
        )
        .await
        {
            Ok(fetched) => fetched,
            Err(e @ FetchError::Zombie { .. }) => {
                warn!("Zombie histogram: {e}");
                return (None, false);
            }
            Err(e) => {
                warn!("Failed to fetch {} for run {}: {e}", plot.name, record.run);
                return (None, e.is_transient());
            }
        };

        if fetched.class_name != plot.expected_type {
            warn!(
                "Skipping {} of run {}: expected {}, found {}",
                plot.name, record.run, plot.expected_type, fetched.class_name
            );
            return (None, false);
        }

        let artifact = HistogramArtifact {
            identity: plot_identity(&plot.name),
            payload: fetched.payload,
            dqm_url: plot.display_link(&record.dataset, record.run),
            draw_option: self.config.draw_option(&fetched.class_name),
            source: SourceRun::Run(record.run),
            type_tag: fetched.class_name,
            hist_name: fetched.name,
            conf_name: plot.name.clone(),
        };
        (Some(artifact), false)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}
