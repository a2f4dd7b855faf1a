use crate::config::{FallbackStrategy, PlotsConfig};
use crate::error::{HistogramError, Result};
use dqm_meta_index::{MetadataIndex, RecordFilter, ResolvedSelection};
use log::debug;
use serde::{Deserialize, Serialize};

/// Client request for histograms. Absent lists match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramRequest {
    /// Group names as configured, not storage directories
    #[serde(default)]
    pub groups: Option<Vec<String>>,

    #[serde(default)]
    pub eras: Option<Vec<String>>,

    #[serde(default)]
    pub runs: Option<Vec<u32>>,
}

impl HistogramRequest {
    /// Treat empty lists as absent.
    pub fn normalized(self) -> Self {
        fn non_empty<T>(values: Option<Vec<T>>) -> Option<Vec<T>> {
            values.filter(|values| !values.is_empty())
        }

        Self {
            groups: non_empty(self.groups),
            eras: non_empty(self.eras),
            runs: non_empty(self.runs),
        }
    }
}

/// Turns a request into `{group_directory -> {run -> era}}`.
#[derive(Debug, Clone, Copy)]
pub struct QueryResolver {
    per_era_run_cap: usize,
    fallback: FallbackStrategy,
}

impl QueryResolver {
    /// Fails when `per_era_run_cap` is 0.
    pub fn new(per_era_run_cap: usize, fallback: FallbackStrategy) -> Result<Self> {
        if per_era_run_cap == 0 {
            return Err(HistogramError::Config(
                "per-era run cap must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            per_era_run_cap,
            fallback,
        })
    }

    pub fn from_config(config: &PlotsConfig) -> Result<Self> {
        Self::new(config.max_era_run_size, config.fallback)
    }

    /// Resolve `request` against `index`.
    ///
    /// `group_directories` restricts the groups (`None` means all). When the
    /// request names neither eras nor runs, only the most recent run is
    /// resolved; that needs a non-empty index.
    pub fn resolve(
        &self,
        index: &MetadataIndex,
        request: &HistogramRequest,
        group_directories: Option<&[String]>,
    ) -> Result<ResolvedSelection> {
        let mut filter = RecordFilter::new();
        if let Some(groups) = group_directories {
            filter = filter.with_groups(groups.iter().cloned());
        }

        match (&request.eras, &request.runs) {
            (None, None) => {
                let latest = self.latest_run(index, group_directories)?;
                debug!("No eras or runs requested, using latest run {latest}");
                filter = filter.with_runs([latest]);
            }
            (eras, runs) => {
                if let Some(eras) = eras {
                    filter = filter.with_eras(eras.iter().cloned());
                }
                if let Some(runs) = runs {
                    filter = filter.with_runs(runs.iter().copied());
                }
            }
        }

        Ok(index.resolve(&filter, self.per_era_run_cap))
    }

    fn latest_run(&self, index: &MetadataIndex, group_directories: Option<&[String]>) -> Result<u32> {
        let run = match self.fallback {
            FallbackStrategy::LatestGlobal => index.max_run()?,
            FallbackStrategy::LatestCommon => index.latest_common_run(group_directories)?,
        };
        Ok(run)
    }
}
