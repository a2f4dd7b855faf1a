/*!
# DQM Histogram Service

Resolves histogram queries over the DQM metadata index and assembles grouped
responses, merging the same plot of several runs into one overlay.

## Architecture

```text
HistogramRequest {groups, eras, runs}
  └─> QueryResolver            {group -> {run -> era}}, per-era cap, latest-run fallback
        └─> ResponseAssembler  per (group, record), memoized
              ├─> HistogramFetcher      one artifact per configured plot
              └─> OverlayCoordinator    runs > 1: line attributes + OverlayRenderer
                    └─> HistogramResponse
```

## Example

```rust,no_run
use dqm_histogram_service::{
    HistogramFetcher, HistogramRequest, HistogramService, JsonStackRenderer, ServerConfig,
};
use std::sync::Arc;

# fn root_fetcher() -> Arc<dyn HistogramFetcher> { unimplemented!() }

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env()?;
    let service = HistogramService::from_server_config(
        &config,
        root_fetcher(),
        Arc::new(JsonStackRenderer),
    )?;

    let request = HistogramRequest {
        eras: Some(vec!["Run2024A".to_string()]),
        ..Default::default()
    };
    let response = service.get_histograms(request).await?;

    for group in response.groups_data {
        println!("{}: {} plots", group.group_name, group.plots.len());
    }

    Ok(())
}
```
*/

mod artifact;
mod assembler;
mod cache;
mod config;
mod error;
mod fetch;
mod overlay;
mod resolver;
mod service;

pub use artifact::{ArtifactSet, HistogramArtifact, OVERLAY_TYPE_TAG, SourceRun, plot_identity};
pub use assembler::{GroupResponse, HistogramResponse, ResponseAssembler};
pub use cache::{CacheStats, ResponseCache, cache_key};
pub use config::{
    CONFIG_DIR_ENV, CONFIG_FILE_NAME, FallbackStrategy, OVERLAY_DRAW_KEY, PlotDefinition,
    PlotGroupConfig, PlotsConfig, ServerConfig,
};
pub use error::{HistogramError, Result};
pub use fetch::{FetchError, FetchPolicy, FetchedHistogram, HistogramFetcher, fetch_with_policy};

#[cfg(any(test, feature = "test-support"))]
pub use fetch::StaticFetcher;
pub use overlay::{
    JsonStackRenderer, LineStyle, OverlayCoordinator, OverlayMember, OverlayRenderer,
    RenderError, assign_styles,
};
pub use resolver::{HistogramRequest, QueryResolver};
pub use service::{GroupRuns, GroupSummary, HistogramService, RunInfo};
