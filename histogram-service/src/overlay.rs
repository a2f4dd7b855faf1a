use crate::artifact::{ArtifactSet, HistogramArtifact, OVERLAY_TYPE_TAG, SourceRun};
use dqm_meta_index::RunEraMap;
use log::{debug, warn};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;

/// Line attributes of one run inside an overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LineStyle {
    pub line_style: u32,
    pub line_color: u32,
    pub line_width: u32,
}

/// Assign line attributes to the contributing runs of one plot.
///
/// `runs` holds `(run, era)` in input order. Colors 0 and 1 are the default
/// and black, so assigned colors start at 2. With a single era every run gets
/// its own color; with several eras the color and width follow the era's
/// position among the sorted distinct eras and the style tells runs apart.
pub fn assign_styles(runs: &[(u32, &str)]) -> Vec<LineStyle> {
    let unique_eras: Vec<&str> = runs
        .iter()
        .map(|(_, era)| *era)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    runs.iter()
        .enumerate()
        .map(|(position, (_, era))| {
            let position = position as u32;
            if unique_eras.len() <= 1 {
                LineStyle {
                    line_style: position + 1,
                    line_color: position + 2,
                    line_width: position + 1,
                }
            } else {
                let era_index = unique_eras
                    .iter()
                    .position(|unique| unique == era)
                    .unwrap_or_default() as u32;
                LineStyle {
                    line_style: position + 1,
                    line_color: era_index + 2,
                    line_width: era_index + 1,
                }
            }
        })
        .collect()
}

/// One run's histogram handed to a renderer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayMember<'a> {
    pub run: u32,
    pub era: &'a str,
    pub payload: &'a str,
    pub style: LineStyle,
    /// `{era}-{run}`
    pub legend: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("Nothing to render")]
    Empty,

    #[error("Invalid payload of run {run}: {reason}")]
    InvalidPayload { run: u32, reason: String },

    #[error("Serialization failed: {0}")]
    Serialization(String),
}

/// Composes the member histograms of one plot into a single payload.
pub trait OverlayRenderer: Send + Sync {
    fn render(&self, title: &str, members: &[OverlayMember<'_>]) -> Result<String, RenderError>;
}

/// Renders a JSON stack document: the member histograms with their line
/// attributes and legend entries, drawn unstacked by the client.
#[derive(Debug, Clone, Default)]
pub struct JsonStackRenderer;

#[derive(Serialize)]
struct StackDocument<'a> {
    #[serde(rename = "_typename")]
    typename: &'static str,
    title: &'a str,
    members: Vec<StackMember<'a>>,
}

#[derive(Serialize)]
struct StackMember<'a> {
    run: u32,
    era: &'a str,
    legend: &'a str,
    #[serde(flatten)]
    style: LineStyle,
    histogram: serde_json::Value,
}

impl OverlayRenderer for JsonStackRenderer {
    fn render(&self, title: &str, members: &[OverlayMember<'_>]) -> Result<String, RenderError> {
        if members.is_empty() {
            return Err(RenderError::Empty);
        }

        let mut stacked = Vec::with_capacity(members.len());
        for member in members {
            let histogram: serde_json::Value =
                serde_json::from_str(member.payload).map_err(|e| RenderError::InvalidPayload {
                    run: member.run,
                    reason: e.to_string(),
                })?;
            stacked.push(StackMember {
                run: member.run,
                era: member.era,
                legend: &member.legend,
                style: member.style,
                histogram,
            });
        }

        serde_json::to_string(&StackDocument {
            typename: "DqmStack",
            title,
            members: stacked,
        })
        .map_err(|e| RenderError::Serialization(e.to_string()))
    }
}

/// Merges the per-run artifacts of a group into one artifact per plot.
#[derive(Clone)]
pub struct OverlayCoordinator {
    renderer: Arc<dyn OverlayRenderer>,
    draw_option: Option<String>,
}

impl OverlayCoordinator {
    pub fn new(renderer: Arc<dyn OverlayRenderer>, draw_option: Option<String>) -> Self {
        Self {
            renderer,
            draw_option,
        }
    }

    /// Overlay every plot of a group.
    ///
    /// `run_sets` holds `(run, artifacts)` in input order, each set aligned
    /// with the group's `plot_count` plots. Position `i` of every set is the
    /// same plot. A plot no run contributed to is left out of the result.
    pub fn combine(
        &self,
        run_sets: &[(u32, ArtifactSet)],
        run_era_map: &RunEraMap,
        plot_count: usize,
    ) -> Vec<HistogramArtifact> {
        (0..plot_count)
            .filter_map(|position| {
                let contributions: Vec<(u32, &HistogramArtifact)> = run_sets
                    .iter()
                    .filter_map(|(run, set)| {
                        set.get(position)
                            .and_then(Option::as_ref)
                            .filter(|artifact| !artifact.payload.is_empty())
                            .map(|artifact| (*run, artifact))
                    })
                    .collect();
                self.overlay_plot(&contributions, run_era_map)
            })
            .collect()
    }

    /// Overlay the contributions of one plot, `None` when there are none.
    pub fn overlay_plot(
        &self,
        contributions: &[(u32, &HistogramArtifact)],
        run_era_map: &RunEraMap,
    ) -> Option<HistogramArtifact> {
        let (_, first) = contributions.first()?;

        let runs: Vec<(u32, &str)> = contributions
            .iter()
            .map(|(run, _)| {
                let era = run_era_map.get(run).map(String::as_str).unwrap_or_default();
                (*run, era)
            })
            .collect();
        let styles = assign_styles(&runs);

        let members: Vec<OverlayMember<'_>> = contributions
            .iter()
            .zip(runs.iter().zip(styles))
            .map(|((_, artifact), ((run, era), style))| OverlayMember {
                run: *run,
                era,
                payload: &artifact.payload,
                style,
                legend: format!("{era}-{run}"),
            })
            .collect();

        let payload = match self.renderer.render(&first.conf_name, &members) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Overlay of {} failed: {e}", first.conf_name);
                String::new()
            }
        };
        debug!(
            "Overlaid {} from {} runs",
            first.conf_name,
            contributions.len()
        );

        Some(HistogramArtifact {
            identity: first.identity.clone(),
            payload,
            dqm_url: first.dqm_url.clone(),
            draw_option: self.draw_option.clone(),
            source: SourceRun::Overlay,
            type_tag: OVERLAY_TYPE_TAG.to_string(),
            hist_name: first.hist_name.clone(),
            conf_name: first.conf_name.clone(),
        })
    }
}
