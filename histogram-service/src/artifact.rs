use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// `type_tag` of merged artifacts
pub const OVERLAY_TYPE_TAG: &str = "overlay";

/// Where an artifact's payload came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceRun {
    /// Read from the stored file of one run
    Run(u32),
    /// Merged from several runs
    Overlay,
}

impl SourceRun {
    pub fn run(&self) -> Option<u32> {
        match self {
            Self::Run(run) => Some(*run),
            Self::Overlay => None,
        }
    }
}

/// One histogram ready for the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramArtifact {
    /// Stable identifier derived from the plot name
    pub identity: String,

    /// Serialized histogram (or overlay document); empty when rendering failed
    pub payload: String,

    /// Display link of the plot for this run
    pub dqm_url: String,

    pub draw_option: Option<String>,

    pub source: SourceRun,

    /// Histogram class, or `overlay`
    pub type_tag: String,

    /// Name of the stored object
    pub hist_name: String,

    /// Plot name from the configuration
    pub conf_name: String,
}

impl HistogramArtifact {
    pub fn is_overlay(&self) -> bool {
        self.source == SourceRun::Overlay
    }
}

/// Per-run artifacts of one group, aligned with the group's plot list.
/// `None` marks a plot that could not be fetched.
pub type ArtifactSet = Vec<Option<HistogramArtifact>>;

/// Identifier of a plot, the same for every run it is fetched from.
pub fn plot_identity(plot_name: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plot_name.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    format!("id{}", &hex[..16])
}
