use crate::error::{HistogramError, Result};
use dqm_meta_index::MetaStoreConfig;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the configuration directory
pub const CONFIG_DIR_ENV: &str = "DQM_CONF";

/// File looked up inside [`CONFIG_DIR_ENV`]
pub const CONFIG_FILE_NAME: &str = "server.toml";

/// Draw option key used for overlaid artifacts
pub const OVERLAY_DRAW_KEY: &str = "overlay";

/// One histogram of a detector group
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlotDefinition {
    /// Object name inside the group's directory of the stored file
    pub name: String,

    /// Display link template, `{run}` and `{dataset}` are substituted
    pub dqm_link: String,

    /// Expected histogram class, e.g. `TH1F`
    #[serde(rename = "type")]
    pub expected_type: String,
}

impl PlotDefinition {
    pub fn display_link(&self, dataset: &str, run: u32) -> String {
        self.dqm_link
            .replace("{run}", &run.to_string())
            .replace("{dataset}", dataset)
    }
}

/// A detector group and its ordered plots
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlotGroupConfig {
    /// Name shown to clients, e.g. `HLT`
    pub group_name: String,

    /// Storage directory of the group, e.g. `HLTPhysics`
    pub group_directory: String,

    /// Directory of the plots inside a stored file; `{run}` is substituted
    pub tdirectory: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub plots: Vec<PlotDefinition>,
}

impl PlotGroupConfig {
    /// Full object path of `plot` inside the file of `run`.
    pub fn object_path(&self, plot: &PlotDefinition, run: u32) -> String {
        let directory = self.tdirectory.replace("{run}", &run.to_string());
        format!(
            "{}/{}",
            directory.trim_end_matches('/'),
            plot.name.trim_start_matches('/')
        )
    }
}

/// How the "most recent run" is chosen when a request names neither eras nor runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Greatest run in the whole index
    #[default]
    LatestGlobal,
    /// Smallest of the selected groups' latest runs, so every group has data
    LatestCommon,
}

/// Plot and response configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotsConfig {
    /// Histogram class -> draw option; the `overlay` key applies to overlays
    #[serde(default = "default_draw_options")]
    pub draw_options: BTreeMap<String, String>,

    /// Maximum runs kept per (group, era)
    #[serde(default = "default_max_era_run_size")]
    pub max_era_run_size: usize,

    #[serde(default)]
    pub fallback: FallbackStrategy,

    /// Entries of the per-(group, run) response cache
    #[serde(default = "default_response_cache_size")]
    pub response_cache_size: usize,

    /// Timeout of a single histogram fetch
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Extra attempts after a transient fetch failure
    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,

    #[serde(default)]
    pub groups: Vec<PlotGroupConfig>,
}

fn default_draw_options() -> BTreeMap<String, String> {
    [
        ("TH1F", "hist"),
        ("TH2F", "colz"),
        ("TProfile", "hist"),
        (OVERLAY_DRAW_KEY, "nostack,hist"),
    ]
    .into_iter()
    .map(|(class, option)| (class.to_string(), option.to_string()))
    .collect()
}

fn default_max_era_run_size() -> usize {
    5
}

fn default_response_cache_size() -> usize {
    1000
}

fn default_fetch_timeout_ms() -> u64 {
    10_000
}

fn default_fetch_retries() -> u32 {
    1
}

impl Default for PlotsConfig {
    fn default() -> Self {
        Self {
            draw_options: default_draw_options(),
            max_era_run_size: default_max_era_run_size(),
            fallback: FallbackStrategy::default(),
            response_cache_size: default_response_cache_size(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            fetch_retries: default_fetch_retries(),
            groups: Vec::new(),
        }
    }
}

impl PlotsConfig {
    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_era_run_size == 0 {
            return Err("max_era_run_size must be > 0".to_string());
        }

        if self.response_cache_size == 0 {
            return Err("response_cache_size must be > 0".to_string());
        }

        if self.fetch_timeout_ms == 0 {
            return Err("fetch_timeout_ms must be > 0".to_string());
        }

        let mut names = HashSet::new();
        for group in &self.groups {
            if group.group_name.is_empty() || group.group_directory.is_empty() {
                return Err("group_name and group_directory must not be empty".to_string());
            }
            if !names.insert(group.group_name.as_str()) {
                return Err(format!("duplicate group_name `{}`", group.group_name));
            }

            let mut plots = HashSet::new();
            for plot in &group.plots {
                if !plots.insert(plot.name.as_str()) {
                    return Err(format!(
                        "duplicate plot `{}` in group `{}`",
                        plot.name, group.group_name
                    ));
                }
            }
        }

        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Draw option configured for a histogram class.
    pub fn draw_option(&self, class_name: &str) -> Option<String> {
        self.draw_options.get(class_name).cloned()
    }

    pub fn group(&self, group_name: &str) -> Option<&PlotGroupConfig> {
        self.groups
            .iter()
            .find(|group| group.group_name == group_name)
    }

    /// Storage directories of the named groups, in configuration order.
    /// Unknown names are ignored.
    pub fn group_directories(&self, group_names: &[String]) -> Vec<String> {
        self.groups
            .iter()
            .filter(|group| group_names.contains(&group.group_name))
            .map(|group| group.group_directory.clone())
            .collect()
    }
}

/// Full server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub meta_store: MetaStoreConfig,

    #[serde(default)]
    pub plots: PlotsConfig,
}

impl ServerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ServerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load `server.toml` from the directory named by `DQM_CONF`.
    pub fn from_env() -> Result<Self> {
        let dir = std::env::var_os(CONFIG_DIR_ENV).ok_or_else(|| {
            HistogramError::Config(format!("{CONFIG_DIR_ENV} is not set"))
        })?;
        Self::load(&PathBuf::from(dir).join(CONFIG_FILE_NAME))
    }

    pub fn validate(&self) -> Result<()> {
        self.meta_store.validate().map_err(HistogramError::Config)?;
        self.plots.validate().map_err(HistogramError::Config)
    }
}
