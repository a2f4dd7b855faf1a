pub mod index_cmd;

use anyhow::{Context, Result};
use clap::Parser;
use dqm_histogram_service::{CONFIG_DIR_ENV, ServerConfig};
use index_cmd::IndexCommand;
use std::path::PathBuf;

/// Inspect and build the DQM metadata index.
#[derive(Debug, Parser)]
#[command(name = "dqm", version, about)]
pub struct Cli {
    /// Server configuration file (defaults to $DQM_CONF/server.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log filter, overrides RUST_LOG
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: IndexCommand,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = self.load_config()?;
        self.command.run(&config).await
    }

    fn load_config(&self) -> Result<ServerConfig> {
        if let Some(path) = &self.config {
            return ServerConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()));
        }
        if std::env::var_os(CONFIG_DIR_ENV).is_some() {
            return ServerConfig::from_env()
                .with_context(|| format!("Failed to load config from ${CONFIG_DIR_ENV}"));
        }
        Ok(ServerConfig::default())
    }
}

/// Log to stderr at `level`, or at `RUST_LOG` (default `info`).
pub fn init_logging(level: Option<&str>) {
    let env = env_logger::Env::default().default_filter_or("info");
    let mut builder = env_logger::Builder::from_env(env);
    if let Some(level) = level {
        builder.parse_filters(level);
    }
    // A second initialisation in the same process is harmless.
    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index_cmd::IndexCommand;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_runs_command() {
        let cli = Cli::try_parse_from([
            "dqm",
            "--log-level",
            "debug",
            "runs",
            "--snapshot",
            "meta.json",
            "--group",
            "HLTPhysics",
            "--era",
            "Run2023A",
            "--limit",
            "3",
        ])
        .expect("parse");

        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        let IndexCommand::Runs(args) = cli.command else {
            panic!("expected runs command");
        };
        assert_eq!(args.groups, vec!["HLTPhysics".to_string()]);
        assert_eq!(args.eras, vec!["Run2023A".to_string()]);
        assert_eq!(args.limit, Some(3));
        assert_eq!(args.source.snapshot, Some(PathBuf::from("meta.json")));
    }

    #[test]
    fn test_build_index_requires_no_snapshot_source() {
        assert!(Cli::try_parse_from(["dqm", "build-index", "--snapshot", "meta.json"]).is_err());
    }
}
