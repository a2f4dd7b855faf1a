use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dqm_histogram_service::ServerConfig;
use dqm_meta_index::{
    BuildStats, FsPathLister, IndexBuilder, IndexRefreshScheduler, IndexSourceKind,
    ListingFileLister, MetaStoreConfig, MetadataIndex, PathLister, RecordFilter, save_snapshot,
};
use owo_colors::OwoColorize;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Subcommand)]
pub enum IndexCommand {
    /// Crawl (or read a listing) and write an index snapshot
    BuildIndex(BuildIndexArgs),

    /// List available eras
    Eras(ErasArgs),

    /// List indexed detector groups
    Groups(GroupsArgs),

    /// List runs per group, most recent first
    Runs(RunsArgs),

    /// Show index statistics
    Stats(StatsArgs),
}

/// Where paths are listed from; overrides the configured source
#[derive(Debug, Clone, Default, Args)]
pub struct ListingArgs {
    /// Base DQM directory to crawl
    #[arg(long, value_name = "PATH")]
    pub base_dir: Option<PathBuf>,

    /// Newline-separated file listing to read instead of crawling
    #[arg(long, value_name = "PATH", conflicts_with = "base_dir")]
    pub listing_file: Option<PathBuf>,

    /// Number of run years to crawl
    #[arg(long, value_name = "N")]
    pub years: Option<u32>,
}

/// Index source of the query commands
#[derive(Debug, Clone, Default, Args)]
pub struct SourceArgs {
    #[command(flatten)]
    pub listing: ListingArgs,

    /// Index snapshot written by `dqm build-index`
    #[arg(long, value_name = "PATH", conflicts_with_all = ["base_dir", "listing_file"])]
    pub snapshot: Option<PathBuf>,
}

#[derive(Debug, Parser)]
pub struct BuildIndexArgs {
    #[command(flatten)]
    pub listing: ListingArgs,

    /// Snapshot file to write (defaults to the configured snapshot_file)
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Parser)]
pub struct ErasArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Restrict to a group directory (repeatable)
    #[arg(short, long = "group", value_name = "DIR")]
    pub groups: Vec<String>,
}

#[derive(Debug, Parser)]
pub struct GroupsArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

#[derive(Debug, Parser)]
pub struct RunsArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Restrict to a group directory (repeatable)
    #[arg(short, long = "group", value_name = "DIR")]
    pub groups: Vec<String>,

    /// Restrict to an era (repeatable)
    #[arg(short, long = "era", value_name = "ERA")]
    pub eras: Vec<String>,

    /// Runs kept per (group, era), defaults to max_era_run_size
    #[arg(short = 'n', long)]
    pub limit: Option<usize>,

    /// Print the selection as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct StatsArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

impl IndexCommand {
    pub async fn run(self, config: &ServerConfig) -> Result<()> {
        match self {
            IndexCommand::BuildIndex(args) => run_build_index(args, config),
            IndexCommand::Eras(args) => run_eras(args, config).await,
            IndexCommand::Groups(args) => run_groups(args, config).await,
            IndexCommand::Runs(args) => run_runs(args, config).await,
            IndexCommand::Stats(args) => run_stats(args, config).await,
        }
    }
}

impl ListingArgs {
    fn apply(&self, meta: &mut MetaStoreConfig) {
        if let Some(base_dir) = &self.base_dir {
            meta.base_dir = base_dir.clone();
            meta.source = IndexSourceKind::Crawl;
        }
        if let Some(listing_file) = &self.listing_file {
            meta.listing_file = Some(listing_file.clone());
            meta.source = IndexSourceKind::ListingFile;
        }
        if let Some(years) = self.years {
            meta.last_n_run_years = years;
        }
    }
}

impl SourceArgs {
    fn meta_store(&self, config: &ServerConfig) -> MetaStoreConfig {
        let mut meta = config.meta_store.clone();
        self.listing.apply(&mut meta);
        if let Some(snapshot) = &self.snapshot {
            meta.snapshot_file = Some(snapshot.clone());
            meta.source = IndexSourceKind::Snapshot;
        }
        meta
    }

    async fn load(&self, config: &ServerConfig) -> Result<(Arc<MetadataIndex>, Option<BuildStats>)> {
        let meta = self.meta_store(config);
        let scheduler =
            IndexRefreshScheduler::from_config(&meta).context("Invalid index source")?;
        let index = scheduler
            .current()
            .await
            .context("Failed to load metadata index")?;
        let stats = scheduler
            .generation()
            .and_then(|generation| generation.stats.clone());
        Ok((index, stats))
    }
}

fn run_build_index(args: BuildIndexArgs, config: &ServerConfig) -> Result<()> {
    let mut meta = config.meta_store.clone();
    if meta.source == IndexSourceKind::Snapshot {
        meta.source = IndexSourceKind::Crawl;
    }
    args.listing.apply(&mut meta);
    meta.validate().map_err(anyhow::Error::msg)?;

    let output = args
        .output
        .or_else(|| meta.snapshot_file.clone())
        .context("No output given and no snapshot_file configured")?;

    let lister: Arc<dyn PathLister> = match (&meta.source, &meta.listing_file) {
        (IndexSourceKind::ListingFile, Some(path)) => Arc::new(ListingFileLister::new(path.clone())),
        _ => Arc::new(FsPathLister::for_recent_years(
            meta.base_dir.clone(),
            meta.last_n_run_years,
            &meta.file_suffix_pattern,
        )),
    };

    println!("{} Building metadata index", "▶".bright_blue());
    let builder = IndexBuilder::new(lister).context("Failed to initialize index builder")?;
    let (index, stats) = builder.build().context("Failed to build metadata index")?;

    save_snapshot(&output, &index)
        .with_context(|| format!("Failed to write snapshot {}", output.display()))?;

    println!("{} Index built", "✓".bright_green());
    print_build_stats(&stats);
    println!("  Snapshot: {}", output.display().to_string().bright_cyan());

    Ok(())
}

async fn run_eras(args: ErasArgs, config: &ServerConfig) -> Result<()> {
    let (index, _) = args.source.load(config).await?;
    let groups = (!args.groups.is_empty()).then_some(args.groups.as_slice());

    let eras = index.eras(groups);
    if eras.is_empty() {
        println!("{} No eras found", "✗".bright_red());
        return Ok(());
    }
    for era in eras {
        println!("{era}");
    }
    Ok(())
}

async fn run_groups(args: GroupsArgs, config: &ServerConfig) -> Result<()> {
    let (index, _) = args.source.load(config).await?;

    let groups = index.groups();
    if groups.is_empty() {
        println!("{} No groups found", "✗".bright_red());
        return Ok(());
    }
    for group in groups {
        let latest = index
            .max_run_of_group(group)
            .map(|run| run.to_string())
            .unwrap_or_default();
        let configured = config
            .plots
            .groups
            .iter()
            .find(|plots| plots.group_directory == group)
            .map(|plots| format!(" ({})", plots.group_name))
            .unwrap_or_default();
        println!(
            "{}{}  latest run {}",
            group.bright_cyan(),
            configured,
            latest.bright_yellow()
        );
    }
    Ok(())
}

async fn run_runs(args: RunsArgs, config: &ServerConfig) -> Result<()> {
    let (index, _) = args.source.load(config).await?;

    let mut filter = RecordFilter::new();
    if !args.groups.is_empty() {
        filter = filter.with_groups(args.groups);
    }
    if !args.eras.is_empty() {
        filter = filter.with_eras(args.eras);
    }
    let limit = args.limit.unwrap_or(config.plots.max_era_run_size);
    anyhow::ensure!(limit > 0, "--limit must be at least 1");
    let selection = index.resolve(&filter, limit);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&selection)?);
        return Ok(());
    }
    if selection.is_empty() {
        println!("{} No runs found", "✗".bright_red());
        return Ok(());
    }
    for (group, runs) in &selection {
        println!("{}", group.bright_cyan());
        for (run, era) in runs.iter().rev() {
            println!("  {run} {era}");
        }
    }
    Ok(())
}

async fn run_stats(args: StatsArgs, config: &ServerConfig) -> Result<()> {
    let (index, stats) = args.source.load(config).await?;

    println!("{} Index Statistics", "▶".bright_blue());
    println!("  Records: {}", index.len().bright_cyan());
    println!("  Groups: {}", index.groups().len().bright_cyan());
    println!("  Eras: {}", index.eras(None).len().bright_cyan());
    println!("  Datasets: {}", index.datasets(None).len().bright_cyan());
    let years: Vec<String> = index.years().iter().map(i32::to_string).collect();
    println!("  Years: {}", years.join(", "));
    match index.max_run_of_year(None) {
        Ok((run, year)) => println!("  Latest run: {} ({year})", run.bright_yellow()),
        Err(_) => println!("  Latest run: {}", "none".dimmed()),
    }
    if let Some(stats) = stats {
        print_build_stats(&stats);
    }
    Ok(())
}

fn print_build_stats(stats: &BuildStats) {
    println!("  Paths listed: {}", stats.paths_listed.bright_cyan());
    println!("  Records indexed: {}", stats.records_indexed.bright_cyan());
    println!("  Unparseable paths: {}", stats.parse_failures.bright_cyan());
    println!("  Duplicates: {}", stats.duplicates.bright_cyan());
    println!("  Skipped directories: {}", stats.dirs_skipped.bright_cyan());
    println!("  Build time: {}ms", stats.elapsed_ms);
}
