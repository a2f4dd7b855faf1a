use crate::error::Result;
use chrono::Datelike;
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use wildmatch::WildMatch;

/// Raw file listing handed to the index builder.
#[derive(Debug, Default, Clone)]
pub struct Listing {
    /// Full paths, in listing order
    pub paths: Vec<String>,

    /// Base directories that could not be walked
    pub skipped_dirs: Vec<PathBuf>,
}

/// Source of the raw paths an index is built from.
pub trait PathLister: Send + Sync {
    fn list(&self) -> Result<Listing>;
}

/// Walks `{base_dir}/Run{year}` trees for a set of years and keeps the files
/// whose name matches a glob such as `*DQMIO.root` (case-insensitive).
#[derive(Debug, Clone)]
pub struct FsPathLister {
    base_dir: PathBuf,
    years: Vec<i32>,
    file_pattern: String,
}

impl FsPathLister {
    pub fn new(base_dir: impl Into<PathBuf>, years: Vec<i32>, file_pattern: &str) -> Self {
        Self {
            base_dir: base_dir.into(),
            years,
            file_pattern: file_pattern.to_lowercase(),
        }
    }

    /// Lister over the last `last_n_years` run years, current year included.
    pub fn for_recent_years(
        base_dir: impl Into<PathBuf>,
        last_n_years: u32,
        file_pattern: &str,
    ) -> Self {
        let current = chrono::Local::now().year();
        Self::new(base_dir, recent_years(current, last_n_years), file_pattern)
    }

    pub fn run_dirs(&self) -> Vec<PathBuf> {
        self.years
            .iter()
            .map(|year| self.base_dir.join(format!("Run{year}")))
            .collect()
    }

    fn walk_dir(&self, dir: &Path, matcher: &WildMatch, paths: &mut Vec<String>) {
        for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    warn!("Skipping unreadable entry under {dir:?}: {err}");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_lowercase();
            if matcher.matches(&name) {
                paths.push(entry.path().to_string_lossy().to_string());
            }
        }
    }
}

impl PathLister for FsPathLister {
    fn list(&self) -> Result<Listing> {
        let matcher = WildMatch::new(&self.file_pattern);
        let mut listing = Listing::default();

        for dir in self.run_dirs() {
            if !dir.is_dir() {
                warn!("Run directory does not exist: {dir:?}");
                listing.skipped_dirs.push(dir);
                continue;
            }
            debug!("Listing {dir:?}");
            self.walk_dir(&dir, &matcher, &mut listing.paths);
        }

        info!(
            "Listed {} files under {:?} ({} directories skipped)",
            listing.paths.len(),
            self.base_dir,
            listing.skipped_dirs.len()
        );
        Ok(listing)
    }
}

/// Reads a newline-separated listing produced out of process (e.g. by `find`).
#[derive(Debug, Clone)]
pub struct ListingFileLister {
    path: PathBuf,
}

impl ListingFileLister {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl PathLister for ListingFileLister {
    fn list(&self) -> Result<Listing> {
        let content = fs::read_to_string(&self.path)?;
        let paths = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect::<Vec<_>>();
        info!("Read {} paths from listing {:?}", paths.len(), self.path);
        Ok(Listing {
            paths,
            skipped_dirs: Vec::new(),
        })
    }
}

/// Fixed in-memory listing.
#[derive(Debug, Clone, Default)]
pub struct StaticLister {
    paths: Vec<String>,
}

impl StaticLister {
    pub fn new(paths: Vec<String>) -> Self {
        Self { paths }
    }
}

impl PathLister for StaticLister {
    fn list(&self) -> Result<Listing> {
        Ok(Listing {
            paths: self.paths.clone(),
            skipped_dirs: Vec::new(),
        })
    }
}

fn recent_years(current: i32, last_n_years: u32) -> Vec<i32> {
    let span = last_n_years.max(1) as i32;
    ((current - span + 1)..=current).collect()
}
