use crate::error::{MetaIndexError, Result};
use crate::record::{Record, RecordKey};
use log::warn;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// `run -> era` for one detector group.
pub type RunEraMap = BTreeMap<u32, String>;

/// `group_directory -> {run -> era}` produced for one request.
pub type ResolvedSelection = BTreeMap<String, RunEraMap>;

/// Record filter. An absent field matches everything; a present field matches
/// only the listed values (so an empty set matches nothing).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub eras: Option<HashSet<String>>,
    pub groups: Option<HashSet<String>>,
    pub runs: Option<HashSet<u32>>,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_eras<I, S>(mut self, eras: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.eras = Some(eras.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = Some(groups.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_runs<I>(mut self, runs: I) -> Self
    where
        I: IntoIterator<Item = u32>,
    {
        self.runs = Some(runs.into_iter().collect());
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.eras.as_ref().is_none_or(|eras| eras.contains(&record.era))
            && self
                .groups
                .as_ref()
                .is_none_or(|groups| groups.contains(&record.group_directory))
            && self.runs.as_ref().is_none_or(|runs| runs.contains(&record.run))
    }
}

/// Group matching records into `{group -> {run -> era}}`, keeping at most
/// `per_era_run_cap` runs per `(group, era)`.
///
/// Records are taken in iteration order and the first ones seen are kept, so
/// the caller's ordering decides which runs survive the cap. A cap of 0
/// selects nothing.
pub fn resolve_records<'a, I>(
    records: I,
    filter: &RecordFilter,
    per_era_run_cap: usize,
) -> ResolvedSelection
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut counters: HashMap<(&str, &str), usize> = HashMap::new();
    let mut result = ResolvedSelection::new();

    for record in records {
        if !filter.matches(record) {
            continue;
        }
        let count = counters
            .entry((record.group_directory.as_str(), record.era.as_str()))
            .or_insert(0);
        if *count >= per_era_run_cap {
            continue;
        }
        *count += 1;
        result
            .entry(record.group_directory.clone())
            .or_default()
            .insert(record.run, record.era.clone());
    }

    result
}

/// Immutable in-memory index over all known records.
///
/// Records are kept in canonical order: newest run first, then by group
/// directory. Every scan (and therefore the per-era cap) follows that order.
#[derive(Debug, Clone, Default)]
pub struct MetadataIndex {
    records: Vec<Record>,
    by_key: HashMap<RecordKey, usize>,
}

impl MetadataIndex {
    /// Build from records in listing order. A later record with the same
    /// `(group_directory, run)` replaces an earlier one; the number of
    /// replaced records is returned alongside the index.
    pub fn from_records(records: Vec<Record>) -> (Self, usize) {
        let mut unique: HashMap<RecordKey, Record> = HashMap::with_capacity(records.len());
        let mut duplicates = 0;

        for record in records {
            if let Some(previous) = unique.insert(record.key(), record) {
                duplicates += 1;
                warn!(
                    "Duplicate record for group {} run {}; keeping the later one (dropped {})",
                    previous.group_directory, previous.run, previous.location
                );
            }
        }

        let mut records: Vec<Record> = unique.into_values().collect();
        records.sort_by(canonical_order);

        let by_key = records
            .iter()
            .enumerate()
            .map(|(idx, record)| (record.key(), idx))
            .collect();

        (Self { records, by_key }, duplicates)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in canonical order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Greatest run number across all records.
    pub fn max_run(&self) -> Result<u32> {
        // Canonical order puts the newest run first.
        self.records
            .first()
            .map(|record| record.run)
            .ok_or(MetaIndexError::EmptyIndex)
    }

    /// Greatest run of one group, if the group has any record.
    pub fn max_run_of_group(&self, group_directory: &str) -> Option<u32> {
        self.records
            .iter()
            .find(|record| record.group_directory == group_directory)
            .map(|record| record.run)
    }

    /// Most recent run every selected group has data for: the minimum over the
    /// groups of each group's greatest run. Groups without records are ignored.
    pub fn latest_common_run(&self, group_filter: Option<&[String]>) -> Result<u32> {
        let groups: Vec<&str> = match group_filter {
            Some(filter) if !filter.is_empty() => filter.iter().map(String::as_str).collect(),
            _ => self.groups().into_iter().collect(),
        };
        groups
            .into_iter()
            .filter_map(|group| self.max_run_of_group(group))
            .min()
            .ok_or(MetaIndexError::EmptyIndex)
    }

    /// Greatest run of `year`, or of the most recent year when `year` is
    /// absent. Returns the run together with the year it belongs to.
    pub fn max_run_of_year(&self, year: Option<i32>) -> Result<(u32, i32)> {
        let year = match year {
            Some(year) => year,
            None => self
                .records
                .iter()
                .map(|record| record.year)
                .max()
                .ok_or(MetaIndexError::EmptyIndex)?,
        };
        self.records
            .iter()
            .find(|record| record.year == year)
            .map(|record| (record.run, year))
            .ok_or(MetaIndexError::NoRunsInYear(year))
    }

    /// Distinct eras, optionally restricted to some group directories. An
    /// absent or empty filter means every group.
    pub fn eras(&self, group_filter: Option<&[String]>) -> BTreeSet<String> {
        self.records_of_groups(group_filter)
            .map(|record| record.era.clone())
            .collect()
    }

    /// Distinct datasets (`{group_directory}/{era}-{suffix}`), filtered like
    /// [`MetadataIndex::eras`].
    pub fn datasets(&self, group_filter: Option<&[String]>) -> BTreeSet<String> {
        self.records_of_groups(group_filter)
            .map(|record| record.dataset.clone())
            .collect()
    }

    fn records_of_groups<'a>(
        &'a self,
        group_filter: Option<&[String]>,
    ) -> impl Iterator<Item = &'a Record> + 'a {
        let groups: Option<HashSet<String>> = group_filter
            .filter(|filter| !filter.is_empty())
            .map(|filter| filter.iter().cloned().collect());

        self.records.iter().filter(move |record| {
            groups
                .as_ref()
                .is_none_or(|groups| groups.contains(&record.group_directory))
        })
    }

    /// Distinct group directories.
    pub fn groups(&self) -> BTreeSet<&str> {
        self.records
            .iter()
            .map(|record| record.group_directory.as_str())
            .collect()
    }

    /// Distinct run years.
    pub fn years(&self) -> BTreeSet<i32> {
        self.records.iter().map(|record| record.year).collect()
    }

    /// Point lookup by `(group_directory, run)`.
    pub fn lookup(&self, group_directory: &str, run: u32) -> Result<&Record> {
        let key = RecordKey {
            group_directory: group_directory.to_string(),
            run,
        };
        self.by_key
            .get(&key)
            .and_then(|idx| self.records.get(*idx))
            .ok_or_else(|| MetaIndexError::NotFound {
                group_directory: key.group_directory,
                run,
            })
    }

    /// Filter and cap over the whole index, in canonical order. A cap of 0
    /// selects nothing.
    pub fn resolve(&self, filter: &RecordFilter, per_era_run_cap: usize) -> ResolvedSelection {
        resolve_records(&self.records, filter, per_era_run_cap)
    }
}

fn canonical_order(a: &Record, b: &Record) -> Ordering {
    b.run
        .cmp(&a.run)
        .then_with(|| a.group_directory.cmp(&b.group_directory))
}
