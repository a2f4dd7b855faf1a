use crate::error::{MetaIndexError, ParseError, Result};
use crate::record::Record;
use regex_lite::Regex;

/// Layout of a DQM file below the base directory:
///
/// ```text
/// {base}/Run2023/AlCaPPSPrompt/0003658xx/DQM_V0001_R000365835__AlCaPPSPrompt__Run2023A-PromptReco-v1__DQMIO.root
/// ```
const FILE_PATTERN: &str = r"^.*?/Run(?P<year>\d{4})/(?P<group>[^/]+)/(?P<bucket>[^/]+)/DQM_V(?P<version>\d+)_R(?P<run>\d+)__(?P<primary>[^/]+?)__(?P<dataset>[^/]+?)__(?i:DQMIO\.root)$";

const FILE_VERSION: &str = "0001";

/// Extracts records from full file paths.
#[derive(Debug, Clone)]
pub struct PathParser {
    pattern: Regex,
}

impl PathParser {
    pub fn new() -> Result<Self> {
        let pattern =
            Regex::new(FILE_PATTERN).map_err(|e| MetaIndexError::Pattern(e.to_string()))?;
        Ok(Self { pattern })
    }

    /// Parse one listed path. Surrounding whitespace (e.g. the newline of a
    /// listing file) is ignored.
    pub fn parse(&self, path: &str) -> std::result::Result<Record, ParseError> {
        let path = path.trim();
        let caps = self
            .pattern
            .captures(path)
            .ok_or_else(|| ParseError::NoMatch(path.to_string()))?;

        let year_str = &caps["year"];
        let year = year_str
            .parse::<i32>()
            .map_err(|_| ParseError::InvalidNumber {
                path: path.to_string(),
                field: "year",
                value: year_str.to_string(),
            })?;

        let run_str = &caps["run"];
        let run = run_str
            .parse::<u32>()
            .map_err(|_| ParseError::InvalidNumber {
                path: path.to_string(),
                field: "run",
                value: run_str.to_string(),
            })?;

        let group_directory = caps["group"].to_string();
        let label = &caps["dataset"];
        let era = label.split('-').next().unwrap_or_default();
        if era.is_empty() {
            return Err(ParseError::MissingEra(path.to_string()));
        }

        Ok(Record {
            year,
            run,
            era: era.to_string(),
            dataset: format!("{group_directory}/{label}"),
            group_directory,
            location: path.to_string(),
        })
    }

    /// Rebuild the canonical path of a record below `base_dir`.
    pub fn format_path(base_dir: &str, record: &Record) -> String {
        format!(
            "{base}/Run{year}/{group}/{bucket}/DQM_V{FILE_VERSION}_R{run:09}__{group}__{label}__DQMIO.root",
            base = base_dir.trim_end_matches('/'),
            year = record.year,
            group = record.group_directory,
            bucket = run_bucket(record.run),
            run = record.run,
            label = record.dataset_label(),
        )
    }
}

/// Hundred-run bucket directory: run 365835 lives in `0003658xx`.
fn run_bucket(run: u32) -> String {
    format!("{:07}xx", run / 100)
}
