use serde::{Deserialize, Serialize};

/// Metadata of one stored DQM file: a single detector group's histograms for a
/// single run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    /// Calendar year of the run (`Run{year}` directory)
    pub year: i32,

    /// Run number
    pub run: u32,

    /// Run era, e.g. `Run2023A`
    pub era: String,

    /// Detector group storage directory, e.g. `HLTPhysics`
    pub group_directory: String,

    /// `{group_directory}/{era}-{suffix}`, e.g. `JetMET1/Run2023A-PromptReco-v1`
    pub dataset: String,

    /// Full path of the stored file
    pub location: String,
}

impl Record {
    /// Key of the point-lookup index. One record exists per key.
    pub fn key(&self) -> RecordKey {
        RecordKey {
            group_directory: self.group_directory.clone(),
            run: self.run,
        }
    }

    /// Dataset label as it appears in the file name (`{era}-{suffix}`).
    pub fn dataset_label(&self) -> &str {
        self.dataset
            .split_once('/')
            .map(|(_, label)| label)
            .unwrap_or(&self.dataset)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub group_directory: String,
    pub run: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_dataset_label() {
        let record = Record {
            year: 2023,
            run: 365835,
            era: "Run2023A".to_string(),
            group_directory: "JetMET1".to_string(),
            dataset: "JetMET1/Run2023A-PromptReco-v1".to_string(),
            location: "/data/x.root".to_string(),
        };
        assert_eq!(record.dataset_label(), "Run2023A-PromptReco-v1");
        assert_eq!(
            record.key(),
            RecordKey {
                group_directory: "JetMET1".to_string(),
                run: 365835
            }
        );
    }
}
