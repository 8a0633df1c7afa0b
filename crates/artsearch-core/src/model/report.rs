use serde::{Deserialize, Serialize};

use crate::model::record::EmbeddingRecord;

/// What happened to one image of a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageOutcome {
    /// Embedded successfully; the record goes to the batch output file.
    Embedded(EmbeddingRecord),
    /// Failed processing and was copied to the quarantine prefix.
    Quarantined { key: String, reason: String },
    /// Failed processing, and copying it to quarantine failed as well.
    /// The image is in neither the output nor quarantine.
    QuarantineFailed {
        key: String,
        reason: String,
        error: String,
    },
}

/// An image lost from both the output and quarantine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuarantineFailure {
    pub key: String,
    pub reason: String,
    pub error: String,
}

/// Summary of one published batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_name: String,
    /// Number of images in the batch.
    pub size: usize,
    pub records_written: usize,
    pub quarantined: Vec<String>,
    pub quarantine_failed: Vec<QuarantineFailure>,
    /// Key of the uploaded output file, once published.
    pub output_key: Option<String>,
}

impl BatchReport {
    /// Fold per-image outcomes into a report, returning the records to
    /// write alongside it.
    #[must_use]
    pub fn from_outcomes(
        batch_name: impl Into<String>,
        outcomes: Vec<ImageOutcome>,
    ) -> (Self, Vec<EmbeddingRecord>) {
        let mut report = Self {
            batch_name: batch_name.into(),
            size: outcomes.len(),
            records_written: 0,
            quarantined: Vec::new(),
            quarantine_failed: Vec::new(),
            output_key: None,
        };
        let mut records = Vec::new();

        for outcome in outcomes {
            match outcome {
                ImageOutcome::Embedded(record) => records.push(record),
                ImageOutcome::Quarantined { key, .. } => report.quarantined.push(key),
                ImageOutcome::QuarantineFailed { key, reason, error } => {
                    report
                        .quarantine_failed
                        .push(QuarantineFailure { key, reason, error });
                }
            }
        }
        report.records_written = records.len();

        (report, records)
    }

    /// Every image is accounted for exactly once.
    #[must_use]
    pub fn is_accounted(&self) -> bool {
        self.records_written + self.quarantined.len() + self.quarantine_failed.len() == self.size
    }
}

/// Result of a full embedding-generation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub categories: usize,
    pub batches: Vec<BatchReport>,
}

impl RunSummary {
    #[must_use]
    pub fn records_written(&self) -> usize {
        self.batches.iter().map(|b| b.records_written).sum()
    }

    #[must_use]
    pub fn quarantined(&self) -> usize {
        self.batches.iter().map(|b| b.quarantined.len()).sum()
    }

    #[must_use]
    pub fn quarantine_failures(&self) -> usize {
        self.batches.iter().map(|b| b.quarantine_failed.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::category::Category;

    fn outcomes() -> Vec<ImageOutcome> {
        let category = Category::new("cubism");
        vec![
            ImageOutcome::Embedded(EmbeddingRecord::new("a", vec![1.0], &category)),
            ImageOutcome::Quarantined {
                key: "cubism/b.jpg".to_string(),
                reason: "decode failed".to_string(),
            },
            ImageOutcome::QuarantineFailed {
                key: "cubism/c.jpg".to_string(),
                reason: "decode failed".to_string(),
                error: "copy refused".to_string(),
            },
            ImageOutcome::Embedded(EmbeddingRecord::new("d", vec![2.0], &category)),
        ]
    }

    #[test]
    fn test_from_outcomes_partitions_images() {
        let (report, records) = BatchReport::from_outcomes("batch", outcomes());
        assert_eq!(report.size, 4);
        assert_eq!(report.records_written, 2);
        assert_eq!(report.quarantined, vec!["cubism/b.jpg"]);
        assert_eq!(report.quarantine_failed.len(), 1);
        assert_eq!(records.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["a", "d"]);
        assert!(report.is_accounted());
        assert!(report.output_key.is_none());
    }

    #[test]
    fn test_run_summary_totals() {
        let (first, _) = BatchReport::from_outcomes("one", outcomes());
        let (second, _) = BatchReport::from_outcomes("two", outcomes());
        let summary = RunSummary {
            categories: 1,
            batches: vec![first, second],
        };
        assert_eq!(summary.records_written(), 4);
        assert_eq!(summary.quarantined(), 2);
        assert_eq!(summary.quarantine_failures(), 2);
    }
}
