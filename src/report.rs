use std::path::Path;

use anyhow::{Context, Result};

// ---------------------------------------------------------------------------
// Prediction summary table
// ---------------------------------------------------------------------------

/// One batch-prediction result: the input file, the predicted value (a
/// decoded class label or a regression scalar), and the winning-class
/// probability in classification mode.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRecord {
    pub file: String,
    pub value: String,
    pub probability: Option<f64>,
}

/// Aggregates prediction records and writes the batch summary CSV.
///
/// The table has a fixed two-row header (product/mode, then column names)
/// followed by one row per input file, so N files produce N + 2 CSV rows.
#[derive(Debug)]
pub struct Summary {
    regressor: bool,
    records: Vec<PredictionRecord>,
}

impl Summary {
    pub fn new(regressor: bool) -> Self {
        Summary {
            regressor,
            records: Vec::new(),
        }
    }

    pub fn push(&mut self, record: PredictionRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("creating summary file {}", path.display()))?;

        if self.regressor {
            writer.write_record(["spectral-mlp", "Regressor", ""])?;
            writer.write_record(["File name", "Prediction", ""])?;
        } else {
            writer.write_record(["spectral-mlp", "Classifier", ""])?;
            writer.write_record(["File name", "Predicted class", "Probability"])?;
        }

        for record in &self.records {
            let probability = record
                .probability
                .map(|p| format!("{:.2}", p * 100.0))
                .unwrap_or_default();
            writer.write_record([
                record.file.as_str(),
                record.value.as_str(),
                probability.as_str(),
            ])?;
        }

        writer
            .flush()
            .with_context(|| format!("writing summary file {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_rows(path: &Path) -> Vec<Vec<String>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .unwrap();
        reader
            .records()
            .map(|r| r.unwrap().iter().map(|f| f.to_string()).collect())
            .collect()
    }

    #[test]
    fn classifier_summary_has_n_plus_two_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.csv");

        let mut summary = Summary::new(false);
        for i in 0..3 {
            summary.push(PredictionRecord {
                file: format!("sample_{i}.txt"),
                value: "2".into(),
                probability: Some(0.987),
            });
        }
        summary.write(&path).unwrap();

        let rows = read_rows(&path);
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0], vec!["spectral-mlp", "Classifier", ""]);
        assert_eq!(rows[1], vec!["File name", "Predicted class", "Probability"]);
        assert_eq!(rows[2], vec!["sample_0.txt", "2", "98.70"]);
    }

    #[test]
    fn regressor_summary_uses_its_own_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.csv");

        let mut summary = Summary::new(true);
        summary.push(PredictionRecord {
            file: "a.txt".into(),
            value: "1.25".into(),
            probability: None,
        });
        summary.write(&path).unwrap();

        let rows = read_rows(&path);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec!["spectral-mlp", "Regressor", ""]);
        assert_eq!(rows[1], vec!["File name", "Prediction", ""]);
        assert_eq!(rows[2], vec!["a.txt", "1.25", ""]);
    }
}
