use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Name of the configuration file, looked up in the working directory.
pub const CONFIG_FILE: &str = "spectral_mlp.toml";

// ---------------------------------------------------------------------------
// Configuration – loaded once per invocation, then immutable
// ---------------------------------------------------------------------------

/// The full configuration record: `[parameters]` holds the tunables,
/// `[system]` the runtime toggles. Created with documented defaults on
/// first run; passed by reference into every operation that needs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub parameters: Parameters,
    pub system: System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Parameters {
    /// Continuous-value prediction instead of discrete classes.
    pub regressor: bool,
    /// Row-wise intensity normalization of learning and sample data.
    pub normalize: bool,
    pub learning_rate: f64,
    /// Keras-style step decay: lr / (1 + decay * step).
    pub learning_decay: f64,
    /// Width of each hidden layer, in order.
    pub hidden_layers: Vec<usize>,
    /// Dropout rate applied after every hidden layer, 0 disables.
    pub dropout: f64,
    /// L2 penalty weight on dense kernels.
    pub l2: f64,
    pub epochs: usize,
    /// Fraction of training data held out when no validation file is given.
    pub validation_split: f64,
    /// Override `batch_size` with the full training-set size.
    pub full_size_batch: bool,
    pub batch_size: usize,
    /// Leading matrix columns that hold label values.
    pub label_columns: usize,
    /// Print a real-vs-predicted table for an explicit validation file.
    pub show_validation_predictions: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct System {
    /// Seed for weight init, shuffling, dropout, and validation splits.
    pub seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            parameters: Parameters {
                regressor: false,
                normalize: false,
                learning_rate: 0.001,
                learning_decay: 1e-4,
                hidden_layers: vec![20, 30, 40, 50, 60, 70],
                dropout: 0.0,
                l2: 1e-4,
                epochs: 100,
                validation_split: 0.01,
                full_size_batch: false,
                batch_size: 64,
                label_columns: 1,
                show_validation_predictions: false,
            },
            system: System { seed: 17 },
        }
    }
}

impl Config {
    /// Load the configuration from `path`. When the file does not exist the
    /// documented defaults are fully written to disk first, then read back,
    /// so the on-disk record and the in-memory one always agree.
    pub fn load_or_create(path: &Path) -> Result<Config> {
        if !path.exists() {
            log::info!(
                "configuration file {} does not exist, creating it",
                path.display()
            );
            let defaults =
                toml::to_string_pretty(&Config::default()).context("serializing default config")?;
            std::fs::write(path, defaults)
                .with_context(|| format!("writing default config to {}", path.display()))?;
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Config = toml::from_str(&text)
            .with_context(|| format!("malformed config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject out-of-range values with a descriptive message rather than
    /// failing later inside training.
    pub fn validate(&self) -> Result<()> {
        let p = &self.parameters;
        if p.hidden_layers.is_empty() || p.hidden_layers.contains(&0) {
            bail!("hidden_layers must list at least one non-zero layer width");
        }
        if p.epochs == 0 {
            bail!("epochs must be greater than 0");
        }
        if p.batch_size == 0 {
            bail!("batch_size must be greater than 0");
        }
        if !(0.0..1.0).contains(&p.dropout) {
            bail!("dropout must be in [0, 1), got {}", p.dropout);
        }
        if !(0.0..1.0).contains(&p.validation_split) {
            bail!(
                "validation_split must be in [0, 1), got {}",
                p.validation_split
            );
        }
        if p.label_columns == 0 {
            bail!("label_columns must be at least 1");
        }
        if p.learning_rate <= 0.0 {
            bail!("learning_rate must be positive, got {}", p.learning_rate);
        }
        if p.learning_decay < 0.0 || p.l2 < 0.0 {
            bail!("learning_decay and l2 must be non-negative");
        }
        Ok(())
    }

    /// "Classifier" or "Regressor", used in report headers and filenames.
    pub fn mode_name(&self) -> &'static str {
        if self.parameters.regressor {
            "Regressor"
        } else {
            "Classifier"
        }
    }

    pub fn model_path(&self, dir: &Path) -> PathBuf {
        if self.parameters.regressor {
            dir.join("mlp_model_regressor.json")
        } else {
            dir.join("mlp_model_classifier.json")
        }
    }

    pub fn codec_path(&self, dir: &Path) -> PathBuf {
        dir.join("mlp_labels.json")
    }

    pub fn axis_path(&self, dir: &Path) -> PathBuf {
        dir.join("mlp_axis.json")
    }

    pub fn summary_path(&self, dir: &Path) -> PathBuf {
        if self.parameters.regressor {
            dir.join("mlp_summary_regressor.csv")
        } else {
            dir.join("mlp_summary_classifier.csv")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);

        let created = Config::load_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(created, Config::default());

        // Second load reads the file written on first run.
        let reloaded = Config::load_or_create(&path).unwrap();
        assert_eq!(reloaded, created);
    }

    #[test]
    fn malformed_file_is_a_descriptive_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[parameters]\nepochs = \"many\"\n").unwrap();

        let err = Config::load_or_create(&path).unwrap_err();
        assert!(format!("{err:#}").contains("malformed config file"));
    }

    #[test]
    fn out_of_range_values_rejected() {
        let mut config = Config::default();
        config.parameters.dropout = 1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.parameters.hidden_layers.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.parameters.epochs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn artifact_names_depend_on_mode() {
        let dir = Path::new(".");
        let mut config = Config::default();
        assert_eq!(
            config.model_path(dir).file_name().unwrap(),
            "mlp_model_classifier.json"
        );
        config.parameters.regressor = true;
        assert_eq!(
            config.model_path(dir).file_name().unwrap(),
            "mlp_model_regressor.json"
        );
        assert_eq!(
            config.summary_path(dir).file_name().unwrap(),
            "mlp_summary_regressor.csv"
        );
        assert_eq!(config.mode_name(), "Regressor");
    }
}
