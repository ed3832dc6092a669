use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::config::Config;
use crate::data::loader;
use crate::labels::LabelCodec;
use crate::nn::{Head, Mlp, argmax};
use crate::preprocess::{Normalizer, load_axis, resample};
use crate::report::{PredictionRecord, Summary};

/// Per-class probabilities below this are left out of the breakdown.
const DISPLAY_THRESHOLD: f64 = 0.01;

// ---------------------------------------------------------------------------
// Persisted artifacts
// ---------------------------------------------------------------------------

/// The trained model plus the artifacts it was persisted with: the training
/// axis, and the label codec in classification mode.
struct Artifacts {
    mlp: Mlp,
    axis: Vec<f64>,
    codec: Option<LabelCodec>,
}

fn load_artifacts(config: &Config, dir: &Path) -> Result<Artifacts> {
    let mlp = Mlp::load(&config.model_path(dir))
        .context("loading trained model (run --train first)")?;
    let axis = load_axis(&config.axis_path(dir)).context("loading training axis")?;
    if axis.len() != mlp.input_width() {
        bail!(
            "persisted axis has {} points but the model expects {}",
            axis.len(),
            mlp.input_width()
        );
    }

    let codec = match mlp.head() {
        Head::Regression => {
            if config.parameters.regressor {
                None
            } else {
                bail!("persisted model is a regressor but the configuration says classifier");
            }
        }
        Head::Classification { .. } => {
            if config.parameters.regressor {
                bail!("persisted model is a classifier but the configuration says regressor");
            }
            Some(LabelCodec::load(&config.codec_path(dir)).context("loading label codec")?)
        }
    };

    Ok(Artifacts { mlp, axis, codec })
}

/// Read a sample file, normalize if configured, and resample it onto the
/// training axis when its length differs.
fn prepare_sample(config: &Config, axis: &[f64], path: &Path) -> Result<Vec<f64>> {
    let mut sample = loader::read_test_file(path)?;

    if config.parameters.normalize {
        Normalizer.transform_single(&mut sample.intensity);
    }

    if sample.intensity.len() != axis.len() {
        log::info!(
            "rescaling x-axis of {} from {} to {} points",
            path.display(),
            sample.intensity.len(),
            axis.len()
        );
        resample(&sample.axis, &sample.intensity, axis)
    } else {
        Ok(sample.intensity)
    }
}

// ---------------------------------------------------------------------------
// Single prediction
// ---------------------------------------------------------------------------

/// Predict one sample file and print the result. An unreadable sample file
/// is reported and the operation returns without failing the process, so a
/// bad file never looks like a corrupted model.
pub fn predict(config: &Config, dir: &Path, sample_path: &Path) -> Result<()> {
    let artifacts = load_artifacts(config, dir)?;

    let features = match prepare_sample(config, &artifacts.axis, sample_path) {
        Ok(features) => features,
        Err(err) => {
            log::error!("cannot read sample {}: {err:#}", sample_path.display());
            println!("\n  Sample data file could not be read, nothing predicted\n");
            return Ok(());
        }
    };

    let output = artifacts.mlp.predict(&features)?;
    println!("\n  ========================================================");
    println!("  spectral-mlp - {} - Prediction", config.mode_name());
    println!("  ========================================================");

    match &artifacts.codec {
        None => {
            println!("\n  Predicted value = {:.2}\n", output[0]);
        }
        Some(codec) => {
            print_class_breakdown(codec, &output);
        }
    }
    println!("  ========================================================\n");
    Ok(())
}

/// Arg-max class with probability, plus every decodable class above the
/// display threshold. Slot 0 has no label and is reported as "unknown".
fn print_class_breakdown(codec: &LabelCodec, probabilities: &[f64]) {
    println!("  Prediction\tProbability [%]");
    println!("  -------------------------------");
    for index in 1..probabilities.len() {
        if probabilities[index] > DISPLAY_THRESHOLD {
            if let Ok(tuple) = codec.decode(index) {
                println!("  {tuple}\t\t{:.2}", 100.0 * probabilities[index]);
            }
        }
    }

    let best = argmax(probabilities);
    let probability = 100.0 * probabilities[best];
    match codec.decode(best) {
        Ok(tuple) => {
            println!("\n  Predicted class = {tuple} (probability = {probability:.2}%)\n");
        }
        Err(_) => {
            println!("\n  No known class predicted (unknown slot, probability = {probability:.2}%)\n");
        }
    }
}

// ---------------------------------------------------------------------------
// Batch prediction
// ---------------------------------------------------------------------------

/// Predict every `*.txt` sample file in `dir` (sorted by name) and write
/// the mode-specific summary CSV. Unreadable files are skipped with a
/// warning so one bad spectrum cannot sink the batch.
pub fn batch_predict(config: &Config, dir: &Path) -> Result<()> {
    let artifacts = load_artifacts(config, dir)?;

    let mut files: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("listing directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("txt")
        })
        .collect();
    files.sort();

    let mut summary = Summary::new(config.parameters.regressor);
    println!("\n  ========================================================");
    println!("  spectral-mlp - {} - Batch prediction", config.mode_name());
    println!("  ========================================================");

    for path in &files {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("<non-utf8>")
            .to_string();

        let features = match prepare_sample(config, &artifacts.axis, path) {
            Ok(features) => features,
            Err(err) => {
                log::warn!("skipping {name}: {err:#}");
                continue;
            }
        };
        let output = artifacts.mlp.predict(&features)?;

        let record = match &artifacts.codec {
            None => {
                let value = output[0];
                println!("  {name}: predicted value = {value:.2}");
                PredictionRecord {
                    file: name,
                    value: format!("{value:.2}"),
                    probability: None,
                }
            }
            Some(codec) => {
                let best = argmax(&output);
                let probability = output[best];
                let value = match codec.decode(best) {
                    Ok(tuple) => tuple.to_string(),
                    Err(_) => "unknown".to_string(),
                };
                println!(
                    "  {name}: predicted class = {value} (probability = {:.2}%)",
                    100.0 * probability
                );
                PredictionRecord {
                    file: name,
                    value,
                    probability: Some(probability),
                }
            }
        };
        summary.push(record);
    }
    println!("  ========================================================\n");

    let summary_path = config.summary_path(dir);
    summary.write(&summary_path)?;
    println!(
        " Prediction summary ({} file(s)) saved in {}\n",
        summary.len(),
        summary_path.display()
    );
    Ok(())
}
