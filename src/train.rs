use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::config::{Config, Parameters};
use crate::data::loader;
use crate::data::model::LearningSet;
use crate::labels::LabelCodec;
use crate::nn::{FitOptions, Head, History, Mlp, Targets, stats};
use crate::preprocess::{Normalizer, save_axis};
use crate::rng::SimpleRng;

// ---------------------------------------------------------------------------
// Training orchestration
// ---------------------------------------------------------------------------

/// Train a network on `learn_path`, optionally validating against an
/// explicit `validation_path` (otherwise a random `validation_split`
/// fraction of the training data is held out). Persists the model, the
/// training axis, and (classification only) the label codec into `dir`.
pub fn train(
    config: &Config,
    dir: &Path,
    learn_path: &Path,
    validation_path: Option<&Path>,
) -> Result<History> {
    let p = &config.parameters;

    let mut learn = loader::read_learn_file(learn_path, p.label_columns)?;
    let mut explicit_val = validation_path
        .map(|path| loader::read_learn_file(path, p.label_columns))
        .transpose()?;

    if let Some(val) = &explicit_val {
        if val.width() != learn.width() {
            bail!(
                "validation file width ({}) does not match the learning file ({})",
                val.width(),
                learn.width()
            );
        }
    }

    if p.normalize {
        Normalizer.transform_matrix(&mut learn.features);
        if let Some(val) = &mut explicit_val {
            Normalizer.transform_matrix(&mut val.features);
        }
    }

    println!("  Points per spectrum: {}", learn.width());
    println!("  Learning samples:    {}", learn.len());
    println!("  Label columns:       {}\n", p.label_columns);

    // Targets and, in classification mode, the codec fitted over the
    // distinct tuples of training ∪ validation data.
    let (head, targets, val_targets, codec) = build_targets(p, &learn, explicit_val.as_ref())?;

    let mut rng = SimpleRng::new(config.system.seed);
    let mut mlp = Mlp::new(learn.width(), &p.hidden_layers, head, &mut rng)?;

    let opts = FitOptions {
        epochs: p.epochs,
        batch_size: effective_batch_size(p, learn.len()),
        learning_rate: p.learning_rate,
        learning_decay: p.learning_decay,
        dropout: p.dropout,
        l2: p.l2,
    };
    print_parameters(p, opts.batch_size);

    let history = match (&explicit_val, &val_targets) {
        (Some(val), Some(vt)) => mlp.fit(
            &learn.features,
            &targets,
            Some((val.features.as_slice(), vt)),
            &opts,
            &mut rng,
        )?,
        _ => {
            let (train_x, train_y, val_x, val_y) =
                random_split(&learn.features, &targets, p.validation_split, &mut rng);
            match (&val_x, &val_y) {
                (Some(vx), Some(vy)) => {
                    mlp.fit(&train_x, &train_y, Some((vx.as_slice(), vy)), &opts, &mut rng)?
                }
                _ => mlp.fit(&train_x, &train_y, None, &opts, &mut rng)?,
            }
        }
    };

    save_axis(&config.axis_path(dir), &learn.axis)?;
    if let Some(codec) = &codec {
        codec
            .save(&config.codec_path(dir))
            .context("persisting label codec")?;
        log::info!(
            "label codec ({} classes) saved to {}",
            codec.len(),
            config.codec_path(dir).display()
        );
    }
    mlp.save(&config.model_path(dir))
        .context("persisting trained model")?;
    log::info!("model saved to {}", config.model_path(dir).display());

    print_summary(config, &history);

    if p.show_validation_predictions {
        if let (Some(val), Some(vt)) = (&explicit_val, &val_targets) {
            print_validation_predictions(&mlp, val, vt, codec.as_ref())?;
        }
    }

    Ok(history)
}

/// `full_size_batch` overrides the configured batch size with the whole
/// training set.
pub fn effective_batch_size(p: &Parameters, samples: usize) -> usize {
    if p.full_size_batch {
        samples
    } else {
        p.batch_size
    }
}

// ---------------------------------------------------------------------------
// Target encoding
// ---------------------------------------------------------------------------

fn build_targets(
    p: &Parameters,
    learn: &LearningSet,
    explicit_val: Option<&LearningSet>,
) -> Result<(Head, Targets, Option<Targets>, Option<LabelCodec>)> {
    if p.regressor {
        let values = regression_values(learn);
        let val_values = explicit_val.map(|v| Targets::Values(regression_values(v)));
        return Ok((Head::Regression, Targets::Values(values), val_values, None));
    }

    let mut tuples = learn.labels.clone();
    if let Some(val) = explicit_val {
        tuples.extend(val.labels.iter().cloned());
    }
    let codec = LabelCodec::fit(&tuples);
    println!("  Distinct classes:    {}", codec.len());

    let encode_all = |set: &LearningSet| -> Result<Targets> {
        let indices = set
            .labels
            .iter()
            .map(|t| codec.encode(t))
            .collect::<Result<Vec<_>, _>>()
            .context("encoding labels")?;
        Ok(Targets::Classes(indices))
    };

    let targets = encode_all(learn)?;
    let val_targets = explicit_val.map(|v| encode_all(v)).transpose()?;
    // One extra output slot so index 0 can stay reserved for "unknown".
    let head = Head::Classification {
        classes: codec.len() + 1,
    };
    Ok((head, targets, val_targets, Some(codec)))
}

/// Regression uses the first label column as the continuous target.
fn regression_values(set: &LearningSet) -> Vec<f64> {
    set.labels.iter().map(|t| t.0[0]).collect()
}

// ---------------------------------------------------------------------------
// Random validation split
// ---------------------------------------------------------------------------

/// Hold out `fraction` of the samples (rounded, shuffled) for validation.
/// Degenerate fractions (0 held out, or everything held out) disable
/// validation instead of failing.
fn random_split(
    x: &[Vec<f64>],
    y: &Targets,
    fraction: f64,
    rng: &mut SimpleRng,
) -> (Vec<Vec<f64>>, Targets, Option<Vec<Vec<f64>>>, Option<Targets>) {
    let n = x.len();
    let n_val = (n as f64 * fraction).round() as usize;
    if n_val == 0 || n_val >= n {
        return (x.to_vec(), y.clone(), None, None);
    }

    let mut indices: Vec<usize> = (0..n).collect();
    rng.shuffle(&mut indices);
    let (val_idx, train_idx) = indices.split_at(n_val);

    (
        subset_rows(x, train_idx),
        subset_targets(y, train_idx),
        Some(subset_rows(x, val_idx)),
        Some(subset_targets(y, val_idx)),
    )
}

fn subset_rows(x: &[Vec<f64>], indices: &[usize]) -> Vec<Vec<f64>> {
    indices.iter().map(|&i| x[i].clone()).collect()
}

fn subset_targets(y: &Targets, indices: &[usize]) -> Targets {
    match y {
        Targets::Values(v) => Targets::Values(indices.iter().map(|&i| v[i]).collect()),
        Targets::Classes(c) => Targets::Classes(indices.iter().map(|&i| c[i]).collect()),
    }
}

// ---------------------------------------------------------------------------
// Console reporting
// ---------------------------------------------------------------------------

fn print_parameters(p: &Parameters, batch_size: usize) {
    println!("\n  ================================================");
    println!("  spectral-mlp - Parameters");
    println!("  ================================================");
    println!("  Optimizer:           Adam");
    println!("  Hidden layers:       {:?}", p.hidden_layers);
    println!("  Activation:          relu");
    println!("  L2:                  {}", p.l2);
    println!("  Dropout:             {}", p.dropout);
    println!("  Learning rate:       {}", p.learning_rate);
    println!("  Learning decay:      {}", p.learning_decay);
    if p.full_size_batch {
        println!("  Batch size:          full ({batch_size})");
    } else {
        println!("  Batch size:          {batch_size}");
    }
    println!("  Epochs:              {}", p.epochs);
    println!("  Label columns:       {}", p.label_columns);
    println!("  ================================================\n");
}

fn print_summary(config: &Config, history: &History) {
    let mode = config.mode_name();

    println!("\n  ========================================================");
    println!("  spectral-mlp - {mode} - Training Summary");
    println!("  ========================================================");
    if let Some(s) = stats(&history.loss) {
        println!(
            "  Loss     - Average: {:.4}; Min: {:.4}; Last: {:.4}",
            s.average, s.min, s.last
        );
    }
    if let Some(s) = stats(&history.metric) {
        if config.parameters.regressor {
            println!(
                "  Mean Abs Err - Average: {:.4}; Min: {:.4}; Last: {:.4}",
                s.average, s.min, s.last
            );
        } else {
            println!(
                "  Accuracy - Average: {:.2}%; Max: {:.2}%; Last: {:.2}%",
                100.0 * s.average,
                100.0 * s.max,
                100.0 * s.last
            );
        }
    }

    if !history.val_loss.is_empty() {
        println!("\n  ========================================================");
        println!("  spectral-mlp - {mode} - Validation Summary");
        println!("  ========================================================");
        if let Some(s) = stats(&history.val_loss) {
            println!(
                "  Loss     - Average: {:.4}; Min: {:.4}; Last: {:.4}",
                s.average, s.min, s.last
            );
        }
        if let Some(s) = stats(&history.val_metric) {
            if config.parameters.regressor {
                println!(
                    "  Mean Abs Err - Average: {:.4}; Min: {:.4}; Last: {:.4}",
                    s.average, s.min, s.last
                );
            } else {
                println!(
                    "  Accuracy - Average: {:.2}%; Max: {:.2}%; Last: {:.2}%",
                    100.0 * s.average,
                    100.0 * s.max,
                    100.0 * s.last
                );
            }
        }
    }
    println!("  ========================================================\n");
}

fn print_validation_predictions(
    mlp: &Mlp,
    val: &LearningSet,
    targets: &Targets,
    codec: Option<&LabelCodec>,
) -> Result<()> {
    match targets {
        Targets::Values(values) => {
            println!("  Real value | Predicted value");
            println!("  ----------------------------");
            for (row, &real) in val.features.iter().zip(values.iter()) {
                let out = mlp.predict(row)?;
                println!("  {real:.2}\t| {:.2}", out[0]);
            }
        }
        Targets::Classes(indices) => {
            let codec = codec.context("classification table needs the label codec")?;
            println!("  Real class | Predicted class | Probability [%]");
            println!("  ----------------------------------------------");
            for (row, &real) in val.features.iter().zip(indices.iter()) {
                let out = mlp.predict(row)?;
                let predicted = crate::nn::argmax(&out);
                let label = match codec.decode(predicted) {
                    Ok(tuple) => tuple.to_string(),
                    Err(_) => "unknown".to_string(),
                };
                let real_label = codec.decode(real).map(|t| t.to_string()).unwrap_or_default();
                println!(
                    "  {real_label}\t| {label}\t| {:.2}",
                    100.0 * out[predicted]
                );
            }
        }
    }
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::labels::LabelTuple;

    #[test]
    fn full_size_batch_overrides_configured_size() {
        let mut p = Config::default().parameters;
        p.batch_size = 64;
        assert_eq!(effective_batch_size(&p, 2), 64);
        p.full_size_batch = true;
        assert_eq!(effective_batch_size(&p, 2), 2);
    }

    #[test]
    fn random_split_respects_fraction_and_degenerates_gracefully() {
        let x: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64]).collect();
        let y = Targets::Values((0..10).map(|i| i as f64).collect());
        let mut rng = SimpleRng::new(1);

        let (tx, ty, vx, vy) = random_split(&x, &y, 0.2, &mut rng);
        assert_eq!(tx.len(), 8);
        assert_eq!(ty.len(), 8);
        assert_eq!(vx.unwrap().len(), 2);
        assert_eq!(vy.unwrap().len(), 2);

        // Tiny fraction rounds to zero held-out samples: no validation.
        let (tx, _, vx, _) = random_split(&x, &y, 0.01, &mut rng);
        assert_eq!(tx.len(), 10);
        assert!(vx.is_none());
    }

    #[test]
    fn classification_targets_reserve_slot_zero() {
        let learn = LearningSet {
            axis: vec![0.0, 1.0],
            features: vec![vec![0.1, 0.2], vec![0.3, 0.4]],
            labels: vec![LabelTuple(vec![5.0]), LabelTuple(vec![7.0])],
        };
        let p = Config::default().parameters;
        let (head, targets, _, codec) = build_targets(&p, &learn, None).unwrap();

        assert_eq!(head, Head::Classification { classes: 3 });
        match targets {
            Targets::Classes(indices) => assert_eq!(indices, vec![1, 2]),
            _ => panic!("expected class targets"),
        }
        assert_eq!(codec.unwrap().len(), 2);
    }

    #[test]
    fn regression_targets_use_first_label_column() {
        let learn = LearningSet {
            axis: vec![0.0, 1.0],
            features: vec![vec![0.1, 0.2]],
            labels: vec![LabelTuple(vec![2.5, 9.0])],
        };
        let mut p = Config::default().parameters;
        p.regressor = true;
        let (head, targets, _, codec) = build_targets(&p, &learn, None).unwrap();

        assert_eq!(head, Head::Regression);
        match targets {
            Targets::Values(values) => assert_eq!(values, vec![2.5]),
            _ => panic!("expected value targets"),
        }
        assert!(codec.is_none());
    }
}
