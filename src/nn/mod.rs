/// Feed-forward network layer: dense layers, Adam, and the training loop.
///
/// Everything runs on flat row-major `f64` buffers, single-threaded. The
/// network is small (a handful of dense layers over ~10^3-wide spectra), so
/// clarity wins over BLAS here.
pub mod dense;
pub mod optim;

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::rng::SimpleRng;
use dense::{DenseLayer, LayerGrads};
use optim::Adam;

// ---------------------------------------------------------------------------
// Network definition
// ---------------------------------------------------------------------------

/// Task-specific output head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Head {
    /// Single linear unit, mean-squared-error loss.
    Regression,
    /// `classes` softmax units (slot 0 reserved for "unknown"),
    /// categorical cross-entropy loss.
    Classification { classes: usize },
}

/// Multilayer perceptron: ReLU hidden layers sized from configuration,
/// followed by a task head. Persisted as JSON (topology + weights).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mlp {
    input_width: usize,
    hidden: Vec<DenseLayer>,
    output: DenseLayer,
    head: Head,
}

/// Training targets, one entry per sample. Must match the network head.
#[derive(Debug, Clone)]
pub enum Targets {
    /// Continuous values for a regression head.
    Values(Vec<f64>),
    /// Class indices (1-based; 0 is the reserved unknown slot) for a
    /// classification head.
    Classes(Vec<usize>),
}

impl Targets {
    pub fn len(&self) -> usize {
        match self {
            Targets::Values(v) => v.len(),
            Targets::Classes(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Hyperparameters for one [`Mlp::fit`] call.
#[derive(Debug, Clone)]
pub struct FitOptions {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub learning_decay: f64,
    pub dropout: f64,
    pub l2: f64,
}

/// Per-epoch training curves. `metric` is accuracy for classification and
/// mean absolute error for regression; validation vectors stay empty when
/// no validation data was available.
#[derive(Debug, Clone, Default)]
pub struct History {
    pub loss: Vec<f64>,
    pub val_loss: Vec<f64>,
    pub metric: Vec<f64>,
    pub val_metric: Vec<f64>,
}

/// Summary statistics over one training curve.
#[derive(Debug, Clone, Copy)]
pub struct Stats {
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub last: f64,
}

pub fn stats(values: &[f64]) -> Option<Stats> {
    let last = *values.last()?;
    let sum: f64 = values.iter().sum();
    Some(Stats {
        average: sum / values.len() as f64,
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        last,
    })
}

// ---------------------------------------------------------------------------
// Forward / inference
// ---------------------------------------------------------------------------

impl Mlp {
    /// Build an untrained network. `hidden_widths` must be non-empty.
    pub fn new(
        input_width: usize,
        hidden_widths: &[usize],
        head: Head,
        rng: &mut SimpleRng,
    ) -> Result<Self> {
        if input_width == 0 {
            bail!("network input width must be non-zero");
        }
        if hidden_widths.is_empty() || hidden_widths.contains(&0) {
            bail!("hidden layer widths must be non-empty and non-zero");
        }
        if let Head::Classification { classes } = head {
            if classes < 2 {
                bail!("a classification head needs at least 2 output slots");
            }
        }

        let mut hidden = Vec::with_capacity(hidden_widths.len());
        let mut prev = input_width;
        for &width in hidden_widths {
            hidden.push(DenseLayer::glorot(prev, width, rng));
            prev = width;
        }
        let out_width = match head {
            Head::Regression => 1,
            Head::Classification { classes } => classes,
        };
        let output = DenseLayer::glorot(prev, out_width, rng);

        Ok(Mlp {
            input_width,
            hidden,
            output,
            head,
        })
    }

    pub fn head(&self) -> Head {
        self.head
    }

    pub fn input_width(&self) -> usize {
        self.input_width
    }

    /// Forward one sample. Regression returns a single raw value;
    /// classification returns the softmax probability per class slot.
    pub fn predict(&self, features: &[f64]) -> Result<Vec<f64>> {
        if features.len() != self.input_width {
            bail!(
                "sample has {} points but the network expects {}",
                features.len(),
                self.input_width
            );
        }

        let mut current = features.to_vec();
        for layer in &self.hidden {
            let mut next = vec![0.0; layer.output_size];
            layer.forward(&current, &mut next, 1);
            relu(&mut next);
            current = next;
        }
        let mut out = vec![0.0; self.output.output_size];
        self.output.forward(&current, &mut out, 1);
        if matches!(self.head, Head::Classification { .. }) {
            softmax(&mut out);
        }
        Ok(out)
    }

    /// Mean loss (including the L2 penalty used in training) and metric
    /// over a dataset, dropout disabled.
    pub fn evaluate(&self, x: &[Vec<f64>], y: &Targets, l2: f64) -> Result<(f64, f64)> {
        if x.len() != y.len() || x.is_empty() {
            bail!(
                "evaluation needs matching non-empty features ({}) and targets ({})",
                x.len(),
                y.len()
            );
        }
        let mut loss = 0.0;
        let mut metric = 0.0;
        for (i, row) in x.iter().enumerate() {
            let out = self.predict(row)?;
            match (&self.head, y) {
                (Head::Regression, Targets::Values(values)) => {
                    let diff = out[0] - values[i];
                    loss += diff * diff;
                    metric += diff.abs();
                }
                (Head::Classification { classes }, Targets::Classes(indices)) => {
                    let target = indices[i];
                    if target >= *classes {
                        bail!("class index {target} out of range for {classes} slots");
                    }
                    loss -= out[target].max(1e-12).ln();
                    if argmax(&out) == target {
                        metric += 1.0;
                    }
                }
                _ => bail!("target kind does not match the network head"),
            }
        }
        let n = x.len() as f64;
        Ok((loss / n + l2 * self.penalty_norm(), metric / n))
    }

    fn penalty_norm(&self) -> f64 {
        self.hidden
            .iter()
            .map(DenseLayer::weight_norm_sq)
            .sum::<f64>()
            + self.output.weight_norm_sq()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self).context("serializing model")?;
        std::fs::write(path, json)
            .with_context(|| format!("writing model to {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading model from {}", path.display()))?;
        serde_json::from_str(&text).context("parsing model file")
    }
}

pub fn relu(data: &mut [f64]) {
    for v in data.iter_mut() {
        if *v < 0.0 {
            *v = 0.0;
        }
    }
}

/// Numerically stable softmax over one row, in place.
pub fn softmax(row: &mut [f64]) {
    let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut sum = 0.0;
    for v in row.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in row.iter_mut() {
        *v /= sum;
    }
}

pub fn argmax(row: &[f64]) -> usize {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate().skip(1) {
        if v > row[best] {
            best = i;
        }
    }
    best
}

// ---------------------------------------------------------------------------
// Training loop
// ---------------------------------------------------------------------------

impl Mlp {
    /// Train over `opts.epochs` epochs of shuffled minibatches, optionally
    /// evaluating a validation set after each epoch.
    pub fn fit(
        &mut self,
        x: &[Vec<f64>],
        y: &Targets,
        validation: Option<(&[Vec<f64>], &Targets)>,
        opts: &FitOptions,
        rng: &mut SimpleRng,
    ) -> Result<History> {
        let n = x.len();
        if n == 0 || y.len() != n {
            bail!(
                "training needs matching non-empty features ({n}) and targets ({})",
                y.len()
            );
        }
        for (i, row) in x.iter().enumerate() {
            if row.len() != self.input_width {
                bail!(
                    "training row {i} has {} points but the network expects {}",
                    row.len(),
                    self.input_width
                );
            }
        }
        self.check_targets(y)?;
        if let Some((vx, vy)) = validation {
            if vx.len() != vy.len() {
                bail!("validation features and targets differ in length");
            }
        }
        if opts.batch_size == 0 || opts.epochs == 0 {
            bail!("batch_size and epochs must be non-zero");
        }

        let batch = opts.batch_size.min(n);
        let out_width = self.output.output_size;
        let keep = 1.0 - opts.dropout;

        // Flat per-batch buffers, reused across epochs.
        let mut batch_input = vec![0.0; batch * self.input_width];
        let mut acts: Vec<Vec<f64>> = self
            .hidden
            .iter()
            .map(|l| vec![0.0; batch * l.output_size])
            .collect();
        let mut masks: Vec<Vec<f64>> = self
            .hidden
            .iter()
            .map(|l| vec![1.0; batch * l.output_size])
            .collect();
        let mut deltas: Vec<Vec<f64>> = self
            .hidden
            .iter()
            .map(|l| vec![0.0; batch * l.output_size])
            .collect();
        let mut out_buf = vec![0.0; batch * out_width];
        let mut out_delta = vec![0.0; batch * out_width];
        let mut input_grad = vec![0.0; batch * self.input_width];

        let mut grads: Vec<LayerGrads> = self
            .hidden
            .iter()
            .chain(std::iter::once(&self.output))
            .map(LayerGrads::zeros_like)
            .collect();

        let layer_refs: Vec<&DenseLayer> = self
            .hidden
            .iter()
            .chain(std::iter::once(&self.output))
            .collect();
        let mut adam = Adam::new(opts.learning_rate, opts.learning_decay, opts.l2, &layer_refs);
        drop(layer_refs);

        let mut indices: Vec<usize> = (0..n).collect();
        let mut history = History::default();

        for epoch in 0..opts.epochs {
            rng.shuffle(&mut indices);
            let mut total_loss = 0.0;
            let mut total_metric = 0.0;

            for chunk in indices.chunks(batch) {
                let bcount = chunk.len();

                for (slot, &idx) in chunk.iter().enumerate() {
                    batch_input[slot * self.input_width..(slot + 1) * self.input_width]
                        .copy_from_slice(&x[idx]);
                }

                // Forward through hidden layers with ReLU and dropout.
                for i in 0..self.hidden.len() {
                    let (done, rest) = acts.split_at_mut(i);
                    let input: &[f64] = if i == 0 { &batch_input } else { &done[i - 1] };
                    let layer = &self.hidden[i];
                    let act = &mut rest[0];
                    layer.forward(input, act, bcount);

                    let len = bcount * layer.output_size;
                    relu(&mut act[..len]);
                    if opts.dropout > 0.0 {
                        let mask = &mut masks[i];
                        for j in 0..len {
                            if rng.next_f64() < opts.dropout {
                                mask[j] = 0.0;
                                act[j] = 0.0;
                            } else {
                                mask[j] = 1.0 / keep;
                                act[j] *= 1.0 / keep;
                            }
                        }
                    }
                }

                let last_act = acts.last().map(|a| a.as_slice()).unwrap_or(&batch_input);
                self.output.forward(last_act, &mut out_buf, bcount);

                // Head loss and output delta.
                match (&self.head, y) {
                    (Head::Regression, Targets::Values(values)) => {
                        for b in 0..bcount {
                            let pred = out_buf[b];
                            let diff = pred - values[chunk[b]];
                            total_loss += diff * diff;
                            total_metric += diff.abs();
                            out_delta[b] = 2.0 * diff;
                        }
                    }
                    (Head::Classification { .. }, Targets::Classes(targets)) => {
                        for b in 0..bcount {
                            let row = &mut out_buf[b * out_width..(b + 1) * out_width];
                            softmax(row);
                            let target = targets[chunk[b]];
                            total_loss -= row[target].max(1e-12).ln();
                            if argmax(row) == target {
                                total_metric += 1.0;
                            }
                            let delta_row = &mut out_delta[b * out_width..(b + 1) * out_width];
                            delta_row.copy_from_slice(row);
                            delta_row[target] -= 1.0;
                        }
                    }
                    // check_targets ruled this out already
                    _ => bail!("target kind does not match the network head"),
                }

                // Backward.
                for g in grads.iter_mut() {
                    g.reset();
                }
                let last = self.hidden.len() - 1;
                let (out_grads, hidden_grads) = {
                    let (h, o) = grads.split_at_mut(self.hidden.len());
                    (&mut o[0], h)
                };
                self.output.backward(
                    &acts[last],
                    &out_delta,
                    &mut deltas[last],
                    out_grads,
                    bcount,
                );
                backprop_activation(
                    &mut deltas[last],
                    &acts[last],
                    &masks[last],
                    opts.dropout > 0.0,
                    bcount * self.hidden[last].output_size,
                );

                for i in (0..self.hidden.len()).rev() {
                    if i == 0 {
                        self.hidden[0].backward(
                            &batch_input,
                            &deltas[0],
                            &mut input_grad,
                            &mut hidden_grads[0],
                            bcount,
                        );
                    } else {
                        let (lower, upper) = deltas.split_at_mut(i);
                        self.hidden[i].backward(
                            &acts[i - 1],
                            &upper[0],
                            &mut lower[i - 1],
                            &mut hidden_grads[i],
                            bcount,
                        );
                        backprop_activation(
                            &mut lower[i - 1],
                            &acts[i - 1],
                            &masks[i - 1],
                            opts.dropout > 0.0,
                            bcount * self.hidden[i - 1].output_size,
                        );
                    }
                }

                let mut layer_muts: Vec<&mut DenseLayer> = self
                    .hidden
                    .iter_mut()
                    .chain(std::iter::once(&mut self.output))
                    .collect();
                adam.step(&mut layer_muts, &grads);
            }

            let epoch_loss = total_loss / n as f64 + opts.l2 * self.penalty_norm();
            let epoch_metric = total_metric / n as f64;
            history.loss.push(epoch_loss);
            history.metric.push(epoch_metric);

            if let Some((vx, vy)) = validation {
                let (vl, vm) = self.evaluate(vx, vy, opts.l2)?;
                history.val_loss.push(vl);
                history.val_metric.push(vm);
                log::info!(
                    "epoch {}/{}: loss {:.4} metric {:.4} val_loss {:.4} val_metric {:.4} lr {:.6}",
                    epoch + 1,
                    opts.epochs,
                    epoch_loss,
                    epoch_metric,
                    vl,
                    vm,
                    adam.current_lr()
                );
            } else {
                log::info!(
                    "epoch {}/{}: loss {:.4} metric {:.4} lr {:.6}",
                    epoch + 1,
                    opts.epochs,
                    epoch_loss,
                    epoch_metric,
                    adam.current_lr()
                );
            }
        }

        Ok(history)
    }

    fn check_targets(&self, y: &Targets) -> Result<()> {
        match (&self.head, y) {
            (Head::Regression, Targets::Values(_)) => Ok(()),
            (Head::Classification { classes }, Targets::Classes(indices)) => {
                if let Some(&bad) = indices.iter().find(|&&i| i >= *classes) {
                    bail!("class index {bad} out of range for {classes} output slots");
                }
                Ok(())
            }
            _ => bail!("target kind does not match the network head"),
        }
    }
}

/// Gradient of ReLU-then-dropout: units that ended up at zero are dead;
/// surviving units carry the inverted-dropout scale.
fn backprop_activation(delta: &mut [f64], act: &[f64], mask: &[f64], dropout: bool, len: usize) {
    for i in 0..len {
        if act[i] <= 0.0 {
            delta[i] = 0.0;
        } else if dropout {
            delta[i] *= mask[i];
        }
    }
}
