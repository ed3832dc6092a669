use std::path::Path;

use anyhow::{Context, Result, bail};

// ---------------------------------------------------------------------------
// Normalizer – optional, configuration-gated intensity rescaling
// ---------------------------------------------------------------------------

/// Row-wise intensity normalization: each spectrum is rescaled so its peak
/// intensity is 1. Rows whose maximum is not positive pass through
/// unchanged. Must be applied identically at training and prediction time.
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer;

impl Normalizer {
    pub fn transform_matrix(&self, matrix: &mut [Vec<f64>]) {
        for row in matrix.iter_mut() {
            self.transform_single(row);
        }
    }

    pub fn transform_single(&self, row: &mut [f64]) {
        let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if max > 0.0 {
            for v in row.iter_mut() {
                *v /= max;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Resampling onto the training axis
// ---------------------------------------------------------------------------

/// Linearly interpolate `intensity` (sampled at `sample_axis`) onto
/// `target_axis`. Target points outside the sample range clamp to the
/// nearest endpoint. Both axes may run ascending or descending; the output
/// always has `target_axis.len()` points, ordered like `target_axis`.
pub fn resample(sample_axis: &[f64], intensity: &[f64], target_axis: &[f64]) -> Result<Vec<f64>> {
    if sample_axis.len() != intensity.len() {
        bail!(
            "sample axis has {} points but intensity has {}",
            sample_axis.len(),
            intensity.len()
        );
    }
    if sample_axis.is_empty() {
        bail!("cannot resample an empty spectrum");
    }

    // Interpolation walks an ascending axis; reverse a descending input.
    let descending = sample_axis[0] > sample_axis[sample_axis.len() - 1];
    let (axis, values): (Vec<f64>, Vec<f64>) = if descending {
        (
            sample_axis.iter().rev().copied().collect(),
            intensity.iter().rev().copied().collect(),
        )
    } else {
        (sample_axis.to_vec(), intensity.to_vec())
    };

    let out = target_axis
        .iter()
        .map(|&t| interp_point(&axis, &values, t))
        .collect();
    Ok(out)
}

/// One linearly interpolated point; clamps outside the sampled range.
fn interp_point(axis: &[f64], values: &[f64], t: f64) -> f64 {
    let n = axis.len();
    if t <= axis[0] {
        return values[0];
    }
    if t >= axis[n - 1] {
        return values[n - 1];
    }
    // First index with axis[i] >= t; t is strictly inside the range here.
    let hi = axis.partition_point(|&x| x < t);
    let lo = hi - 1;
    let span = axis[hi] - axis[lo];
    if span == 0.0 {
        return values[lo];
    }
    let frac = (t - axis[lo]) / span;
    values[lo] + frac * (values[hi] - values[lo])
}

// ---------------------------------------------------------------------------
// Persisted training axis
// ---------------------------------------------------------------------------

/// Persist the training-time energy axis so prediction can resample new
/// spectra onto the same grid.
pub fn save_axis(path: &Path, axis: &[f64]) -> Result<()> {
    let json = serde_json::to_string(axis).context("serializing axis")?;
    std::fs::write(path, json).with_context(|| format!("writing axis to {}", path.display()))?;
    Ok(())
}

pub fn load_axis(path: &Path) -> Result<Vec<f64>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading axis from {}", path.display()))?;
    let axis: Vec<f64> = serde_json::from_str(&text).context("parsing axis")?;
    if axis.is_empty() {
        bail!("persisted axis at {} is empty", path.display());
    }
    Ok(axis)
}
