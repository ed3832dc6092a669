use crate::labels::LabelTuple;

// ---------------------------------------------------------------------------
// LearningSet – one decomposed learning matrix
// ---------------------------------------------------------------------------

/// A learning file after decomposition: the shared energy axis, one feature
/// row per sample, and the matching label tuple per sample.
///
/// Invariants (enforced by the loader): every feature row has the same
/// length as the axis, and `features.len() == labels.len()`.
#[derive(Debug, Clone)]
pub struct LearningSet {
    /// Shared x-axis (e.g. Raman shift in 1/cm) for all samples.
    pub axis: Vec<f64>,
    /// Intensity rows, one per sample, each `axis.len()` wide.
    pub features: Vec<Vec<f64>>,
    /// Label tuple per sample (`label_columns` values each).
    pub labels: Vec<LabelTuple>,
}

impl LearningSet {
    /// Number of samples.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Feature-vector width, identical to the axis length.
    pub fn width(&self) -> usize {
        self.axis.len()
    }
}

// ---------------------------------------------------------------------------
// RawSample – a single unseen spectrum read for prediction
// ---------------------------------------------------------------------------

/// One spectrum from a two-row sample file, still on its own axis. It is
/// resampled onto the training axis before it reaches the model.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSample {
    pub axis: Vec<f64>,
    pub intensity: Vec<f64>,
}
