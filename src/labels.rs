use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// LabelTuple – one sample's label column(s)
// ---------------------------------------------------------------------------

/// The label value(s) of a single sample: one entry per configured label
/// column. Needs a total order so it can key a `BTreeMap` and so class
/// indices are assigned deterministically.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelTuple(pub Vec<f64>);

impl PartialEq for LabelTuple {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for LabelTuple {}

impl PartialOrd for LabelTuple {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LabelTuple {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        let len_order = self.0.len().cmp(&other.0.len());
        if len_order != std::cmp::Ordering::Equal {
            return len_order;
        }
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            let ord = a.total_cmp(b);
            if ord != std::cmp::Ordering::Equal {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    }
}

impl fmt::Display for LabelTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for v in &self.0 {
            if !first {
                write!(f, ";")?;
            }
            write!(f, "{v}")?;
            first = false;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Lookup failures outside the fitted domain. Explicit by contract: the
/// codec never silently coerces an unseen label or index.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("label tuple [{0}] was not seen when the codec was fitted")]
    UnknownLabel(LabelTuple),
    #[error("class index {0} is outside the fitted domain (1..={1})")]
    UnknownIndex(usize, usize),
    #[error("class index 0 is the reserved \"unknown\" slot and has no label")]
    ReservedSlot,
}

// ---------------------------------------------------------------------------
// LabelCodec – bijection between label tuples and dense class indices
// ---------------------------------------------------------------------------

/// Bijective mapping between label tuples and dense class indices.
///
/// Indices are 1-based: index 0 is reserved for the network's "unknown"
/// output slot and never maps to a label. Fitting sorts the distinct tuples
/// before assigning indices, so the same data always yields the same codec
/// regardless of input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "Vec<LabelTuple>", into = "Vec<LabelTuple>")]
pub struct LabelCodec {
    classes: Vec<LabelTuple>,
    index: BTreeMap<LabelTuple, usize>,
}

impl From<Vec<LabelTuple>> for LabelCodec {
    fn from(classes: Vec<LabelTuple>) -> Self {
        let index = classes
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i + 1))
            .collect();
        LabelCodec { classes, index }
    }
}

impl From<LabelCodec> for Vec<LabelTuple> {
    fn from(codec: LabelCodec) -> Self {
        codec.classes
    }
}

impl LabelCodec {
    /// Fit the bijection over the distinct label tuples in `tuples`
    /// (training ∪ validation data). Duplicates are collapsed; the distinct
    /// tuples are sorted and assigned indices 1..=n.
    pub fn fit(tuples: &[LabelTuple]) -> Self {
        let mut classes: Vec<LabelTuple> = tuples.to_vec();
        classes.sort();
        classes.dedup();
        LabelCodec::from(classes)
    }

    /// Number of distinct classes (excludes the reserved slot 0).
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Map a label tuple to its class index (1-based).
    pub fn encode(&self, tuple: &LabelTuple) -> Result<usize, CodecError> {
        self.index
            .get(tuple)
            .copied()
            .ok_or_else(|| CodecError::UnknownLabel(tuple.clone()))
    }

    /// Map a class index back to its label tuple.
    pub fn decode(&self, index: usize) -> Result<&LabelTuple, CodecError> {
        if index == 0 {
            return Err(CodecError::ReservedSlot);
        }
        self.classes
            .get(index - 1)
            .ok_or(CodecError::UnknownIndex(index, self.classes.len()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self).context("serializing label codec")?;
        std::fs::write(path, json)
            .with_context(|| format!("writing label codec to {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading label codec from {}", path.display()))?;
        serde_json::from_str(&text).context("parsing label codec")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuple(values: &[f64]) -> LabelTuple {
        LabelTuple(values.to_vec())
    }

    #[test]
    fn round_trip_over_fitted_domain() {
        let tuples = vec![tuple(&[2.0]), tuple(&[1.0]), tuple(&[2.0]), tuple(&[5.0])];
        let codec = LabelCodec::fit(&tuples);
        assert_eq!(codec.len(), 3);
        for t in &tuples {
            let idx = codec.encode(t).unwrap();
            assert_eq!(codec.decode(idx).unwrap(), t);
        }
    }

    #[test]
    fn fit_is_order_independent() {
        let a = LabelCodec::fit(&[tuple(&[3.0]), tuple(&[1.0]), tuple(&[2.0])]);
        let b = LabelCodec::fit(&[tuple(&[2.0]), tuple(&[3.0]), tuple(&[1.0])]);
        for t in [tuple(&[1.0]), tuple(&[2.0]), tuple(&[3.0])] {
            assert_eq!(a.encode(&t).unwrap(), b.encode(&t).unwrap());
        }
    }

    #[test]
    fn indices_are_one_based() {
        let codec = LabelCodec::fit(&[tuple(&[1.0]), tuple(&[2.0])]);
        assert_eq!(codec.encode(&tuple(&[1.0])).unwrap(), 1);
        assert_eq!(codec.encode(&tuple(&[2.0])).unwrap(), 2);
        assert!(matches!(codec.decode(0), Err(CodecError::ReservedSlot)));
    }

    #[test]
    fn unseen_label_fails() {
        let codec = LabelCodec::fit(&[tuple(&[1.0])]);
        assert!(matches!(
            codec.encode(&tuple(&[9.0])),
            Err(CodecError::UnknownLabel(_))
        ));
        assert!(matches!(
            codec.decode(42),
            Err(CodecError::UnknownIndex(42, 1))
        ));
    }

    #[test]
    fn multi_label_tuples() {
        let codec = LabelCodec::fit(&[tuple(&[1.0, 0.5]), tuple(&[1.0, 0.7])]);
        assert_eq!(codec.len(), 2);
        let idx = codec.encode(&tuple(&[1.0, 0.7])).unwrap();
        assert_eq!(codec.decode(idx).unwrap(), &tuple(&[1.0, 0.7]));
    }

    #[test]
    fn json_round_trip() {
        let codec = LabelCodec::fit(&[tuple(&[1.0]), tuple(&[2.0]), tuple(&[7.5])]);
        let json = serde_json::to_string(&codec).unwrap();
        let back: LabelCodec = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), 3);
        assert_eq!(back.encode(&tuple(&[7.5])).unwrap(), 3);
    }
}
