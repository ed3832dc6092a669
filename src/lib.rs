//! spectral-mlp: train and run an MLP classifier/regressor over 1-D
//! spectral data (e.g. Raman spectra).
//!
//! The crate is a coordination layer: configuration, file loading, label
//! encoding, and resampling around a small feed-forward network in [`nn`].

pub mod config;
pub mod data;
pub mod labels;
pub mod nn;
pub mod predict;
pub mod preprocess;
pub mod report;
pub mod rng;
pub mod train;
