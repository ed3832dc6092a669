use serde::{Deserialize, Serialize};

use crate::rng::SimpleRng;

// ---------------------------------------------------------------------------
// DenseLayer – fully connected layer over flat row-major buffers
// ---------------------------------------------------------------------------

/// A fully connected layer. Weights are row-major: `weights[i * output + j]`
/// connects input `i` to output `j`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    pub input_size: usize,
    pub output_size: usize,
    pub weights: Vec<f64>,
    pub biases: Vec<f64>,
}

/// Gradient accumulator matching one [`DenseLayer`]'s parameters.
#[derive(Debug, Clone)]
pub struct LayerGrads {
    pub weights: Vec<f64>,
    pub biases: Vec<f64>,
}

impl LayerGrads {
    pub fn zeros_like(layer: &DenseLayer) -> Self {
        LayerGrads {
            weights: vec![0.0; layer.weights.len()],
            biases: vec![0.0; layer.biases.len()],
        }
    }

    pub fn reset(&mut self) {
        self.weights.iter_mut().for_each(|g| *g = 0.0);
        self.biases.iter_mut().for_each(|g| *g = 0.0);
    }
}

impl DenseLayer {
    /// Glorot-uniform initialisation.
    pub fn glorot(input_size: usize, output_size: usize, rng: &mut SimpleRng) -> Self {
        let limit = (6.0 / (input_size + output_size) as f64).sqrt();
        let weights = (0..input_size * output_size)
            .map(|_| rng.range_f64(-limit, limit))
            .collect();
        DenseLayer {
            input_size,
            output_size,
            weights,
            biases: vec![0.0; output_size],
        }
    }

    /// Forward pass for a batch: `input` is `batch x input_size` row-major,
    /// `output` must hold at least `batch x output_size` values.
    pub fn forward(&self, input: &[f64], output: &mut [f64], batch: usize) {
        for b in 0..batch {
            let in_offset = b * self.input_size;
            let out_offset = b * self.output_size;
            for j in 0..self.output_size {
                let mut sum = self.biases[j];
                for i in 0..self.input_size {
                    sum += input[in_offset + i] * self.weights[i * self.output_size + j];
                }
                output[out_offset + j] = sum;
            }
        }
    }

    /// Backward pass: accumulates parameter gradients (averaged over the
    /// batch) into `grads` and writes the input gradient into `grad_input`.
    pub fn backward(
        &self,
        input: &[f64],
        grad_output: &[f64],
        grad_input: &mut [f64],
        grads: &mut LayerGrads,
        batch: usize,
    ) {
        let scale = 1.0 / batch as f64;

        for v in grad_input[..batch * self.input_size].iter_mut() {
            *v = 0.0;
        }

        for b in 0..batch {
            let in_offset = b * self.input_size;
            let out_offset = b * self.output_size;
            for j in 0..self.output_size {
                let g = grad_output[out_offset + j];
                grads.biases[j] += g * scale;
                for i in 0..self.input_size {
                    grads.weights[i * self.output_size + j] += input[in_offset + i] * g * scale;
                    grad_input[in_offset + i] += g * self.weights[i * self.output_size + j];
                }
            }
        }
    }

    /// Sum of squared kernel weights, for the L2 penalty term.
    pub fn weight_norm_sq(&self) -> f64 {
        self.weights.iter().map(|w| w * w).sum()
    }
}
