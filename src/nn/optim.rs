use super::dense::{DenseLayer, LayerGrads};

// ---------------------------------------------------------------------------
// Adam – adaptive moment estimation with Keras-style step decay
// ---------------------------------------------------------------------------

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const EPSILON: f64 = 1e-8;

/// First/second moment buffers for one layer.
#[derive(Debug, Clone)]
struct Moments {
    m_weights: Vec<f64>,
    v_weights: Vec<f64>,
    m_biases: Vec<f64>,
    v_biases: Vec<f64>,
}

impl Moments {
    fn zeros_like(layer: &DenseLayer) -> Self {
        Moments {
            m_weights: vec![0.0; layer.weights.len()],
            v_weights: vec![0.0; layer.weights.len()],
            m_biases: vec![0.0; layer.biases.len()],
            v_biases: vec![0.0; layer.biases.len()],
        }
    }
}

/// Adam optimizer over a stack of dense layers. The learning rate follows
/// the legacy Keras schedule `lr / (1 + decay * step)`, one step per batch.
#[derive(Debug)]
pub struct Adam {
    learning_rate: f64,
    decay: f64,
    l2: f64,
    step: u64,
    moments: Vec<Moments>,
}

impl Adam {
    pub fn new(learning_rate: f64, decay: f64, l2: f64, layers: &[&DenseLayer]) -> Self {
        Adam {
            learning_rate,
            decay,
            l2,
            step: 0,
            moments: layers.iter().map(|l| Moments::zeros_like(l)).collect(),
        }
    }

    /// Current decayed learning rate (before the step that would use it).
    pub fn current_lr(&self) -> f64 {
        self.learning_rate / (1.0 + self.decay * self.step as f64)
    }

    /// Apply one update across all layers. `layers` and `grads` must be in
    /// the same order as the slice passed to [`Adam::new`].
    pub fn step(&mut self, layers: &mut [&mut DenseLayer], grads: &[LayerGrads]) {
        self.step += 1;
        let lr = self.learning_rate / (1.0 + self.decay * self.step as f64);
        let bias_corr1 = 1.0 - BETA1.powi(self.step as i32);
        let bias_corr2 = 1.0 - BETA2.powi(self.step as i32);

        for ((layer, grad), moments) in layers
            .iter_mut()
            .zip(grads.iter())
            .zip(self.moments.iter_mut())
        {
            update_params(
                &mut layer.weights,
                &grad.weights,
                &mut moments.m_weights,
                &mut moments.v_weights,
                lr,
                bias_corr1,
                bias_corr2,
                self.l2,
            );
            update_params(
                &mut layer.biases,
                &grad.biases,
                &mut moments.m_biases,
                &mut moments.v_biases,
                lr,
                bias_corr1,
                bias_corr2,
                0.0, // biases are not regularized
            );
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn update_params(
    params: &mut [f64],
    grads: &[f64],
    m: &mut [f64],
    v: &mut [f64],
    lr: f64,
    bias_corr1: f64,
    bias_corr2: f64,
    l2: f64,
) {
    for i in 0..params.len() {
        let g = grads[i] + 2.0 * l2 * params[i];
        m[i] = BETA1 * m[i] + (1.0 - BETA1) * g;
        v[i] = BETA2 * v[i] + (1.0 - BETA2) * g * g;
        let m_hat = m[i] / bias_corr1;
        let v_hat = v[i] / bias_corr2;
        params[i] -= lr * m_hat / (v_hat.sqrt() + EPSILON);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::SimpleRng;

    #[test]
    fn steps_reduce_a_quadratic_loss() {
        // Minimise f(w) = (w - 3)^2 for a single "weight".
        let mut rng = SimpleRng::new(1);
        let mut layer = DenseLayer::glorot(1, 1, &mut rng);
        layer.weights[0] = 0.0;
        layer.biases[0] = 0.0;

        let mut adam = Adam::new(0.1, 0.0, 0.0, &[&layer]);
        for _ in 0..500 {
            let w = layer.weights[0];
            let grads = vec![LayerGrads {
                weights: vec![2.0 * (w - 3.0)],
                biases: vec![0.0],
            }];
            adam.step(&mut [&mut layer], &grads);
        }
        assert!((layer.weights[0] - 3.0).abs() < 0.05);
    }

    #[test]
    fn learning_rate_decays_with_steps() {
        let mut rng = SimpleRng::new(1);
        let mut layer = DenseLayer::glorot(1, 1, &mut rng);
        let mut adam = Adam::new(0.001, 0.5, 0.0, &[&layer]);
        assert!((adam.current_lr() - 0.001).abs() < 1e-15);

        let grads = vec![LayerGrads {
            weights: vec![0.0],
            biases: vec![0.0],
        }];
        adam.step(&mut [&mut layer], &grads);
        adam.step(&mut [&mut layer], &grads);
        // After 2 steps: lr / (1 + 0.5 * 2) = lr / 2.
        assert!((adam.current_lr() - 0.0005).abs() < 1e-15);
    }

    #[test]
    fn l2_pulls_weights_toward_zero() {
        let mut rng = SimpleRng::new(1);
        let mut layer = DenseLayer::glorot(1, 1, &mut rng);
        layer.weights[0] = 1.0;

        let mut adam = Adam::new(0.01, 0.0, 0.1, &[&layer]);
        let grads = vec![LayerGrads {
            weights: vec![0.0],
            biases: vec![0.0],
        }];
        for _ in 0..100 {
            adam.step(&mut [&mut layer], &grads);
        }
        assert!(layer.weights[0] < 1.0);
    }
}
