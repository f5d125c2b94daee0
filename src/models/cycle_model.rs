use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::layers::linear::{LinearGradients, LinearLayer};
use crate::layers::lstm_cell::LSTMCellGradients;
use crate::models::lstm_network::{LSTMNetwork, LSTMNetworkCache};
use crate::optimizers::Optimizer;

/// Number of values per timestep and per prediction:
/// (cycle_length, menstruation_length).
pub const NUM_FEATURES: usize = 2;

/// Gradients of every parameter in a [`CycleModel`]
#[derive(Clone, Debug)]
pub struct CycleModelGradients {
    pub lstm: Vec<LSTMCellGradients>,
    pub head: LinearGradients,
}

impl CycleModelGradients {
    pub fn accumulate(&mut self, other: &CycleModelGradients) {
        for (total, step) in self.lstm.iter_mut().zip(other.lstm.iter()) {
            total.accumulate(step);
        }
        self.head.accumulate(&other.head);
    }

    pub fn scale(&mut self, factor: f64) {
        for grad in &mut self.lstm {
            grad.scale(factor);
        }
        self.head.scale(factor);
    }

    /// Clip every gradient matrix to at most `max_norm` (Frobenius norm)
    pub fn clip(&mut self, max_norm: f64) {
        let lstm = self.lstm.iter_mut().flat_map(|g| g.matrices_mut());
        for matrix in lstm.chain(self.head.matrices_mut()) {
            let norm = matrix.iter().map(|x| x * x).sum::<f64>().sqrt();
            if norm > max_norm {
                *matrix *= max_norm / norm;
            }
        }
    }
}

/// Forward-pass state kept for [`CycleModel::backward`]
pub struct CycleModelCache {
    lstm: Vec<LSTMNetworkCache>,
    last_hidden: Array2<f64>,
}

/// Many-to-one LSTM regressor
///
/// Reads a window of `(cycle_length, menstruation_length)` pairs, one per
/// timestep, and maps the last hidden state through a dense head to the
/// next pair. Operates on normalized values; see
/// [`crate::normalization::Normalizer`].
#[derive(Clone, Debug)]
pub struct CycleModel {
    pub network: LSTMNetwork,
    pub head: LinearLayer,
}

impl CycleModel {
    pub fn new(hidden_size: usize, num_layers: usize) -> Self {
        Self::new_with_rng(hidden_size, num_layers, &mut rand::thread_rng())
    }

    /// Reproducible initialization
    pub fn with_seed(hidden_size: usize, num_layers: usize, seed: u64) -> Self {
        Self::new_with_rng(hidden_size, num_layers, &mut StdRng::seed_from_u64(seed))
    }

    pub fn new_with_rng<R: Rng + ?Sized>(
        hidden_size: usize,
        num_layers: usize,
        rng: &mut R,
    ) -> Self {
        let network = LSTMNetwork::new_with_rng(NUM_FEATURES, hidden_size, num_layers, rng);
        let head = LinearLayer::new_with_rng(hidden_size, NUM_FEATURES, rng);
        CycleModel { network, head }
    }

    pub fn from_parts(network: LSTMNetwork, head: LinearLayer) -> Self {
        CycleModel { network, head }
    }

    pub fn hidden_size(&self) -> usize {
        self.network.hidden_size
    }

    pub fn num_layers(&self) -> usize {
        self.network.num_layers
    }

    /// Predict the next pair for a window of (normalized) pairs
    pub fn predict(&self, window: &[[f64; NUM_FEATURES]]) -> [f64; NUM_FEATURES] {
        let (output, _) = self.forward_with_cache(window);
        [output[[0, 0]], output[[1, 0]]]
    }

    pub fn forward_with_cache(
        &self,
        window: &[[f64; NUM_FEATURES]],
    ) -> (Array2<f64>, CycleModelCache) {
        let sequence: Vec<Array2<f64>> = window.iter().map(column).collect();
        let (outputs, lstm) = self.network.forward_sequence_with_cache(&sequence);
        let last_hidden = outputs
            .last()
            .cloned()
            .unwrap_or_else(|| Array2::zeros((self.network.hidden_size, 1)));
        let output = self.head.forward(&last_hidden);

        (output, CycleModelCache { lstm, last_hidden })
    }

    /// Backward pass given ∂L/∂output of shape (2, 1)
    pub fn backward(
        &self,
        output_gradient: &Array2<f64>,
        cache: &CycleModelCache,
    ) -> CycleModelGradients {
        let (head, dh_last) = self.head.backward(&cache.last_hidden, output_gradient);

        let steps = cache.lstm.len();
        let mut output_gradients = vec![Array2::zeros((self.network.hidden_size, 1)); steps];
        if let Some(last) = output_gradients.last_mut() {
            *last = dh_last;
        }
        let lstm = self.network.backward_sequence(&output_gradients, &cache.lstm);

        CycleModelGradients { lstm, head }
    }

    pub fn update_parameters<O: Optimizer>(
        &mut self,
        gradients: &CycleModelGradients,
        optimizer: &mut O,
    ) {
        self.network.update_parameters(&gradients.lstm, optimizer);
        self.head.update_parameters(&gradients.head, optimizer, "head");
    }

    pub fn zero_gradients(&self) -> CycleModelGradients {
        CycleModelGradients {
            lstm: self.network.zero_gradients(),
            head: self.head.zero_gradients(),
        }
    }

    pub fn num_parameters(&self) -> usize {
        self.network.num_parameters() + self.head.num_parameters()
    }
}

/// Pair as an (n, 1) column vector
pub fn column(pair: &[f64; NUM_FEATURES]) -> Array2<f64> {
    Array2::from_shape_fn((NUM_FEATURES, 1), |(i, _)| pair[i])
}
