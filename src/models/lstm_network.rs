use ndarray::Array2;
use rand::Rng;

use crate::layers::lstm_cell::{LSTMCell, LSTMCellCache, LSTMCellGradients};
use crate::optimizers::Optimizer;

/// Cached values of every layer for one timestep
#[derive(Clone, Debug)]
pub struct LSTMNetworkCache {
    pub cell_caches: Vec<LSTMCellCache>,
}

/// Multi-layer LSTM network for sequence modeling
///
/// Stacks LSTM cells so that the hidden output of layer i is the input
/// of layer i+1 at the same timestep.
#[derive(Clone, Debug)]
pub struct LSTMNetwork {
    cells: Vec<LSTMCell>,
    pub input_size: usize,
    pub hidden_size: usize,
    pub num_layers: usize,
}

impl LSTMNetwork {
    /// Creates a new multi-layer LSTM network
    ///
    /// First layer accepts `input_size` dimensions, subsequent layers
    /// accept `hidden_size` dimensions from the previous layer.
    pub fn new(input_size: usize, hidden_size: usize, num_layers: usize) -> Self {
        Self::new_with_rng(input_size, hidden_size, num_layers, &mut rand::thread_rng())
    }

    pub fn new_with_rng<R: Rng + ?Sized>(
        input_size: usize,
        hidden_size: usize,
        num_layers: usize,
        rng: &mut R,
    ) -> Self {
        let cells = (0..num_layers)
            .map(|i| {
                let layer_input_size = if i == 0 { input_size } else { hidden_size };
                LSTMCell::new_with_rng(layer_input_size, hidden_size, rng)
            })
            .collect();

        LSTMNetwork {
            cells,
            input_size,
            hidden_size,
            num_layers,
        }
    }

    /// Creates a network from existing cells (used for deserialization)
    pub fn from_cells(cells: Vec<LSTMCell>, input_size: usize, hidden_size: usize) -> Self {
        let num_layers = cells.len();
        LSTMNetwork {
            cells,
            input_size,
            hidden_size,
            num_layers,
        }
    }

    pub fn get_cells(&self) -> &[LSTMCell] {
        &self.cells
    }

    pub fn get_cells_mut(&mut self) -> &mut [LSTMCell] {
        &mut self.cells
    }

    /// One timestep through all layers
    ///
    /// `hx` and `cx` hold the previous state of each layer and are replaced
    /// with the new state.
    pub fn step_with_cache(
        &self,
        input: &Array2<f64>,
        hx: &mut [Array2<f64>],
        cx: &mut [Array2<f64>],
    ) -> LSTMNetworkCache {
        let mut current_input = input.clone();
        let mut cell_caches = Vec::with_capacity(self.num_layers);

        for (layer, cell) in self.cells.iter().enumerate() {
            let (hy, cy, cache) = cell.forward_with_cache(&current_input, &hx[layer], &cx[layer]);
            cell_caches.push(cache);
            current_input = hy.clone();
            hx[layer] = hy;
            cx[layer] = cy;
        }

        LSTMNetworkCache { cell_caches }
    }

    /// Run a whole sequence from a zero state
    ///
    /// Returns the top layer hidden output of every timestep and the caches
    /// needed by [`LSTMNetwork::backward_sequence`].
    pub fn forward_sequence_with_cache(
        &self,
        sequence: &[Array2<f64>],
    ) -> (Vec<Array2<f64>>, Vec<LSTMNetworkCache>) {
        let mut hx = vec![Array2::zeros((self.hidden_size, 1)); self.num_layers];
        let mut cx = vec![Array2::zeros((self.hidden_size, 1)); self.num_layers];
        let mut outputs = Vec::with_capacity(sequence.len());
        let mut caches = Vec::with_capacity(sequence.len());

        for input in sequence {
            let cache = self.step_with_cache(input, &mut hx, &mut cx);
            outputs.push(hx[self.num_layers - 1].clone());
            caches.push(cache);
        }

        (outputs, caches)
    }

    /// Final top-layer hidden state after running `sequence`
    pub fn forward_sequence(&self, sequence: &[Array2<f64>]) -> Array2<f64> {
        let (outputs, _) = self.forward_sequence_with_cache(sequence);
        outputs
            .into_iter()
            .last()
            .unwrap_or_else(|| Array2::zeros((self.hidden_size, 1)))
    }

    /// Backpropagation through time over layers and timesteps
    ///
    /// `output_gradients[t]` is the loss gradient with respect to the top
    /// layer hidden output at timestep `t`. Hidden and cell gradients are
    /// carried backwards in time within each layer, and input gradients are
    /// passed down to the layer below.
    pub fn backward_sequence(
        &self,
        output_gradients: &[Array2<f64>],
        caches: &[LSTMNetworkCache],
    ) -> Vec<LSTMCellGradients> {
        let mut gradients = self.zero_gradients();
        let mut dh_next = vec![Array2::zeros((self.hidden_size, 1)); self.num_layers];
        let mut dc_next = vec![Array2::zeros((self.hidden_size, 1)); self.num_layers];

        for t in (0..caches.len()).rev() {
            let mut dh_from_above = output_gradients[t].clone();

            for layer in (0..self.num_layers).rev() {
                let dhy = &dh_from_above + &dh_next[layer];
                let cache = &caches[t].cell_caches[layer];
                let (step, dx, dhx, dcx) = self.cells[layer].backward(&dhy, &dc_next[layer], cache);

                gradients[layer].accumulate(&step);
                dh_next[layer] = dhx;
                dc_next[layer] = dcx;
                dh_from_above = dx;
            }
        }

        gradients
    }

    pub fn update_parameters<O: Optimizer>(
        &mut self,
        gradients: &[LSTMCellGradients],
        optimizer: &mut O,
    ) {
        for (i, (cell, cell_gradients)) in self.cells.iter_mut().zip(gradients.iter()).enumerate() {
            cell.update_parameters(cell_gradients, optimizer, &format!("layer_{}", i));
        }
    }

    pub fn zero_gradients(&self) -> Vec<LSTMCellGradients> {
        self.cells.iter().map(|cell| cell.zero_gradients()).collect()
    }

    pub fn num_parameters(&self) -> usize {
        self.cells.iter().map(LSTMCell::num_parameters).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_sequence_forward_shapes() {
        let network = LSTMNetwork::new(2, 4, 2);
        let sequence = vec![arr2(&[[0.5], [0.1]]), arr2(&[[0.2], [-0.3]]), arr2(&[[0.0], [1.0]])];

        let (outputs, caches) = network.forward_sequence_with_cache(&sequence);

        assert_eq!(outputs.len(), 3);
        assert_eq!(caches.len(), 3);
        assert_eq!(caches[0].cell_caches.len(), 2);
        assert_eq!(outputs[2].shape(), &[4, 1]);
        assert_eq!(network.forward_sequence(&sequence), outputs[2]);
    }

    #[test]
    fn test_second_layer_consumes_hidden_state() {
        let network = LSTMNetwork::new(2, 3, 2);
        assert_eq!(network.get_cells()[0].w_ih.shape(), &[12, 2]);
        assert_eq!(network.get_cells()[1].w_ih.shape(), &[12, 3]);
    }

    #[test]
    fn test_backward_sequence_shapes() {
        let network = LSTMNetwork::new(2, 3, 2);
        let sequence = vec![arr2(&[[0.5], [0.1]]), arr2(&[[0.2], [-0.3]])];
        let (outputs, caches) = network.forward_sequence_with_cache(&sequence);
        let grads = outputs.clone();

        let gradients = network.backward_sequence(&grads, &caches);

        assert_eq!(gradients.len(), 2);
        assert_eq!(gradients[0].w_ih.shape(), &[12, 2]);
        assert_eq!(gradients[1].w_hh.shape(), &[12, 3]);
        assert!(gradients[0].w_ih.iter().any(|&g| g != 0.0));
    }
}
