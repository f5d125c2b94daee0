use ndarray::{Array2, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;

use crate::optimizers::Optimizer;

/// Holds gradients for linear layer parameters during backpropagation
#[derive(Clone, Debug)]
pub struct LinearGradients {
    pub weight: Array2<f64>,
    pub bias: Array2<f64>,
}

impl LinearGradients {
    pub fn accumulate(&mut self, other: &LinearGradients) {
        self.weight += &other.weight;
        self.bias += &other.bias;
    }

    pub fn scale(&mut self, factor: f64) {
        self.weight *= factor;
        self.bias *= factor;
    }

    pub fn matrices_mut(&mut self) -> [&mut Array2<f64>; 2] {
        [&mut self.weight, &mut self.bias]
    }
}

/// A fully connected (dense) layer
///
/// Performs `output = weight · input + bias` where weight has shape
/// (output_size, input_size) and bias has shape (output_size, 1).
#[derive(Clone, Debug)]
pub struct LinearLayer {
    pub weight: Array2<f64>,
    pub bias: Array2<f64>,
    pub input_size: usize,
    pub output_size: usize,
}

impl LinearLayer {
    /// Create a new linear layer with Xavier/Glorot uniform initialization
    pub fn new(input_size: usize, output_size: usize) -> Self {
        Self::new_with_rng(input_size, output_size, &mut rand::thread_rng())
    }

    pub fn new_with_rng<R: Rng + ?Sized>(
        input_size: usize,
        output_size: usize,
        rng: &mut R,
    ) -> Self {
        let range = (6.0 / (input_size + output_size) as f64).sqrt();
        let dist = Uniform::new(-range, range);
        let weight = Array2::random_using((output_size, input_size), dist, rng);
        let bias = Array2::zeros((output_size, 1));

        Self {
            weight,
            bias,
            input_size,
            output_size,
        }
    }

    /// Create a linear layer from existing parameters
    ///
    /// Panics when the bias is not an (output_size, 1) column.
    pub fn from_weights(weight: Array2<f64>, bias: Array2<f64>) -> Self {
        let (output_size, input_size) = weight.dim();
        assert_eq!(bias.shape(), &[output_size, 1], "Bias shape must be (output_size, 1)");

        Self {
            weight,
            bias,
            input_size,
            output_size,
        }
    }

    /// Forward pass; `input` has shape (input_size, batch_size)
    pub fn forward(&self, input: &Array2<f64>) -> Array2<f64> {
        &self.weight.dot(input) + &self.bias
    }

    /// Backward pass given the input seen by [`LinearLayer::forward`]
    ///
    /// Returns (gradients, input_gradient).
    pub fn backward(
        &self,
        input: &Array2<f64>,
        grad_output: &Array2<f64>,
    ) -> (LinearGradients, Array2<f64>) {
        let weight = grad_output.dot(&input.t());
        // Sum over the batch dimension, keep as column vector
        let bias = grad_output.sum_axis(Axis(1)).insert_axis(Axis(1));
        let input_grad = self.weight.t().dot(grad_output);

        (LinearGradients { weight, bias }, input_grad)
    }

    pub fn update_parameters<O: Optimizer>(
        &mut self,
        gradients: &LinearGradients,
        optimizer: &mut O,
        prefix: &str,
    ) {
        optimizer.update(&format!("{}_weight", prefix), &mut self.weight, &gradients.weight);
        optimizer.update(&format!("{}_bias", prefix), &mut self.bias, &gradients.bias);
    }

    pub fn zero_gradients(&self) -> LinearGradients {
        LinearGradients {
            weight: Array2::zeros(self.weight.raw_dim()),
            bias: Array2::zeros(self.bias.raw_dim()),
        }
    }

    pub fn num_parameters(&self) -> usize {
        self.weight.len() + self.bias.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizers::SGD;
    use ndarray::arr2;

    #[test]
    fn test_linear_layer_creation() {
        let layer = LinearLayer::new(10, 2);
        assert_eq!(layer.weight.shape(), &[2, 10]);
        assert_eq!(layer.bias.shape(), &[2, 1]);
        assert_eq!(layer.num_parameters(), 22);
    }

    #[test]
    fn test_from_weights_forward() {
        let layer =
            LinearLayer::from_weights(arr2(&[[1.0, 2.0], [3.0, 4.0]]), arr2(&[[0.5], [-0.5]]));
        let output = layer.forward(&arr2(&[[1.0], [1.0]]));
        assert_eq!(output, arr2(&[[3.5], [6.5]]));
    }

    #[test]
    fn test_linear_layer_backward() {
        let layer = LinearLayer::new(3, 2);
        let input = arr2(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);
        let grad_output = arr2(&[[1.0, 1.0], [1.0, 1.0]]);

        let (gradients, input_grad) = layer.backward(&input, &grad_output);

        assert_eq!(gradients.weight.shape(), &[2, 3]);
        assert_eq!(gradients.bias, arr2(&[[2.0], [2.0]]));
        assert_eq!(input_grad.shape(), &[3, 2]);
    }

    #[test]
    fn test_sgd_step_reduces_error() {
        let mut layer = LinearLayer::from_weights(Array2::zeros((1, 2)), Array2::zeros((1, 1)));
        let mut optimizer = SGD::new(0.1);
        let input = arr2(&[[1.0], [2.0]]);
        let target = arr2(&[[3.0]]);

        let before = (&layer.forward(&input) - &target)[[0, 0]].abs();
        let grad_output = &layer.forward(&input) - &target;
        let (gradients, _) = layer.backward(&input, &grad_output);
        layer.update_parameters(&gradients, &mut optimizer, "linear");
        let after = (&layer.forward(&input) - &target)[[0, 0]].abs();

        assert!(after < before);
    }
}
