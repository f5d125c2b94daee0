use ndarray::Array2;
use std::collections::HashMap;

/// Optimizer trait for parameter updates during training
pub trait Optimizer {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>);
    fn reset(&mut self);
    fn learning_rate(&self) -> f64;
}

impl<O: Optimizer + ?Sized> Optimizer for Box<O> {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        (**self).update(param_id, param, gradient)
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn learning_rate(&self) -> f64 {
        (**self).learning_rate()
    }
}

/// Stochastic Gradient Descent: θ = θ - η∇θ
#[derive(Clone, Debug)]
pub struct SGD {
    learning_rate: f64,
}

impl SGD {
    pub fn new(learning_rate: f64) -> Self {
        SGD { learning_rate }
    }
}

impl Optimizer for SGD {
    fn update(&mut self, _param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        param.scaled_add(-self.learning_rate, gradient);
    }

    fn reset(&mut self) {}

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }
}

/// Adam optimizer with adaptive learning rates
///
/// Implements: m_t = β₁m_{t-1} + (1-β₁)g_t
///             v_t = β₂v_{t-1} + (1-β₂)g_t²
///             θ_t = θ_{t-1} - η * m̂_t / (√v̂_t + ε)
/// where m̂_t and v̂_t are bias-corrected estimates. The step counter is kept
/// per parameter so that updating several tensors in one step does not skew
/// the bias correction.
#[derive(Clone, Debug)]
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    state: HashMap<String, AdamState>,
}

#[derive(Clone, Debug)]
struct AdamState {
    t: i32,
    m: Array2<f64>,
    v: Array2<f64>,
}

impl Adam {
    pub fn new(learning_rate: f64) -> Self {
        Adam::with_params(learning_rate, 0.9, 0.999, 1e-8)
    }

    pub fn with_params(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Adam {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            state: HashMap::new(),
        }
    }
}

impl Optimizer for Adam {
    fn update(&mut self, param_id: &str, param: &mut Array2<f64>, gradient: &Array2<f64>) {
        let state = self.state.entry(param_id.to_string()).or_insert_with(|| AdamState {
            t: 0,
            m: Array2::zeros(param.raw_dim()),
            v: Array2::zeros(param.raw_dim()),
        });
        state.t += 1;

        state.m = self.beta1 * &state.m + (1.0 - self.beta1) * gradient;
        state.v = self.beta2 * &state.v + (1.0 - self.beta2) * &(gradient * gradient);

        let m_hat = &state.m / (1.0 - self.beta1.powi(state.t));
        let v_hat = &state.v / (1.0 - self.beta2.powi(state.t));

        let update = self.learning_rate * m_hat / (v_hat.map(|x| x.sqrt()) + self.epsilon);
        *param -= &update;
    }

    fn reset(&mut self) {
        self.state.clear();
    }

    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_sgd_optimizer() {
        let mut optimizer = SGD::new(0.1);
        let mut param = arr2(&[[1.0, 2.0], [3.0, 4.0]]);
        let gradient = arr2(&[[0.1, 0.2], [0.3, 0.4]]);

        let original_param = param.clone();
        optimizer.update("test_param", &mut param, &gradient);

        let expected = &original_param - &(0.1 * &gradient);
        assert!((param - expected).map(|x| x.abs()).sum() < 1e-10);
    }

    #[test]
    fn test_adam_first_step_is_learning_rate_sized() {
        let mut optimizer = Adam::new(0.01);
        let mut param = arr2(&[[1.0, -1.0]]);
        let gradient = arr2(&[[0.5, -2.0]]);

        optimizer.update("p", &mut param, &gradient);

        // After bias correction the first step is ±η regardless of gradient size
        assert!((param[[0, 0]] - 0.99).abs() < 1e-6);
        assert!((param[[0, 1]] + 0.99).abs() < 1e-6);
    }

    #[test]
    fn test_adam_reset_clears_state() {
        let mut optimizer = Adam::new(0.01);
        let mut param = arr2(&[[1.0]]);
        optimizer.update("p", &mut param, &arr2(&[[1.0]]));
        optimizer.reset();
        assert!(optimizer.state.is_empty());
        assert_eq!(optimizer.learning_rate(), 0.01);
    }
}
