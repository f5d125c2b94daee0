use serde::{Deserialize, Serialize};

use crate::dataset::{Pair, Sample};
use crate::models::cycle_model::NUM_FEATURES;

/// Standard deviations below this are treated as constant features.
const MIN_STD: f64 = 1e-8;

/// Per-feature z-score scaling shared by model inputs and targets
///
/// Cycle and menstruation lengths live on very different scales (~28 vs ~5
/// days), so both are centred and scaled before they reach the LSTM. The
/// statistics are fitted on training inputs only and saved with the model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalizer {
    pub mean: Pair,
    pub std: Pair,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::identity()
    }
}

impl Normalizer {
    pub fn identity() -> Self {
        Normalizer {
            mean: [0.0; NUM_FEATURES],
            std: [1.0; NUM_FEATURES],
        }
    }

    /// Fit on every input pair of every sample
    ///
    /// An empty set yields the identity; a constant feature keeps a scale of
    /// one day.
    pub fn fit(samples: &[Sample]) -> Self {
        let pairs: Vec<&Pair> = samples.iter().flat_map(|s| s.inputs.iter()).collect();
        if pairs.is_empty() {
            return Self::identity();
        }
        let n = pairs.len() as f64;

        let mut mean = [0.0; NUM_FEATURES];
        let mut std = [0.0; NUM_FEATURES];
        for feature in 0..NUM_FEATURES {
            mean[feature] = pairs.iter().map(|p| p[feature]).sum::<f64>() / n;
            let variance = pairs
                .iter()
                .map(|p| (p[feature] - mean[feature]).powi(2))
                .sum::<f64>()
                / n;
            std[feature] = if variance.sqrt() < MIN_STD { 1.0 } else { variance.sqrt() };
        }

        Normalizer { mean, std }
    }

    pub fn normalize(&self, pair: &Pair) -> Pair {
        let mut out = [0.0; NUM_FEATURES];
        for (i, value) in out.iter_mut().enumerate() {
            *value = (pair[i] - self.mean[i]) / self.std[i];
        }
        out
    }

    pub fn denormalize(&self, pair: &Pair) -> Pair {
        let mut out = [0.0; NUM_FEATURES];
        for (i, value) in out.iter_mut().enumerate() {
            *value = pair[i] * self.std[i] + self.mean[i];
        }
        out
    }

    pub fn normalize_window(&self, window: &[Pair]) -> Vec<Pair> {
        window.iter().map(|pair| self.normalize(pair)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(inputs: [Pair; 3]) -> Sample {
        Sample { inputs, target: [0.0, 0.0] }
    }

    #[test]
    fn test_fit_statistics() {
        let samples = vec![
            sample([[26.0, 4.0], [28.0, 5.0], [30.0, 6.0]]),
            sample([[28.0, 5.0], [30.0, 6.0], [26.0, 4.0]]),
        ];
        let normalizer = Normalizer::fit(&samples);

        assert!((normalizer.mean[0] - 28.0).abs() < 1e-12);
        assert!((normalizer.mean[1] - 5.0).abs() < 1e-12);
        assert!((normalizer.std[0] - (8.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_then_denormalize_restores_value() {
        let normalizer = Normalizer {
            mean: [28.0, 5.0],
            std: [2.0, 0.5],
        };
        assert_eq!(normalizer.normalize(&[30.0, 4.0]), [1.0, -2.0]);
        assert_eq!(normalizer.denormalize(&[1.0, -2.0]), [30.0, 4.0]);
    }

    #[test]
    fn test_constant_feature_and_empty_input() {
        let samples = vec![sample([[28.0, 5.0], [28.0, 6.0], [28.0, 4.0]])];
        let normalizer = Normalizer::fit(&samples);
        assert_eq!(normalizer.std[0], 1.0);
        assert_eq!(normalizer.normalize(&[29.0, 5.0])[0], 1.0);

        assert_eq!(Normalizer::fit(&[]), Normalizer::identity());
    }
}
