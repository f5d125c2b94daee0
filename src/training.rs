use std::time::Instant;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::{Pair, Sample};
use crate::loss::{LossFunction, MAELoss, MSELoss};
use crate::models::cycle_model::{column, CycleModel};
use crate::normalization::Normalizer;
use crate::optimizers::{Adam, Optimizer, SGD};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrainingError {
    #[error("no training samples")]
    EmptyDataset,
    #[error("batch size must be at least 1")]
    InvalidBatchSize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LossKind {
    #[default]
    Mse,
    Mae,
}

impl LossKind {
    pub fn build(self) -> Box<dyn LossFunction> {
        match self {
            LossKind::Mse => Box::new(MSELoss),
            LossKind::Mae => Box::new(MAELoss),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    #[default]
    Adam,
    Sgd,
}

impl OptimizerKind {
    pub fn build(self, learning_rate: f64) -> Box<dyn Optimizer> {
        match self {
            OptimizerKind::Adam => Box::new(Adam::new(learning_rate)),
            OptimizerKind::Sgd => Box::new(SGD::new(learning_rate)),
        }
    }
}

/// Configuration for training hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub clip_gradient: Option<f64>,
    /// Log progress every this many epochs; 0 disables progress logging.
    pub log_every: usize,
    pub shuffle: bool,
    pub seed: Option<u64>,
    pub loss: LossKind,
    pub optimizer: OptimizerKind,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            epochs: 500,
            batch_size: 32,
            learning_rate: 0.001,
            clip_gradient: Some(5.0),
            log_every: 50,
            shuffle: true,
            seed: None,
            loss: LossKind::default(),
            optimizer: OptimizerKind::default(),
        }
    }
}

/// Training metrics tracked during training
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub epoch: usize,
    pub train_loss: f64,
    pub validation_loss: Option<f64>,
    pub time_elapsed: f64,
}

/// Mini-batch trainer for [`CycleModel`]
///
/// Samples are given in days; the trainer normalizes inputs and targets with
/// its [`Normalizer`] and reports losses in normalized units.
pub struct CycleTrainer<L: LossFunction, O: Optimizer> {
    pub model: CycleModel,
    pub normalizer: Normalizer,
    pub loss_function: L,
    pub optimizer: O,
    pub config: TrainingConfig,
    metrics_history: Vec<TrainingMetrics>,
    rng: StdRng,
}

impl<L: LossFunction, O: Optimizer> CycleTrainer<L, O> {
    pub fn new(model: CycleModel, normalizer: Normalizer, loss_function: L, optimizer: O) -> Self {
        CycleTrainer {
            model,
            normalizer,
            loss_function,
            optimizer,
            config: TrainingConfig::default(),
            metrics_history: Vec::new(),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_config(mut self, config: TrainingConfig) -> Self {
        if let Some(seed) = config.seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
        self.config = config;
        self
    }

    /// One optimizer step on the averaged gradients of `batch`
    ///
    /// Returns the mean loss of the batch before the update.
    pub fn train_batch(&mut self, batch: &[Sample]) -> f64 {
        if batch.is_empty() {
            return 0.0;
        }

        let mut total_loss = 0.0;
        let mut total_gradients = self.model.zero_gradients();

        for sample in batch {
            let inputs = self.normalizer.normalize_window(&sample.inputs);
            let target = column(&self.normalizer.normalize(&sample.target));

            let (output, cache) = self.model.forward_with_cache(&inputs);
            total_loss += self.loss_function.compute_loss(&output, &target);

            let gradient = self.loss_function.compute_gradient(&output, &target);
            total_gradients.accumulate(&self.model.backward(&gradient, &cache));
        }

        total_gradients.scale(1.0 / batch.len() as f64);
        if let Some(max_norm) = self.config.clip_gradient {
            total_gradients.clip(max_norm);
        }
        self.model.update_parameters(&total_gradients, &mut self.optimizer);

        total_loss / batch.len() as f64
    }

    /// Train for the configured number of epochs with optional validation
    pub fn train(
        &mut self,
        train_data: &[Sample],
        validation_data: Option<&[Sample]>,
    ) -> Result<(), TrainingError> {
        if train_data.is_empty() {
            return Err(TrainingError::EmptyDataset);
        }
        if self.config.batch_size == 0 {
            return Err(TrainingError::InvalidBatchSize);
        }

        info!(
            "training on {} samples for {} epochs (batch size {}, {} parameters)",
            train_data.len(),
            self.config.epochs,
            self.config.batch_size,
            self.model.num_parameters()
        );

        let mut order: Vec<Sample> = train_data.to_vec();
        for epoch in 0..self.config.epochs {
            let start_time = Instant::now();
            if self.config.shuffle {
                order.shuffle(&mut self.rng);
            }

            let mut epoch_loss = 0.0;
            for (i, batch) in order.chunks(self.config.batch_size).enumerate() {
                let loss = self.train_batch(batch);
                debug!("epoch {} batch {}: loss {:.6}", epoch, i, loss);
                epoch_loss += loss * batch.len() as f64;
            }
            epoch_loss /= order.len() as f64;

            let validation_loss = validation_data
                .filter(|v| !v.is_empty())
                .map(|v| self.evaluate(v));
            let metrics = TrainingMetrics {
                epoch,
                train_loss: epoch_loss,
                validation_loss,
                time_elapsed: start_time.elapsed().as_secs_f64(),
            };

            let last_epoch = epoch + 1 == self.config.epochs;
            if self.config.log_every > 0 && (epoch % self.config.log_every == 0 || last_epoch) {
                match validation_loss {
                    Some(val_loss) => info!(
                        "epoch {}: train loss {:.6}, val loss {:.6}, {:.2}s",
                        epoch, epoch_loss, val_loss, metrics.time_elapsed
                    ),
                    None => info!(
                        "epoch {}: train loss {:.6}, {:.2}s",
                        epoch, epoch_loss, metrics.time_elapsed
                    ),
                }
            }
            self.metrics_history.push(metrics);
        }

        info!("training completed");
        Ok(())
    }

    /// Mean loss over `data` without updating the model
    pub fn evaluate(&self, data: &[Sample]) -> f64 {
        if data.is_empty() {
            return 0.0;
        }

        let total: f64 = data
            .iter()
            .map(|sample| {
                let inputs = self.normalizer.normalize_window(&sample.inputs);
                let target = column(&self.normalizer.normalize(&sample.target));
                let (output, _) = self.model.forward_with_cache(&inputs);
                self.loss_function.compute_loss(&output, &target)
            })
            .sum();

        total / data.len() as f64
    }

    /// Predict the next pair, in days, for a window given in days
    pub fn predict(&self, window: &[Pair]) -> Pair {
        let inputs = self.normalizer.normalize_window(window);
        self.normalizer.denormalize(&self.model.predict(&inputs))
    }

    pub fn predict_samples(&self, samples: &[Sample]) -> Vec<Pair> {
        samples.iter().map(|s| self.predict(&s.inputs)).collect()
    }

    pub fn get_latest_metrics(&self) -> Option<&TrainingMetrics> {
        self.metrics_history.last()
    }

    pub fn get_metrics_history(&self) -> &[TrainingMetrics] {
        &self.metrics_history
    }

    pub fn into_parts(self) -> (CycleModel, Normalizer) {
        (self.model, self.normalizer)
    }
}

/// Create a trainer with Adam and MSE loss, normalizer fitted on `train_data`
pub fn create_adam_trainer(
    model: CycleModel,
    train_data: &[Sample],
    config: TrainingConfig,
) -> CycleTrainer<MSELoss, Adam> {
    let normalizer = Normalizer::fit(train_data);
    let optimizer = Adam::new(config.learning_rate);
    CycleTrainer::new(model, normalizer, MSELoss, optimizer).with_config(config)
}

/// Trainer with the loss and optimizer named in `config`
pub fn create_trainer(
    model: CycleModel,
    train_data: &[Sample],
    config: TrainingConfig,
) -> CycleTrainer<Box<dyn LossFunction>, Box<dyn Optimizer>> {
    let normalizer = Normalizer::fit(train_data);
    let loss_function = config.loss.build();
    let optimizer = config.optimizer.build(config.learning_rate);
    CycleTrainer::new(model, normalizer, loss_function, optimizer).with_config(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizers::SGD;

    fn samples() -> Vec<Sample> {
        vec![
            Sample {
                inputs: [[28.0, 5.0], [30.0, 4.0], [27.0, 6.0]],
                target: [29.0, 5.0],
            },
            Sample {
                inputs: [[30.0, 4.0], [27.0, 6.0], [29.0, 5.0]],
                target: [26.0, 4.0],
            },
            Sample {
                inputs: [[27.0, 6.0], [29.0, 5.0], [26.0, 4.0]],
                target: [31.0, 6.0],
            },
        ]
    }

    #[test]
    fn test_trainer_creation() {
        let model = CycleModel::with_seed(6, 1, 1);
        let trainer = create_adam_trainer(model, &samples(), TrainingConfig::default());
        assert_eq!(trainer.model.hidden_size(), 6);
        assert_eq!(trainer.model.num_layers(), 1);
        assert!(trainer.get_latest_metrics().is_none());
    }

    #[test]
    fn test_training_reduces_loss() {
        let data = samples();
        let config = TrainingConfig {
            epochs: 300,
            batch_size: 3,
            learning_rate: 0.01,
            log_every: 0,
            seed: Some(3),
            ..TrainingConfig::default()
        };
        let mut trainer = create_adam_trainer(CycleModel::with_seed(8, 1, 9), &data, config);

        let before = trainer.evaluate(&data);
        trainer.train(&data, Some(&data)).unwrap();
        let after = trainer.evaluate(&data);

        assert!(after < before * 0.5, "loss went from {} to {}", before, after);
        assert_eq!(trainer.get_metrics_history().len(), 300);
        let last = trainer.get_latest_metrics().unwrap();
        assert_eq!(last.epoch, 299);
        assert!(last.validation_loss.is_some());
    }

    #[test]
    fn test_predict_in_days() {
        let data = samples();
        let normalizer = Normalizer::fit(&data);
        let model = CycleModel::with_seed(4, 1, 2);
        let trainer = CycleTrainer::new(model, normalizer, MSELoss, SGD::new(0.01));

        let prediction = trainer.predict(&data[0].inputs);
        // An untrained model stays close to the fitted mean
        assert!((prediction[0] - normalizer.mean[0]).abs() < 10.0);
        assert_eq!(trainer.predict_samples(&data).len(), 3);
    }

    #[test]
    fn test_configured_loss_and_optimizer() {
        let config: TrainingConfig = serde_json::from_str(
            r#"{ "epochs": 200, "batch_size": 3, "learning_rate": 0.05, "log_every": 0,
                 "seed": 4, "loss": "mae", "optimizer": "sgd" }"#,
        )
        .unwrap();
        assert_eq!(config.loss, LossKind::Mae);
        assert_eq!(config.optimizer, OptimizerKind::Sgd);
        assert_eq!(TrainingConfig::default().optimizer, OptimizerKind::Adam);

        let data = samples();
        let mut trainer = create_trainer(CycleModel::with_seed(8, 1, 9), &data, config);
        assert_eq!(trainer.optimizer.learning_rate(), 0.05);

        let before = trainer.evaluate(&data);
        trainer.train(&data, None).unwrap();
        assert!(trainer.evaluate(&data) < before);
    }

    #[test]
    fn test_train_errors() {
        let model = CycleModel::with_seed(2, 1, 0);
        let mut trainer = create_adam_trainer(model, &[], TrainingConfig::default());
        assert_eq!(trainer.train(&[], None), Err(TrainingError::EmptyDataset));

        let mut trainer = trainer.with_config(TrainingConfig {
            batch_size: 0,
            ..TrainingConfig::default()
        });
        assert_eq!(trainer.train(&samples(), None), Err(TrainingError::InvalidBatchSize));
    }
}
