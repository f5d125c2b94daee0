//! # cycle-lstm
//!
//! Menstrual cycle forecasting from calendar logs with a small LSTM
//! regression model.
//!
//! ## Core Components
//!
//! - **Calendar**: parse `Period Starts` / `Period Ends` logs into per-cycle
//!   `(cycle_length, menstruation_length)` records
//! - **Dataset**: sliding windows of three cycles targeting the fourth,
//!   ordered train/test splits, synthetic histories
//! - **Model**: stacked LSTM with a dense head, trained with BPTT and Adam
//! - **Evaluation**: exact-match accuracy of rounded predictions per quantity
//! - **Forecast & Phase**: next period dates and the current cycle phase
//!
//! ## Quick Start
//!
//! ```rust
//! use cycle_lstm::calendar::parse_calendar;
//! use cycle_lstm::phase::{classify, Phase, PhaseThresholds};
//!
//! let log = "03 Jan, 2021\tPeriod Starts\n07 Jan, 2021\tPeriod Ends\n\
//!            31 Jan, 2021\tPeriod Starts\n04 Feb, 2021\tPeriod Ends\n";
//! let records = parse_calendar(log).unwrap();
//! assert_eq!(records[0].cycle_length, 28);
//! assert_eq!(records[0].menstruation_length, 5);
//!
//! let thresholds = PhaseThresholds::from_history(&records);
//! assert_eq!(classify(14, &thresholds).unwrap(), Phase::Ovulation);
//! ```

pub mod calendar;
pub mod config;
pub mod dataset;
pub mod evaluation;
pub mod forecast;
pub mod layers;
pub mod loss;
pub mod models;
pub mod normalization;
pub mod optimizers;
pub mod persistence;
pub mod phase;
pub mod training;
pub mod utils;

// Re-export commonly used items
pub use calendar::{parse_calendar, read_period_file, CalendarError, Period, PeriodRecord};
pub use dataset::{load_synthetic_data, make_train_test_sets, DatasetConfig, Sample, Split};
pub use evaluation::{evaluate_predictions, Accuracy};
pub use forecast::{Forecaster, Prediction};
pub use models::cycle_model::CycleModel;
pub use normalization::Normalizer;
pub use persistence::{ModelMetadata, ModelPersistence, PersistenceError, SavedModel};
pub use phase::{Phase, PhaseThresholds};
pub use training::{
    create_adam_trainer, create_trainer, CycleTrainer, LossKind, OptimizerKind, TrainingConfig,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_integration() {
        let model = CycleModel::with_seed(4, 2, 0);
        let forecaster = Forecaster::new(model, Normalizer { mean: [28.0, 5.0], std: [2.0, 1.0] });

        let prediction = forecaster.predict_window(&[[28.0, 5.0], [29.0, 5.0], [27.0, 4.0]]);

        assert_eq!(prediction.len(), 2);
        assert!(prediction.iter().all(|v| v.is_finite()));
    }
}
