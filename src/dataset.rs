//! Windowing period histories into training samples.

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use log::info;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calendar::PeriodRecord;
use crate::models::cycle_model::NUM_FEATURES;

/// Number of consecutive pairs fed to the model.
pub const WINDOW: usize = 3;

/// Real training samples kept when mixing with synthetic data.
pub const DEFAULT_REAL_TAIL: usize = 78;

/// `(cycle_length, menstruation_length)` in days.
pub type Pair = [f64; NUM_FEATURES];

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to access dataset file: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: `{value}` is not a whole number of days")]
    InvalidNumber { line: usize, value: String },
    #[error("train fraction must be in (0, 1], got {0}")]
    InvalidTrainFraction(f64),
    #[error("repeat factor must be at least 1")]
    InvalidRepeat,
    #[error("invalid synthetic distribution: {0}")]
    InvalidDistribution(String),
}

/// Three consecutive pairs and the pair that followed them
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub inputs: [Pair; WINDOW],
    pub target: Pair,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// How many times the window list is repeated before splitting.
    pub repeat: usize,
    pub train_fraction: f64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        DatasetConfig {
            repeat: 1,
            train_fraction: 0.8,
        }
    }
}

impl DatasetConfig {
    pub fn validate(&self) -> Result<(), DatasetError> {
        if !(self.train_fraction > 0.0 && self.train_fraction <= 1.0) {
            return Err(DatasetError::InvalidTrainFraction(self.train_fraction));
        }
        if self.repeat == 0 {
            return Err(DatasetError::InvalidRepeat);
        }
        Ok(())
    }
}

/// Ordered train/test split
#[derive(Debug, Clone, Default)]
pub struct Split {
    pub train: Vec<Sample>,
    pub test: Vec<Sample>,
    /// Start date of the last input period of the first test sample.
    pub last_known_period: Option<NaiveDate>,
}

/// Slide a window of [`WINDOW`] pairs over `pairs`, targeting the next pair
pub fn make_windows(pairs: &[Pair]) -> Vec<Sample> {
    pairs
        .windows(WINDOW + 1)
        .map(|w| Sample {
            inputs: [w[0], w[1], w[2]],
            target: w[WINDOW],
        })
        .collect()
}

/// Repeat then split without shuffling; returns (train, test)
pub fn split_samples(
    samples: &[Sample],
    config: &DatasetConfig,
) -> Result<(Vec<Sample>, Vec<Sample>), DatasetError> {
    config.validate()?;
    let mut all = samples.repeat(config.repeat);
    let train_size = (all.len() as f64 * config.train_fraction).floor() as usize;
    let test = all.split_off(train_size);
    Ok((all, test))
}

/// Window real period records and split them into train and test sets
pub fn make_train_test_sets(
    records: &[PeriodRecord],
    config: &DatasetConfig,
) -> Result<Split, DatasetError> {
    let pairs: Vec<Pair> = records.iter().map(PeriodRecord::pair).collect();
    let windows = make_windows(&pairs);
    let (train, test) = split_samples(&windows, config)?;

    let last_known_period = if test.is_empty() {
        None
    } else {
        let first_test_window = train.len() % windows.len();
        Some(records[first_test_window + WINDOW - 1].start_date)
    };

    info!(
        "windowed {} records into {} train / {} test samples",
        records.len(),
        train.len(),
        test.len()
    );

    Ok(Split {
        train,
        test,
        last_known_period,
    })
}

/// Parse `<cycle>\t<menstruation>` lines; other line shapes are skipped
pub fn parse_synthetic(text: &str) -> Result<Vec<Pair>, DatasetError> {
    let mut pairs = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let values: Vec<&str> = line.trim().split('\t').collect();
        if values.len() != NUM_FEATURES {
            continue;
        }

        let mut pair = [0.0; NUM_FEATURES];
        for (slot, value) in pair.iter_mut().zip(values) {
            let days: i64 = value.trim().parse().map_err(|_| DatasetError::InvalidNumber {
                line: index + 1,
                value: value.to_string(),
            })?;
            *slot = days as f64;
        }
        pairs.push(pair);
    }

    Ok(pairs)
}

/// Load a synthetic `(cycle, menstruation)` file and window it like real data
pub fn load_synthetic_data<P: AsRef<Path>>(
    path: P,
    config: &DatasetConfig,
) -> Result<Split, DatasetError> {
    let text = fs::read_to_string(path)?;
    let pairs = parse_synthetic(&text)?;
    let (train, test) = split_samples(&make_windows(&pairs), config)?;

    info!(
        "loaded {} synthetic pairs: {} train / {} test samples",
        pairs.len(),
        train.len(),
        test.len()
    );

    Ok(Split {
        train,
        test,
        last_known_period: None,
    })
}

/// Synthetic training samples followed by the most recent real ones
///
/// `real_tail` limits how many real samples (taken from the end) are kept;
/// `None` keeps them all.
pub fn combine_training_sets(
    synthetic: &[Sample],
    real: &[Sample],
    real_tail: Option<usize>,
) -> Vec<Sample> {
    let keep = real_tail.unwrap_or(real.len()).min(real.len());
    synthetic
        .iter()
        .chain(&real[real.len() - keep..])
        .copied()
        .collect()
}

/// Normal distributions used to draw synthetic histories
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub cycle_mean: f64,
    pub cycle_std: f64,
    pub cycle_range: (i64, i64),
    pub menstruation_mean: f64,
    pub menstruation_std: f64,
    pub menstruation_range: (i64, i64),
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        SyntheticConfig {
            cycle_mean: 28.0,
            cycle_std: 2.0,
            cycle_range: (21, 35),
            menstruation_mean: 5.0,
            menstruation_std: 1.0,
            menstruation_range: (2, 8),
        }
    }
}

impl SyntheticConfig {
    /// Ranges must be non-empty and start at one day or more
    pub fn validate(&self) -> Result<(), DatasetError> {
        let ranges = [
            ("cycle_range", self.cycle_range),
            ("menstruation_range", self.menstruation_range),
        ];
        for (name, (lo, hi)) in ranges {
            if lo < 1 || lo > hi {
                return Err(DatasetError::InvalidDistribution(format!(
                    "{} must satisfy 1 <= min <= max, got ({}, {})",
                    name, lo, hi
                )));
            }
        }
        Ok(())
    }
}

/// Draw `count` plausible `(cycle, menstruation)` pairs
pub fn generate_synthetic<R: Rng + ?Sized>(
    count: usize,
    config: &SyntheticConfig,
    rng: &mut R,
) -> Result<Vec<[i64; 2]>, DatasetError> {
    config.validate()?;
    let cycle = Normal::new(config.cycle_mean, config.cycle_std)
        .map_err(|e| DatasetError::InvalidDistribution(e.to_string()))?;
    let menstruation = Normal::new(config.menstruation_mean, config.menstruation_std)
        .map_err(|e| DatasetError::InvalidDistribution(e.to_string()))?;

    let draw = |dist: &Normal<f64>, (lo, hi): (i64, i64), rng: &mut R| {
        (dist.sample(rng).round() as i64).clamp(lo, hi)
    };

    Ok((0..count)
        .map(|_| {
            let c = draw(&cycle, config.cycle_range, &mut *rng);
            let m = draw(&menstruation, config.menstruation_range, &mut *rng);
            [c, m]
        })
        .collect())
}

pub fn format_synthetic(pairs: &[[i64; 2]]) -> String {
    pairs.iter().map(|[c, m]| format!("{}\t{}\n", c, m)).collect()
}

pub fn write_synthetic<P: AsRef<Path>>(path: P, pairs: &[[i64; 2]]) -> Result<(), DatasetError> {
    fs::write(path, format_synthetic(pairs))?;
    Ok(())
}

/// Targets of `samples` as whole days
pub fn targets_as_days(samples: &[Sample]) -> Vec<[i64; 2]> {
    samples
        .iter()
        .map(|s| [s.target[0].round() as i64, s.target[1].round() as i64])
        .collect()
}
