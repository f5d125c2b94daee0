use std::fmt::Write as _;
use std::path::Path;

use chrono::{Duration, NaiveDate};
use log::debug;
use serde::Serialize;
use thiserror::Error;

use crate::calendar::PeriodRecord;
use crate::dataset::{Pair, WINDOW};
use crate::models::cycle_model::CycleModel;
use crate::normalization::Normalizer;
use crate::persistence::{ModelMetadata, ModelPersistence, PersistenceError};
use crate::utils::round_days;

/// Output date format for projected periods.
pub const DISPLAY_DATE_FORMAT: &str = "%d.%m.%Y";

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("need at least {needed} recorded cycles, got {got}")]
    NotEnoughHistory { needed: usize, got: usize },
    #[error("{days} days from {from} is outside the supported date range")]
    DateOutOfRange { from: NaiveDate, days: i64 },
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Predicted next period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Prediction {
    pub cycle_length: i64,
    pub menstruation_length: i64,
    pub next_start: NaiveDate,
    pub next_end: NaiveDate,
}

/// A future period on the calendar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProjectedPeriod {
    pub start: NaiveDate,
    /// Last day of bleeding (inclusive).
    pub end: NaiveDate,
    pub length: i64,
}

fn shift(date: NaiveDate, days: i64) -> Result<NaiveDate, ForecastError> {
    Duration::try_days(days)
        .and_then(|delta| date.checked_add_signed(delta))
        .ok_or(ForecastError::DateOutOfRange { from: date, days })
}

/// Chain predicted `(cycle_length, menstruation_length)` pairs into dates
///
/// The first period starts `cycle_length` days after `last_known_start`,
/// each following one counts from the previous projected start.
pub fn project_periods(
    last_known_start: NaiveDate,
    predictions: &[[i64; 2]],
) -> Result<Vec<ProjectedPeriod>, ForecastError> {
    let mut anchor = last_known_start;
    let mut periods = Vec::with_capacity(predictions.len());
    for &[cycle_length, length] in predictions {
        let start = shift(anchor, cycle_length)?;
        let end = shift(start, length.saturating_sub(1))?;
        anchor = start;
        periods.push(ProjectedPeriod { start, end, length });
    }
    Ok(periods)
}

/// `0. From 01.02.2021 to 05.02.2021, length: 5` per line
pub fn format_projection(periods: &[ProjectedPeriod]) -> String {
    let mut out = String::new();
    for (num, period) in periods.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. From {} to {}, length: {}",
            num,
            period.start.format(DISPLAY_DATE_FORMAT),
            period.end.format(DISPLAY_DATE_FORMAT),
            period.length
        );
    }
    out
}

/// Trained model with the normalizer it was fitted with
#[derive(Debug, Clone)]
pub struct Forecaster {
    pub model: CycleModel,
    pub normalizer: Normalizer,
}

impl Forecaster {
    pub fn new(model: CycleModel, normalizer: Normalizer) -> Self {
        Forecaster { model, normalizer }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<(Self, ModelMetadata), ForecastError> {
        let (model, normalizer, metadata) = ModelPersistence::load(path)?.into_parts()?;
        Ok((Forecaster::new(model, normalizer), metadata))
    }

    /// Raw prediction in days for a window of pairs in days
    pub fn predict_window(&self, window: &[Pair]) -> Pair {
        let inputs = self.normalizer.normalize_window(window);
        self.normalizer.denormalize(&self.model.predict(&inputs))
    }

    /// Predict the period following the last record
    pub fn predict_next(&self, records: &[PeriodRecord]) -> Result<Prediction, ForecastError> {
        self.forecast(records, 1)?
            .into_iter()
            .next()
            .ok_or(ForecastError::NotEnoughHistory {
                needed: WINDOW,
                got: records.len(),
            })
    }

    /// Predict `count` periods ahead, feeding each prediction back as input
    ///
    /// Predicted lengths are clamped to at least one day so dates always
    /// move forward.
    pub fn forecast(
        &self,
        records: &[PeriodRecord],
        count: usize,
    ) -> Result<Vec<Prediction>, ForecastError> {
        if records.len() < WINDOW {
            return Err(ForecastError::NotEnoughHistory {
                needed: WINDOW,
                got: records.len(),
            });
        }

        let mut window: Vec<Pair> = records[records.len() - WINDOW..]
            .iter()
            .map(PeriodRecord::pair)
            .collect();
        let mut rounded = Vec::with_capacity(count);
        for _ in 0..count {
            let raw = self.predict_window(&window[window.len() - WINDOW..]);
            let days = [round_days(raw[0]).max(1), round_days(raw[1]).max(1)];
            debug!("raw prediction {:?} -> {:?}", raw, days);
            window.push([days[0] as f64, days[1] as f64]);
            rounded.push(days);
        }

        let last_start = records[records.len() - 1].start_date;
        Ok(project_periods(last_start, &rounded)?
            .into_iter()
            .zip(rounded)
            .map(|(period, [cycle_length, menstruation_length])| Prediction {
                cycle_length,
                menstruation_length,
                next_start: period.start,
                next_end: period.end,
            })
            .collect())
    }
}
