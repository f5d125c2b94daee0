//! Coarse cycle phase classification.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calendar::PeriodRecord;
use crate::utils::mean;

/// Days between ovulation and the next period start.
pub const LUTEAL_PHASE_DAYS: i64 = 14;

/// Days either side of the ovulation day still labelled as ovulation.
pub const OVULATION_MARGIN: i64 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PhaseError {
    #[error("day of cycle starts at 1")]
    InvalidDay,
    #[error("{today} is before the last period start {last_start}")]
    BeforeLastStart { last_start: NaiveDate, today: NaiveDate },
    #[error("thresholds need a positive cycle and menstruation length")]
    InvalidThresholds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Menstrual,
    Follicular,
    Ovulation,
    Luteal,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Menstrual => "menstrual",
            Phase::Follicular => "follicular",
            Phase::Ovulation => "ovulation",
            Phase::Luteal => "luteal",
        };
        f.write_str(name)
    }
}

/// Lengths the phase boundaries are derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseThresholds {
    pub cycle_length: i64,
    pub menstruation_length: i64,
}

impl Default for PhaseThresholds {
    fn default() -> Self {
        PhaseThresholds {
            cycle_length: 28,
            menstruation_length: 5,
        }
    }
}

impl PhaseThresholds {
    pub fn new(cycle_length: i64, menstruation_length: i64) -> Result<Self, PhaseError> {
        if cycle_length <= 0 || menstruation_length <= 0 {
            return Err(PhaseError::InvalidThresholds);
        }
        Ok(PhaseThresholds {
            cycle_length,
            menstruation_length,
        })
    }

    /// Rounded averages of the recorded lengths, defaults when empty
    pub fn from_history(records: &[PeriodRecord]) -> Self {
        let cycles: Vec<f64> = records.iter().map(|r| r.cycle_length as f64).collect();
        let menses: Vec<f64> = records.iter().map(|r| r.menstruation_length as f64).collect();

        match (mean(&cycles), mean(&menses)) {
            (Some(cycle), Some(menstruation)) => PhaseThresholds {
                cycle_length: cycle.round() as i64,
                menstruation_length: menstruation.round() as i64,
            },
            _ => PhaseThresholds::default(),
        }
    }

    /// Estimated ovulation day, never inside the menstrual phase
    pub fn ovulation_day(&self) -> i64 {
        (self.cycle_length - LUTEAL_PHASE_DAYS).max(self.menstruation_length + 1 + OVULATION_MARGIN)
    }
}

/// 1-based day of the cycle that `today` falls on
pub fn day_of_cycle(last_start: NaiveDate, today: NaiveDate) -> Result<i64, PhaseError> {
    if today < last_start {
        return Err(PhaseError::BeforeLastStart { last_start, today });
    }
    Ok((today - last_start).num_days() + 1)
}

/// Classify a 1-based cycle day
///
/// Days past the expected cycle length stay luteal.
pub fn classify(day: i64, thresholds: &PhaseThresholds) -> Result<Phase, PhaseError> {
    if day < 1 {
        return Err(PhaseError::InvalidDay);
    }

    let ovulation = thresholds.ovulation_day();
    let phase = if day <= thresholds.menstruation_length {
        Phase::Menstrual
    } else if day < ovulation - OVULATION_MARGIN {
        Phase::Follicular
    } else if day <= ovulation + OVULATION_MARGIN {
        Phase::Ovulation
    } else {
        Phase::Luteal
    };
    Ok(phase)
}

/// Days until the next expected period start; negative when late
pub fn days_until_next(day: i64, thresholds: &PhaseThresholds) -> i64 {
    thresholds.cycle_length - day + 1
}

/// Two-line summary of the phase and the next expected period
pub fn describe_day(day: i64, thresholds: &PhaseThresholds) -> Result<String, PhaseError> {
    let phase = classify(day, thresholds)?;
    let remaining = days_until_next(day, thresholds);
    let next = if remaining >= 0 {
        format!("Next period expected in {} days", remaining)
    } else {
        format!("Period is {} days late", -remaining)
    };
    Ok(format!("Day {} of the cycle: {} phase\n{}", day, phase, next))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_default_boundaries() {
        let t = PhaseThresholds::default();
        let phases: Vec<Phase> = [1, 5, 6, 12, 13, 14, 15, 16, 28, 40]
            .iter()
            .map(|&day| classify(day, &t).unwrap())
            .collect();

        assert_eq!(
            phases,
            vec![
                Phase::Menstrual,
                Phase::Menstrual,
                Phase::Follicular,
                Phase::Follicular,
                Phase::Ovulation,
                Phase::Ovulation,
                Phase::Ovulation,
                Phase::Luteal,
                Phase::Luteal,
                Phase::Luteal,
            ]
        );
    }

    #[test]
    fn test_short_cycle_keeps_ovulation_after_menstruation() {
        let t = PhaseThresholds::new(18, 6).unwrap();
        assert_eq!(t.ovulation_day(), 8);
        assert_eq!(classify(6, &t).unwrap(), Phase::Menstrual);
        assert_eq!(classify(7, &t).unwrap(), Phase::Ovulation);
        assert_eq!(classify(10, &t).unwrap(), Phase::Luteal);
    }

    #[test]
    fn test_thresholds_from_history() {
        let record = |cycle_length, menstruation_length| PeriodRecord {
            start_date: date(2021, 1, 1),
            cycle_length,
            menstruation_length,
        };
        let t = PhaseThresholds::from_history(&[record(30, 4), record(31, 5), record(32, 5)]);
        assert_eq!(t, PhaseThresholds { cycle_length: 31, menstruation_length: 5 });
        assert_eq!(t.ovulation_day(), 17);
        assert_eq!(classify(15, &t).unwrap(), Phase::Follicular);

        assert_eq!(PhaseThresholds::from_history(&[]), PhaseThresholds::default());
    }

    #[test]
    fn test_day_of_cycle() {
        assert_eq!(day_of_cycle(date(2021, 3, 1), date(2021, 3, 1)), Ok(1));
        assert_eq!(day_of_cycle(date(2021, 2, 27), date(2021, 3, 1)), Ok(3));
        assert!(matches!(
            day_of_cycle(date(2021, 3, 2), date(2021, 3, 1)),
            Err(PhaseError::BeforeLastStart { .. })
        ));
        assert_eq!(days_until_next(3, &PhaseThresholds::default()), 26);
    }

    #[test]
    fn test_describe_day() {
        let t = PhaseThresholds::default();
        assert_eq!(
            describe_day(3, &t).unwrap(),
            "Day 3 of the cycle: menstrual phase\nNext period expected in 26 days"
        );
        assert_eq!(
            describe_day(29, &t).unwrap(),
            "Day 29 of the cycle: luteal phase\nNext period expected in 0 days"
        );
        assert_eq!(
            describe_day(33, &t).unwrap(),
            "Day 33 of the cycle: luteal phase\nPeriod is 4 days late"
        );
        assert_eq!(describe_day(0, &t), Err(PhaseError::InvalidDay));
    }

    #[test]
    fn test_invalid_inputs() {
        assert_eq!(classify(0, &PhaseThresholds::default()), Err(PhaseError::InvalidDay));
        assert_eq!(PhaseThresholds::new(0, 5), Err(PhaseError::InvalidThresholds));
        assert_eq!(Phase::Ovulation.to_string(), "ovulation");
    }
}
