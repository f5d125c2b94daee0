//! Calendar log parsing.
//!
//! A calendar log is a tab-separated text file with one event per line:
//!
//! ```text
//! 03 Jan, 2021	Period Starts
//! 07 Jan, 2021	Period Ends
//! ```
//!
//! Every start is paired with the first end that follows it, and each period
//! after the first becomes a [`PeriodRecord`].

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Date format used by calendar logs, e.g. `03 Jan, 2021`.
pub const DATE_FORMAT: &str = "%d %b, %Y";
pub const START_LABEL: &str = "Period Starts";
pub const END_LABEL: &str = "Period Ends";

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("failed to read calendar: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: invalid date `{value}`")]
    InvalidDate { line: usize, value: String },
    #[error("period starting {start} has no end date")]
    MissingEnd { start: NaiveDate },
    #[error("period ending {end} ends before it starts on {start}")]
    EndBeforeStart { start: NaiveDate, end: NaiveDate },
    #[error("period starting {start} does not come after the previous start {previous}")]
    OutOfOrder { previous: NaiveDate, start: NaiveDate },
    #[error("expected START:END with valid dates, got `{0}`")]
    InvalidPeriodArgument(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodEvent {
    Start,
    End,
}

impl PeriodEvent {
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            START_LABEL => Some(PeriodEvent::Start),
            END_LABEL => Some(PeriodEvent::End),
            _ => None,
        }
    }
}

/// A period start with the end date paired to it, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
}

/// Lengths derived for one period
///
/// `cycle_length` is the number of days since the previous period started,
/// `menstruation_length` counts the start and end days inclusively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodRecord {
    pub start_date: NaiveDate,
    pub cycle_length: i64,
    pub menstruation_length: i64,
}

impl PeriodRecord {
    /// `(cycle_length, menstruation_length)` as model features
    pub fn pair(&self) -> [f64; 2] {
        [self.cycle_length as f64, self.menstruation_length as f64]
    }
}

/// Parse a date as written in calendar logs, falling back to ISO 8601
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y-%m-%d"))
        .ok()
}

/// Pair start and end events into periods
///
/// Lines with fewer than two tab-separated fields and lines with unknown
/// labels are skipped. An end with no open start is ignored, as is any end
/// after the first one for the same start.
pub fn pair_events(text: &str) -> Result<Vec<Period>, CalendarError> {
    let mut periods: Vec<Period> = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let line_number = index + 1;
        let fields: Vec<&str> = line.trim().split('\t').collect();
        if fields.len() < 2 {
            continue;
        }

        let event = match PeriodEvent::from_label(fields[1].trim()) {
            Some(event) => event,
            None => {
                debug!("line {}: skipping unknown event `{}`", line_number, fields[1]);
                continue;
            }
        };

        let date = parse_date(fields[0]).ok_or_else(|| CalendarError::InvalidDate {
            line: line_number,
            value: fields[0].to_string(),
        })?;

        match event {
            PeriodEvent::Start => periods.push(Period { start: date, end: None }),
            PeriodEvent::End => match periods.last_mut() {
                Some(period) if period.end.is_none() => period.end = Some(date),
                Some(period) => warn!(
                    "line {}: ignoring second end {} for period starting {}",
                    line_number, date, period.start
                ),
                None => warn!("line {}: ignoring end {} before any start", line_number, date),
            },
        }
    }

    Ok(periods)
}

/// Derive a record for every period after the first
///
/// The first period only anchors the first cycle length, so it may lack an
/// end date.
pub fn records_from_periods(periods: &[Period]) -> Result<Vec<PeriodRecord>, CalendarError> {
    for period in periods {
        if let Some(end) = period.end {
            if end < period.start {
                return Err(CalendarError::EndBeforeStart { start: period.start, end });
            }
        }
    }

    periods
        .windows(2)
        .map(|pair| {
            let (previous, current) = (&pair[0], &pair[1]);
            if current.start <= previous.start {
                return Err(CalendarError::OutOfOrder {
                    previous: previous.start,
                    start: current.start,
                });
            }
            let end = current.end.ok_or(CalendarError::MissingEnd { start: current.start })?;

            Ok(PeriodRecord {
                start_date: current.start,
                cycle_length: (current.start - previous.start).num_days(),
                menstruation_length: (end - current.start).num_days() + 1,
            })
        })
        .collect()
}

pub fn parse_calendar(text: &str) -> Result<Vec<PeriodRecord>, CalendarError> {
    let periods = pair_events(text)?;
    records_from_periods(&periods)
}

/// Parse a `START:END` period such as `2021-01-03:2021-01-07`
pub fn parse_period_argument(argument: &str) -> Result<Period, CalendarError> {
    let invalid = || CalendarError::InvalidPeriodArgument(argument.to_string());
    let (start, end) = argument.split_once(':').ok_or_else(invalid)?;

    Ok(Period {
        start: parse_date(start).ok_or_else(invalid)?,
        end: Some(parse_date(end).ok_or_else(invalid)?),
    })
}

/// Records from `START:END` periods given oldest first
pub fn records_from_arguments<S: AsRef<str>>(
    arguments: &[S],
) -> Result<Vec<PeriodRecord>, CalendarError> {
    let periods = arguments
        .iter()
        .map(|argument| parse_period_argument(argument.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    records_from_periods(&periods)
}

/// Read a calendar log from disk and derive its period records
pub fn read_period_file<P: AsRef<Path>>(path: P) -> Result<Vec<PeriodRecord>, CalendarError> {
    let text = fs::read_to_string(path)?;
    parse_calendar(&text)
}
