use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::Pair;
use crate::utils::round_days;

/// Guards the percentage error against zero-length targets.
const MAPE_EPSILON: f64 = 1e-7;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EvaluationError {
    #[error("{truth} ground-truth values but {predictions} predictions")]
    LengthMismatch { truth: usize, predictions: usize },
    #[error("nothing to evaluate")]
    Empty,
}

/// Exact-match accuracy per predicted quantity, in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Accuracy {
    pub cycle_length: f64,
    pub menstruation_length: f64,
}

/// Error magnitudes per quantity, `[cycle_length, menstruation_length]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionReport {
    pub mae: Pair,
    /// Mean absolute percentage error, in percent.
    pub mape: Pair,
}

pub fn round_predictions(predictions: &[Pair]) -> Vec<[i64; 2]> {
    predictions
        .iter()
        .map(|p| [round_days(p[0]), round_days(p[1])])
        .collect()
}

fn check_lengths(truth: usize, predictions: usize) -> Result<(), EvaluationError> {
    if truth != predictions {
        return Err(EvaluationError::LengthMismatch { truth, predictions });
    }
    if truth == 0 {
        return Err(EvaluationError::Empty);
    }
    Ok(())
}

/// Fraction of rounded predictions equal to the ground truth, per quantity
pub fn evaluate_predictions(
    truth: &[[i64; 2]],
    predictions: &[[i64; 2]],
) -> Result<Accuracy, EvaluationError> {
    check_lengths(truth.len(), predictions.len())?;

    let hits = |dim: usize| truth.iter().zip(predictions).filter(|(t, p)| t[dim] == p[dim]).count();
    let n = truth.len() as f64;

    Ok(Accuracy {
        cycle_length: hits(0) as f64 / n,
        menstruation_length: hits(1) as f64 / n,
    })
}

/// Mean absolute and mean absolute percentage error of raw predictions
pub fn regression_report(
    truth: &[Pair],
    predictions: &[Pair],
) -> Result<RegressionReport, EvaluationError> {
    check_lengths(truth.len(), predictions.len())?;
    let n = truth.len() as f64;

    let mut mae = [0.0; 2];
    let mut mape = [0.0; 2];
    for (t, p) in truth.iter().zip(predictions) {
        for dim in 0..2 {
            let error = (t[dim] - p[dim]).abs();
            mae[dim] += error / n;
            mape[dim] += 100.0 * error / t[dim].abs().max(MAPE_EPSILON) / n;
        }
    }

    Ok(RegressionReport { mae, mape })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_accuracy_per_dimension() {
        let truth = [[28, 5], [29, 4], [30, 6], [27, 5]];
        let predictions = [[28, 4], [29, 4], [31, 6], [26, 4]];

        let accuracy = evaluate_predictions(&truth, &predictions).unwrap();
        assert_eq!(accuracy.cycle_length, 0.5);
        assert_eq!(accuracy.menstruation_length, 0.5);
    }

    #[test]
    fn test_rounding_before_comparison() {
        let rounded = round_predictions(&[[27.6, 4.4], [28.5, 5.49]]);
        assert_eq!(rounded, vec![[28, 4], [29, 5]]);

        let accuracy = evaluate_predictions(&[[28, 5], [29, 5]], &rounded).unwrap();
        assert_eq!(accuracy.cycle_length, 1.0);
        assert_eq!(accuracy.menstruation_length, 0.5);
    }

    #[test]
    fn test_length_errors() {
        assert_eq!(
            evaluate_predictions(&[[28, 5]], &[]),
            Err(EvaluationError::LengthMismatch { truth: 1, predictions: 0 })
        );
        assert_eq!(evaluate_predictions(&[], &[]), Err(EvaluationError::Empty));
    }

    #[test]
    fn test_regression_report() {
        let truth = [[28.0, 5.0], [30.0, 4.0]];
        let report = regression_report(&truth, &[[27.0, 5.0], [33.0, 5.0]]).unwrap();
        assert!((report.mae[0] - 2.0).abs() < 1e-12);
        assert!((report.mae[1] - 0.5).abs() < 1e-12);
        // (1/28 + 3/30) / 2 * 100
        assert!((report.mape[0] - (100.0 / 28.0 + 10.0) / 2.0).abs() < 1e-9);
        assert!((report.mape[1] - 12.5).abs() < 1e-9);
    }
}
