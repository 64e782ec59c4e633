//! Retrying a stage with progressively looser numerical thresholds.
//!
//! Disaster import limits below the current threshold are clamped to zero. Tiny limits can leave
//! the solver with a badly scaled problem, so when an attempt does not reach an optimal solution
//! it is retried with the next, larger threshold.
use crate::error::MriaError;
use crate::solver::TerminationStatus;
use anyhow::{Result, ensure};
use log::{debug, info, warn};
use serde::Deserialize;

/// The default escalation sequence
pub const DEFAULT_THRESHOLDS: [f64; 13] = [
    1e-30, 1e-12, 1e-11, 1e-10, 1e-9, 1e-8, 1e-7, 1e-6, 1e-4, 1e-3, 1e-2, 1e-1, 1.0,
];

/// A validated, strictly ascending sequence of numerical thresholds
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Vec<f64>")]
pub struct Thresholds(Vec<f64>);

impl TryFrom<Vec<f64>> for Thresholds {
    type Error = anyhow::Error;

    fn try_from(values: Vec<f64>) -> Result<Self> {
        Self::new(values)
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self(DEFAULT_THRESHOLDS.to_vec())
    }
}

impl Thresholds {
    /// Create a threshold sequence, checking that it is non-empty, finite, non-negative and
    /// strictly ascending
    pub fn new(values: Vec<f64>) -> Result<Self> {
        ensure!(!values.is_empty(), "At least one threshold must be given");
        for value in &values {
            ensure!(
                value.is_finite() && *value >= 0.0,
                "Thresholds must be finite, non-negative numbers (got {value})"
            );
        }
        ensure!(
            values.windows(2).all(|pair| pair[0] < pair[1]),
            "Thresholds must be strictly ascending"
        );

        Ok(Self(values))
    }

    /// The thresholds, in the order they are tried
    pub fn values(&self) -> &[f64] {
        &self.0
    }
}

/// The successful outcome of an escalation
#[derive(Debug, Clone, PartialEq)]
pub struct Escalated<T> {
    /// What the successful attempt produced
    pub value: T,
    /// Index of the threshold at which the attempt succeeded
    pub threshold_index: usize,
    /// The threshold at which the attempt succeeded
    pub threshold: f64,
}

/// Run `attempt` with each threshold in turn until it reports an optimal status.
///
/// `attempt` is given the threshold index and value and returns the status to inspect along with
/// whatever it produced. Errors returned by `attempt` abort the escalation immediately.
///
/// # Returns
///
/// The first optimal attempt or [`MriaError::NoFeasibleRationingSolution`] if every threshold was
/// tried without success.
pub fn escalate<T, F>(thresholds: &Thresholds, mut attempt: F) -> Result<Escalated<T>>
where
    F: FnMut(usize, f64) -> Result<(TerminationStatus, T)>,
{
    let mut last_status = TerminationStatus::Other;
    for (threshold_index, &threshold) in thresholds.values().iter().enumerate() {
        debug!("Attempt {} with threshold {threshold:e}", threshold_index + 1);
        let (status, value) = attempt(threshold_index, threshold)?;
        if status == TerminationStatus::Optimal {
            info!("Optimal solution found with threshold {threshold:e} (index {threshold_index})");
            return Ok(Escalated {
                value,
                threshold_index,
                threshold,
            });
        }

        debug!("Solver status {status} with threshold {threshold:e}");
        last_status = status;
    }

    let attempts = thresholds.values().len();
    let threshold = thresholds.values()[attempts - 1];
    warn!("No optimal solution found after trying {attempts} threshold(s)");
    Err(MriaError::NoFeasibleRationingSolution {
        status: last_status,
        threshold_index: attempts - 1,
        threshold,
        attempts,
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::assert_error;
    use rstest::rstest;

    fn scripted(
        statuses: &[TerminationStatus],
    ) -> impl FnMut(usize, f64) -> Result<(TerminationStatus, usize)> + '_ {
        let mut calls = 0;
        move |index, _| {
            assert_eq!(index, calls, "Thresholds must be tried in order");
            calls += 1;
            Ok((statuses[index], calls))
        }
    }

    #[test]
    fn test_default_thresholds_valid() {
        assert!(Thresholds::new(DEFAULT_THRESHOLDS.to_vec()).is_ok());
        assert_eq!(Thresholds::default().values().len(), 13);
    }

    #[rstest]
    #[case(vec![])]
    #[case(vec![1e-6, 1e-6])]
    #[case(vec![1e-3, 1e-6])]
    #[case(vec![-1.0, 1.0])]
    #[case(vec![1e-6, f64::INFINITY])]
    fn test_thresholds_invalid(#[case] values: Vec<f64>) {
        assert!(Thresholds::new(values).is_err());
    }

    #[test]
    fn test_escalate_first_attempt() {
        let thresholds = Thresholds::default();
        let statuses = [TerminationStatus::Optimal; 13];
        let result = escalate(&thresholds, scripted(&statuses)).unwrap();
        assert_eq!(result.threshold_index, 0);
        assert_eq!(result.value, 1);
    }

    #[test]
    fn test_escalate_stops_at_first_optimal() {
        let thresholds = Thresholds::new(vec![1e-9, 1e-6, 1e-3, 1.0]).unwrap();
        let statuses = [
            TerminationStatus::Infeasible,
            TerminationStatus::Other,
            TerminationStatus::Optimal,
            TerminationStatus::Optimal,
        ];
        let result = escalate(&thresholds, scripted(&statuses)).unwrap();
        assert_eq!(result.threshold_index, 2);
        assert_eq!(result.threshold.to_bits(), 1e-3_f64.to_bits());

        // Exactly three attempts were made
        assert_eq!(result.value, 3);
    }

    #[test]
    fn test_escalate_exhausted() {
        let thresholds = Thresholds::new(vec![1e-6, 1.0]).unwrap();
        let statuses = [TerminationStatus::Infeasible, TerminationStatus::Unbounded];
        let err = escalate(&thresholds, scripted(&statuses)).unwrap_err();
        assert_eq!(
            err.downcast_ref::<MriaError>(),
            Some(&MriaError::NoFeasibleRationingSolution {
                status: TerminationStatus::Unbounded,
                threshold_index: 1,
                threshold: 1.0,
                attempts: 2,
            })
        );
    }

    #[test]
    fn test_escalate_aborts_on_error() {
        let thresholds = Thresholds::default();
        let mut calls = 0;
        let result: Result<Escalated<()>> = escalate(&thresholds, |_, _| {
            calls += 1;
            Err(MriaError::SolverTimeout(5.0).into())
        });
        assert_error!(result, "Solver exceeded its time limit of 5s");
        assert_eq!(calls, 1);
    }
}
