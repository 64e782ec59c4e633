//! Error types for the impact assessment pipeline.
//!
//! These are raised inside [`anyhow::Error`]s throughout the crate. Callers that need to react to
//! a particular kind of failure (e.g. the scenario sweep, which records unresolved scenarios
//! rather than aborting) can recover the variant with `downcast_ref::<MriaError>()`.
use crate::solver::TerminationStatus;
use thiserror::Error;

/// A failure of one of the stages of the impact assessment pipeline
#[derive(Debug, Error, PartialEq)]
pub enum MriaError {
    /// The raw input table is inconsistent with the declared regions, sectors and products
    #[error("Malformed economic table: {0}")]
    MalformedTable(String),
    /// The baseline calibration problem could not be solved to optimality
    #[error("Baseline calibration failed: solver status was {status}")]
    BaselineCalibrationInfeasible {
        /// The status reported by the solver
        status: TerminationStatus,
    },
    /// Every numerical threshold was tried without reaching an optimal solution
    #[error(
        "No optimal rationing solution found after {attempts} attempt(s): last status was \
        {status} at threshold index {threshold_index} ({threshold:e})"
    )]
    NoFeasibleRationingSolution {
        /// Status of the final attempt
        status: TerminationStatus,
        /// Index of the final threshold tried
        threshold_index: usize,
        /// Value of the final threshold tried
        threshold: f64,
        /// Number of thresholds tried
        attempts: usize,
    },
    /// The solver could not be run or failed internally
    #[error("Solver unavailable: {0}")]
    SolverUnavailable(String),
    /// The solver ran out of time before reaching a solution
    #[error("Solver exceeded its time limit of {0}s")]
    SolverTimeout(f64),
}

/// Convenience constructor for [`MriaError::MalformedTable`]
pub fn malformed(message: impl Into<String>) -> MriaError {
    MriaError::MalformedTable(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_feasible_message() {
        let err = MriaError::NoFeasibleRationingSolution {
            status: TerminationStatus::Infeasible,
            threshold_index: 12,
            threshold: 1.0,
            attempts: 13,
        };
        assert_eq!(
            err.to_string(),
            "No optimal rationing solution found after 13 attempt(s): last status was infeasible \
            at threshold index 12 (1e0)"
        );
    }

    #[test]
    fn test_downcast_from_anyhow() {
        let err = anyhow::Error::new(malformed("bad")).context("Loading table");
        assert_eq!(
            err.downcast_ref::<MriaError>(),
            Some(&MriaError::MalformedTable("bad".into()))
        );
    }
}
