//! The boundary between the pipeline and the numerical solver.
//!
//! Stages describe their linear programmes with a [`Problem`], which is independent of any
//! particular backend. A [`Solver`] turns a [`Problem`] into a [`RawSolution`]. The only backend
//! shipped is [`HighsSolver`], which uses the HiGHS solver via the `highs` crate.
use crate::error::MriaError;
use anyhow::Result;
use highs::{HighsModelStatus, RowProblem};
use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use strum::Display;

pub use highs::Sense;

/// A reference to a column (decision variable) of a [`Problem`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Column(usize);

impl Column {
    /// The position of the column in the problem
    pub fn index(self) -> usize {
        self.0
    }
}

/// A decision variable: its objective coefficient and bounds
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    /// Coefficient of the variable in the objective
    pub cost: f64,
    /// Lower bound
    pub lower: f64,
    /// Upper bound (may be infinite)
    pub upper: f64,
}

/// A linear constraint of the form `lower <= sum(coeff * var) <= upper`
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Lower bound (may be minus infinity)
    pub lower: f64,
    /// Upper bound (may be infinity)
    pub upper: f64,
    /// Coefficient of each variable appearing in the row
    pub terms: IndexMap<Column, f64>,
}

impl Row {
    /// Create a new row with no terms
    pub fn new(bounds: RangeInclusive<f64>) -> Self {
        Self {
            lower: *bounds.start(),
            upper: *bounds.end(),
            terms: IndexMap::new(),
        }
    }

    /// Add `coeff * var` to the row.
    ///
    /// Terms for a variable which is already present are merged, as solvers reject rows with
    /// duplicate entries. Zero coefficients are skipped.
    pub fn add_term(&mut self, var: Column, coeff: f64) {
        if coeff == 0.0 {
            return;
        }

        *self.terms.entry(var).or_insert(0.0) += coeff;
    }

    /// The value of the row's linear expression for the given column values
    pub fn activity(&self, values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(var, coeff)| coeff * values[var.index()])
            .sum()
    }
}

/// A linear programme, described independently of any solver backend
#[derive(Debug, Clone)]
pub struct Problem {
    columns: Vec<ColumnSpec>,
    rows: Vec<Row>,
    sense: Sense,
}

impl Problem {
    /// Create an empty problem with the given optimisation sense
    pub fn new(sense: Sense) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            sense,
        }
    }

    /// Add a column with the given objective coefficient and bounds
    pub fn add_column(&mut self, cost: f64, bounds: RangeInclusive<f64>) -> Column {
        self.columns.push(ColumnSpec {
            cost,
            lower: *bounds.start(),
            upper: *bounds.end(),
        });

        Column(self.columns.len() - 1)
    }

    /// Add a constraint to the problem
    pub fn add_row(&mut self, row: Row) {
        self.rows.push(row);
    }

    /// The problem's columns, in the order they were added
    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    /// The problem's rows, in the order they were added
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// The number of rows added so far
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Whether the objective is minimised or maximised
    pub fn sense(&self) -> Sense {
        self.sense
    }

    /// Evaluate the objective function for the given column values
    pub fn objective_value(&self, values: &[f64]) -> f64 {
        self.columns
            .iter()
            .zip(values)
            .map(|(col, value)| col.cost * value)
            .sum()
    }
}

/// The termination status reported by a solver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TerminationStatus {
    /// An optimal solution was found
    Optimal,
    /// The problem has no feasible solution
    Infeasible,
    /// The objective is unbounded
    Unbounded,
    /// Any other outcome (numerical trouble, iteration limits, etc.)
    Other,
}

/// The result of a single solver call
#[derive(Debug, Clone, PartialEq)]
pub struct RawSolution {
    /// How the solver terminated
    pub status: TerminationStatus,
    /// A value for each column of the problem, in column order
    pub values: Vec<f64>,
    /// The objective value at `values`
    pub objective_value: f64,
}

/// A backend capable of solving a [`Problem`].
///
/// Solvers are shared between the workers of a scenario sweep, hence the `Sync` bound.
/// Implementations should return `Ok` with a non-optimal status when the solver ran but did not
/// find an optimum, and `Err` only when the solver itself could not be run
/// ([`MriaError::SolverUnavailable`]) or ran out of time ([`MriaError::SolverTimeout`]).
pub trait Solver: Sync {
    /// Solve the problem
    fn solve(&self, problem: &Problem) -> Result<RawSolution>;
}

/// Solver backend using HiGHS
#[derive(Debug, Clone, Default)]
pub struct HighsSolver {
    /// Time limit for each solver call, in seconds
    pub time_limit: Option<f64>,
    /// Whether HiGHS should write its own log to the console
    pub verbose: bool,
}

impl HighsSolver {
    /// Create a new [`HighsSolver`]
    pub fn new(time_limit: Option<f64>, verbose: bool) -> Self {
        Self {
            time_limit,
            verbose,
        }
    }
}

impl Solver for HighsSolver {
    fn solve(&self, problem: &Problem) -> Result<RawSolution> {
        let mut pb = RowProblem::default();
        let cols: Vec<_> = problem
            .columns()
            .iter()
            .map(|col| pb.add_column(col.cost, col.lower..=col.upper))
            .collect();
        for row in problem.rows() {
            pb.add_row(
                row.lower..=row.upper,
                row.terms
                    .iter()
                    .map(|(var, coeff)| (cols[var.index()], *coeff)),
            );
        }

        let mut model = pb.optimise(problem.sense());
        model.set_option("output_flag", self.verbose);
        if self.verbose {
            model.set_option("log_to_console", true);
        }
        if let Some(time_limit) = self.time_limit {
            model.set_option("time_limit", time_limit);
        }

        let solved = model
            .try_solve()
            .map_err(|status| MriaError::SolverUnavailable(format!("HiGHS error: {status:?}")))?;
        let highs_status = solved.status();
        debug!("HiGHS finished with model status {highs_status:?}");

        let status = match highs_status {
            HighsModelStatus::Optimal => TerminationStatus::Optimal,
            HighsModelStatus::Infeasible => TerminationStatus::Infeasible,
            HighsModelStatus::Unbounded | HighsModelStatus::UnboundedOrInfeasible => {
                TerminationStatus::Unbounded
            }
            HighsModelStatus::ReachedTimeLimit => {
                Err(MriaError::SolverTimeout(self.time_limit.unwrap_or_default()))?
            }
            _ => TerminationStatus::Other,
        };

        let values = solved.get_solution().columns().to_vec();
        let objective_value = problem.objective_value(&values);

        Ok(RawSolution {
            status,
            values,
            objective_value,
        })
    }
}
