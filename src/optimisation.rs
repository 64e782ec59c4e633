//! The linear programme solved at each stage of the pipeline.
//!
//! Every stage shares the same structure: output variables for each region-sector and a
//! supply-demand balance constraint for each region-product. The disruption stages add variables
//! for rationed demand and disaster imports. A [`Stage`] selects the bounds, objective and
//! right-hand side.
use crate::coefficients::{Coefficients, OutputMap, RegionProductMap};
use crate::disruption::DisruptionLimits;
use crate::error::MriaError;
use crate::id::{ProductID, RegionID, SectorID};
use crate::solver::{Column, Problem, Sense, Solver, TerminationStatus};
use crate::table::Dimensions;
use crate::trade::ImportLimitMap;
use anyhow::{Result, ensure};
use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};
use strum::Display;

pub mod constraints;
use constraints::add_balance_constraints;

/// The data shared by every stage
#[derive(Clone, Copy)]
pub struct ModelInputs<'a> {
    /// The table's index sets
    pub dims: &'a Dimensions,
    /// Supply and use coefficients
    pub coeffs: &'a Coefficients,
    /// Final demand `fd[R,P]`
    pub final_demand: &'a RegionProductMap,
    /// Exports to the rest of the world `ExportROW[R,P]`
    pub exports: &'a RegionProductMap,
}

impl ModelInputs<'_> {
    /// Final demand plus exports for a region-product
    fn total_demand(&self, region: &RegionID, product: &ProductID) -> f64 {
        let key = (region.clone(), product.clone());
        self.final_demand[&key] + self.exports[&key]
    }
}

/// Bounds on the disruption stages' variables
#[derive(Clone, Copy)]
pub struct DisruptionBounds<'a> {
    /// Output and rationing limits
    pub limits: &'a DisruptionLimits,
    /// Disaster import limits for the current threshold
    pub imports: &'a ImportLimitMap,
}

/// A stage of the pipeline, with the stage-specific data needed to build its problem
#[derive(Clone, Copy)]
pub enum Stage<'a> {
    /// Find the smallest output vector for which supply covers intermediate and final demand
    Calibrate,
    /// Minimise rationed demand under a disruption
    Ration(DisruptionBounds<'a>),
    /// Minimise output and disaster imports with rationing fixed at the given values
    MinimiseOutput(DisruptionBounds<'a>, &'a RegionProductMap),
    /// Find the smallest output vector which covers intermediate use plus the given demand
    RecomputeDemand(&'a RegionProductMap),
}

/// The name of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// [`Stage::Calibrate`]
    Calibrate,
    /// [`Stage::Ration`]
    Ration,
    /// [`Stage::MinimiseOutput`]
    MinimiseOutput,
    /// [`Stage::RecomputeDemand`]
    RecomputeDemand,
}

impl Stage<'_> {
    /// The name of the stage
    pub fn kind(&self) -> StageKind {
        match self {
            Self::Calibrate => StageKind::Calibrate,
            Self::Ration(_) => StageKind::Ration,
            Self::MinimiseOutput(..) => StageKind::MinimiseOutput,
            Self::RecomputeDemand(_) => StageKind::RecomputeDemand,
        }
    }

    /// Whether the stage has rationing and disaster import variables
    fn is_disruption(&self) -> bool {
        matches!(self, Self::Ration(_) | Self::MinimiseOutput(..))
    }

    /// The right-hand side of the balance constraint for a region-product
    fn demand_rhs(&self, inputs: &ModelInputs, region: &RegionID, product: &ProductID) -> f64 {
        let key = (region.clone(), product.clone());
        match self {
            Self::Calibrate => inputs.total_demand(region, product),
            Self::Ration(bounds) | Self::MinimiseOutput(bounds, _) => {
                inputs.total_demand(region, product) - bounds.limits.demand_loss[&key]
            }
            Self::RecomputeDemand(demand) => demand[&key],
        }
    }
}

/// A decision variable of a stage's problem
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VariableKey {
    /// Output `X[R,S]` (or `Xdis[R,S]` for the disruption stages)
    Output(RegionID, SectorID),
    /// Rationed demand `Ddis[R,P]`
    Rationing(RegionID, ProductID),
    /// Disaster imports `disimp[Rb,R,P]` of `Rb`'s product into `R`
    DisasterImport(RegionID, RegionID, ProductID),
}

impl VariableKey {
    fn output(region: &RegionID, sector: &SectorID) -> Self {
        Self::Output(region.clone(), sector.clone())
    }

    fn rationing(region: &RegionID, product: &ProductID) -> Self {
        Self::Rationing(region.clone(), product.clone())
    }

    fn disaster_import(from_region: &RegionID, to_region: &RegionID, product: &ProductID) -> Self {
        Self::DisasterImport(from_region.clone(), to_region.clone(), product.clone())
    }
}

/// A map for easy lookup of variables in the problem.
///
/// The entries are ordered (see [`IndexMap`]) in the same order as the problem's columns.
#[derive(Default)]
pub struct VariableMap(IndexMap<VariableKey, Column>);

impl VariableMap {
    /// Add a column for the given key
    fn add(&mut self, problem: &mut Problem, key: VariableKey, cost: f64, upper: f64) {
        self.add_bounded(problem, key, cost, 0.0, upper);
    }

    /// Add a column for the given key with explicit bounds
    fn add_bounded(
        &mut self,
        problem: &mut Problem,
        key: VariableKey,
        cost: f64,
        lower: f64,
        upper: f64,
    ) {
        let var = problem.add_column(cost, lower..=upper);
        let existing = self.0.insert(key, var).is_some();
        assert!(!existing, "Duplicate entry for var");
    }

    /// Get the [`Column`] corresponding to the given key
    fn get(&self, key: &VariableKey) -> Column {
        *self.0.get(key).expect("No variable found for given params")
    }
}

/// The result of solving one stage
#[derive(Debug, Clone, PartialEq)]
pub struct SolvedModel {
    /// Which stage was solved
    pub stage: StageKind,
    /// How the solver terminated
    pub status: TerminationStatus,
    /// The objective value
    pub objective_value: f64,
    /// The value of each variable
    pub values: IndexMap<VariableKey, f64>,
    /// Realised supply minus realised demand for each region-product (the "inefficiency")
    pub balance: RegionProductMap,
}

impl SolvedModel {
    /// Whether the solver found an optimal solution
    pub fn is_optimal(&self) -> bool {
        self.status == TerminationStatus::Optimal
    }

    /// Iterate over the output of each region-sector
    pub fn iter_outputs(&self) -> impl Iterator<Item = (&RegionID, &SectorID, f64)> {
        self.values.iter().filter_map(|(key, value)| match key {
            VariableKey::Output(region, sector) => Some((region, sector, *value)),
            _ => None,
        })
    }

    /// Iterate over the rationed demand of each region-product
    pub fn iter_rationing(&self) -> impl Iterator<Item = (&RegionID, &ProductID, f64)> {
        self.values.iter().filter_map(|(key, value)| match key {
            VariableKey::Rationing(region, product) => Some((region, product, *value)),
            _ => None,
        })
    }

    /// Iterate over disaster imports as (exporting region, importing region, product, amount)
    pub fn iter_disaster_imports(
        &self,
    ) -> impl Iterator<Item = (&RegionID, &RegionID, &ProductID, f64)> {
        self.values.iter().filter_map(|(key, value)| match key {
            VariableKey::DisasterImport(from, to, product) => Some((from, to, product, *value)),
            _ => None,
        })
    }

    /// The output of each region-sector, collected into a map
    pub fn outputs(&self) -> OutputMap {
        self.iter_outputs()
            .map(|(region, sector, value)| ((region.clone(), sector.clone()), value))
            .collect()
    }

    /// Rationed demand of each region-product, collected into a map
    pub fn rationing(&self) -> RegionProductMap {
        self.iter_rationing()
            .map(|(region, product, value)| ((region.clone(), product.clone()), value))
            .collect()
    }

    /// The value of a variable, or zero if the stage has no such variable
    pub fn value(&self, key: &VariableKey) -> f64 {
        self.values.get(key).copied().unwrap_or_default()
    }

    /// Total rationed demand
    pub fn total_rationing(&self) -> f64 {
        self.iter_rationing().map(|(_, _, value)| value).sum()
    }

    /// Total output
    pub fn total_output(&self) -> f64 {
        self.iter_outputs().map(|(_, _, value)| value).sum()
    }

    /// Total disaster imports
    pub fn total_disaster_imports(&self) -> f64 {
        self.iter_disaster_imports()
            .map(|(_, _, _, value)| value)
            .sum()
    }
}

/// Build and solve the problem for a stage.
///
/// # Arguments
///
/// * `inputs` - Data shared by every stage
/// * `stage` - The stage to solve
/// * `solver` - The solver backend
///
/// # Returns
///
/// The solved model, whatever the termination status. An error is only returned if the solver
/// itself failed.
pub fn solve_stage(inputs: &ModelInputs, stage: &Stage, solver: &dyn Solver) -> Result<SolvedModel> {
    // Set up problem
    let mut problem = Problem::new(Sense::Minimise);
    let variables = add_variables(&mut problem, inputs, stage);

    // Add constraints
    let balance_keys = add_balance_constraints(&mut problem, &variables, inputs, stage);

    // Solve problem
    debug!(
        "Solving {} problem with {} columns and {} rows",
        stage.kind(),
        problem.columns().len(),
        problem.num_rows()
    );
    let solution = solver.solve(&problem)?;
    ensure!(
        solution.values.len() == problem.columns().len(),
        MriaError::SolverUnavailable(format!(
            "Solver returned {} values for {} columns",
            solution.values.len(),
            problem.columns().len()
        ))
    );
    debug!(
        "{} problem finished with status {} (objective {})",
        stage.kind(),
        solution.status,
        solution.objective_value
    );

    let balance = balance_keys
        .zip_slacks(&problem, &solution.values)
        .map(|(key, slack)| (key.clone(), slack))
        .collect();
    let values = variables
        .0
        .into_keys()
        .zip(solution.values.iter().copied())
        .collect();

    Ok(SolvedModel {
        stage: stage.kind(),
        status: solution.status,
        objective_value: solution.objective_value,
        values,
        balance,
    })
}

/// Add variables to the optimisation problem.
///
/// # Returns
///
/// A [`VariableMap`] with the problem's variables as values.
fn add_variables(problem: &mut Problem, inputs: &ModelInputs, stage: &Stage) -> VariableMap {
    let mut variables = VariableMap::default();
    let dims = inputs.dims;

    let (output_cost, bounds, fixed_rationing) = match stage {
        Stage::Calibrate | Stage::RecomputeDemand(_) => (1.0, None, None),
        Stage::Ration(bounds) => (0.0, Some(bounds), None),
        Stage::MinimiseOutput(bounds, rationing) => (1.0, Some(bounds), Some(*rationing)),
    };

    for (region, sector) in dims.iter_region_sectors() {
        let upper = bounds.map_or(f64::INFINITY, |bounds| {
            bounds.limits.output_limits[&(region.clone(), sector.clone())]
        });
        variables.add(problem, VariableKey::output(region, sector), output_cost, upper);
    }

    let Some(bounds) = bounds else {
        return variables;
    };

    for (region, product) in dims.iter_region_products() {
        let key = VariableKey::rationing(region, product);
        let upper = bounds.limits.rationing_limits[&(region.clone(), product.clone())];
        if let Some(rationing) = fixed_rationing {
            // Fix at the rationing stage's value, allowing for solver noise outside the bounds
            let value = rationing
                .get(&(region.clone(), product.clone()))
                .copied()
                .unwrap_or_default()
                .clamp(0.0, upper);
            variables.add_bounded(problem, key, 0.0, value, value);
        } else {
            variables.add(problem, key, 1.0, upper);
        }
    }

    let import_cost = if fixed_rationing.is_some() { 1.0 } else { 0.0 };
    for (from_region, to_region, product) in
        itertools::iproduct!(&dims.regions, &dims.regions, &dims.products)
    {
        if from_region == to_region {
            continue;
        }

        let upper = bounds.imports[&(from_region.clone(), to_region.clone(), product.clone())];
        variables.add(
            problem,
            VariableKey::disaster_import(from_region, to_region, product),
            import_cost,
            upper,
        );
    }

    variables
}
