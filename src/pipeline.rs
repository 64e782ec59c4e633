//! The impact assessment pipeline.
//!
//! A table is calibrated once into a [`CalibratedBaseline`], which is then shared read-only by
//! every scenario evaluated against it. Evaluating a scenario runs the rationing stage (followed
//! by output minimisation, if enabled) under threshold escalation, then optionally recomputes the
//! output needed to satisfy the rationed demand.
use crate::coefficients::{Coefficients, RegionProductMap, final_demand_and_exports};
use crate::disruption::DisruptionLimits;
use crate::error::MriaError;
use crate::escalation::{Thresholds, escalate};
use crate::id::{RegionID, SectorID};
use crate::optimisation::{DisruptionBounds, ModelInputs, SolvedModel, Stage, solve_stage};
use crate::scenario::{DisruptionScenario, DistanceWeights};
use crate::solver::{Solver, TerminationStatus};
use crate::table::{Dimensions, EconomicTable};
use crate::trade::{ImportLimitMap, import_limits};
use anyhow::{Context, Result, ensure};
use log::{info, warn};

/// Which optional stages to run and how to escalate
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    /// Thresholds for the escalation of the disruption stages
    pub thresholds: Thresholds,
    /// Whether to minimise output and disaster imports after rationing
    pub minimise_output: bool,
    /// Whether to recompute the output needed to satisfy the rationed demand
    pub recompute_demand: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            minimise_output: true,
            recompute_demand: true,
        }
    }
}

/// A table along with its calibrated baseline output and the coefficients derived from it
#[derive(Debug, Clone)]
pub struct CalibratedBaseline {
    table: EconomicTable,
    /// Coefficients relative to the table's own output
    raw: Coefficients,
    /// Coefficients relative to the calibrated output
    calibrated: Coefficients,
    final_demand: RegionProductMap,
    exports: RegionProductMap,
    weights: DistanceWeights,
    calibration: SolvedModel,
}

impl CalibratedBaseline {
    /// The underlying table
    pub fn table(&self) -> &EconomicTable {
        &self.table
    }

    /// The table's index sets
    pub fn dimensions(&self) -> &Dimensions {
        self.table.dimensions()
    }

    /// Coefficients relative to the table's own output
    pub fn raw_coefficients(&self) -> &Coefficients {
        &self.raw
    }

    /// Coefficients relative to the calibrated output
    pub fn calibrated_coefficients(&self) -> &Coefficients {
        &self.calibrated
    }

    /// The solved calibration problem
    pub fn calibration(&self) -> &SolvedModel {
        &self.calibration
    }

    /// Final demand of each region-product
    pub fn final_demand(&self) -> &RegionProductMap {
        &self.final_demand
    }

    /// Exports to the rest of the world of each region-product
    pub fn exports(&self) -> &RegionProductMap {
        &self.exports
    }

    /// Value added per unit of output for a region-sector, relative to the table's own output.
    ///
    /// Zero for a region-sector with no output.
    pub fn value_added_share(&self, region: &RegionID, sector: &SectorID) -> f64 {
        let output = self.raw.output(region, sector);
        if output > 0.0 {
            self.table.total_value_added(region, sector) / output
        } else {
            0.0
        }
    }

    /// Inputs for the stages which use the table's own coefficients
    pub fn raw_inputs(&self) -> ModelInputs<'_> {
        ModelInputs {
            dims: self.dimensions(),
            coeffs: &self.raw,
            final_demand: &self.final_demand,
            exports: &self.exports,
        }
    }

    /// Inputs for the disruption stages, which use the calibrated coefficients
    pub fn disruption_inputs(&self) -> ModelInputs<'_> {
        ModelInputs {
            coeffs: &self.calibrated,
            ..self.raw_inputs()
        }
    }

    /// Output and rationing limits for a scenario
    pub fn disruption_limits(&self, scenario: &DisruptionScenario) -> DisruptionLimits {
        DisruptionLimits::new(
            self.dimensions(),
            &self.calibrated.xbase,
            &self.final_demand,
            &self.exports,
            scenario,
        )
    }

    /// Disaster import limits for a scenario at the given threshold
    pub fn import_limits(&self, scenario: &DisruptionScenario, threshold: f64) -> ImportLimitMap {
        import_limits(
            self.dimensions(),
            &self.calibrated,
            scenario,
            &self.weights,
            threshold,
        )
    }
}

/// Calibrate the baseline output of a table.
///
/// The calibration finds the smallest output vector for which supply covers intermediate use,
/// final demand and exports, correcting small inconsistencies in the table.
///
/// # Arguments
///
/// * `table` - The table
/// * `weights` - Distance weights used to limit disaster imports in later stages
/// * `solver` - The solver backend
///
/// # Returns
///
/// The calibrated baseline or [`MriaError::BaselineCalibrationInfeasible`] if the calibration
/// problem could not be solved to optimality.
pub fn calibrate(
    table: EconomicTable,
    weights: DistanceWeights,
    solver: &dyn Solver,
) -> Result<CalibratedBaseline> {
    let raw = Coefficients::derive(&table);
    let (final_demand, exports) = final_demand_and_exports(&table);
    let inputs = ModelInputs {
        dims: table.dimensions(),
        coeffs: &raw,
        final_demand: &final_demand,
        exports: &exports,
    };

    let calibration = solve_stage(&inputs, &Stage::Calibrate, solver)?;
    ensure!(
        calibration.is_optimal(),
        MriaError::BaselineCalibrationInfeasible {
            status: calibration.status
        }
    );
    info!(
        "Calibrated baseline: total output {:.6} (table total {:.6})",
        calibration.total_output(),
        raw.xbase.values().sum::<f64>()
    );

    let calibrated = Coefficients::derive_with_output(&table, calibration.outputs());
    Ok(CalibratedBaseline {
        table,
        raw,
        calibrated,
        final_demand,
        exports,
        weights,
        calibration,
    })
}

/// The result of evaluating one scenario
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioResult {
    /// Output and rationing limits used for the scenario
    pub limits: DisruptionLimits,
    /// The solved rationing stage
    pub rationing: SolvedModel,
    /// The solved output minimisation stage, if enabled
    pub minimised: Option<SolvedModel>,
    /// The output needed to satisfy the rationed demand, if enabled
    pub recomputed: Option<SolvedModel>,
    /// Index of the threshold at which the disruption stages succeeded
    pub threshold_index: usize,
    /// The threshold at which the disruption stages succeeded
    pub threshold: f64,
}

impl ScenarioResult {
    /// The final disruption stage: output minimisation if it was run, otherwise rationing
    pub fn disruption(&self) -> &SolvedModel {
        self.minimised.as_ref().unwrap_or(&self.rationing)
    }

    /// Iterate over every solved stage, in the order they were run
    pub fn iter_stages(&self) -> impl Iterator<Item = &SolvedModel> {
        std::iter::once(&self.rationing)
            .chain(self.minimised.as_ref())
            .chain(self.recomputed.as_ref())
    }

    /// Total rationed demand
    pub fn total_rationing(&self) -> f64 {
        self.disruption().total_rationing()
    }

    /// Total demand removed by the demand shock
    pub fn total_demand_loss(&self) -> f64 {
        self.limits.demand_loss.values().sum()
    }
}

/// The disruption stages solved in one escalation attempt
type AttemptStages = (SolvedModel, Option<SolvedModel>);

/// Evaluate a scenario against a calibrated baseline.
///
/// # Arguments
///
/// * `baseline` - The calibrated baseline
/// * `scenario` - The disruption
/// * `options` - Which stages to run and the escalation thresholds
/// * `solver` - The solver backend
///
/// # Returns
///
/// The solved stages or [`MriaError::NoFeasibleRationingSolution`] if the disruption stages did not
/// reach an optimal solution at any threshold.
pub fn evaluate_scenario(
    baseline: &CalibratedBaseline,
    scenario: &DisruptionScenario,
    options: &PipelineOptions,
    solver: &dyn Solver,
) -> Result<ScenarioResult> {
    scenario.validate().context("Invalid disruption scenario")?;

    let limits = baseline.disruption_limits(scenario);
    let inputs = baseline.disruption_inputs();
    let escalated = escalate(&options.thresholds, |_, threshold| {
        solve_disruption_stages(baseline, &inputs, &limits, scenario, threshold, options, solver)
    })?;
    let (rationing, minimised) = escalated.value;

    let recomputed = if options.recompute_demand {
        let demand = rationing.rationing();
        let solved = solve_stage(
            &baseline.raw_inputs(),
            &Stage::RecomputeDemand(&demand),
            solver,
        )?;
        if !solved.is_optimal() {
            warn!(
                "Recomputing output for rationed demand finished with status {}",
                solved.status
            );
        }
        Some(solved)
    } else {
        None
    };

    Ok(ScenarioResult {
        limits,
        rationing,
        minimised,
        recomputed,
        threshold_index: escalated.threshold_index,
        threshold: escalated.threshold,
    })
}

/// Solve the rationing stage, then output minimisation if enabled, for one threshold.
///
/// The returned status is optimal only if every stage which was run is optimal.
fn solve_disruption_stages(
    baseline: &CalibratedBaseline,
    inputs: &ModelInputs,
    limits: &DisruptionLimits,
    scenario: &DisruptionScenario,
    threshold: f64,
    options: &PipelineOptions,
    solver: &dyn Solver,
) -> Result<(TerminationStatus, AttemptStages)> {
    let imports = baseline.import_limits(scenario, threshold);
    let bounds = DisruptionBounds {
        limits,
        imports: &imports,
    };

    let rationing = solve_stage(inputs, &Stage::Ration(bounds), solver)?;
    if !rationing.is_optimal() || !options.minimise_output {
        return Ok((rationing.status, (rationing, None)));
    }

    let fixed = rationing.rationing();
    let minimised = solve_stage(inputs, &Stage::MinimiseOutput(bounds, &fixed), solver)?;
    Ok((minimised.status, (rationing, Some(minimised))))
}
