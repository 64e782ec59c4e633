//! Evaluating many disruptions against one calibrated baseline.
//!
//! A sweep either removes a share (the magnitude) of the capacity of each region-sector in turn,
//! or deepens every supply shock of the model's scenario by each magnitude. Cases are independent
//! and share only the read-only baseline, so they are evaluated in parallel.
use crate::error::MriaError;
use crate::id::{RegionID, SectorID};
use crate::model::parameters::{SweepMode, SweepParameterSet, SweepParameters};
use crate::pipeline::{CalibratedBaseline, PipelineOptions, ScenarioResult, evaluate_scenario};
use crate::scenario::{DisruptionScenario, SupplyShocks};
use crate::solver::{Solver, TerminationStatus};
use crate::table::Dimensions;
use anyhow::{Context, Result, ensure};
use itertools::iproduct;
use log::{info, warn};
use rayon::prelude::*;
use std::fmt;

/// What one case of a sweep disrupts
#[derive(Debug, Clone, PartialEq)]
pub enum SweepTarget {
    /// A single region-sector, which loses the magnitude of its capacity
    Sector {
        /// The disrupted region
        region: RegionID,
        /// The disrupted sector
        sector: SectorID,
    },
    /// Every supply shock of the model's scenario, with the magnitude taken off the remaining
    /// capacity
    Scenario,
}

impl fmt::Display for SweepTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sector { region, sector } => write!(f, "{region}/{sector}"),
            Self::Scenario => write!(f, "scenario"),
        }
    }
}

/// One case of a sweep
#[derive(Debug, Clone, PartialEq)]
pub struct SweepCase {
    /// What is disrupted
    pub target: SweepTarget,
    /// Share of capacity which is lost
    pub magnitude: f64,
    /// Factor by which sectors without a supply shock may expand their output
    pub op_factor: f64,
    /// Multiplier on the volume of disaster imports
    pub imp_flex: f64,
}

impl SweepCase {
    /// The scenario for this case.
    ///
    /// `base` is the model's scenario. Single-sector cases only take its `all_disimp` switch;
    /// scenario cases keep its demand shocks and deepen its supply shocks, never below zero.
    pub fn scenario(&self, base: &DisruptionScenario) -> DisruptionScenario {
        let scenario = match &self.target {
            SweepTarget::Sector { region, sector } => {
                DisruptionScenario::new(self.op_factor, self.imp_flex, base.all_disimp)
                    .with_supply_shock(region.clone(), sector.clone(), 1.0 - self.magnitude)
            }
            SweepTarget::Scenario => {
                let mut supply_shocks = SupplyShocks::new(1.0);
                for (key, remaining) in base.supply_shocks.iter() {
                    supply_shocks.insert(key.clone(), (remaining - self.magnitude).max(0.0));
                }
                DisruptionScenario {
                    supply_shocks,
                    ..base.clone()
                }
            }
        };

        DisruptionScenario {
            op_factor: self.op_factor,
            imp_flex: self.imp_flex,
            ..scenario
        }
    }
}

/// The outcome of one case
#[derive(Debug, Clone, PartialEq)]
pub enum SweepOutcome {
    /// The disruption stages reached an optimal solution
    Resolved(Box<ScenarioResult>),
    /// No threshold gave an optimal solution
    Unresolved {
        /// Status of the final attempt
        status: TerminationStatus,
        /// Number of thresholds tried
        attempts: usize,
    },
}

/// A case along with its outcome
#[derive(Debug, Clone, PartialEq)]
pub struct SweepRecord {
    /// The case
    pub case: SweepCase,
    /// Its outcome
    pub outcome: SweepOutcome,
}

/// Build the cases of a sweep.
///
/// Cases are ordered by magnitude, then parameter set, then region and sector.
///
/// # Arguments
///
/// * `dims` - The table's index sets
/// * `sweep` - The sweep parameters from the model file
/// * `base` - The model's scenario, whose `op_factor` and `imp_flex` are used if `sweep` gives no
///   parameter sets
pub fn sweep_plan(
    dims: &Dimensions,
    sweep: &SweepParameters,
    base: &DisruptionScenario,
) -> Result<Vec<SweepCase>> {
    ensure!(
        !sweep.magnitudes.is_empty(),
        "At least one sweep magnitude must be given"
    );
    for magnitude in &sweep.magnitudes {
        ensure!(
            (0.0..=1.0).contains(magnitude),
            "Sweep magnitudes must be between 0 and 1 (got {magnitude})"
        );
    }

    let parameter_sets = if sweep.parameters.is_empty() {
        vec![SweepParameterSet {
            op_factor: base.op_factor,
            imp_flex: base.imp_flex,
        }]
    } else {
        sweep.parameters.clone()
    };

    let targets: Vec<SweepTarget> = match sweep.mode {
        SweepMode::Sectors => dims
            .iter_region_sectors()
            .map(|(region, sector)| SweepTarget::Sector {
                region: region.clone(),
                sector: sector.clone(),
            })
            .collect(),
        SweepMode::Scenario => {
            ensure!(
                !base.supply_shocks.is_empty(),
                "A scenario sweep needs at least one supply disruption"
            );
            vec![SweepTarget::Scenario]
        }
    };

    Ok(iproduct!(&sweep.magnitudes, &parameter_sets, &targets)
        .map(|(magnitude, set, target)| SweepCase {
            target: target.clone(),
            magnitude: *magnitude,
            op_factor: set.op_factor,
            imp_flex: set.imp_flex,
        })
        .collect())
}

/// Evaluate every case of a sweep.
///
/// Cases with no optimal solution at any threshold are recorded as unresolved; any other error
/// aborts the sweep.
///
/// # Arguments
///
/// * `baseline` - The calibrated baseline
/// * `base` - The model's scenario
/// * `plan` - The cases to evaluate
/// * `options` - Pipeline options
/// * `solver` - The solver backend
/// * `threads` - Number of worker threads (defaults to rayon's global pool)
///
/// # Returns
///
/// A record for each case, in the same order as `plan`.
pub fn run_sweep(
    baseline: &CalibratedBaseline,
    base: &DisruptionScenario,
    plan: &[SweepCase],
    options: &PipelineOptions,
    solver: &dyn Solver,
    threads: Option<usize>,
) -> Result<Vec<SweepRecord>> {
    info!("Evaluating {} sweep case(s)", plan.len());

    let evaluate_all = || {
        plan.par_iter()
            .map(|case| evaluate_case(baseline, base, case, options, solver))
            .collect::<Result<Vec<_>>>()
    };
    let records = match threads {
        Some(threads) => rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .context("Failed to create thread pool")?
            .install(evaluate_all),
        None => evaluate_all(),
    }?;

    let unresolved = records
        .iter()
        .filter(|record| matches!(record.outcome, SweepOutcome::Unresolved { .. }))
        .count();
    if unresolved > 0 {
        warn!("{unresolved} sweep case(s) could not be resolved");
    }

    Ok(records)
}

fn evaluate_case(
    baseline: &CalibratedBaseline,
    base: &DisruptionScenario,
    case: &SweepCase,
    options: &PipelineOptions,
    solver: &dyn Solver,
) -> Result<SweepRecord> {
    let scenario = case.scenario(base);
    let outcome = match evaluate_scenario(baseline, &scenario, options, solver) {
        Ok(result) => SweepOutcome::Resolved(Box::new(result)),
        Err(err) => match err.downcast_ref::<MriaError>() {
            Some(MriaError::NoFeasibleRationingSolution {
                status, attempts, ..
            }) => {
                warn!(
                    "No solution for {} with magnitude {}: {err}",
                    case.target, case.magnitude
                );
                SweepOutcome::Unresolved {
                    status: *status,
                    attempts: *attempts,
                }
            }
            _ => {
                return Err(err).with_context(|| {
                    format!(
                        "Sweep case {} with magnitude {} failed",
                        case.target, case.magnitude
                    )
                });
            }
        },
    };

    Ok(SweepRecord {
        case: case.clone(),
        outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{pipeline_options, toy_baseline, toy_scenario};
    use crate::solver::{HighsSolver, Problem, RawSolution};
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    /// A solver which reports a failure for every problem with the given number of columns.
    ///
    /// Rationing problems for the toy table have 12 columns.
    struct FailingSolver(usize);

    impl Solver for FailingSolver {
        fn solve(&self, problem: &Problem) -> Result<RawSolution> {
            let mut solution = HighsSolver::default().solve(problem)?;
            if problem.columns().len() == self.0 {
                solution.status = TerminationStatus::Infeasible;
            }
            Ok(solution)
        }
    }

    struct UnavailableSolver;

    impl Solver for UnavailableSolver {
        fn solve(&self, _problem: &Problem) -> Result<RawSolution> {
            Err(MriaError::SolverUnavailable("no solver".into()).into())
        }
    }

    fn sweep_parameters(mode: SweepMode, magnitudes: &[f64]) -> SweepParameters {
        SweepParameters {
            mode,
            magnitudes: magnitudes.to_vec(),
            parameters: Vec::new(),
        }
    }

    fn base_scenario() -> DisruptionScenario {
        DisruptionScenario::new(1.025, 1.0, true)
    }

    #[rstest]
    fn test_sweep_plan(toy_baseline: CalibratedBaseline) {
        let sweep = sweep_parameters(SweepMode::Sectors, &[0.1, 0.5]);
        let plan = sweep_plan(toy_baseline.dimensions(), &sweep, &base_scenario()).unwrap();
        assert_eq!(plan.len(), 8);
        assert_eq!(
            plan[1].target,
            SweepTarget::Sector {
                region: "R1".into(),
                sector: "S2".into()
            }
        );
        assert_approx_eq!(f64, plan[4].magnitude, 0.5);
        assert_approx_eq!(f64, plan[4].op_factor, 1.025);
    }

    #[rstest]
    fn test_sweep_plan_parameter_sets(toy_baseline: CalibratedBaseline) {
        let sweep = SweepParameters {
            parameters: vec![
                SweepParameterSet {
                    op_factor: 1.0,
                    imp_flex: 0.0,
                },
                SweepParameterSet {
                    op_factor: 1.025,
                    imp_flex: 1.0,
                },
            ],
            ..sweep_parameters(SweepMode::Scenario, &[0.0, 0.2])
        };
        let base = base_scenario().with_supply_shock("R1".into(), "S1".into(), 0.7);
        let plan = sweep_plan(toy_baseline.dimensions(), &sweep, &base).unwrap();

        // One case per magnitude and parameter set
        assert_eq!(plan.len(), 4);
        assert!(plan.iter().all(|case| case.target == SweepTarget::Scenario));
        assert_approx_eq!(f64, plan[0].imp_flex, 0.0);
        assert_approx_eq!(f64, plan[1].imp_flex, 1.0);
        assert_approx_eq!(f64, plan[2].magnitude, 0.2);
        assert_approx_eq!(f64, plan[2].op_factor, 1.0);
    }

    #[rstest]
    #[case(SweepMode::Sectors, &[])]
    #[case(SweepMode::Sectors, &[1.5])]
    #[case(SweepMode::Scenario, &[0.1])] // No supply disruptions to deepen
    fn test_sweep_plan_invalid(
        toy_baseline: CalibratedBaseline,
        #[case] mode: SweepMode,
        #[case] magnitudes: &[f64],
    ) {
        let sweep = sweep_parameters(mode, magnitudes);
        assert!(sweep_plan(toy_baseline.dimensions(), &sweep, &base_scenario()).is_err());
    }

    #[test]
    fn test_sector_case_scenario() {
        let case = SweepCase {
            target: SweepTarget::Sector {
                region: "R1".into(),
                sector: "S1".into(),
            },
            magnitude: 0.1,
            op_factor: 1.0,
            imp_flex: 0.5,
        };

        // Shocks of the base scenario are not carried over
        let base = base_scenario().with_supply_shock("R2".into(), "S2".into(), 0.5);
        let scenario = case.scenario(&base);
        assert_approx_eq!(f64, scenario.sup_disrupt(&"R1".into(), &"S1".into()), 0.9);
        assert!(!scenario.is_supply_shocked(&"R2".into(), &"S2".into()));
        assert_approx_eq!(f64, scenario.op_factor, 1.0);
        assert_approx_eq!(f64, scenario.imp_flex, 0.5);
    }

    #[test]
    fn test_scenario_case_scenario() {
        let case = SweepCase {
            target: SweepTarget::Scenario,
            magnitude: 0.3,
            op_factor: 1.0,
            imp_flex: 0.0,
        };
        let base = base_scenario()
            .with_supply_shock("R1".into(), "S1".into(), 0.7)
            .with_supply_shock("R2".into(), "S2".into(), 0.2)
            .with_demand_shock("R1".into(), "P2".into(), 0.5);
        let scenario = case.scenario(&base);

        assert_approx_eq!(f64, scenario.sup_disrupt(&"R1".into(), &"S1".into()), 0.4);
        assert_approx_eq!(f64, scenario.sup_disrupt(&"R2".into(), &"S2".into()), 0.0);
        assert!(!scenario.is_supply_shocked(&"R1".into(), &"S2".into()));
        assert_eq!(scenario.demand_shocks, base.demand_shocks);
        assert_approx_eq!(f64, scenario.op_factor, 1.0);
        assert_approx_eq!(f64, scenario.imp_flex, 0.0);
    }

    #[rstest]
    fn test_run_sweep(toy_baseline: CalibratedBaseline, pipeline_options: PipelineOptions) {
        let base = base_scenario();
        let sweep = sweep_parameters(SweepMode::Sectors, &[0.1]);
        let plan = sweep_plan(toy_baseline.dimensions(), &sweep, &base).unwrap();
        let records = run_sweep(
            &toy_baseline,
            &base,
            &plan,
            &pipeline_options,
            &HighsSolver::default(),
            Some(2),
        )
        .unwrap();

        assert_eq!(records.len(), plan.len());
        for (record, case) in records.iter().zip(&plan) {
            assert_eq!(&record.case, case);
            assert!(matches!(record.outcome, SweepOutcome::Resolved(_)));
        }
    }

    #[rstest]
    fn test_run_sweep_scenario(
        toy_baseline: CalibratedBaseline,
        toy_scenario: DisruptionScenario,
        pipeline_options: PipelineOptions,
    ) {
        let sweep = sweep_parameters(SweepMode::Scenario, &[0.0, 0.2]);
        let plan = sweep_plan(toy_baseline.dimensions(), &sweep, &toy_scenario).unwrap();
        let records = run_sweep(
            &toy_baseline,
            &toy_scenario,
            &plan,
            &pipeline_options,
            &HighsSolver::default(),
            None,
        )
        .unwrap();

        let rationing: Vec<f64> = records
            .iter()
            .map(|record| match &record.outcome {
                SweepOutcome::Resolved(result) => result.total_rationing(),
                SweepOutcome::Unresolved { .. } => panic!("Unresolved case {:?}", record.case),
            })
            .collect();

        // A magnitude of zero is the model's own scenario
        let unchanged = evaluate_scenario(
            &toy_baseline,
            &toy_scenario,
            &pipeline_options,
            &HighsSolver::default(),
        )
        .unwrap();
        assert_approx_eq!(f64, rationing[0], unchanged.total_rationing(), epsilon = 1e-6);

        // Deeper disruptions ration more
        assert!(rationing[1] > rationing[0] + 1e-6);
    }

    #[rstest]
    fn test_run_sweep_unresolved(toy_baseline: CalibratedBaseline, pipeline_options: PipelineOptions) {
        let base = base_scenario();
        let sweep = sweep_parameters(SweepMode::Sectors, &[0.1]);
        let plan = sweep_plan(toy_baseline.dimensions(), &sweep, &base).unwrap();
        let records = run_sweep(
            &toy_baseline,
            &base,
            &plan,
            &pipeline_options,
            &FailingSolver(12),
            None,
        )
        .unwrap();

        assert_eq!(records.len(), plan.len());
        for record in records {
            assert_eq!(
                record.outcome,
                SweepOutcome::Unresolved {
                    status: TerminationStatus::Infeasible,
                    attempts: 13
                }
            );
        }
    }

    #[rstest]
    fn test_run_sweep_aborts(toy_baseline: CalibratedBaseline, pipeline_options: PipelineOptions) {
        let base = base_scenario();
        let sweep = sweep_parameters(SweepMode::Sectors, &[0.1]);
        let plan = sweep_plan(toy_baseline.dimensions(), &sweep, &base).unwrap();
        let result = run_sweep(
            &toy_baseline,
            &base,
            &plan,
            &pipeline_options,
            &UnavailableSolver,
            None,
        );
        assert!(result.is_err());
    }
}
