//! Bounds implied by a disruption scenario.
//!
//! These depend only on the calibrated baseline and the scenario, not on the numerical threshold,
//! so they are calculated once per scenario and reused across escalation attempts.
use crate::coefficients::{OutputMap, RegionProductMap};
use crate::id::{ProductID, RegionID, SectorID};
use crate::scenario::DisruptionScenario;
use crate::table::Dimensions;
use log::debug;

/// Rationing upper bounds more negative than this are reported before being clamped to zero
const NEGATIVE_BOUND_REPORT_TOLERANCE: f64 = 1e-9;

/// The bounds on output and rationing for one scenario
#[derive(Debug, Clone, PartialEq)]
pub struct DisruptionLimits {
    /// `Xlim[R,S]`: the maximum output of each region-sector
    pub output_limits: OutputMap,
    /// `demlim[R,P]`: demand removed exogenously by the demand shock
    pub demand_loss: RegionProductMap,
    /// The upper bound of `Ddis[R,P]`
    pub rationing_limits: RegionProductMap,
}

impl DisruptionLimits {
    /// Calculate the limits for a scenario.
    ///
    /// # Arguments
    ///
    /// * `dims` - The table's index sets
    /// * `xbase` - Calibrated baseline output
    /// * `final_demand` - Final demand `fd[R,P]`
    /// * `exports` - Exports to the rest of the world `ExportROW[R,P]`
    /// * `scenario` - The disruption
    pub fn new(
        dims: &Dimensions,
        xbase: &OutputMap,
        final_demand: &RegionProductMap,
        exports: &RegionProductMap,
        scenario: &DisruptionScenario,
    ) -> Self {
        let output_limits = dims
            .iter_region_sectors()
            .map(|(region, sector)| {
                let key = (region.clone(), sector.clone());
                let limit = output_limit(xbase[&key], region, sector, scenario);
                (key, limit)
            })
            .collect();

        let mut demand_loss = RegionProductMap::new();
        let mut rationing_limits = RegionProductMap::new();
        for (region, product) in dims.iter_region_products() {
            let key = (region.clone(), product.clone());
            let demand = final_demand[&key] + exports[&key];
            let loss = demand * scenario.dem_disrupt(region, product);
            rationing_limits.insert(key.clone(), rationing_limit(demand, loss, region, product));
            demand_loss.insert(key, loss);
        }

        Self {
            output_limits,
            demand_loss,
            rationing_limits,
        }
    }
}

/// `Xlim[R,S]`.
///
/// Shocked sectors are limited to their remaining capacity. Unshocked sectors may expand by up to
/// `op_factor` above their baseline.
pub fn output_limit(
    xbase: f64,
    region: &RegionID,
    sector: &SectorID,
    scenario: &DisruptionScenario,
) -> f64 {
    let limit = xbase * scenario.sup_disrupt(region, sector);
    if scenario.is_supply_shocked(region, sector) {
        limit
    } else {
        limit * scenario.op_factor
    }
}

/// The upper bound of `Ddis[R,P]`: the demand which has not already been removed by the demand
/// shock, floored at zero.
pub fn rationing_limit(demand: f64, loss: f64, region: &RegionID, product: &ProductID) -> f64 {
    let limit = demand - loss;
    if limit < -NEGATIVE_BOUND_REPORT_TOLERANCE {
        debug!("Negative rationing bound {limit} for {region}/{product} clamped to zero");
    }

    limit.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{toy_baseline, toy_scenario};
    use crate::pipeline::CalibratedBaseline;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;

    #[rstest]
    fn test_output_limit() {
        let scenario =
            DisruptionScenario::new(1.025, 1.0, true).with_supply_shock("R1".into(), "S1".into(), 0.7);
        assert_approx_eq!(f64, output_limit(100.0, &"R1".into(), &"S1".into(), &scenario), 70.0);
        assert_approx_eq!(f64, output_limit(50.0, &"R1".into(), &"S2".into(), &scenario), 51.25);
    }

    #[test]
    fn test_output_limit_full_shock() {
        let scenario =
            DisruptionScenario::new(1.025, 1.0, true).with_supply_shock("R1".into(), "S1".into(), 1.0);
        // A listed shock of 1 doesn't get the expansion margin
        assert_approx_eq!(f64, output_limit(100.0, &"R1".into(), &"S1".into(), &scenario), 100.0);
    }

    #[test]
    fn test_rationing_limit_clamped() {
        assert_approx_eq!(f64, rationing_limit(-1e-13, 0.0, &"R1".into(), &"P1".into()), 0.0);
        assert_approx_eq!(f64, rationing_limit(70.0, 49.0, &"R1".into(), &"P1".into()), 21.0);
    }

    #[rstest]
    fn test_disruption_limits(toy_baseline: CalibratedBaseline, toy_scenario: DisruptionScenario) {
        let scenario = toy_scenario.with_demand_shock("R2".into(), "P2".into(), 0.4);
        let limits = toy_baseline.disruption_limits(&scenario);

        let x_key = (RegionID::new("R1"), SectorID::new("S1"));
        assert_approx_eq!(f64, limits.output_limits[&x_key], 70.0, epsilon = 1e-6);

        // Unlisted demand: nothing removed, all demand may be rationed
        let key = (RegionID::new("R1"), ProductID::new("P1"));
        assert_approx_eq!(f64, limits.demand_loss[&key], 0.0);
        assert_approx_eq!(f64, limits.rationing_limits[&key], 70.0, epsilon = 1e-9);

        // Listed demand shock of 0.4: dem_disrupt = 0.6
        let key = (RegionID::new("R2"), ProductID::new("P2"));
        assert_approx_eq!(f64, limits.demand_loss[&key], 43.0 * 0.6, epsilon = 1e-9);
        assert_approx_eq!(f64, limits.rationing_limits[&key], 43.0 * 0.4, epsilon = 1e-9);
    }
}
