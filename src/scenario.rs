//! Disruption scenarios and the distance weights which limit disaster imports.
use crate::id::{ProductID, RegionID, SectorID};
use anyhow::{Result, ensure};
use indexmap::{IndexMap, IndexSet};
use std::hash::Hash;

/// A sparse map of overrides on top of a default value.
///
/// Keys which have not been overridden take the default value.
#[derive(Debug, Clone, PartialEq)]
pub struct OverrideMap<K: Eq + Hash> {
    default: f64,
    overrides: IndexMap<K, f64>,
}

impl<K: Eq + Hash> OverrideMap<K> {
    /// Create an empty map with the given default value
    pub fn new(default: f64) -> Self {
        Self {
            default,
            overrides: IndexMap::new(),
        }
    }

    /// Override the value for `key`, returning the previous override if there was one
    pub fn insert(&mut self, key: K, value: f64) -> Option<f64> {
        self.overrides.insert(key, value)
    }

    /// The value for `key`, or the default if it has not been overridden
    pub fn get(&self, key: &K) -> f64 {
        self.overrides.get(key).copied().unwrap_or(self.default)
    }

    /// The overridden value for `key`, if any
    pub fn get_override(&self, key: &K) -> Option<f64> {
        self.overrides.get(key).copied()
    }

    /// Whether `key` has been overridden
    pub fn is_overridden(&self, key: &K) -> bool {
        self.overrides.contains_key(key)
    }

    /// Iterate over the overrides
    pub fn iter(&self) -> indexmap::map::Iter<'_, K, f64> {
        self.overrides.iter()
    }

    /// Whether there are no overrides
    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

/// Supply-capacity shocks: the share of capacity remaining for each region-sector
pub type SupplyShocks = OverrideMap<(RegionID, SectorID)>;

/// Demand shocks for each region-product
pub type DemandShocks = OverrideMap<(RegionID, ProductID)>;

/// A disruption to be evaluated against a calibrated baseline
#[derive(Debug, Clone, PartialEq)]
pub struct DisruptionScenario {
    /// Remaining production capacity (`sup_disrupt`), default 1 (no shock)
    pub supply_shocks: SupplyShocks,
    /// Demand shock values `d`; a listed region-product has `dem_disrupt = 1 - d`, an unlisted one
    /// has `dem_disrupt = 0`
    pub demand_shocks: DemandShocks,
    /// Factor by which unshocked sectors may expand output above their baseline
    pub op_factor: f64,
    /// Import-substitution elasticity multiplier
    pub imp_flex: f64,
    /// Whether disaster imports are allowed at all
    pub all_disimp: bool,
}

impl Default for DisruptionScenario {
    fn default() -> Self {
        Self {
            supply_shocks: SupplyShocks::new(1.0),
            demand_shocks: DemandShocks::new(0.0),
            op_factor: 1.0,
            imp_flex: 1.0,
            all_disimp: true,
        }
    }
}

impl DisruptionScenario {
    /// Create a scenario with no shocks
    pub fn new(op_factor: f64, imp_flex: f64, all_disimp: bool) -> Self {
        Self {
            op_factor,
            imp_flex,
            all_disimp,
            ..Default::default()
        }
    }

    /// Add a shock to one region-sector, leaving it with `remaining` of its capacity
    pub fn with_supply_shock(mut self, region: RegionID, sector: SectorID, remaining: f64) -> Self {
        self.supply_shocks.insert((region, sector), remaining);
        self
    }

    /// Add a demand shock to one region-product
    pub fn with_demand_shock(mut self, region: RegionID, product: ProductID, value: f64) -> Self {
        self.demand_shocks.insert((region, product), value);
        self
    }

    /// `sup_disrupt[R,S]`
    pub fn sup_disrupt(&self, region: &RegionID, sector: &SectorID) -> f64 {
        self.supply_shocks.get(&(region.clone(), sector.clone()))
    }

    /// Whether the region-sector is subject to a supply shock
    pub fn is_supply_shocked(&self, region: &RegionID, sector: &SectorID) -> bool {
        self.supply_shocks
            .is_overridden(&(region.clone(), sector.clone()))
    }

    /// `dem_disrupt[R,P]`
    pub fn dem_disrupt(&self, region: &RegionID, product: &ProductID) -> f64 {
        self.demand_shocks
            .get_override(&(region.clone(), product.clone()))
            .map_or(0.0, |value| 1.0 - value)
    }

    /// The disaster import switch as a multiplier
    pub fn all_disimp_switch(&self) -> f64 {
        if self.all_disimp { 1.0 } else { 0.0 }
    }

    /// Check that the parameters of the scenario are valid
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.op_factor.is_finite() && self.op_factor >= 1.0,
            "op_factor must be a finite number of at least 1 (got {})",
            self.op_factor
        );
        ensure!(
            self.imp_flex.is_finite() && self.imp_flex >= 0.0,
            "imp_flex must be a finite, non-negative number (got {})",
            self.imp_flex
        );
        for ((region, sector), value) in self.supply_shocks.iter() {
            ensure!(
                (0.0..=1.0).contains(value),
                "Supply shock for {region}/{sector} must be between 0 and 1 (got {value})"
            );
        }
        for ((region, product), value) in self.demand_shocks.iter() {
            ensure!(
                (0.0..=1.0).contains(value),
                "Demand shock for {region}/{product} must be between 0 and 1 (got {value})"
            );
        }

        Ok(())
    }
}

/// Weights in (0, 1] describing how feasible trade substitution is between two regions.
///
/// Self-pairs are never used: disaster imports within a region are not allowed.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceWeights(IndexMap<(RegionID, RegionID), f64>);

impl DistanceWeights {
    /// Weight 1 for every pair of regions, i.e. distance has no effect
    pub fn uniform(regions: &IndexSet<RegionID>) -> Self {
        Self(
            iter_region_pairs(regions)
                .map(|(from, to)| ((from.clone(), to.clone()), 1.0))
                .collect(),
        )
    }

    /// Create weights from explicit values for every ordered pair of distinct regions
    pub fn from_weights(
        regions: &IndexSet<RegionID>,
        weights: IndexMap<(RegionID, RegionID), f64>,
    ) -> Result<Self> {
        for (from, to) in iter_region_pairs(regions) {
            let weight = weights.get(&(from.clone(), to.clone()));
            ensure!(weight.is_some(), "Missing distance weight for {from} -> {to}");
        }
        for ((from, to), weight) in &weights {
            ensure!(
                *weight > 0.0 && *weight <= 1.0,
                "Distance weight for {from} -> {to} must be in (0, 1] (got {weight})"
            );
        }

        Ok(Self(weights))
    }

    /// Create weights from distances (in km) with an inverse power decay.
    ///
    /// The weight is `min(1, 1 / (d / 100 + 0.01)^beta)` for a distance `d`, so `beta = 0` gives
    /// uniform weights.
    pub fn from_distances(
        regions: &IndexSet<RegionID>,
        distances: &IndexMap<(RegionID, RegionID), f64>,
        beta: f64,
    ) -> Result<Self> {
        ensure!(
            beta.is_finite() && beta >= 0.0,
            "Distance decay must be a finite, non-negative number (got {beta})"
        );

        let mut weights = IndexMap::new();
        for (from, to) in iter_region_pairs(regions) {
            let key = (from.clone(), to.clone());
            let Some(&distance) = distances.get(&key) else {
                anyhow::bail!("Missing distance for {from} -> {to}");
            };
            ensure!(
                distance.is_finite() && distance >= 0.0,
                "Distance for {from} -> {to} must be a finite, non-negative number"
            );
            weights.insert(key, distance_decay_weight(distance, beta));
        }

        Self::from_weights(regions, weights)
    }

    /// The weight for imports from `from` into `to` (zero for a self-pair)
    pub fn get(&self, from: &RegionID, to: &RegionID) -> f64 {
        if from == to {
            return 0.0;
        }

        self.0
            .get(&(from.clone(), to.clone()))
            .copied()
            .unwrap_or_default()
    }
}

/// The decay weight for a distance in km
pub fn distance_decay_weight(distance_km: f64, beta: f64) -> f64 {
    let hundreds_of_km = distance_km / 100.0;
    (1.0 / (hundreds_of_km + 0.01).powf(beta)).min(1.0)
}

/// Iterate over ordered pairs of distinct regions
fn iter_region_pairs(
    regions: &IndexSet<RegionID>,
) -> impl Iterator<Item = (&RegionID, &RegionID)> {
    regions
        .iter()
        .flat_map(move |from| regions.iter().map(move |to| (from, to)))
        .filter(|(from, to)| from != to)
}
