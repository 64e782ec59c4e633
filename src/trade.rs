//! Limits on disaster imports between regions.
//!
//! Disaster imports substitute for lost domestic production along trade links which already
//! exist in the baseline. The volume of a link is the intermediate use of the exporting region's
//! product by all sectors of the importing region, scaled by the import flexibility, the disaster
//! import switch and the distance weight between the regions.
use crate::coefficients::Coefficients;
use crate::id::{ProductID, RegionID};
use crate::scenario::{DisruptionScenario, DistanceWeights};
use crate::table::Dimensions;
use indexmap::IndexMap;
use itertools::iproduct;

/// Upper bounds of `disimp[Rb,R,P]`, keyed by (exporting region, importing region, product)
pub type ImportLimitMap = IndexMap<(RegionID, RegionID, ProductID), f64>;

/// Baseline trade volume of `from_region`'s `product` into all sectors of `to_region`.
///
/// This is `Σ_Sb Use[Rb,P,R,Sb] * Xbase[R,Sb]`.
pub fn trade_volume(
    dims: &Dimensions,
    coeffs: &Coefficients,
    from_region: &RegionID,
    to_region: &RegionID,
    product: &ProductID,
) -> f64 {
    dims.sectors
        .iter()
        .map(|sector| {
            coeffs.use_share(from_region, product, to_region, sector)
                * coeffs.output(to_region, sector)
        })
        .sum()
}

/// `disimplim[Rb,R,P]`.
///
/// Imports within a region are never allowed. Limits below `threshold` are clamped to zero.
pub fn import_limit(
    volume: f64,
    from_region: &RegionID,
    to_region: &RegionID,
    scenario: &DisruptionScenario,
    weights: &DistanceWeights,
    threshold: f64,
) -> f64 {
    if from_region == to_region {
        return 0.0;
    }

    let limit = scenario.imp_flex
        * volume
        * scenario.all_disimp_switch()
        * weights.get(from_region, to_region);
    if limit < threshold { 0.0 } else { limit }
}

/// Calculate the disaster import limits for every ordered region pair and product.
///
/// # Arguments
///
/// * `dims` - The table's index sets
/// * `coeffs` - Coefficients relative to the calibrated baseline output
/// * `scenario` - The disruption
/// * `weights` - Distance weights between regions
/// * `threshold` - The current numerical threshold
pub fn import_limits(
    dims: &Dimensions,
    coeffs: &Coefficients,
    scenario: &DisruptionScenario,
    weights: &DistanceWeights,
    threshold: f64,
) -> ImportLimitMap {
    iproduct!(dims.regions.iter(), dims.regions.iter(), dims.products.iter())
        .map(|(from_region, to_region, product)| {
            let volume = if from_region == to_region {
                0.0
            } else {
                trade_volume(dims, coeffs, from_region, to_region, product)
            };
            let limit = import_limit(volume, from_region, to_region, scenario, weights, threshold);
            (
                (from_region.clone(), to_region.clone(), product.clone()),
                limit,
            )
        })
        .collect()
}
