//! Derivation of baseline output and production-share coefficients from an [`EconomicTable`].
use crate::id::{ProductID, RegionID, SectorID};
use crate::table::EconomicTable;
use indexmap::IndexMap;
use std::collections::HashMap;

/// Output of each region-sector
pub type OutputMap = IndexMap<(RegionID, SectorID), f64>;

/// A quantity for each region-product (final demand, exports, rationing, etc.)
pub type RegionProductMap = IndexMap<(RegionID, ProductID), f64>;

/// Share coefficients relative to a baseline output vector.
///
/// Only non-zero coefficients are stored; a missing entry is a coefficient of zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Coefficients {
    /// The output vector the coefficients are relative to
    pub xbase: OutputMap,
    /// `Sup[R,S,P]`: share of region-sector output which is `P`
    supply: HashMap<(RegionID, SectorID, ProductID), f64>,
    /// `Use[Rb,P,R,S]`: amount of `Rb`'s `P` used per unit of output of `S` in `R`
    uses: HashMap<(RegionID, ProductID, RegionID, SectorID), f64>,
}

impl Coefficients {
    /// Derive coefficients from the table, relative to its own baseline output
    pub fn derive(table: &EconomicTable) -> Self {
        Self::derive_with_output(table, baseline_output(table))
    }

    /// Derive coefficients from the table relative to the given output vector.
    ///
    /// Cells whose region-sector has zero output get a coefficient of zero.
    pub fn derive_with_output(table: &EconomicTable, xbase: OutputMap) -> Self {
        let dims = table.dimensions();

        let mut supply = HashMap::new();
        for ((region, sector), &output) in &xbase {
            if output == 0.0 {
                continue;
            }

            for product in &dims.products {
                let total: f64 = dims
                    .regions
                    .iter()
                    .map(|to_region| table.supply(region, sector, to_region, product))
                    .sum();
                if total != 0.0 {
                    supply.insert(
                        (region.clone(), sector.clone(), product.clone()),
                        total / output,
                    );
                }
            }
        }

        let mut uses = HashMap::new();
        for ((region, sector), &output) in &xbase {
            if output == 0.0 {
                continue;
            }

            for (from_region, product) in dims.iter_region_products() {
                let value = table.intermediate_use(from_region, product, region, sector);
                if value != 0.0 {
                    uses.insert(
                        (
                            from_region.clone(),
                            product.clone(),
                            region.clone(),
                            sector.clone(),
                        ),
                        value / output,
                    );
                }
            }
        }

        Self {
            xbase,
            supply,
            uses,
        }
    }

    /// Baseline output of a region-sector
    pub fn output(&self, region: &RegionID, sector: &SectorID) -> f64 {
        self.xbase
            .get(&(region.clone(), sector.clone()))
            .copied()
            .unwrap_or_default()
    }

    /// `Sup[R,S,P]`
    pub fn supply_share(&self, region: &RegionID, sector: &SectorID, product: &ProductID) -> f64 {
        self.supply
            .get(&(region.clone(), sector.clone(), product.clone()))
            .copied()
            .unwrap_or_default()
    }

    /// `Use[Rb,P,R,S]`
    pub fn use_share(
        &self,
        from_region: &RegionID,
        product: &ProductID,
        region: &RegionID,
        sector: &SectorID,
    ) -> f64 {
        self.uses
            .get(&(
                from_region.clone(),
                product.clone(),
                region.clone(),
                sector.clone(),
            ))
            .copied()
            .unwrap_or_default()
    }
}

/// Calculate the baseline output of every region-sector.
///
/// `Xbase[R,S]` is the sum of `Supply[Rb,S,R,P]` over all regions `Rb` and products `P`.
pub fn baseline_output(table: &EconomicTable) -> OutputMap {
    let dims = table.dimensions();
    dims.iter_region_sectors()
        .map(|(region, sector)| {
            let total = dims
                .iter_region_products()
                .map(|(from_region, product)| table.supply(from_region, sector, region, product))
                .sum();
            ((region.clone(), sector.clone()), total)
        })
        .collect()
}

/// Final demand plus exports to the rest of the world for every region-product
pub fn final_demand_and_exports(table: &EconomicTable) -> (RegionProductMap, RegionProductMap) {
    let dims = table.dimensions();
    let final_demand = dims
        .iter_region_products()
        .map(|(r, p)| ((r.clone(), p.clone()), table.final_demand(r, p)))
        .collect();
    let exports = dims
        .iter_region_products()
        .map(|(r, p)| ((r.clone(), p.clone()), table.total_exports(r, p)))
        .collect();

    (final_demand, exports)
}
