//! Fixtures for tests

use crate::pipeline::{CalibratedBaseline, PipelineOptions, calibrate};
use crate::scenario::{DisruptionScenario, DistanceWeights};
use crate::solver::HighsSolver;
use crate::table::{
    CategoryEntry, DEFAULT_EXPORT_CATEGORY, DEFAULT_FINAL_DEMAND_CATEGORY, DEFAULT_IMPORT_CATEGORY,
    DEFAULT_VALUE_ADDED_CATEGORY, Dimensions, EconomicTable, SupplyEntry, TableSpecification,
    UseEntry,
};
use itertools::iproduct;
use rstest::fixture;

/// Assert that an error with the given message occurs
macro_rules! assert_error {
    ($result:expr, $msg:expr) => {
        assert_eq!(
            $result.unwrap_err().chain().next().unwrap().to_string(),
            $msg
        );
    };
}
pub(crate) use assert_error;

const REGIONS: [&str; 2] = ["R1", "R2"];
const SECTORS: [&str; 2] = ["S1", "S2"];
const PRODUCTS: [&str; 2] = ["P1", "P2"];

/// Output of each region-sector. Sector `Si` only makes product `Pi` and only for its own region.
const OUTPUT: [[f64; 2]; 2] = [[100.0, 50.0], [80.0, 60.0]];

/// Use of each region-product by R1/S1, R1/S2, R2/S1, R2/S2, final demand in R1 and final demand
/// in R2
const USES: [[[f64; 6]; 2]; 2] = [
    [
        [10.0, 10.0, 5.0, 5.0, 50.0, 10.0],
        [5.0, 5.0, 2.0, 3.0, 25.0, 5.0],
    ],
    [
        [4.0, 4.0, 8.0, 8.0, 6.0, 40.0],
        [3.0, 2.0, 6.0, 6.0, 3.0, 30.0],
    ],
];

/// Exports of each region-product
const EXPORTS: [[f64; 2]; 2] = [[10.0, 5.0], [10.0, 10.0]];

/// Value added of each region-sector
const VALUE_ADDED: [[f64; 2]; 2] = [[78.0, 29.0], [59.0, 38.0]];

#[fixture]
pub fn toy_dimensions() -> Dimensions {
    Dimensions::new(
        REGIONS.into_iter().map(Into::into).collect(),
        SECTORS.into_iter().map(Into::into).collect(),
        PRODUCTS.into_iter().map(Into::into).collect(),
    )
}

/// A balanced two-region, two-sector, two-product table
#[fixture]
pub fn toy_table_spec(toy_dimensions: Dimensions) -> TableSpecification {
    let supply = iproduct!(0..2, 0..2, 0..2, 0..2)
        .map(|(r, s, rb, p)| SupplyEntry {
            region: REGIONS[r].into(),
            sector: SECTORS[s].into(),
            to_region: REGIONS[rb].into(),
            product: PRODUCTS[p].into(),
            value: if r == rb && s == p { OUTPUT[r][s] } else { 0.0 },
        })
        .collect();

    let columns: Vec<(usize, &str)> = iproduct!(0..2, SECTORS)
        .chain((0..2).map(|rb| (rb, DEFAULT_FINAL_DEMAND_CATEGORY)))
        .collect();
    let uses = iproduct!(0..2, 0..2, columns.iter().enumerate())
        .map(|(r, p, (i, (rb, column)))| UseEntry {
            region: REGIONS[r].into(),
            product: PRODUCTS[p].into(),
            to_region: REGIONS[*rb].into(),
            column: (*column).into(),
            value: USES[r][p][i],
        })
        .collect();

    let category_entries = |items: [&str; 2], category: &str, values: [[f64; 2]; 2]| {
        iproduct!(0..2, 0..2)
            .map(|(r, i)| CategoryEntry {
                region: REGIONS[r].into(),
                item: items[i].into(),
                category: category.into(),
                value: values[r][i],
            })
            .collect::<Vec<_>>()
    };

    TableSpecification {
        dimensions: toy_dimensions,
        supply,
        uses,
        value_added: category_entries(SECTORS, DEFAULT_VALUE_ADDED_CATEGORY, VALUE_ADDED),
        exports: category_entries(PRODUCTS, DEFAULT_EXPORT_CATEGORY, EXPORTS),
        imports: category_entries(PRODUCTS, DEFAULT_IMPORT_CATEGORY, [[5.0; 2]; 2]),
    }
}

#[fixture]
pub fn toy_table(toy_table_spec: TableSpecification) -> EconomicTable {
    EconomicTable::load(toy_table_spec).unwrap()
}

/// R1/S1 loses 30% of its capacity
#[fixture]
pub fn toy_scenario() -> DisruptionScenario {
    DisruptionScenario::new(1.025, 1.0, true).with_supply_shock("R1".into(), "S1".into(), 0.7)
}

#[fixture]
pub fn pipeline_options() -> PipelineOptions {
    PipelineOptions::default()
}

#[fixture]
pub fn toy_baseline(toy_table: EconomicTable) -> CalibratedBaseline {
    let weights = DistanceWeights::uniform(&toy_table.dimensions().regions);
    calibrate(toy_table, weights, &HighsSolver::default()).unwrap()
}
