//! Code for adding constraints to the optimisation problem of a stage.
use super::{ModelInputs, Stage, VariableKey, VariableMap};
use crate::id::{ProductID, RegionID};
use crate::solver::{Problem, Row};

/// Keys for a block of consecutive rows, along with the offset of the first row in the problem
pub struct KeysWithOffset<T> {
    offset: usize,
    keys: Vec<T>,
}

impl<T> KeysWithOffset<T> {
    /// Zip the keys with the slack of the corresponding rows (row activity minus lower bound)
    pub fn zip_slacks<'a>(
        &'a self,
        problem: &'a Problem,
        values: &'a [f64],
    ) -> impl Iterator<Item = (&'a T, f64)> {
        let rows = problem.rows();
        assert!(
            self.offset + self.keys.len() <= rows.len(),
            "Bad constraint keys: rows out of range"
        );

        self.keys
            .iter()
            .zip(&rows[self.offset..])
            .map(move |(key, row)| (key, row.activity(values) - row.lower))
    }
}

/// Indicates the region and product covered by each balance constraint
pub type BalanceKeys = KeysWithOffset<(RegionID, ProductID)>;

/// Add a supply-demand balance constraint for every region-product.
///
/// For region `R` and product `P`, the row reads:
///
/// ```text
/// Σ_S X[R,S]·Sup[R,S,P] − Σ_{Rb,Sb} Use[R,P,Rb,Sb]·X[Rb,Sb]
///     + Ddis[R,P] + Σ_Rb disimp[Rb,R,P] − Σ_Rb disimp[R,Rb,P] >= rhs[R,P]
/// ```
///
/// where the rationing and disaster import terms only appear for the disruption stages and the
/// right-hand side depends on the stage.
pub fn add_balance_constraints(
    problem: &mut Problem,
    variables: &VariableMap,
    inputs: &ModelInputs,
    stage: &Stage,
) -> BalanceKeys {
    // Row offset in problem. This line **must** come before we add more constraints.
    let offset = problem.num_rows();

    let dims = inputs.dims;
    let mut keys = Vec::new();
    for (region, product) in dims.iter_region_products() {
        let mut row = Row::new(stage.demand_rhs(inputs, region, product)..=f64::INFINITY);

        // Production, net of intermediate use
        for (other_region, sector) in dims.iter_region_sectors() {
            let mut coeff = -inputs
                .coeffs
                .use_share(region, product, other_region, sector);
            if other_region == region {
                coeff += inputs.coeffs.supply_share(region, sector, product);
            }
            row.add_term(variables.get(&VariableKey::output(other_region, sector)), coeff);
        }

        if stage.is_disruption() {
            row.add_term(
                variables.get(&VariableKey::rationing(region, product)),
                1.0,
            );

            for other_region in dims.regions.iter().filter(|other| *other != region) {
                let imports = VariableKey::disaster_import(other_region, region, product);
                let exports = VariableKey::disaster_import(region, other_region, product);
                row.add_term(variables.get(&imports), 1.0);
                row.add_term(variables.get(&exports), -1.0);
            }
        }

        problem.add_row(row);
        keys.push((region.clone(), product.clone()));
    }

    BalanceKeys { offset, keys }
}
