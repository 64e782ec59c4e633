//! Code for reading the Supply-Use table from CSV files.
use super::{input_err_msg, read_csv, read_csv_id_file};
use crate::model::ModelParameters;
use crate::table::{
    CategoryEntry, Dimensions, EconomicTable, SupplyEntry, TableSpecification, UseEntry,
};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

const REGIONS_FILE_NAME: &str = "regions.csv";
const SECTORS_FILE_NAME: &str = "sectors.csv";
const PRODUCTS_FILE_NAME: &str = "products.csv";
const SUPPLY_FILE_NAME: &str = "supply.csv";
const USE_FILE_NAME: &str = "use.csv";
const VALUE_ADDED_FILE_NAME: &str = "value_added.csv";
const EXPORTS_FILE_NAME: &str = "exports.csv";
const IMPORTS_FILE_NAME: &str = "imports.csv";

#[derive(Debug, Deserialize, PartialEq)]
struct SupplyRecord {
    region: String,
    sector: String,
    to_region: String,
    product: String,
    value: f64,
}

#[derive(Debug, Deserialize, PartialEq)]
struct UseRecord {
    region: String,
    product: String,
    to_region: String,
    column: String,
    value: f64,
}

#[derive(Debug, Deserialize, PartialEq)]
struct ValueAddedRecord {
    region: String,
    sector: String,
    category: String,
    value: f64,
}

/// A row of the exports or imports file
#[derive(Debug, Deserialize, PartialEq)]
struct TradeRecord {
    region: String,
    product: String,
    category: String,
    value: f64,
}

/// Read the declared regions, sectors and products, with categories from the model parameters
pub fn read_dimensions(model_dir: &Path, parameters: &ModelParameters) -> Result<Dimensions> {
    let mut dims = Dimensions::new(
        read_csv_id_file(&model_dir.join(REGIONS_FILE_NAME))?,
        read_csv_id_file(&model_dir.join(SECTORS_FILE_NAME))?,
        read_csv_id_file(&model_dir.join(PRODUCTS_FILE_NAME))?,
    );
    dims.final_demand_categories = parameters.final_demand_categories.iter().cloned().collect();
    dims.export_categories = parameters.export_categories.iter().cloned().collect();
    dims.import_categories = parameters.import_categories.iter().cloned().collect();
    dims.value_added_categories = parameters.value_added_categories.iter().cloned().collect();

    Ok(dims)
}

/// Read the raw contents of the table from the model directory
fn read_table_specification(
    model_dir: &Path,
    parameters: &ModelParameters,
) -> Result<TableSpecification> {
    let dimensions = read_dimensions(model_dir, parameters)?;

    let supply = read_csv::<SupplyRecord>(&model_dir.join(SUPPLY_FILE_NAME))?
        .into_iter()
        .map(|record| SupplyEntry {
            region: record.region,
            sector: record.sector,
            to_region: record.to_region,
            product: record.product,
            value: record.value,
        })
        .collect();
    let uses = read_csv::<UseRecord>(&model_dir.join(USE_FILE_NAME))?
        .into_iter()
        .map(|record| UseEntry {
            region: record.region,
            product: record.product,
            to_region: record.to_region,
            column: record.column,
            value: record.value,
        })
        .collect();
    let value_added = read_csv::<ValueAddedRecord>(&model_dir.join(VALUE_ADDED_FILE_NAME))?
        .into_iter()
        .map(|record| CategoryEntry {
            region: record.region,
            item: record.sector,
            category: record.category,
            value: record.value,
        })
        .collect();

    Ok(TableSpecification {
        dimensions,
        supply,
        uses,
        value_added,
        exports: read_trade_file(&model_dir.join(EXPORTS_FILE_NAME))?,
        imports: read_trade_file(&model_dir.join(IMPORTS_FILE_NAME))?,
    })
}

fn read_trade_file(file_path: &Path) -> Result<Vec<CategoryEntry>> {
    Ok(read_csv::<TradeRecord>(file_path)?
        .into_iter()
        .map(|record| CategoryEntry {
            region: record.region,
            item: record.product,
            category: record.category,
            value: record.value,
        })
        .collect())
}

/// Read and validate the Supply-Use table in the model directory.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
/// * `parameters` - Model parameters, which declare the accounting categories
///
/// # Returns
///
/// The validated table or an error.
pub fn read_table(model_dir: &Path, parameters: &ModelParameters) -> Result<EconomicTable> {
    let spec = read_table_specification(model_dir, parameters)?;
    EconomicTable::load(spec)
        .with_context(|| format!("Invalid economic table. {}", input_err_msg(model_dir)))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::MriaError;
    use crate::id::{ProductID, RegionID, SectorID};
    use float_cmp::assert_approx_eq;
    use itertools::iproduct;
    use std::fs;
    use tempfile::tempdir;

    /// Write a complete, balanced 2x2x2 table to `dir`.
    ///
    /// Each region's sector `Si` only makes product `Pi` for its own region.
    pub fn write_table_files(dir: &Path) {
        let regions = ["R1", "R2"];
        let ids = |prefix: &str| {
            let mut out = String::from("id,description\n");
            for i in 1..=2 {
                out.push_str(&format!("{prefix}{i},{prefix}{i} description\n"));
            }
            out
        };
        fs::write(dir.join(REGIONS_FILE_NAME), ids("R")).unwrap();
        fs::write(dir.join(SECTORS_FILE_NAME), ids("S")).unwrap();
        fs::write(dir.join(PRODUCTS_FILE_NAME), ids("P")).unwrap();

        let output = [[100.0, 50.0], [80.0, 60.0]];
        let mut supply = String::from("region,sector,to_region,product,value\n");
        for (r, s, rb, p) in iproduct!(0..2, 0..2, 0..2, 0..2) {
            let value = if r == rb && s == p { output[r][s] } else { 0.0 };
            supply.push_str(&format!(
                "{},S{},{},P{},{value}\n",
                regions[r],
                s + 1,
                regions[rb],
                p + 1
            ));
        }
        fs::write(dir.join(SUPPLY_FILE_NAME), supply).unwrap();

        let uses = [
            [[10.0, 10.0, 5.0, 5.0, 50.0, 10.0], [5.0, 5.0, 2.0, 3.0, 25.0, 5.0]],
            [[4.0, 4.0, 8.0, 8.0, 6.0, 40.0], [3.0, 2.0, 6.0, 6.0, 3.0, 30.0]],
        ];
        let columns = [
            ("R1", "S1"),
            ("R1", "S2"),
            ("R2", "S1"),
            ("R2", "S2"),
            ("R1", "FinalD"),
            ("R2", "FinalD"),
        ];
        let mut use_file = String::from("region,product,to_region,column,value\n");
        for (r, p) in iproduct!(0..2, 0..2) {
            for (i, (to_region, column)) in columns.iter().enumerate() {
                use_file.push_str(&format!(
                    "{},P{},{to_region},{column},{}\n",
                    regions[r],
                    p + 1,
                    uses[r][p][i]
                ));
            }
        }
        fs::write(dir.join(USE_FILE_NAME), use_file).unwrap();

        fs::write(
            dir.join(VALUE_ADDED_FILE_NAME),
            "region,sector,category,value
R1,S1,VA,78
R1,S2,VA,29
R2,S1,VA,59
R2,S2,VA,38",
        )
        .unwrap();
        fs::write(
            dir.join(EXPORTS_FILE_NAME),
            "region,product,category,value
R1,P1,Exports,10
R1,P2,Exports,5
R2,P1,Exports,10
R2,P2,Exports,10",
        )
        .unwrap();
        fs::write(
            dir.join(IMPORTS_FILE_NAME),
            "region,product,category,value
R1,P1,Imports,5
R1,P2,Imports,5
R2,P1,Imports,5
R2,P2,Imports,5",
        )
        .unwrap();
    }

    #[test]
    fn test_read_table() {
        let dir = tempdir().unwrap();
        write_table_files(dir.path());
        let table = read_table(dir.path(), &ModelParameters::default()).unwrap();

        let dims = table.dimensions();
        assert_eq!(dims.regions.len(), 2);
        assert_eq!(dims.sectors.len(), 2);
        assert_eq!(dims.products.len(), 2);

        let (r1, r2) = (RegionID::new("R1"), RegionID::new("R2"));
        let (s1, p1) = (SectorID::new("S1"), ProductID::new("P1"));
        assert_approx_eq!(f64, table.supply(&r1, &s1, &r1, &p1), 100.0);
        assert_approx_eq!(f64, table.intermediate_use(&r2, &p1, &r1, &s1), 4.0);
        assert_approx_eq!(f64, table.final_demand(&r2, &p1), 46.0);
        assert_approx_eq!(f64, table.import(&r1, &p1, "Imports"), 5.0);
    }

    #[test]
    fn test_read_table_missing_row() {
        let dir = tempdir().unwrap();
        write_table_files(dir.path());
        fs::write(
            dir.path().join(EXPORTS_FILE_NAME),
            "region,product,category,value
R1,P1,Exports,10",
        )
        .unwrap();

        let err = read_table(dir.path(), &ModelParameters::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MriaError>(),
            Some(MriaError::MalformedTable(_))
        ));
    }

    #[test]
    fn test_read_table_missing_file() {
        let dir = tempdir().unwrap();
        write_table_files(dir.path());
        fs::remove_file(dir.path().join(USE_FILE_NAME)).unwrap();
        assert!(read_table(dir.path(), &ModelParameters::default()).is_err());
    }

    #[test]
    fn test_read_table_custom_categories() {
        let dir = tempdir().unwrap();
        write_table_files(dir.path());
        let parameters = ModelParameters {
            export_categories: vec!["ROW".into()],
            ..Default::default()
        };

        // The exports file still uses the default category
        assert!(read_table(dir.path(), &parameters).is_err());
    }
}
