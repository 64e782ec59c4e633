//! Code for reading disruption scenarios from a CSV file.
use super::{deserialise_proportion, input_err_msg, read_csv_optional};
use crate::id::IDCollection;
use crate::scenario::DisruptionScenario;
use crate::table::Dimensions;
use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use serde_string_enum::DeserializeLabeledStringEnum;
use std::path::Path;

const DISRUPTIONS_FILE_NAME: &str = "disruptions.csv";

/// What part of the economy a disruption applies to
#[derive(PartialEq, Debug, Clone, Copy, DeserializeLabeledStringEnum)]
enum DisruptionKind {
    /// The remaining share of a region-sector's capacity
    #[string = "supply"]
    Supply,
    /// The remaining share of demand for a region-product
    #[string = "demand"]
    Demand,
}

#[derive(PartialEq, Debug, Deserialize)]
struct DisruptionRecord {
    region: String,
    kind: DisruptionKind,
    /// A sector for supply disruptions or a product for demand disruptions
    target: String,
    #[serde(deserialize_with = "deserialise_proportion")]
    value: f64,
}

/// Read the disruptions for a model, if any.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
/// * `dims` - The dimensions of the economic table
/// * `template` - A scenario with no shocks to which disruptions are added
///
/// # Returns
///
/// The scenario to evaluate. If `disruptions.csv` is absent, `template` is returned unchanged.
pub fn read_disruptions(
    model_dir: &Path,
    dims: &Dimensions,
    template: DisruptionScenario,
) -> Result<DisruptionScenario> {
    let file_path = model_dir.join(DISRUPTIONS_FILE_NAME);
    let records = read_csv_optional::<DisruptionRecord>(&file_path)?;
    add_disruptions(dims, template, records).with_context(|| input_err_msg(&file_path))
}

fn add_disruptions<I>(
    dims: &Dimensions,
    mut scenario: DisruptionScenario,
    records: I,
) -> Result<DisruptionScenario>
where
    I: IntoIterator<Item = DisruptionRecord>,
{
    for record in records {
        let region = dims.regions.get_id(&record.region)?;
        let is_new = match record.kind {
            DisruptionKind::Supply => {
                let sector = dims.sectors.get_id(&record.target)?;
                scenario
                    .supply_shocks
                    .insert((region.clone(), sector), record.value)
                    .is_none()
            }
            DisruptionKind::Demand => {
                let product = dims.products.get_id(&record.target)?;
                scenario
                    .demand_shocks
                    .insert((region.clone(), product), record.value)
                    .is_none()
            }
        };
        ensure!(
            is_new,
            "Duplicate {:?} disruption for {region}/{}",
            record.kind,
            record.target
        );
    }

    scenario.validate()?;

    Ok(scenario)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{assert_error, toy_dimensions};
    use float_cmp::assert_approx_eq;
    use rstest::rstest;
    use std::fs;
    use tempfile::tempdir;

    fn record(region: &str, kind: DisruptionKind, target: &str, value: f64) -> DisruptionRecord {
        DisruptionRecord {
            region: region.into(),
            kind,
            target: target.into(),
            value,
        }
    }

    #[rstest]
    fn test_add_disruptions(toy_dimensions: Dimensions) {
        let records = [
            record("R1", DisruptionKind::Supply, "S1", 0.7),
            record("R2", DisruptionKind::Demand, "P2", 0.4),
        ];
        let scenario =
            add_disruptions(&toy_dimensions, DisruptionScenario::default(), records).unwrap();

        assert_approx_eq!(f64, scenario.sup_disrupt(&"R1".into(), &"S1".into()), 0.7);
        assert_approx_eq!(f64, scenario.sup_disrupt(&"R1".into(), &"S2".into()), 1.0);
        assert!(scenario.is_supply_shocked(&"R1".into(), &"S1".into()));
        assert_approx_eq!(f64, scenario.dem_disrupt(&"R2".into(), &"P2".into()), 0.6);
        assert_approx_eq!(f64, scenario.dem_disrupt(&"R1".into(), &"P1".into()), 0.0);
    }

    #[rstest]
    fn test_add_disruptions_unknown_id(toy_dimensions: Dimensions) {
        let records = [record("R1", DisruptionKind::Supply, "P1", 0.7)];
        assert_error!(
            add_disruptions(&toy_dimensions, DisruptionScenario::default(), records),
            "Unknown ID P1 found"
        );
    }

    #[rstest]
    fn test_add_disruptions_duplicate(toy_dimensions: Dimensions) {
        let records = [
            record("R1", DisruptionKind::Supply, "S1", 0.7),
            record("R1", DisruptionKind::Supply, "S1", 0.5),
        ];
        assert_error!(
            add_disruptions(&toy_dimensions, DisruptionScenario::default(), records),
            "Duplicate Supply disruption for R1/S1"
        );
    }

    #[rstest]
    fn test_read_disruptions(toy_dimensions: Dimensions) {
        let dir = tempdir().unwrap();
        let template = DisruptionScenario::new(1.1, 0.5, false);

        // No file: template returned unchanged
        let scenario = read_disruptions(dir.path(), &toy_dimensions, template.clone()).unwrap();
        assert_eq!(scenario, template);

        fs::write(
            dir.path().join(DISRUPTIONS_FILE_NAME),
            "region,kind,target,value\nR2,supply,S2,0.25",
        )
        .unwrap();
        let scenario = read_disruptions(dir.path(), &toy_dimensions, template).unwrap();
        assert_approx_eq!(f64, scenario.sup_disrupt(&"R2".into(), &"S2".into()), 0.25);
        assert_approx_eq!(f64, scenario.op_factor, 1.1);
        assert!(!scenario.all_disimp);
    }

    #[rstest]
    #[case("R1,supply,S1,1.5")]
    #[case("R1,shock,S1,0.5")]
    fn test_read_disruptions_invalid(toy_dimensions: Dimensions, #[case] row: &str) {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(DISRUPTIONS_FILE_NAME),
            format!("region,kind,target,value\n{row}"),
        )
        .unwrap();
        assert!(
            read_disruptions(dir.path(), &toy_dimensions, DisruptionScenario::default()).is_err()
        );
    }
}
