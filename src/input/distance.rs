//! Code for reading distances between regions.
use super::{input_err_msg, read_csv_optional};
use crate::id::{IDCollection, RegionID};
use crate::scenario::DistanceWeights;
use anyhow::{Context, Result, ensure};
use indexmap::{IndexMap, IndexSet};
use log::debug;
use serde::Deserialize;
use std::path::Path;

const DISTANCES_FILE_NAME: &str = "distances.csv";

#[derive(PartialEq, Debug, Deserialize)]
struct DistanceRecord {
    from_region: String,
    to_region: String,
    /// Distance in km
    distance: f64,
}

/// Read the weights used to scale disaster imports between regions.
///
/// If `distances.csv` is absent, all inter-region weights are 1.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
/// * `regions` - All regions
/// * `beta` - Distance decay exponent
pub fn read_distance_weights(
    model_dir: &Path,
    regions: &IndexSet<RegionID>,
    beta: f64,
) -> Result<DistanceWeights> {
    let file_path = model_dir.join(DISTANCES_FILE_NAME);
    let records = read_csv_optional::<DistanceRecord>(&file_path)?;
    if records.is_empty() {
        debug!("No distances provided; using uniform weights");
        return Ok(DistanceWeights::uniform(regions));
    }

    read_distance_weights_from_iter(regions, records, beta)
        .with_context(|| input_err_msg(&file_path))
}

fn read_distance_weights_from_iter<I>(
    regions: &IndexSet<RegionID>,
    iter: I,
    beta: f64,
) -> Result<DistanceWeights>
where
    I: IntoIterator<Item = DistanceRecord>,
{
    let mut distances = IndexMap::new();
    for record in iter {
        let from = regions.get_id(&record.from_region)?;
        let to = regions.get_id(&record.to_region)?;
        ensure!(
            from != to,
            "Distance given from region {from} to itself; self-imports are not allowed"
        );
        ensure!(
            distances.insert((from.clone(), to.clone()), record.distance).is_none(),
            "Duplicate distance for {from} -> {to}"
        );
    }

    DistanceWeights::from_distances(regions, &distances, beta)
}
