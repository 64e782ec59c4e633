//! Common routines for handling input data.
use crate::id::IDLike;
use crate::model::{Model, ModelParameters};
use anyhow::{Context, Result, ensure};
use indexmap::IndexSet;
use serde::Deserialize;
use serde::de::{DeserializeOwned, Deserializer};
use std::fs;
use std::path::Path;

pub mod disruption;
use disruption::read_disruptions;
pub mod distance;
use distance::read_distance_weights;
pub mod table;
use table::read_table;

/// Read a series of type `T`s from a CSV file.
///
/// # Arguments
///
/// * `file_path` - Path to the CSV file
///
/// # Returns
///
/// The rows of the file or an error if the file could not be read, could not be parsed or is
/// empty.
pub fn read_csv<T: DeserializeOwned>(file_path: &Path) -> Result<Vec<T>> {
    let vec = read_csv_internal(file_path)?;
    ensure!(!vec.is_empty(), "CSV file {} cannot be empty", file_path.display());

    Ok(vec)
}

/// Read a series of type `T`s from a CSV file, returning an empty `Vec` if the file is absent
pub fn read_csv_optional<T: DeserializeOwned>(file_path: &Path) -> Result<Vec<T>> {
    if !file_path.exists() {
        return Ok(Vec::new());
    }

    read_csv_internal(file_path)
}

fn read_csv_internal<T: DeserializeOwned>(file_path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::Reader::from_path(file_path).with_context(|| input_err_msg(file_path))?;
    let vec = reader
        .deserialize()
        .collect::<Result<Vec<T>, _>>()
        .with_context(|| input_err_msg(file_path))?;

    Ok(vec)
}

/// Parse a TOML file at the specified path.
///
/// # Arguments
///
/// * `file_path` - Path to the TOML file
///
/// # Returns
///
/// * The deserialised TOML data or an error if the file could not be read or parsed.
pub fn read_toml<T: DeserializeOwned>(file_path: &Path) -> Result<T> {
    let toml_str = fs::read_to_string(file_path).with_context(|| input_err_msg(file_path))?;
    let toml_data = toml::from_str(&toml_str).with_context(|| input_err_msg(file_path))?;
    Ok(toml_data)
}

/// Format an error message to include the file path. To be used with `anyhow::Context`.
pub fn input_err_msg<P: AsRef<Path>>(file_path: P) -> String {
    format!("Error reading {}", file_path.as_ref().display())
}

/// Read an f64, checking that it is between 0 and 1
pub fn deserialise_proportion<'de, D>(deserialiser: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserialiser)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(serde::de::Error::custom("Value is not between 0 and 1"));
    }

    Ok(value)
}

/// A row of a file declaring IDs
#[derive(Debug, Deserialize, PartialEq)]
struct IDRecord {
    id: String,
    #[allow(dead_code)]
    description: String,
}

/// Read a set of IDs from a CSV file with `id` and `description` columns.
///
/// IDs are returned in the order they appear in the file.
pub fn read_csv_id_file<ID: IDLike>(file_path: &Path) -> Result<IndexSet<ID>> {
    let records: Vec<IDRecord> = read_csv(file_path)?;

    let mut ids = IndexSet::with_capacity(records.len());
    for record in records {
        let id = record.id.trim();
        ensure!(!id.is_empty(), "{}: IDs cannot be empty", input_err_msg(file_path));
        ensure!(
            ids.insert(ID::from(id.to_string())),
            "{}: Duplicate ID found: {id}",
            input_err_msg(file_path)
        );
    }

    Ok(ids)
}

/// Read a model from the specified directory.
///
/// # Arguments
///
/// * `model_dir` - Folder containing model configuration files
///
/// # Returns
///
/// The model, including its validated economic table, or an error.
pub fn load_model<P: AsRef<Path>>(model_dir: P) -> Result<Model> {
    let model_dir = model_dir.as_ref();
    let parameters = ModelParameters::from_path(model_dir)?;
    let table = read_table(model_dir, &parameters)?;
    let dims = table.dimensions();
    let scenario = read_disruptions(model_dir, dims, parameters.scenario_template())?;
    let weights = read_distance_weights(model_dir, &dims.regions, parameters.distance_decay)?;

    Ok(Model {
        model_path: model_dir.to_path_buf(),
        parameters,
        table,
        scenario,
        weights,
    })
}
