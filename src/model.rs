//! The model represents the static input data provided by the user.
use crate::scenario::{DisruptionScenario, DistanceWeights};
use crate::table::EconomicTable;
use std::path::PathBuf;

pub mod parameters;
pub use parameters::ModelParameters;

/// Model definition
pub struct Model {
    /// Path to model folder
    pub model_path: PathBuf,
    /// Parameters from the model TOML file
    pub parameters: ModelParameters,
    /// The multiregional Supply-Use table
    pub table: EconomicTable,
    /// The disruption to evaluate with the `run` command
    pub scenario: DisruptionScenario,
    /// Weights for disaster imports between regions
    pub weights: DistanceWeights,
}
