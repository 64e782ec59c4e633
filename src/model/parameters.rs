//! Defines the `ModelParameters` struct, which represents the contents of `model.toml`.
use crate::escalation::Thresholds;
use crate::input::{input_err_msg, read_toml};
use crate::pipeline::PipelineOptions;
use crate::scenario::DisruptionScenario;
use crate::table::{
    DEFAULT_EXPORT_CATEGORY, DEFAULT_FINAL_DEMAND_CATEGORY, DEFAULT_IMPORT_CATEGORY,
    DEFAULT_VALUE_ADDED_CATEGORY,
};
use anyhow::{Context, Result, ensure};
use itertools::Itertools;
use serde::Deserialize;
use serde_string_enum::DeserializeLabeledStringEnum;
use std::path::Path;

const MODEL_PARAMETERS_FILE_NAME: &str = "model.toml";

macro_rules! define_param_default {
    ($name:ident, $type: ty, $value: expr) => {
        fn $name() -> $type {
            $value
        }
    };
}

macro_rules! define_category_default {
    ($name:ident, $value: expr) => {
        fn $name() -> Vec<String> {
            vec![$value.to_string()]
        }
    };
}

define_param_default!(default_op_factor, f64, 1.025);
define_param_default!(default_imp_flex, f64, 1.0);
define_param_default!(default_true, bool, true);
define_param_default!(default_distance_decay, f64, 0.0);
define_param_default!(default_sweep_magnitudes, Vec<f64>, vec![0.1]);
define_category_default!(default_final_demand_categories, DEFAULT_FINAL_DEMAND_CATEGORY);
define_category_default!(default_export_categories, DEFAULT_EXPORT_CATEGORY);
define_category_default!(default_import_categories, DEFAULT_IMPORT_CATEGORY);
define_category_default!(default_value_added_categories, DEFAULT_VALUE_ADDED_CATEGORY);

/// Represents the contents of the entire model file.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ModelParameters {
    /// Factor by which sectors without a supply shock may expand their output
    #[serde(default = "default_op_factor")]
    pub op_factor: f64,
    /// Multiplier on the volume of disaster imports allowed along existing trade links
    #[serde(default = "default_imp_flex")]
    pub imp_flex: f64,
    /// Whether disaster imports between regions are allowed
    #[serde(default = "default_true")]
    pub all_disimp: bool,
    /// Numerical thresholds tried in turn when the disruption stages fail.
    ///
    /// Don't change unless you know what you're doing.
    #[serde(default)]
    pub thresholds: Thresholds,
    /// Whether to minimise output once rationing has been determined
    #[serde(default = "default_true")]
    pub minimise_output: bool,
    /// Whether to recompute the balance with the rationed demand
    #[serde(default = "default_true")]
    pub recompute_demand: bool,
    /// Exponent for the decay of disaster import weights with distance
    #[serde(default = "default_distance_decay")]
    pub distance_decay: f64,
    /// Use table columns which are final demand rather than a sector
    #[serde(default = "default_final_demand_categories")]
    pub final_demand_categories: Vec<String>,
    /// Categories of exports to the rest of the world
    #[serde(default = "default_export_categories")]
    pub export_categories: Vec<String>,
    /// Categories of imports from the rest of the world
    #[serde(default = "default_import_categories")]
    pub import_categories: Vec<String>,
    /// Categories of value added
    #[serde(default = "default_value_added_categories")]
    pub value_added_categories: Vec<String>,
    /// Parameters for the `sweep` command
    #[serde(default)]
    pub sweep: SweepParameters,
}

/// What is disrupted in each case of a sweep
#[derive(DeserializeLabeledStringEnum, Debug, Clone, Copy, PartialEq, Default)]
pub enum SweepMode {
    /// Disrupt each region-sector in turn
    #[default]
    #[string = "sectors"]
    Sectors,
    /// Deepen every supply disruption of the model's scenario at once
    #[string = "scenario"]
    Scenario,
}

/// A pair of disruption parameters evaluated together in a sweep
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SweepParameterSet {
    /// Factor by which sectors without a supply shock may expand their output
    pub op_factor: f64,
    /// Multiplier on the volume of disaster imports allowed along existing trade links
    pub imp_flex: f64,
}

/// Parameters for the `sweep` command
#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SweepParameters {
    /// What is disrupted in each case
    #[serde(default)]
    pub mode: SweepMode,
    /// The shares of capacity removed in each case
    #[serde(default = "default_sweep_magnitudes")]
    pub magnitudes: Vec<f64>,
    /// Disruption parameters to evaluate each case with. If empty, the model's `op_factor` and
    /// `imp_flex` are used.
    #[serde(default)]
    pub parameters: Vec<SweepParameterSet>,
}

impl Default for SweepParameters {
    fn default() -> Self {
        Self {
            mode: SweepMode::default(),
            magnitudes: default_sweep_magnitudes(),
            parameters: Vec::new(),
        }
    }
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            op_factor: default_op_factor(),
            imp_flex: default_imp_flex(),
            all_disimp: true,
            thresholds: Thresholds::default(),
            minimise_output: true,
            recompute_demand: true,
            distance_decay: default_distance_decay(),
            final_demand_categories: default_final_demand_categories(),
            export_categories: default_export_categories(),
            import_categories: default_import_categories(),
            value_added_categories: default_value_added_categories(),
            sweep: SweepParameters::default(),
        }
    }
}

/// Check that the `op_factor` parameter is valid
fn check_op_factor(value: f64) -> Result<()> {
    ensure!(
        value.is_finite() && value >= 1.0,
        "op_factor must be a finite number of at least 1"
    );

    Ok(())
}

/// Check that the `imp_flex` parameter is valid
fn check_imp_flex(value: f64) -> Result<()> {
    ensure!(
        value.is_finite() && value >= 0.0,
        "imp_flex must be a finite, non-negative number"
    );

    Ok(())
}

/// Check that the `distance_decay` parameter is valid
fn check_distance_decay(value: f64) -> Result<()> {
    ensure!(
        value.is_finite() && value >= 0.0,
        "distance_decay must be a finite, non-negative number"
    );

    Ok(())
}

/// Check that a list of categories is non-empty and contains no duplicates
fn check_categories(name: &str, categories: &[String]) -> Result<()> {
    ensure!(!categories.is_empty(), "{name} cannot be empty");
    ensure!(
        categories.iter().all_unique(),
        "{name} cannot contain duplicate entries"
    );
    ensure!(
        categories.iter().all(|category| !category.trim().is_empty()),
        "{name} cannot contain empty entries"
    );

    Ok(())
}

/// Check that the sweep magnitudes are valid
fn check_sweep_magnitudes(magnitudes: &[f64]) -> Result<()> {
    ensure!(!magnitudes.is_empty(), "sweep.magnitudes cannot be empty");
    ensure!(
        magnitudes.iter().all(|value| (0.0..=1.0).contains(value)),
        "sweep.magnitudes must all be between 0 and 1"
    );

    Ok(())
}

impl ModelParameters {
    /// Read a model file from the specified directory.
    ///
    /// # Arguments
    ///
    /// * `model_dir` - Folder containing model configuration files
    ///
    /// # Returns
    ///
    /// The model file contents as a [`ModelParameters`] struct or an error if the file is invalid
    pub fn from_path<P: AsRef<Path>>(model_dir: P) -> Result<ModelParameters> {
        let file_path = model_dir.as_ref().join(MODEL_PARAMETERS_FILE_NAME);
        let model_params: ModelParameters = read_toml(&file_path)?;

        model_params
            .validate()
            .with_context(|| input_err_msg(file_path))?;

        Ok(model_params)
    }

    /// Validate parameters after reading in file
    fn validate(&self) -> Result<()> {
        check_op_factor(self.op_factor)?;
        check_imp_flex(self.imp_flex)?;
        check_distance_decay(self.distance_decay)?;

        // thresholds already validated on deserialisation

        check_categories("final_demand_categories", &self.final_demand_categories)?;
        check_categories("export_categories", &self.export_categories)?;
        check_categories("import_categories", &self.import_categories)?;
        check_categories("value_added_categories", &self.value_added_categories)?;

        check_sweep_magnitudes(&self.sweep.magnitudes)?;
        for set in &self.sweep.parameters {
            check_op_factor(set.op_factor).context("Invalid sweep.parameters")?;
            check_imp_flex(set.imp_flex).context("Invalid sweep.parameters")?;
        }

        Ok(())
    }

    /// A scenario with no shocks, carrying the disruption parameters of the model
    pub fn scenario_template(&self) -> DisruptionScenario {
        DisruptionScenario::new(self.op_factor, self.imp_flex, self.all_disimp)
    }

    /// Options controlling which stages of the pipeline are run
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            thresholds: self.thresholds.clone(),
            minimise_output: self.minimise_output,
            recompute_demand: self.recompute_demand,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::assert_approx_eq;
    use rstest::rstest;
    use std::fmt::Display;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    /// Helper function to assert validation result based on expected validity
    fn assert_validation_result<T, U: Display>(
        result: Result<T>,
        expected_valid: bool,
        value: U,
        expected_error_fragment: &str,
    ) {
        if expected_valid {
            assert!(
                result.is_ok(),
                "Expected value {} to be valid, but got error: {:?}",
                value,
                result.err()
            );
        } else {
            assert!(
                result.is_err(),
                "Expected value {value} to be invalid, but it was accepted",
            );
            let error_message = result.err().unwrap().to_string();
            assert!(
                error_message.contains(expected_error_fragment),
                "Error message should mention the validation constraint, got: {error_message}",
            );
        }
    }

    fn write_model_file(dir: &Path, contents: &str) {
        let mut file = File::create(dir.join(MODEL_PARAMETERS_FILE_NAME)).unwrap();
        writeln!(file, "{contents}").unwrap();
    }

    #[test]
    fn test_model_params_from_path_defaults() {
        let dir = tempdir().unwrap();
        write_model_file(dir.path(), "");

        let model_params = ModelParameters::from_path(dir.path()).unwrap();
        assert_eq!(model_params, ModelParameters::default());
        assert_approx_eq!(f64, model_params.op_factor, 1.025);
        assert_eq!(model_params.thresholds.values().len(), 13);
        assert_eq!(model_params.sweep.magnitudes, [0.1]);
        assert_eq!(model_params.sweep.mode, SweepMode::Sectors);
        assert!(model_params.sweep.parameters.is_empty());
    }

    #[test]
    fn test_model_params_from_path() {
        let dir = tempdir().unwrap();
        write_model_file(
            dir.path(),
            "op_factor = 1.1
imp_flex = 0.5
all_disimp = false
thresholds = [1e-6, 1e-3]
minimise_output = false
recompute_demand = false
distance_decay = 1.5
export_categories = [\"ROW\", \"EU\"]

[sweep]
mode = \"scenario\"
magnitudes = [0.1, 0.5]

[[sweep.parameters]]
op_factor = 1.0
imp_flex = 0.0

[[sweep.parameters]]
op_factor = 1.025
imp_flex = 1.0",
        );

        let model_params = ModelParameters::from_path(dir.path()).unwrap();
        assert_approx_eq!(f64, model_params.op_factor, 1.1);
        assert!(!model_params.all_disimp);
        assert_eq!(model_params.thresholds.values(), [1e-6, 1e-3]);
        assert_eq!(model_params.export_categories, ["ROW", "EU"]);
        assert_eq!(model_params.sweep.magnitudes, [0.1, 0.5]);
        assert_eq!(model_params.sweep.mode, SweepMode::Scenario);
        assert_eq!(
            model_params.sweep.parameters,
            [
                SweepParameterSet {
                    op_factor: 1.0,
                    imp_flex: 0.0
                },
                SweepParameterSet {
                    op_factor: 1.025,
                    imp_flex: 1.0
                }
            ]
        );

        let scenario = model_params.scenario_template();
        assert_approx_eq!(f64, scenario.imp_flex, 0.5);
        assert!(scenario.supply_shocks.is_empty());

        let options = model_params.pipeline_options();
        assert!(!options.minimise_output);
        assert!(!options.recompute_demand);
    }

    #[rstest]
    #[case("thresholds = []")]
    #[case("thresholds = [1e-3, 1e-6]")]
    #[case("unknown_parameter = 1")]
    #[case("op_factor = 0.5")]
    #[case("import_categories = []")]
    #[case("[sweep]\nmagnitudes = [2.0]")]
    #[case("[sweep]\nmode = \"regions\"")]
    #[case("[[sweep.parameters]]\nop_factor = 0.9\nimp_flex = 1.0")]
    #[case("[[sweep.parameters]]\nop_factor = 1.0\nimp_flex = -1.0")]
    #[case("[[sweep.parameters]]\nop_factor = 1.0")]
    fn test_model_params_from_path_invalid(#[case] contents: &str) {
        let dir = tempdir().unwrap();
        write_model_file(dir.path(), contents);
        assert!(ModelParameters::from_path(dir.path()).is_err());
    }

    #[rstest]
    #[case(1.0, true)] // Valid minimum value
    #[case(1.025, true)] // Valid default value
    #[case(2.0, true)] // Valid large value
    #[case(0.99, false)] // Invalid: below one
    #[case(0.0, false)] // Invalid: zero
    #[case(f64::INFINITY, false)] // Invalid: infinite value
    #[case(f64::NAN, false)] // Invalid: NaN value
    fn test_check_op_factor(#[case] value: f64, #[case] expected_valid: bool) {
        assert_validation_result(
            check_op_factor(value),
            expected_valid,
            value,
            "op_factor must be a finite number of at least 1",
        );
    }

    #[rstest]
    #[case(0.0, true)] // Valid: no disaster imports
    #[case(1.0, true)] // Valid default value
    #[case(10.0, true)] // Valid large value
    #[case(-1e-10, false)] // Invalid: negative value
    #[case(f64::INFINITY, false)] // Invalid: infinite value
    #[case(f64::NAN, false)] // Invalid: NaN value
    fn test_check_imp_flex(#[case] value: f64, #[case] expected_valid: bool) {
        assert_validation_result(
            check_imp_flex(value),
            expected_valid,
            value,
            "imp_flex must be a finite, non-negative number",
        );
    }

    #[rstest]
    #[case(0.0, true)] // Valid default value
    #[case(2.0, true)] // Valid positive value
    #[case(-1.0, false)] // Invalid: negative value
    #[case(f64::NEG_INFINITY, false)] // Invalid: infinite value
    fn test_check_distance_decay(#[case] value: f64, #[case] expected_valid: bool) {
        assert_validation_result(
            check_distance_decay(value),
            expected_valid,
            value,
            "distance_decay must be a finite, non-negative number",
        );
    }

    #[test]
    fn test_check_categories() {
        assert!(check_categories("x", &["A".into(), "B".into()]).is_ok());
        assert!(check_categories("x", &[]).is_err());
        assert!(check_categories("x", &["A".into(), "A".into()]).is_err());
        assert!(check_categories("x", &[" ".into()]).is_err());
    }
}
