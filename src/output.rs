//! The module responsible for writing output data to disk.
use crate::id::{ProductID, RegionID, SectorID};
use crate::optimisation::{SolvedModel, StageKind};
use crate::pipeline::{CalibratedBaseline, ScenarioResult};
use crate::scenario::DisruptionScenario;
use crate::solver::TerminationStatus;
use crate::sweep::{SweepOutcome, SweepRecord, SweepTarget};
use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};

pub mod metadata;

/// The root folder in which model-specific output folders will be created
const OUTPUT_DIRECTORY_ROOT: &str = "mria_results";

/// The output file name for output of each region-sector
const OUTPUTS_FILE_NAME: &str = "outputs.csv";

/// The output file name for rationed demand
const RATIONING_FILE_NAME: &str = "rationing.csv";

/// The output file name for disaster imports
const DISASTER_IMPORTS_FILE_NAME: &str = "disaster_imports.csv";

/// The output file name for the supply-demand balance of each region-product
const BALANCE_FILE_NAME: &str = "balance.csv";

/// The output file name for a summary of each stage
const SUMMARY_FILE_NAME: &str = "summary.csv";

/// The output file name for the calibrated baseline
const BASELINE_FILE_NAME: &str = "baseline.csv";

/// The output file name for the baseline demand and trade of each region-product
const BASELINE_PRODUCTS_FILE_NAME: &str = "baseline_products.csv";

/// The output file name for the results of a sweep
const SWEEP_FILE_NAME: &str = "sweep.csv";

/// The output file name for output limits
const OUTPUT_LIMITS_FILE_NAME: &str = "debug_output_limits.csv";

/// The output file name for rationing limits
const RATIONING_LIMITS_FILE_NAME: &str = "debug_rationing_limits.csv";

/// The output file name for disaster import limits
const IMPORT_LIMITS_FILE_NAME: &str = "debug_import_limits.csv";

/// Get the default output directory for the model specified at `model_dir`
pub fn get_output_dir(model_dir: &Path) -> Result<PathBuf> {
    // Get the model name from the dir path. This ends up being convoluted because we need to check
    // for all possible errors. Ugh.
    let model_dir = model_dir
        .canonicalize() // canonicalise in case the user has specified "."
        .context("Could not resolve path to model")?;

    let model_name = model_dir
        .file_name()
        .context("Model cannot be in root folder")?
        .to_str()
        .context("Invalid chars in model dir name")?;

    // Construct path
    Ok([OUTPUT_DIRECTORY_ROOT, model_name].iter().collect())
}

/// Create a new output directory for the model specified at `model_dir`.
///
/// # Returns
///
/// Whether an existing, non-empty folder was overwritten, or an error if the folder is non-empty
/// and `allow_overwrite` is false.
pub fn create_output_directory(output_dir: &Path, allow_overwrite: bool) -> Result<bool> {
    // If the folder already exists, then delete it
    let overwrite = if let Ok(mut it) = fs::read_dir(output_dir) {
        if it.next().is_none() {
            // Folder exists and is empty: nothing to do
            return Ok(false);
        }

        ensure!(
            allow_overwrite,
            "Output folder already exists and is not empty. Please delete the folder or pass the \
            --overwrite command-line option."
        );

        fs::remove_dir_all(output_dir)?;
        true
    } else {
        false
    };

    // Try to create the directory, with parents
    fs::create_dir_all(output_dir)?;

    Ok(overwrite)
}

/// Open a CSV writer for a file in `output_path`
fn new_writer(output_path: &Path, file_name: &str) -> Result<csv::Writer<File>> {
    let file_path = output_path.join(file_name);
    csv::Writer::from_path(&file_path)
        .with_context(|| format!("Could not create {}", file_path.display()))
}

/// Represents a row in the baseline CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct BaselineRow {
    region_id: RegionID,
    sector_id: SectorID,
    table_output: f64,
    calibrated_output: f64,
    value_added: f64,
}

/// Represents a row in the baseline products CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct BaselineProductRow {
    region_id: RegionID,
    product_id: ProductID,
    final_demand: f64,
    exports: f64,
    imports: f64,
}

/// Represents a row in the outputs CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct OutputRow {
    stage: StageKind,
    region_id: RegionID,
    sector_id: SectorID,
    baseline: f64,
    value: f64,
    value_added: f64,
}

/// Represents a row in the rationing or balance CSV files
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct RegionProductRow {
    stage: StageKind,
    region_id: RegionID,
    product_id: ProductID,
    value: f64,
}

/// Represents a row in the disaster imports CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct DisasterImportRow {
    stage: StageKind,
    from_region_id: RegionID,
    to_region_id: RegionID,
    product_id: ProductID,
    value: f64,
}

/// Represents a row in the summary CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct SummaryRow {
    stage: StageKind,
    status: TerminationStatus,
    objective_value: f64,
    total_output: f64,
    total_rationing: f64,
    total_disaster_imports: f64,
    threshold_index: usize,
    threshold: f64,
}

/// Represents a row in the sweep CSV file.
///
/// The region and sector are empty for cases which deepen the model's whole scenario.
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct SweepRow {
    region_id: Option<RegionID>,
    sector_id: Option<SectorID>,
    magnitude: f64,
    op_factor: f64,
    imp_flex: f64,
    status: TerminationStatus,
    threshold_index: Option<usize>,
    threshold: Option<f64>,
    objective_value: Option<f64>,
    total_output: Option<f64>,
    total_rationing: Option<f64>,
    total_demand_loss: Option<f64>,
    total_disaster_imports: Option<f64>,
}

impl SweepRow {
    fn new(record: &SweepRecord) -> Self {
        let case = &record.case;
        let (region_id, sector_id) = match &case.target {
            SweepTarget::Sector { region, sector } => (Some(region.clone()), Some(sector.clone())),
            SweepTarget::Scenario => (None, None),
        };
        let mut row = Self {
            region_id,
            sector_id,
            magnitude: case.magnitude,
            op_factor: case.op_factor,
            imp_flex: case.imp_flex,
            status: TerminationStatus::Optimal,
            threshold_index: None,
            threshold: None,
            objective_value: None,
            total_output: None,
            total_rationing: None,
            total_demand_loss: None,
            total_disaster_imports: None,
        };

        match &record.outcome {
            SweepOutcome::Resolved(result) => {
                let disruption = result.disruption();
                row.status = disruption.status;
                row.threshold_index = Some(result.threshold_index);
                row.threshold = Some(result.threshold);
                row.objective_value = Some(result.rationing.objective_value);
                row.total_output = Some(disruption.total_output());
                row.total_rationing = Some(result.total_rationing());
                row.total_demand_loss = Some(result.total_demand_loss());
                row.total_disaster_imports = Some(disruption.total_disaster_imports());
            }
            SweepOutcome::Unresolved { status, .. } => row.status = *status,
        }

        row
    }
}

/// Represents a row in the output limits CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct OutputLimitRow {
    region_id: RegionID,
    sector_id: SectorID,
    limit: f64,
}

/// Represents a row in the rationing limits CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct RationingLimitRow {
    region_id: RegionID,
    product_id: ProductID,
    demand_loss: f64,
    limit: f64,
}

/// Represents a row in the import limits CSV file
#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct ImportLimitRow {
    from_region_id: RegionID,
    to_region_id: RegionID,
    product_id: ProductID,
    limit: f64,
}

/// For writing extra debug information about the model
struct DebugDataWriter {
    output_limits_writer: csv::Writer<File>,
    rationing_limits_writer: csv::Writer<File>,
    import_limits_writer: csv::Writer<File>,
}

impl DebugDataWriter {
    /// Open CSV files to write debug info to
    ///
    /// # Arguments
    ///
    /// * `output_path` - Folder where files will be saved
    fn create(output_path: &Path) -> Result<Self> {
        Ok(Self {
            output_limits_writer: new_writer(output_path, OUTPUT_LIMITS_FILE_NAME)?,
            rationing_limits_writer: new_writer(output_path, RATIONING_LIMITS_FILE_NAME)?,
            import_limits_writer: new_writer(output_path, IMPORT_LIMITS_FILE_NAME)?,
        })
    }

    /// Write the limits used for a scenario
    fn write_limits(
        &mut self,
        baseline: &CalibratedBaseline,
        scenario: &DisruptionScenario,
        result: &ScenarioResult,
    ) -> Result<()> {
        for ((region_id, sector_id), limit) in &result.limits.output_limits {
            self.output_limits_writer.serialize(OutputLimitRow {
                region_id: region_id.clone(),
                sector_id: sector_id.clone(),
                limit: *limit,
            })?;
        }

        for ((region_id, product_id), limit) in &result.limits.rationing_limits {
            let key = (region_id.clone(), product_id.clone());
            self.rationing_limits_writer.serialize(RationingLimitRow {
                region_id: region_id.clone(),
                product_id: product_id.clone(),
                demand_loss: result.limits.demand_loss[&key],
                limit: *limit,
            })?;
        }

        // Import limits at the threshold which succeeded
        let import_limits = baseline.import_limits(scenario, result.threshold);
        for ((from_region_id, to_region_id, product_id), limit) in import_limits {
            self.import_limits_writer.serialize(ImportLimitRow {
                from_region_id,
                to_region_id,
                product_id,
                limit,
            })?;
        }

        Ok(())
    }

    /// Flush the underlying streams
    fn flush(&mut self) -> Result<()> {
        self.output_limits_writer.flush()?;
        self.rationing_limits_writer.flush()?;
        self.import_limits_writer.flush()?;

        Ok(())
    }
}

/// An object for writing the results of a scenario to file
pub struct DataWriter {
    baseline_writer: csv::Writer<File>,
    baseline_products_writer: csv::Writer<File>,
    outputs_writer: csv::Writer<File>,
    rationing_writer: csv::Writer<File>,
    disaster_imports_writer: csv::Writer<File>,
    balance_writer: csv::Writer<File>,
    summary_writer: csv::Writer<File>,
    debug_writer: Option<DebugDataWriter>,
}

impl DataWriter {
    /// Open CSV files to write output data to
    ///
    /// # Arguments
    ///
    /// * `output_path` - Folder where files will be saved
    /// * `save_debug_info` - Whether to include extra CSV files for debugging model
    pub fn create(output_path: &Path, save_debug_info: bool) -> Result<Self> {
        let debug_writer = if save_debug_info {
            // Create debug CSV files
            Some(DebugDataWriter::create(output_path)?)
        } else {
            None
        };

        Ok(Self {
            baseline_writer: new_writer(output_path, BASELINE_FILE_NAME)?,
            baseline_products_writer: new_writer(output_path, BASELINE_PRODUCTS_FILE_NAME)?,
            outputs_writer: new_writer(output_path, OUTPUTS_FILE_NAME)?,
            rationing_writer: new_writer(output_path, RATIONING_FILE_NAME)?,
            disaster_imports_writer: new_writer(output_path, DISASTER_IMPORTS_FILE_NAME)?,
            balance_writer: new_writer(output_path, BALANCE_FILE_NAME)?,
            summary_writer: new_writer(output_path, SUMMARY_FILE_NAME)?,
            debug_writer,
        })
    }

    /// Write the table and calibrated output of each region-sector, along with the demand and
    /// trade of each region-product
    pub fn write_baseline(&mut self, baseline: &CalibratedBaseline) -> Result<()> {
        let table = baseline.table();
        let calibrated = baseline.calibrated_coefficients();
        for ((region_id, sector_id), table_output) in &baseline.raw_coefficients().xbase {
            self.baseline_writer.serialize(BaselineRow {
                region_id: region_id.clone(),
                sector_id: sector_id.clone(),
                table_output: *table_output,
                calibrated_output: calibrated.output(region_id, sector_id),
                value_added: table.total_value_added(region_id, sector_id),
            })?;
        }

        for ((region_id, product_id), final_demand) in baseline.final_demand() {
            let key = (region_id.clone(), product_id.clone());
            self.baseline_products_writer.serialize(BaselineProductRow {
                region_id: region_id.clone(),
                product_id: product_id.clone(),
                final_demand: *final_demand,
                exports: baseline.exports()[&key],
                imports: table.total_imports(region_id, product_id),
            })?;
        }

        Ok(())
    }

    /// Write the results of every stage of a scenario
    pub fn write_scenario(
        &mut self,
        baseline: &CalibratedBaseline,
        result: &ScenarioResult,
    ) -> Result<()> {
        let calibrated = baseline.calibrated_coefficients();
        for stage in result.iter_stages() {
            for (region_id, sector_id, value) in stage.iter_outputs() {
                self.outputs_writer.serialize(OutputRow {
                    stage: stage.stage,
                    region_id: region_id.clone(),
                    sector_id: sector_id.clone(),
                    baseline: calibrated.output(region_id, sector_id),
                    value,
                    value_added: value * baseline.value_added_share(region_id, sector_id),
                })?;
            }

            self.write_stage_summary(stage, result)?;
            self.write_stage_rationing(stage)?;
            self.write_stage_disaster_imports(stage)?;
            self.write_stage_balance(stage)?;
        }

        Ok(())
    }

    fn write_stage_summary(&mut self, stage: &SolvedModel, result: &ScenarioResult) -> Result<()> {
        self.summary_writer.serialize(SummaryRow {
            stage: stage.stage,
            status: stage.status,
            objective_value: stage.objective_value,
            total_output: stage.total_output(),
            total_rationing: stage.total_rationing(),
            total_disaster_imports: stage.total_disaster_imports(),
            threshold_index: result.threshold_index,
            threshold: result.threshold,
        })?;

        Ok(())
    }

    fn write_stage_rationing(&mut self, stage: &SolvedModel) -> Result<()> {
        for (region_id, product_id, value) in stage.iter_rationing() {
            self.rationing_writer.serialize(RegionProductRow {
                stage: stage.stage,
                region_id: region_id.clone(),
                product_id: product_id.clone(),
                value,
            })?;
        }

        Ok(())
    }

    fn write_stage_disaster_imports(&mut self, stage: &SolvedModel) -> Result<()> {
        for (from_region_id, to_region_id, product_id, value) in stage.iter_disaster_imports() {
            self.disaster_imports_writer.serialize(DisasterImportRow {
                stage: stage.stage,
                from_region_id: from_region_id.clone(),
                to_region_id: to_region_id.clone(),
                product_id: product_id.clone(),
                value,
            })?;
        }

        Ok(())
    }

    fn write_stage_balance(&mut self, stage: &SolvedModel) -> Result<()> {
        for ((region_id, product_id), value) in &stage.balance {
            self.balance_writer.serialize(RegionProductRow {
                stage: stage.stage,
                region_id: region_id.clone(),
                product_id: product_id.clone(),
                value: *value,
            })?;
        }

        Ok(())
    }

    /// Write debug information to CSV files
    pub fn write_debug_info(
        &mut self,
        baseline: &CalibratedBaseline,
        scenario: &DisruptionScenario,
        result: &ScenarioResult,
    ) -> Result<()> {
        if let Some(wtr) = &mut self.debug_writer {
            wtr.write_limits(baseline, scenario, result)?;
        }

        Ok(())
    }

    /// Flush the underlying streams
    pub fn flush(&mut self) -> Result<()> {
        self.baseline_writer.flush()?;
        self.baseline_products_writer.flush()?;
        self.outputs_writer.flush()?;
        self.rationing_writer.flush()?;
        self.disaster_imports_writer.flush()?;
        self.balance_writer.flush()?;
        self.summary_writer.flush()?;
        if let Some(wtr) = &mut self.debug_writer {
            wtr.flush()?;
        }

        Ok(())
    }
}

/// Write the results of a sweep to `sweep.csv`, one row per case in plan order
pub fn write_sweep(output_path: &Path, records: &[SweepRecord]) -> Result<()> {
    let mut writer = new_writer(output_path, SWEEP_FILE_NAME)?;
    for record in records {
        writer.serialize(SweepRow::new(record))?;
    }
    writer.flush()?;

    Ok(())
}
