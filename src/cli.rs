//! The command line interface for the model.
use crate::input::load_model;
use crate::log;
use crate::model::Model;
use crate::output::metadata::write_metadata;
use crate::output::{DataWriter, create_output_directory, get_output_dir, write_sweep};
use crate::pipeline::{calibrate, evaluate_scenario};
use crate::settings::Settings;
use crate::solver::HighsSolver;
use crate::sweep::{run_sweep, sweep_plan};
use ::log::{info, warn};
use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};

pub mod example;
use example::ExampleSubcommands;
pub mod settings;
use settings::SettingsSubcommands;

/// The command line interface for the model.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// The available commands.
    #[command(subcommand)]
    command: Option<Commands>,
    /// Flag to provide the CLI docs as markdown
    #[arg(long, hide = true)]
    markdown_help: bool,
}

/// Options for the run command
#[derive(Args, Default)]
pub struct RunOpts {
    /// Directory for output files
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
    /// Whether to overwrite the output directory if it already exists
    #[arg(long)]
    pub overwrite: bool,
    /// Whether to write additional information to CSV files
    #[arg(long)]
    pub debug_model: bool,
}

/// Options for the sweep command
#[derive(Args, Default)]
pub struct SweepOpts {
    /// Directory for output files
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
    /// Whether to overwrite the output directory if it already exists
    #[arg(long)]
    pub overwrite: bool,
    /// Number of worker threads (defaults to the number of CPUs)
    #[arg(long)]
    pub threads: Option<usize>,
}

/// The available commands.
#[derive(Subcommand)]
enum Commands {
    /// Evaluate the disruption scenario of a model.
    Run {
        /// Path to the model directory.
        model_dir: PathBuf,
        /// Other run options
        #[command(flatten)]
        opts: RunOpts,
    },
    /// Evaluate a disruption to each region-sector of a model in turn.
    Sweep {
        /// Path to the model directory.
        model_dir: PathBuf,
        /// Other sweep options
        #[command(flatten)]
        opts: SweepOpts,
    },
    /// Manage example models.
    Example {
        /// The available subcommands for managing example models.
        #[command(subcommand)]
        subcommand: ExampleSubcommands,
    },
    /// Validate a model.
    Validate {
        /// The path to the model directory.
        model_dir: PathBuf,
    },
    /// Manage settings file.
    Settings {
        /// The subcommands for managing the settings file.
        #[command(subcommand)]
        subcommand: SettingsSubcommands,
    },
}

impl Commands {
    /// Execute the supplied CLI command
    fn execute(self) -> Result<()> {
        match self {
            Self::Run { model_dir, opts } => handle_run_command(&model_dir, &opts, None),
            Self::Sweep { model_dir, opts } => handle_sweep_command(&model_dir, &opts, None),
            Self::Example { subcommand } => subcommand.execute(),
            Self::Validate { model_dir } => handle_validate_command(&model_dir, None),
            Self::Settings { subcommand } => subcommand.execute(),
        }
    }
}

/// Parse CLI arguments and start MRIA
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    // Invoked as: `$ mria --markdown-help`
    if cli.markdown_help {
        clap_markdown::print_help_markdown::<Cli>();
        return Ok(());
    }

    let Some(command) = cli.command else {
        // No command given: output program help
        let help_str = Cli::command().render_long_help().to_string();
        println!("{help_str}");
        return Ok(());
    };

    command.execute()
}

/// Load program settings, if not provided
fn load_settings(settings: Option<Settings>) -> Result<Settings> {
    match settings {
        Some(settings) => Ok(settings),
        None => Settings::load().context("Failed to load settings."),
    }
}

/// Prepare the output folder and start logging to it.
///
/// # Returns
///
/// The path to the output folder.
fn prepare_output(
    model_path: &Path,
    output_dir: Option<&Path>,
    overwrite: bool,
    settings: &Settings,
) -> Result<PathBuf> {
    // Get path to output folder
    let output_path = match output_dir {
        Some(p) => p.to_path_buf(),
        None => get_output_dir(model_path)?,
    };

    let overwritten = create_output_directory(&output_path, overwrite).with_context(|| {
        format!(
            "Failed to create output directory: {}",
            output_path.display()
        )
    })?;

    // Initialise program logger
    log::init(Some(&settings.log_level), Some(&output_path))
        .context("Failed to initialise logging.")?;

    // NB: We have to wait until the logger is initialised to display this warning
    if overwritten {
        warn!("Output folder will be overwritten");
    }
    info!("Output folder: {}", output_path.display());

    Ok(output_path)
}

/// The solver backend configured by the program settings.
///
/// HiGHS only writes to the console if debug messages are being logged.
fn new_solver(settings: &Settings) -> HighsSolver {
    HighsSolver::new(settings.solver_time_limit, log::is_debug_enabled())
}

/// Handle the `run` command.
pub fn handle_run_command(
    model_path: &Path,
    opts: &RunOpts,
    settings: Option<Settings>,
) -> Result<()> {
    let mut settings = load_settings(settings)?;

    // These settings can be overridden by command-line arguments
    if opts.debug_model {
        settings.debug_model = true;
    }
    let overwrite = opts.overwrite || settings.overwrite;

    let output_path = prepare_output(model_path, opts.output_dir.as_deref(), overwrite, &settings)?;

    // Load the model to run
    let model = load_model(model_path).context("Failed to load model.")?;
    info!("Loaded model from {}", model.model_path.display());
    write_metadata(&output_path, "run", &model.model_path).context("Failed to save metadata.")?;

    let Model {
        parameters,
        table,
        scenario,
        weights,
        ..
    } = model;
    let solver = new_solver(&settings);
    let baseline = calibrate(table, weights, &solver)?;
    let result = evaluate_scenario(
        &baseline,
        &scenario,
        &parameters.pipeline_options(),
        &solver,
    )?;
    info!(
        "Total rationing: {:.6}; total demand loss: {:.6}",
        result.total_rationing(),
        result.total_demand_loss()
    );

    let mut writer = DataWriter::create(&output_path, settings.debug_model)?;
    writer.write_baseline(&baseline)?;
    writer.write_scenario(&baseline, &result)?;
    writer.write_debug_info(&baseline, &scenario, &result)?;
    writer.flush()?;
    info!("Scenario evaluation complete!");

    Ok(())
}

/// Handle the `sweep` command.
pub fn handle_sweep_command(
    model_path: &Path,
    opts: &SweepOpts,
    settings: Option<Settings>,
) -> Result<()> {
    let settings = load_settings(settings)?;
    let overwrite = opts.overwrite || settings.overwrite;
    let output_path = prepare_output(model_path, opts.output_dir.as_deref(), overwrite, &settings)?;

    let model = load_model(model_path).context("Failed to load model.")?;
    info!("Loaded model from {}", model.model_path.display());
    write_metadata(&output_path, "sweep", &model.model_path).context("Failed to save metadata.")?;

    let Model {
        parameters,
        table,
        scenario,
        weights,
        ..
    } = model;
    let plan = sweep_plan(table.dimensions(), &parameters.sweep, &scenario)
        .context("Invalid sweep parameters.")?;
    let solver = new_solver(&settings);
    let baseline = calibrate(table, weights, &solver)?;
    let records = run_sweep(
        &baseline,
        &scenario,
        &plan,
        &parameters.pipeline_options(),
        &solver,
        opts.threads,
    )?;

    write_sweep(&output_path, &records)?;
    info!("Sweep complete!");

    Ok(())
}

/// Handle the `validate` command.
pub fn handle_validate_command(model_path: &Path, settings: Option<Settings>) -> Result<()> {
    let settings = load_settings(settings)?;

    // Initialise program logger (we won't save log files when running the validate command)
    log::init(Some(&settings.log_level), None).context("Failed to initialise logging.")?;

    // Load/validate the model
    let model = load_model(model_path).context("Failed to validate model.")?;
    let dims = model.table.dimensions();
    info!(
        "Model has {} regions, {} sectors and {} products",
        dims.regions.len(),
        dims.sectors.len(),
        dims.products.len()
    );
    info!("Model validation successful!");

    Ok(())
}
