//! Code for loading program settings.
use crate::get_mria_config_dir;
use crate::input::read_toml;
use crate::log::DEFAULT_LOG_LEVEL;
use anyhow::{Result, ensure};
use documented::DocumentedFields;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::path::{Path, PathBuf};

const SETTINGS_FILE_NAME: &str = "settings.toml";

const DEFAULT_SETTINGS_FILE_HEADER: &str =
    "# This file contains the program settings for MRIA, the multiregional impact assessment model
";

/// Settings which have no default value, along with an example value for the settings template
const OPTIONAL_SETTINGS: [(&str, &str); 1] = [("solver_time_limit", "60.0")];

/// Default log level for program
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

/// Get the path to where the settings file will be read from
pub fn get_settings_file_path() -> PathBuf {
    let mut path = get_mria_config_dir();
    path.push(SETTINGS_FILE_NAME);

    path
}

/// Program settings from config file
#[derive(Debug, DocumentedFields, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// The default program log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Whether to overwrite output files by default
    #[serde(default)]
    pub overwrite: bool,
    /// Whether to write additional information to CSV files
    #[serde(default)]
    pub debug_model: bool,
    /// Time limit in seconds for each call to the solver (no limit if not given)
    #[serde(default)]
    pub solver_time_limit: Option<f64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            overwrite: false,
            debug_model: false,
            solver_time_limit: None,
        }
    }
}

impl Settings {
    /// Read the contents of the program settings file.
    ///
    /// If the file is not present, default values for settings will be used
    ///
    /// # Returns
    ///
    /// The program settings as a `Settings` struct or an error if the file is invalid
    pub fn load() -> Result<Settings> {
        Self::load_from_path(&get_settings_file_path())
    }

    /// Read from the specified path, returning default settings if the file doesn't exist
    fn load_from_path(file_path: &Path) -> Result<Settings> {
        if !file_path.is_file() {
            return Ok(Settings::default());
        }

        let settings: Settings = read_toml(file_path)?;
        settings.validate()?;

        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if let Some(limit) = self.solver_time_limit {
            ensure!(
                limit.is_finite() && limit > 0.0,
                "solver_time_limit must be a finite number greater than zero"
            );
        }

        Ok(())
    }

    /// The contents of the default settings file
    pub fn default_file_contents() -> String {
        // Convert default settings to TOML
        let settings_raw =
            toml::to_string(&Settings::default()).expect("Could not convert settings to TOML");

        // Iterate through the generated TOML, commenting out lines and adding docs
        let mut out = DEFAULT_SETTINGS_FILE_HEADER.to_string();
        for line in settings_raw.split('\n') {
            if let Some(last) = line.find('=') {
                let field = line[..last].trim();
                write_field(&mut out, field, line.trim());
            }
        }

        // Optional settings are omitted from the generated TOML
        for (field, example) in OPTIONAL_SETTINGS {
            write_field(&mut out, field, &format!("{field} = {example}"));
        }

        out
    }
}

/// Write a commented-out setting to `out`, preceded by its documentation
fn write_field(out: &mut String, field: &str, line: &str) {
    // Use doc comment to document parameter. All fields should have doc comments.
    let docs = Settings::get_field_docs(field).expect("Missing doc comment for field");
    for doc_line in docs.split('\n') {
        write!(out, "\n# # {}\n", doc_line.trim()).unwrap();
    }

    writeln!(out, "# {line}").unwrap();
}
