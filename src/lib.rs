//! Common functionality for MRIA, the multiregional impact assessment model.
//!
//! Given a multiregional Supply-Use table and a disruption scenario, MRIA estimates how much
//! final demand must be rationed, how output is redistributed across sectors and regions and what
//! disaster imports are required for the economy to reach a new equilibrium.
#![warn(missing_docs)]
use std::path::PathBuf;

pub mod cli;
pub mod coefficients;
pub mod disruption;
pub mod error;
pub mod escalation;
pub mod id;
pub mod input;
pub mod log;
pub mod model;
pub mod optimisation;
pub mod output;
pub mod pipeline;
pub mod scenario;
pub mod settings;
pub mod solver;
pub mod sweep;
pub mod table;
pub mod trade;

#[cfg(test)]
mod fixture;

/// Get the path to the folder in which MRIA's program configuration is stored
pub fn get_mria_config_dir() -> PathBuf {
    let Some(mut config_dir) = dirs::config_dir() else {
        // No config dir found: use the current directory
        return PathBuf::default();
    };

    config_dir.push("mria");
    config_dir
}
