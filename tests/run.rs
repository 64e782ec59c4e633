//! Integration tests for the `run` command.
use mria::cli::{RunOpts, handle_run_command};
use mria::settings::Settings;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

/// Get the path to the example model.
fn get_model_dir() -> PathBuf {
    PathBuf::from("demos/toy")
}

/// An integration test for the `run` command.
#[test]
fn test_handle_run_command() {
    unsafe { std::env::set_var("MRIA_LOG_LEVEL", "off") };

    // Save results to non-existent directory to check that directory creation works
    let tempdir = tempdir().unwrap();
    let output_dir = tempdir.path().join("results");
    let opts = RunOpts {
        output_dir: Some(output_dir.clone()),
        overwrite: false,
        debug_model: true,
    };
    handle_run_command(&get_model_dir(), &opts, Some(Settings::default())).unwrap();

    for file_name in [
        "baseline.csv",
        "baseline_products.csv",
        "outputs.csv",
        "rationing.csv",
        "disaster_imports.csv",
        "balance.csv",
        "summary.csv",
        "metadata.toml",
        "mria_info.log",
        "mria_error.log",
        "debug_output_limits.csv",
        "debug_rationing_limits.csv",
        "debug_import_limits.csv",
    ] {
        assert!(
            output_dir.join(file_name).is_file(),
            "Missing output file {file_name}"
        );
    }

    let summary = fs::read_to_string(output_dir.join("summary.csv")).unwrap();
    let mut lines = summary.lines();
    assert!(lines.next().unwrap().starts_with("stage,status"));
    assert!(lines.next().unwrap().starts_with("ration,optimal"));

    // Second time will fail because the logging is already initialised
    assert_eq!(
        handle_run_command(
            &get_model_dir(),
            &RunOpts {
                output_dir: Some(tempdir.path().join("results2")),
                ..Default::default()
            },
            Some(Settings::default())
        )
        .unwrap_err()
        .chain()
        .next()
        .unwrap()
        .to_string(),
        "Failed to initialise logging."
    );
}
