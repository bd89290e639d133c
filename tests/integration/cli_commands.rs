#![allow(missing_docs)]

use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use csv::ReaderBuilder;
use evently::config::PipelinePaths;
use serde_json::Value;
use tempfile::TempDir;

fn run_json(dir: &TempDir, args: &[&str]) -> Value {
    let output = cargo_bin_cmd!("evently")
        .current_dir(dir.path())
        .env("RUST_LOG", "warn")
        .args(["--format", "json"])
        .args(args)
        .output()
        .expect("run evently");
    assert!(
        output.status.success(),
        "evently {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("json summary")
}

#[test]
fn generate_then_pipeline_writes_every_artifact() {
    let dir = TempDir::new().expect("tempdir");
    let paths = PipelinePaths::under(dir.path());

    let generated = run_json(&dir, &["generate", "--users", "30", "--events", "12", "--seed", "7"]);
    assert_eq!(generated["users"], 30);
    assert_eq!(generated["events"], 12);
    assert!(paths.users_csv.exists());
    assert!(paths.events_csv.exists());

    let summary = run_json(&dir, &["pipeline"]);
    assert_eq!(summary["build"]["rows"], 360);
    assert_eq!(summary["training"]["test_rows"], 72);
    assert_eq!(summary["evaluation"]["stats"]["count"], 360);

    for path in [
        &paths.features_csv,
        &paths.model_bin,
        &paths.model_json,
        &paths.metadata_json,
        &paths.training_metrics_csv,
        &paths.predictions_csv,
        &paths.evaluation_metrics_csv,
    ] {
        assert!(path.exists(), "{} missing", path.display());
    }

    let mut reader = ReaderBuilder::new()
        .from_path(&paths.predictions_csv)
        .expect("predictions");
    let headers = reader.headers().expect("headers").clone();
    assert_eq!(headers.iter().last(), Some("predicted_score"));
    assert_eq!(reader.records().count(), 360);
}

#[test]
fn steps_can_run_one_by_one() {
    let dir = TempDir::new().expect("tempdir");
    run_json(&dir, &["generate", "--users", "10", "--events", "5"]);

    let build = run_json(&dir, &["build-features"]);
    assert_eq!(build["rows"], 50);

    let train = run_json(&dir, &["train", "--test-ratio", "0.3", "--seed", "1"]);
    assert_eq!(train["test_rows"], 15);
    assert_eq!(train["coefficients"].as_array().map(Vec::len), Some(3));

    let evaluation = run_json(&dir, &["evaluate"]);
    assert_eq!(evaluation["stats"]["count"], 50);
    assert!(evaluation["metrics"]["mse"].is_number());
}

#[test]
fn failures_exit_with_status_one() {
    let dir = TempDir::new().expect("tempdir");
    let output = cargo_bin_cmd!("evently")
        .current_dir(dir.path())
        .arg("train")
        .output()
        .expect("run evently");
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.lines().any(|line| line.starts_with("error: ")), "{stderr}");
}

#[test]
fn root_flag_relocates_the_layout() {
    let dir = TempDir::new().expect("tempdir");
    let nested = dir.path().join("work");
    fs::create_dir_all(&nested).expect("mkdir");
    let root = nested.to_str().expect("utf-8 path");
    run_json(&dir, &["--root", root, "generate", "--users", "4", "--events", "3"]);
    assert!(PipelinePaths::under(&nested).users_csv.exists());
    assert!(!PipelinePaths::under(dir.path()).users_csv.exists());
}

#[test]
fn train_help_marks_split_flags_experimental() {
    let output = cargo_bin_cmd!("evently")
        .args(["train", "--help"])
        .output()
        .expect("run evently");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for flag in ["--test-ratio", "--seed"] {
        let line = stdout
            .lines()
            .find(|line| line.contains(flag))
            .unwrap_or_else(|| panic!("{flag} missing from help:\n{stdout}"));
        assert!(line.contains("experimentation only"), "{line}");
    }
}
