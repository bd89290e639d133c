#![allow(missing_docs)]

use std::fs;
use std::sync::Arc;

use evently::config::{PipelinePaths, TrainOptions};
use evently::model::{decode_binary, decode_json};
use evently::pipeline::run_pipeline;
use evently::predict::PredictionService;
use evently::store::ModelStore;
use evently::training::read_metadata;
use evently::{DataError, PipelineError};
use serde_json::json;
use tempfile::TempDir;

/// Eight events covering every combination of region, category and a
/// popularity of 0 or 1, plus five identical users in `north` who like one
/// music event and one event that no longer exists.
///
/// With likes and popularity restricted to {0, 1} the heuristic label is
/// exactly `0.5 * region_match + 0.3 * likes + 0.1 * popularity`.
fn write_linear_dataset(paths: &PipelinePaths) {
    fs::create_dir_all(paths.users_csv.parent().expect("raw dir")).expect("mkdir");
    let mut users = String::from("id,regione,favoriteIds\n");
    for i in 0..5 {
        users.push_str(&format!("u{i},north,\"['A', 'ZZ']\"\n"));
    }
    fs::write(&paths.users_csv, users).expect("users");

    let events = "id,regione,category,favoriteCount\n\
                  A,north,music,0\n\
                  B,north,music,1\n\
                  C,north,sport,0\n\
                  D,north,sport,1\n\
                  E,south,music,0\n\
                  F,south,music,1\n\
                  G,south,sport,0\n\
                  H,south,sport,1\n";
    fs::write(&paths.events_csv, events).expect("events");
}

fn setup() -> (TempDir, PipelinePaths) {
    let dir = TempDir::new().expect("tempdir");
    let paths = PipelinePaths::under(dir.path());
    write_linear_dataset(&paths);
    (dir, paths)
}

#[test]
fn trained_model_recovers_the_heuristic_weights() {
    let (_dir, paths) = setup();
    let report = run_pipeline(&paths, &TrainOptions::default()).expect("pipeline");

    assert_eq!(report.build.rows, 40);
    assert_eq!(report.training.train_rows, 32);
    assert_eq!(report.training.test_rows, 8);
    let coef = report.training.model.coefficients();
    assert!((coef[0] - 0.5).abs() < 1e-8);
    assert!((coef[1] - 0.3).abs() < 1e-8);
    assert!((coef[2] - 0.1).abs() < 1e-8);
    assert!(report.training.model.intercept().abs() < 1e-8);
    assert!(report.training.metrics.mse < 1e-12);

    let evaluation = report.evaluation.metrics.expect("labeled table");
    assert!(evaluation.mse < 1e-12);
    assert_eq!(report.evaluation.stats.count, 40);
}

#[test]
fn served_prediction_matches_the_linear_model() {
    let (_dir, paths) = setup();
    run_pipeline(&paths, &TrainOptions::default()).expect("pipeline");

    let service = PredictionService::new(Arc::new(ModelStore::new(&paths.model_bin)));
    let input = json!({"region_match": 1, "user_likes_for_category": 3, "event_popularity": 15});
    let result = service.predict_one(input.clone()).expect("predict");
    assert!((result.prediction - 2.9).abs() < 1e-6, "got {}", result.prediction);
    assert_eq!(result.input_data, input);
}

#[test]
fn artifacts_agree_with_each_other() {
    let (_dir, paths) = setup();
    run_pipeline(&paths, &TrainOptions::default()).expect("pipeline");

    let primary = decode_binary(&fs::read(&paths.model_bin).expect("bin")).expect("decode bin");
    let backup =
        decode_json(&fs::read_to_string(&paths.model_json).expect("json")).expect("decode json");
    assert_eq!(primary, backup);

    let metadata = read_metadata(&paths.metadata_json).expect("metadata");
    assert_eq!(
        metadata.features,
        vec!["region_match", "user_likes_for_category", "event_popularity"]
    );
    assert_eq!(metadata.model_type, "LinearRegression");

    let metrics = fs::read_to_string(&paths.training_metrics_csv).expect("training metrics");
    assert!(metrics.starts_with("mse,r2\n"));
    let predictions = fs::read_to_string(&paths.predictions_csv).expect("predictions");
    assert_eq!(predictions.lines().count(), 41);
    assert!(paths.evaluation_metrics_csv.exists());
}

#[test]
fn feature_table_is_byte_identical_across_runs() {
    let (_dir, paths) = setup();
    run_pipeline(&paths, &TrainOptions::default()).expect("first run");
    let first = fs::read(&paths.features_csv).expect("first table");
    let first_model = fs::read(&paths.model_bin).expect("first model");

    run_pipeline(&paths, &TrainOptions::default()).expect("second run");
    assert_eq!(fs::read(&paths.features_csv).expect("second table"), first);
    assert_eq!(fs::read(&paths.model_bin).expect("second model"), first_model);
}

#[test]
fn empty_users_table_aborts_training() {
    let (_dir, paths) = setup();
    fs::write(&paths.users_csv, "id,regione,favoriteIds\n").expect("users");
    let err = run_pipeline(&paths, &TrainOptions::default()).expect_err("no rows");
    assert!(matches!(err, PipelineError::Data(DataError::EmptyDataset)));
    assert!(!paths.model_bin.exists());
}

#[test]
fn missing_raw_table_is_a_read_error() {
    let (_dir, paths) = setup();
    fs::remove_file(&paths.events_csv).expect("remove");
    let err = run_pipeline(&paths, &TrainOptions::default()).expect_err("missing events");
    assert!(matches!(err, PipelineError::Data(DataError::Read { .. })));
}
