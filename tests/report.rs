use std::{fs, os::unix::fs::symlink, path::Path};

use serde_json::{json, Value};
use tempfile::tempdir;

use catgrader::report::{Image, Report, TestResult, RESULTS_FILE};

mod common;

#[test]
fn it_should_aggregate_fields() {
  common::setup();

  let mut report = Report::new();
  report.add_test(TestResult::new("leak 1").max_points(2.0).points(1.0), Some("memory"));
  report.add_test(TestResult::new("leak 2").max_points(2.0).passed(true), Some("memory"));
  report.add_test(TestResult::new("output").passed(false), None);
  report.finalize();

  assert_eq!(report.points(), 3.0);
  assert_eq!(report.max_points(), 5.0);
  assert_eq!(report.score(), 0.6);

  let memory = &report.partial_scores()["memory"];
  assert_eq!(memory.points(), 3.0);
  assert_eq!(memory.max_points(), 4.0);
  assert_eq!(memory.score(), Some(0.75));
}

#[test]
fn it_should_clamp_points() {
  common::setup();

  let mut report = Report::new();
  let test = report.add_test(TestResult::new("too much").max_points(2.0).points(5.0), None);
  assert_eq!(test.get_points(), 2.0);
  let test = report.add_test(TestResult::new("negative").points(-1.0), None);
  assert_eq!(test.get_points(), 0.0);
  let test = report.add_test(TestResult::new("nan").points(f64::NAN), None);
  assert_eq!(test.get_points(), 0.0);

  assert_eq!(report.points(), 2.0);
  assert_eq!(report.max_points(), 4.0);
  for test in report.tests() {
    assert!(test.get_points() >= 0.0 && test.get_points() <= test.get_max_points());
  }
}

#[test]
fn it_should_skip_score_without_points() {
  common::setup();

  let mut report = Report::new();
  report.add_test(TestResult::new("manual").max_points(0.0), Some("style"));
  report.finalize();

  assert_eq!(report.score(), 0.0);
  assert_eq!(report.partial_scores()["style"].score(), None);
}

#[test]
fn it_should_save_results_json() {
  common::setup();

  let dir = tempdir().unwrap();
  let results_dir = dir.path().join("results");

  let mut report = Report::new();
  report.append_message("Compilation warnings:\n\nunused variable\n");
  report.add_test(
    TestResult::new("Compilation")
      .passed(true)
      .output("ok")
      .image(Image::Path("plot.png".to_string())),
    None,
  );
  report.add_test(TestResult::new("Run").message("Expected:\n\t42"), None);
  let report = report.save(&results_dir).unwrap();
  assert_eq!(report.score(), 0.5);

  let saved: Value =
    serde_json::from_str(&fs::read_to_string(results_dir.join(RESULTS_FILE)).unwrap()).unwrap();
  assert_eq!(
    saved,
    json!({
      "score": 0.5,
      "points": 1.0,
      "max_points": 2.0,
      "output": "",
      "message": "Compilation warnings:\n\nunused variable\n",
      "gradable": true,
      "tests": [
        {
          "name": "Compilation",
          "description": "",
          "points": 1.0,
          "max_points": 1.0,
          "output": "ok",
          "message": "",
          "images": ["plot.png"]
        },
        {
          "name": "Run",
          "description": "",
          "points": 0.0,
          "max_points": 1.0,
          "output": "",
          "message": "Expected:\n\t42"
        }
      ]
    })
  );
}

#[test]
fn it_should_mark_ungradable() {
  common::setup();

  let mut report = Report::new();
  report.mark_ungradable("Linker errors, please fix and try again.\n\n");
  let json: Value = serde_json::from_str(&report.report_json().unwrap()).unwrap();
  assert_eq!(json["gradable"], json!(false));
  assert_eq!(json["message"], json!("Linker errors, please fix and try again.\n\n"));
  assert!(json.get("partial_scores").is_none());
}

#[test]
fn it_should_fail_when_results_can_not_be_written() {
  common::setup();
  if !Path::new("/dev/full").exists() {
    return;
  }

  let dir = tempdir().unwrap();
  symlink("/dev/full", dir.path().join(RESULTS_FILE)).unwrap();

  let mut report = Report::new();
  report.add_test(TestResult::new("output").passed(true), None);
  assert!(report.save(dir.path()).is_err());
}
