use std::{fs, time::Duration};

use serde_json::Value;
use tempfile::{tempdir, TempDir};

use catgrader::session::{MANUAL_GRADING_DESCRIPTION, MANUAL_GRADING_NAME};
use catgrader::{
  CompileOptions, GraderConfig, GraderError, Quantifier, RunTest, Session, SuiteRun,
};

mod common;

fn config(dir: &TempDir) -> GraderConfig {
  let data_file = dir.path().join("data.json");
  fs::write(&data_file, r#"{"params": {"n": 3}, "submitted_answers": {}}"#).unwrap();
  GraderConfig::default()
    .data_file(data_file)
    .results_dir(dir.path().join("results"))
    .submission_dir(dir.path())
    .grade_root(dir.path())
    .shim_dir(dir.path().join("shim"))
    .sandbox_user(None::<String>)
    .prepare_workspace(false)
}

fn saved(dir: &TempDir) -> Value {
  let path = dir.path().join("results").join("results.json");
  serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn it_should_load_data() {
  common::setup();

  let dir = tempdir().unwrap();
  let session = Session::start(config(&dir)).unwrap();
  assert_eq!(session.data()["params"]["n"], 3);
  assert!(session.sandbox().is_none());

  let missing = config(&dir).data_file(dir.path().join("missing.json"));
  assert!(Session::start(missing).is_err());
}

#[test]
fn it_should_grade_runs() {
  common::setup();

  let dir = tempdir().unwrap();
  let report = Session::start(config(&dir))
    .unwrap()
    .run(|session| {
      let test = session.test_run(
        RunTest::new(vec!["/bin/sh", "-c", "echo Hello World"]).expected("hello world"),
      )?;
      assert_eq!(test.get_points(), 1.0);
      assert_eq!(test.get_name(), "Test command: /bin/sh");

      let test = session.test_run(RunTest::command_line("/bin/cat").input("1 2\n3").expected("1 2 3"))?;
      assert_eq!(test.get_name(), "Test with input \"1 2 3\"");
      assert_eq!(test.get_points(), 1.0);
      assert_eq!(test.get_output(), "1 2\n3\n(NO ENDING LINE BREAK)");

      let test = session.test_run(
        RunTest::new(vec!["/bin/echo"])
          .args(vec![1, 2])
          .expected("3")
          .rejected("error"),
      )?;
      assert_eq!(test.get_name(), "Test with arguments \"1 2\"");
      assert_eq!(test.get_points(), 0.0);
      assert_eq!(test.get_message(), "Expected:\n\t3\nBut not:\n\terror");
      Ok(())
    })
    .unwrap();

  assert!(report.gradable());
  assert_eq!(report.points(), 2.0);
  assert_eq!(report.max_points(), 3.0);
  assert_eq!(saved(&dir)["tests"].as_array().unwrap().len(), 3);
}

#[test]
fn it_should_zero_timeouts() {
  common::setup();

  let dir = tempdir().unwrap();
  let report = Session::start(config(&dir))
    .unwrap()
    .run(|session| {
      let test = session.test_run(
        RunTest::command_line("/bin/sh -c")
          .arg("echo Hello; sleep 5")
          .name("Slow")
          .timeout(Some(Duration::from_millis(200)))
          .expected("Hello"),
      )?;
      assert_eq!(test.get_points(), 0.0);
      assert!(test.get_output().starts_with("Hello\n"));
      assert!(test.get_output().contains("TIMEOUT!"));
      Ok(())
    })
    .unwrap();
  assert_eq!(report.score(), 0.0);
}

#[test]
fn it_should_score_fields() {
  common::setup();

  let dir = tempdir().unwrap();
  let report = Session::start(config(&dir))
    .unwrap()
    .run(|session| {
      session.test_run(
        RunTest::command_line("/bin/echo a c")
          .expected_list(vec!["a", "b", "c", "d"])
          .quantifier(Quantifier::Partial)
          .max_points(4.0)
          .field("memory"),
      )?;
      session.add_manual_grading(3.0, None, None);
      Ok(())
    })
    .unwrap();

  assert_eq!(report.partial_scores()["memory"].points(), 2.0);
  assert_eq!(report.partial_scores()["memory"].score(), Some(0.5));
  assert_eq!(report.max_points(), 7.0);

  let manual = &report.tests()[1];
  assert_eq!(manual.get_name(), MANUAL_GRADING_NAME);
  assert_eq!(manual.get_description(), MANUAL_GRADING_DESCRIPTION);
  assert_eq!(manual.get_points(), 0.0);

  let json = saved(&dir);
  assert_eq!(json["partial_scores"]["memory"]["score"], 0.5);
}

#[test]
fn it_should_mark_missing_suite_log_ungradable() {
  common::setup();

  let dir = tempdir().unwrap();
  let report = Session::start(config(&dir))
    .unwrap()
    .run(|session| {
      session.add_manual_grading(1.0, Some("Style"), Some("Reviewed later"));
      session.run_check_suite(SuiteRun::new("/bin/true"))?;
      panic!("The suite should end the session");
    })
    .unwrap();

  assert!(!report.gradable());
  assert_eq!(
    report.message(),
    "Test suite log file not found. Consult the instructor.\n"
  );
  assert_eq!(report.tests().len(), 1);

  let json = saved(&dir);
  assert_eq!(json["gradable"], false);
  assert_eq!(json["tests"][0]["name"], "Style");
}

#[test]
fn it_should_save_before_returning_errors() {
  common::setup();

  let dir = tempdir().unwrap();
  let result = Session::start(config(&dir)).unwrap().run(|session| {
    session.add_manual_grading(2.0, None, None);
    Err(GraderError::config("broken question"))
  });

  assert!(matches!(result, Err(GraderError::Config(_))));
  let json = saved(&dir);
  assert_eq!(json["gradable"], true);
  assert_eq!(json["max_points"], 2.0);
}

#[test]
fn it_should_record_compilation() {
  common::setup();
  if !common::has_tool("gcc") || !common::has_tool("nm") {
    return;
  }

  let dir = tempdir().unwrap();
  let source = dir.path().join("hello.c");
  fs::copy(common::fixture("build/hello.c"), &source).unwrap();
  let executable = dir.path().join("hello");

  let report = Session::start(config(&dir))
    .unwrap()
    .run(|session| {
      let test = session.test_compile_file(
        &CompileOptions::single(&source)
          .executable(&executable)
          .points(2.0)
          .field("build"),
      )?;
      assert_eq!(test.get_name(), "Compilation");
      assert_eq!(test.get_points(), 2.0);

      let test = session.test_run(RunTest::new(vec![executable.to_string_lossy()]).expected("Hello, World!"))?;
      assert_eq!(test.get_points(), 1.0);
      Ok(())
    })
    .unwrap();

  assert_eq!(report.score(), 1.0);
  assert!(report.gradable());
}
