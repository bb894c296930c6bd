use std::{
  env,
  fmt::Display,
  fs,
  os::unix::fs::symlink,
  path::Path,
  time::Duration,
};

use log::{debug, error, info, warn};
use serde_json::Value;

use crate::build::{BuildOutput, BuildPipeline, CompileOptions};
use crate::config::GraderConfig;
use crate::matcher::{self, MatchConfig, Pattern, Quantifier};
use crate::report::{Report, TestResult};
use crate::runner::{self, RunOptions, SandboxIdentity};
use crate::suite::SuiteRun;
use crate::utils::permission::{self, change_mode_recursive, ModeChange};
use crate::utils::split_command;
use crate::GraderError;

pub const MANUAL_GRADING_NAME: &str = "Manual Grading - to be reviewed by a human grader";

pub const MANUAL_GRADING_DESCRIPTION: &str = "This code will be manually reviewed by a human grader. The points associated to this component will be added based on evaluation of code style, programming practices and other manully checked criteria.";

const PAUSE_SHIM: &str = "#! /bin/sh\n";

/// One run of the submission whose output is matched against patterns
#[derive(Debug, Clone)]
pub struct RunTest {
  command: Vec<String>,
  command_line: Option<String>,
  args: Option<Vec<String>>,
  input: Option<String>,
  expected: Vec<Pattern>,
  rejected: Vec<Pattern>,
  matching: MatchConfig,
  timeout: Option<Duration>,
  max_points: f64,
  name: Option<String>,
  field: Option<String>,
}

/// Grading state of one submission: config, question data and the report being built
pub struct Session {
  config: GraderConfig,
  data: Value,
  path: String,
  report: Report,
}

impl RunTest {
  /// First element is the program
  pub fn new<S: Into<String>>(argv: Vec<S>) -> Self {
    RunTest {
      command: argv.into_iter().map(|a| a.into()).collect(),
      command_line: None,
      args: None,
      input: None,
      expected: vec![],
      rejected: vec![],
      matching: MatchConfig::default(),
      timeout: Some(Duration::from_secs(1)),
      max_points: 1.0,
      name: None,
      field: None,
    }
  }

  /// Whitespace separated command line, e.g. `"./main -v"`
  pub fn command_line(command: &str) -> Self {
    let mut test = RunTest::new(split_command(command));
    test.command_line = Some(command.to_string());
    test
  }

  /// Extra arguments, each stringified
  pub fn args<T: Display>(mut self, args: Vec<T>) -> Self {
    self
      .args
      .get_or_insert_with(Vec::new)
      .extend(args.iter().map(|a| a.to_string()));
    self
  }

  pub fn arg<T: Display>(self, arg: T) -> Self {
    self.args(vec![arg])
  }

  pub fn input<S: ToString>(mut self, input: S) -> Self {
    self.input = Some(input.to_string());
    self
  }

  pub fn expected<P: Into<Pattern>>(mut self, pattern: P) -> Self {
    self.expected.push(pattern.into());
    self
  }

  pub fn expected_list<P: Into<Pattern>>(mut self, patterns: Vec<P>) -> Self {
    self.expected.extend(patterns.into_iter().map(|p| p.into()));
    self
  }

  pub fn rejected<P: Into<Pattern>>(mut self, pattern: P) -> Self {
    self.rejected.push(pattern.into());
    self
  }

  pub fn rejected_list<P: Into<Pattern>>(mut self, patterns: Vec<P>) -> Self {
    self.rejected.extend(patterns.into_iter().map(|p| p.into()));
    self
  }

  pub fn matching(mut self, config: MatchConfig) -> Self {
    self.matching = config;
    self
  }

  pub fn quantifier(mut self, quantifier: Quantifier) -> Self {
    self.matching = self.matching.quantifier(quantifier);
    self
  }

  /// Default 1 second, `None` waits forever and disables the timeout check
  pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
    self.timeout = timeout;
    self
  }

  pub fn max_points(mut self, max_points: f64) -> Self {
    self.max_points = max_points;
    self
  }

  pub fn name<S: Into<String>>(mut self, name: S) -> Self {
    self.name = Some(name.into());
    self
  }

  pub fn field<S: Into<String>>(mut self, field: S) -> Self {
    self.field = Some(field.into());
    self
  }

  /// The given name, else one derived from the input, arguments or command
  pub fn display_name(&self) -> String {
    if let Some(name) = &self.name {
      name.clone()
    } else if let Some(input) = &self.input {
      format!(
        "Test with input \"{}\"",
        input.lines().collect::<Vec<&str>>().join(" ")
      )
    } else if let Some(args) = &self.args {
      format!("Test with arguments \"{}\"", args.join(" "))
    } else if let Some(command) = &self.command_line {
      format!("Test command: {}", command)
    } else {
      format!(
        "Test command: {}",
        self.command.first().map(|c| c.as_str()).unwrap_or("")
      )
    }
  }
}

impl Session {
  /// Load the question data and open an empty report
  pub fn start(config: GraderConfig) -> Result<Session, GraderError> {
    let data_file = config.get_data_file();
    let content = fs::read_to_string(data_file).map_err(|err| {
      GraderError::config(format!(
        "Read data file {} fails: {}",
        data_file.to_string_lossy(),
        err
      ))
    })?;
    let data = serde_json::from_str(&content)?;

    let path = format!(
      "{}:{}",
      config.get_shim_dir().to_string_lossy(),
      env::var("PATH").unwrap_or_default()
    );
    info!("Start grading {}", config.get_submission_dir().to_string_lossy());

    Ok(Session {
      config,
      data,
      path,
      report: Report::new(),
    })
  }

  /// Question data from the data file
  pub fn data(&self) -> &Value {
    &self.data
  }

  pub fn config(&self) -> &GraderConfig {
    &self.config
  }

  pub fn report(&self) -> &Report {
    &self.report
  }

  pub fn report_mut(&mut self) -> &mut Report {
    &mut self.report
  }

  /// `None` when no sandbox user is configured
  pub fn sandbox(&self) -> Option<SandboxIdentity> {
    self
      .config
      .get_sandbox_user()
      .map(|user| SandboxIdentity::new(user, self.path.clone()))
  }

  /// Run a command and return its merged output, never fails
  pub fn run_command(&self, options: RunOptions, sandboxed: bool) -> String {
    let options = if sandboxed {
      options.set_sandbox(self.sandbox())
    } else {
      options
    };
    runner::run_text(&options)
  }

  /// Build and report the warnings, compile or link errors may end the session
  pub fn compile_file(&mut self, options: &CompileOptions) -> Result<BuildOutput, GraderError> {
    let pipeline = BuildPipeline::new(
      self.config.get_compiler(),
      self.config.get_build_failure(),
      options,
    );
    let output = pipeline.run()?;
    self.report.append_message(output.messages());
    Ok(output)
  }

  /// Build and record a compilation test worth `options.points`
  pub fn test_compile_file(&mut self, options: &CompileOptions) -> Result<TestResult, GraderError> {
    let output = self.compile_file(options)?;
    let points = if output.success() {
      options.get_points()
    } else {
      0.0
    };
    let test = TestResult::new(options.get_name())
      .max_points(options.get_points())
      .points(points)
      .output(output.output());
    Ok(self.add_test_result(test, options.get_field()))
  }

  /// Run the submission sandboxed and score its output
  pub fn test_run(&mut self, test: RunTest) -> Result<TestResult, GraderError> {
    let name = test.display_name();
    let expected = test.matching.compile(&test.expected)?;
    let rejected = test.matching.compile(&test.rejected)?;

    let options = RunOptions::from_argv(test.command.clone())
      .arguments(test.args.clone().unwrap_or_default())
      .set_input(test.input.clone())
      .set_timeout(test.timeout)
      .set_sandbox(self.sandbox());
    debug!("{}: {}", name, options.command_line());
    let text = runner::run_text(&options);

    let config = test.matching.clone().detect_timeout(test.timeout.is_some());
    let outcome = matcher::score(&text, &expected, &rejected, &config);

    let result = TestResult::new(name)
      .max_points(test.max_points)
      .points(test.max_points * outcome.fraction())
      .message(outcome.message())
      .output(outcome.display());
    Ok(self.add_test_result(result, test.field.as_deref()))
  }

  /// Run a Check test binary and add one test per case
  pub fn run_check_suite(&mut self, suite: SuiteRun) -> Result<(), GraderError> {
    let sandbox = self.sandbox();
    let results = suite.run(sandbox.as_ref(), self.config.get_results_dir())?;
    for result in results {
      self.add_test_result(result, None);
    }
    Ok(())
  }

  pub fn add_test_result(&mut self, test: TestResult, field: Option<&str>) -> TestResult {
    self.report.add_test(test, field).clone()
  }

  /// Placeholder worth `points`, none awarded until a human grades it
  pub fn add_manual_grading(
    &mut self,
    points: f64,
    name: Option<&str>,
    description: Option<&str>,
  ) -> TestResult {
    let test = TestResult::new(name.unwrap_or(MANUAL_GRADING_NAME))
      .description(description.unwrap_or(MANUAL_GRADING_DESCRIPTION))
      .max_points(points)
      .points(0.0);
    self.add_test_result(test, None)
  }

  /// See [`permission::change_mode`]
  pub fn change_mode<P: AsRef<Path>>(&self, file: P, mode: ModeChange, change_parent: bool) {
    permission::change_mode(file, mode, change_parent);
  }

  /// Prepare the workspace, run `tests` and save the report.
  ///
  /// An ungradable error ends the tests early and marks the report; any other
  /// error is returned once the report is saved.
  pub fn run<F>(mut self, tests: F) -> Result<Report, GraderError>
  where
    F: FnOnce(&mut Session) -> Result<(), GraderError>,
  {
    let outcome = match self.prepare_workspace() {
      Ok(()) => tests(&mut self),
      Err(err) => Err(err),
    };

    let failure = match outcome {
      Ok(()) => None,
      Err(GraderError::Ungradable { reason, diagnostic }) => {
        error!("Submission is ungradable: {}", reason);
        self.report.mark_ungradable(&diagnostic);
        None
      }
      Err(err) => {
        error!("Grading fails: {}", err);
        Some(err)
      }
    };

    let results_dir = self.config.get_results_dir().clone();
    let report = self.report.save(&results_dir)?;

    match failure {
      Some(err) => Err(err),
      None => Ok(report),
    }
  }

  fn prepare_workspace(&self) -> Result<(), GraderError> {
    if !self.config.get_prepare_workspace() {
      return Ok(());
    }

    env::set_current_dir(self.config.get_submission_dir())?;

    let grade_root = self.config.get_grade_root();
    if let Err(err) = change_mode_recursive(grade_root, 0o700) {
      warn!("chmod -R 700 {} fails: {}", grade_root.to_string_lossy(), err);
    }

    // Submissions calling system("PAUSE") should not fail
    let shim_dir = self.config.get_shim_dir();
    fs::create_dir_all(shim_dir)?;
    let pause = shim_dir.join("PAUSE");
    fs::write(&pause, PAUSE_SHIM)?;
    permission::change_mode(&pause, ModeChange::Set(0o755), true);
    for alias in ["pause", "Pause"] {
      if let Err(err) = symlink(&pause, shim_dir.join(alias)) {
        debug!("Link {} fails: {}", alias, err);
      }
    }
    Ok(())
  }
}
