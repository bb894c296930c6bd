use std::{
  collections::BTreeMap,
  fs::{self, File},
  io::{BufWriter, Write},
  path::Path,
};

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::GraderError;

pub const RESULTS_FILE: &str = "results.json";

/// Image attached to a test record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Image {
  Path(String),
  Labeled(BTreeMap<String, String>),
}

/// One graded item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
  name: String,
  description: String,
  points: f64,
  max_points: f64,
  output: String,
  message: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  images: Option<Vec<Image>>,
}

/// Subtotal of one rubric field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldScore {
  points: f64,
  max_points: f64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  score: Option<f64>,
}

/// The whole grading verdict, written once as `results.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
  score: f64,
  points: f64,
  max_points: f64,
  output: String,
  message: String,
  gradable: bool,
  tests: Vec<TestResult>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  partial_scores: BTreeMap<String, FieldScore>,
}

impl TestResult {
  /// Worth one point, none earned yet
  pub fn new<S: Into<String>>(name: S) -> Self {
    TestResult {
      name: name.into(),
      description: String::new(),
      points: 0.0,
      max_points: 1.0,
      output: String::new(),
      message: String::new(),
      images: None,
    }
  }

  pub fn description<S: Into<String>>(mut self, description: S) -> Self {
    self.description = description.into();
    self
  }

  pub fn points(mut self, points: f64) -> Self {
    self.points = points;
    self
  }

  /// All or nothing
  pub fn passed(mut self, flag: bool) -> Self {
    self.points = if flag { self.max_points } else { 0.0 };
    self
  }

  pub fn max_points(mut self, max_points: f64) -> Self {
    self.max_points = max_points;
    self
  }

  pub fn output<S: Into<String>>(mut self, output: S) -> Self {
    self.output = output.into();
    self
  }

  pub fn message<S: Into<String>>(mut self, message: S) -> Self {
    self.message = message.into();
    self
  }

  pub fn image(mut self, image: Image) -> Self {
    self.images.get_or_insert_with(Vec::new).push(image);
    self
  }

  pub fn get_name(&self) -> &str {
    &self.name
  }

  pub fn get_description(&self) -> &str {
    &self.description
  }

  pub fn get_points(&self) -> f64 {
    self.points
  }

  pub fn get_max_points(&self) -> f64 {
    self.max_points
  }

  pub fn get_output(&self) -> &str {
    &self.output
  }

  pub fn get_message(&self) -> &str {
    &self.message
  }

  pub fn get_images(&self) -> Option<&Vec<Image>> {
    self.images.as_ref()
  }

  /// Keep `0 <= points <= max_points`
  fn clamp(&mut self) {
    if !(self.max_points >= 0.0) {
      warn!("Test {} has max_points {}, using 0", self.name, self.max_points);
      self.max_points = 0.0;
    }
    if !(self.points >= 0.0 && self.points <= self.max_points) {
      let points = if self.points.is_nan() {
        0.0
      } else {
        self.points.clamp(0.0, self.max_points)
      };
      warn!(
        "Test {} has points {} outside [0, {}], using {}",
        self.name, self.points, self.max_points, points
      );
      self.points = points;
    }
  }
}

impl FieldScore {
  pub fn points(&self) -> f64 {
    self.points
  }

  pub fn max_points(&self) -> f64 {
    self.max_points
  }

  /// Set by [`Report::finalize`] when `max_points > 0`
  pub fn score(&self) -> Option<f64> {
    self.score
  }
}

impl Default for Report {
  fn default() -> Self {
    Report::new()
  }
}

impl Report {
  pub fn new() -> Self {
    Report {
      score: 0.0,
      points: 0.0,
      max_points: 0.0,
      output: String::new(),
      message: String::new(),
      gradable: true,
      tests: vec![],
      partial_scores: BTreeMap::new(),
    }
  }

  /// Append a test and add it to the totals and, when given, to `field`'s subtotal
  pub fn add_test(&mut self, mut test: TestResult, field: Option<&str>) -> &TestResult {
    test.clamp();

    self.points += test.points;
    self.max_points += test.max_points;

    if let Some(field) = field {
      let subtotal = self
        .partial_scores
        .entry(field.to_string())
        .or_insert(FieldScore {
          points: 0.0,
          max_points: 0.0,
          score: None,
        });
      subtotal.points += test.points;
      subtotal.max_points += test.max_points;
    }

    info!(
      "Test {}: {} / {}{}",
      test.name,
      test.points,
      test.max_points,
      field.map(|f| format!(" ({})", f)).unwrap_or_default()
    );

    self.tests.push(test);
    &self.tests[self.tests.len() - 1]
  }

  pub fn append_message(&mut self, text: &str) {
    self.message.push_str(text);
  }

  pub fn append_output(&mut self, text: &str) {
    self.output.push_str(text);
  }

  /// No verdict can be produced, keep whatever was graded so far
  pub fn mark_ungradable(&mut self, diagnostic: &str) {
    self.gradable = false;
    self.append_message(diagnostic);
  }

  /// Derive overall and per-field scores from the totals
  pub fn finalize(&mut self) {
    if self.max_points > 0.0 {
      self.score = self.points / self.max_points;
    }
    for subtotal in self.partial_scores.values_mut() {
      if subtotal.max_points > 0.0 {
        subtotal.score = Some(subtotal.points / subtotal.max_points);
      }
    }
  }

  /// Finalize and write `<results_dir>/results.json`
  pub fn save<P: AsRef<Path>>(mut self, results_dir: P) -> Result<Report, GraderError> {
    self.finalize();

    let results_dir = results_dir.as_ref();
    fs::create_dir_all(results_dir)?;
    let path = results_dir.join(RESULTS_FILE);
    let file = File::create(&path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, &self)?;
    writer.flush()?;

    info!("Save results to {}", path.to_string_lossy());
    self.report_human();
    Ok(self)
  }

  pub fn report_json(&self) -> Result<String, GraderError> {
    Ok(serde_json::to_string(self)?)
  }

  /// Summary lines in the grading log
  pub fn report_human(&self) {
    info!(
      "Score {:.4} ({} / {}), gradable: {}",
      self.score, self.points, self.max_points, self.gradable
    );
    for (field, subtotal) in self.partial_scores.iter() {
      info!(
        "  {}: {} / {} ({})",
        field,
        subtotal.points,
        subtotal.max_points,
        subtotal
          .score
          .map(|s| format!("{:.4}", s))
          .unwrap_or("-".to_string())
      );
    }
  }

  pub fn score(&self) -> f64 {
    self.score
  }

  pub fn points(&self) -> f64 {
    self.points
  }

  pub fn max_points(&self) -> f64 {
    self.max_points
  }

  pub fn output(&self) -> &str {
    &self.output
  }

  pub fn message(&self) -> &str {
    &self.message
  }

  pub fn gradable(&self) -> bool {
    self.gradable
  }

  pub fn tests(&self) -> &Vec<TestResult> {
    &self.tests
  }

  pub fn partial_scores(&self) -> &BTreeMap<String, FieldScore> {
    &self.partial_scores
  }
}
