use std::{
  env,
  path::PathBuf,
};

use log::info;

/// What a failed compile or link turns into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildFailurePolicy {
  /// Abort the session and report it as ungradable
  Ungradable,
  /// Record a zero-point compilation test and keep grading
  ZeroPoints,
}

impl Default for BuildFailurePolicy {
  fn default() -> Self {
    BuildFailurePolicy::Ungradable
  }
}

/// Session wide settings, one per grading container
#[derive(Debug, Clone)]
pub struct GraderConfig {
  submission_dir: PathBuf,
  data_file: PathBuf,
  results_dir: PathBuf,
  grade_root: PathBuf,
  shim_dir: PathBuf,
  sandbox_user: Option<String>,
  compiler: String,
  build_failure: BuildFailurePolicy,
  prepare_workspace: bool,
}

impl Default for GraderConfig {
  fn default() -> Self {
    GraderConfig {
      submission_dir: PathBuf::from("/grade/student"),
      data_file: PathBuf::from("/grade/data/data.json"),
      results_dir: PathBuf::from("/grade/results"),
      grade_root: PathBuf::from("/grade"),
      shim_dir: PathBuf::from("/cgrader"),
      sandbox_user: Some("sbuser".to_string()),
      compiler: "gcc".to_string(),
      build_failure: BuildFailurePolicy::Ungradable,
      prepare_workspace: true,
    }
  }
}

impl GraderConfig {
  /// Defaults for a C++ submission
  pub fn cpp() -> Self {
    GraderConfig::default().compiler("g++")
  }

  /// Override paths and identity from `CATGRADER_*` environment variables
  pub fn from_env(mut self) -> Self {
    if let Ok(value) = env::var("CATGRADER_SUBMISSION_DIR") {
      self.submission_dir = value.into();
    }
    if let Ok(value) = env::var("CATGRADER_DATA_FILE") {
      self.data_file = value.into();
    }
    if let Ok(value) = env::var("CATGRADER_RESULTS_DIR") {
      self.results_dir = value.into();
    }
    if let Ok(value) = env::var("CATGRADER_GRADE_ROOT") {
      self.grade_root = value.into();
    }
    if let Ok(value) = env::var("CATGRADER_SHIM_DIR") {
      self.shim_dir = value.into();
    }
    if let Ok(value) = env::var("CATGRADER_SANDBOX_USER") {
      // An empty user runs everything as the grader itself
      self.sandbox_user = if value.is_empty() { None } else { Some(value) };
    }
    if let Ok(value) = env::var("CATGRADER_COMPILER") {
      self.compiler = value;
    }
    info!("Grader config: {:?}", self);
    self
  }

  pub fn submission_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
    self.submission_dir = path.into();
    self
  }

  pub fn data_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
    self.data_file = path.into();
    self
  }

  pub fn results_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
    self.results_dir = path.into();
    self
  }

  pub fn grade_root<P: Into<PathBuf>>(mut self, path: P) -> Self {
    self.grade_root = path.into();
    self
  }

  pub fn shim_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
    self.shim_dir = path.into();
    self
  }

  pub fn sandbox_user<S: Into<String>>(mut self, user: Option<S>) -> Self {
    self.sandbox_user = user.map(|u| u.into());
    self
  }

  pub fn compiler<S: Into<String>>(mut self, compiler: S) -> Self {
    self.compiler = compiler.into();
    self
  }

  pub fn build_failure(mut self, policy: BuildFailurePolicy) -> Self {
    self.build_failure = policy;
    self
  }

  /// Skip chdir, chmod and shim creation, used when grading outside the container
  pub fn prepare_workspace(mut self, flag: bool) -> Self {
    self.prepare_workspace = flag;
    self
  }

  pub fn get_submission_dir(&self) -> &PathBuf {
    &self.submission_dir
  }

  pub fn get_data_file(&self) -> &PathBuf {
    &self.data_file
  }

  pub fn get_results_dir(&self) -> &PathBuf {
    &self.results_dir
  }

  pub fn get_grade_root(&self) -> &PathBuf {
    &self.grade_root
  }

  pub fn get_shim_dir(&self) -> &PathBuf {
    &self.shim_dir
  }

  pub fn get_sandbox_user(&self) -> Option<&str> {
    self.sandbox_user.as_deref()
  }

  pub fn get_compiler(&self) -> &str {
    &self.compiler
  }

  pub fn get_build_failure(&self) -> BuildFailurePolicy {
    self.build_failure
  }

  pub fn get_prepare_workspace(&self) -> bool {
    self.prepare_workspace
  }
}
