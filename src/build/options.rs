use std::path::PathBuf;

use crate::config::BuildFailurePolicy;
use crate::utils::split_command;

/// Everything one compile (and optional link) of a submission needs
#[derive(Debug, Clone)]
pub struct CompileOptions {
  sources: Vec<PathBuf>,
  executable: Option<PathBuf>,
  added: Vec<PathBuf>,
  compiler: Option<String>,
  flags: Vec<String>,
  pkg_config: Vec<String>,
  warnings_in_message: bool,
  on_failure: Option<BuildFailurePolicy>,
  enable_asan: bool,
  reject_symbols: Vec<String>,
  objcopy_args: Vec<String>,
  name: String,
  points: f64,
  field: Option<String>,
}

impl CompileOptions {
  pub fn new<P: Into<PathBuf>>(sources: Vec<P>) -> Self {
    CompileOptions {
      sources: sources.into_iter().map(|s| s.into()).collect(),
      executable: None,
      added: vec![],
      compiler: None,
      flags: vec![],
      pkg_config: vec![],
      warnings_in_message: true,
      on_failure: None,
      enable_asan: false,
      reject_symbols: vec![],
      objcopy_args: vec![],
      name: "Compilation".to_string(),
      points: 1.0,
      field: None,
    }
  }

  pub fn single<P: Into<PathBuf>>(source: P) -> Self {
    CompileOptions::new(vec![source])
  }

  /// Link the objects into this executable
  pub fn executable<P: Into<PathBuf>>(mut self, path: P) -> Self {
    self.executable = Some(path.into());
    self
  }

  /// Grader-provided unit, linked before the student objects
  pub fn added<P: Into<PathBuf>>(mut self, path: P) -> Self {
    self.added.push(path.into());
    self
  }

  /// Same as [`CompileOptions::added`], kept for old question code
  pub fn main_file<P: Into<PathBuf>>(self, path: P) -> Self {
    self.added(path)
  }

  /// Use another compiler than the session's
  pub fn compiler<S: Into<String>>(mut self, compiler: S) -> Self {
    self.compiler = Some(compiler.into());
    self
  }

  pub fn flags<S: Into<String>>(mut self, flags: Vec<S>) -> Self {
    self.flags.extend(flags.into_iter().map(|f| f.into()));
    self
  }

  /// Whitespace separated flags, e.g. `"-Wall -std=c11"`
  pub fn parse_flags(mut self, flags: &str) -> Self {
    self.flags.extend(split_command(flags));
    self
  }

  /// Packages resolved through `pkg-config`
  pub fn pkg_config<S: Into<String>>(mut self, packages: Vec<S>) -> Self {
    self
      .pkg_config
      .extend(packages.into_iter().map(|p| p.into()));
    self
  }

  /// Add compiler and linker warnings to the report message (default on)
  pub fn warnings_in_message(mut self, flag: bool) -> Self {
    self.warnings_in_message = flag;
    self
  }

  pub fn on_failure(mut self, policy: BuildFailurePolicy) -> Self {
    self.on_failure = Some(policy);
    self
  }

  /// AddressSanitizer build
  pub fn enable_asan(mut self, flag: bool) -> Self {
    self.enable_asan = flag;
    self
  }

  /// Extra symbols the submission may not define or use
  pub fn reject_symbols<S: Into<String>>(mut self, symbols: Vec<S>) -> Self {
    self
      .reject_symbols
      .extend(symbols.into_iter().map(|s| s.into()));
    self
  }

  /// Run `objcopy <object> <args>` on every accepted student object
  pub fn objcopy_args<S: Into<String>>(mut self, args: Vec<S>) -> Self {
    self
      .objcopy_args
      .extend(args.into_iter().map(|a| a.into()));
    self
  }

  /// Test name (default `Compilation`)
  pub fn name<S: Into<String>>(mut self, name: S) -> Self {
    self.name = name.into();
    self
  }

  pub fn points(mut self, points: f64) -> Self {
    self.points = points;
    self
  }

  pub fn field<S: Into<String>>(mut self, field: S) -> Self {
    self.field = Some(field.into());
    self
  }

  pub fn get_sources(&self) -> &Vec<PathBuf> {
    &self.sources
  }

  pub fn get_executable(&self) -> Option<&PathBuf> {
    self.executable.as_ref()
  }

  pub fn get_added(&self) -> &Vec<PathBuf> {
    &self.added
  }

  pub fn get_compiler(&self) -> Option<&str> {
    self.compiler.as_deref()
  }

  pub fn get_flags(&self) -> &Vec<String> {
    &self.flags
  }

  pub fn get_pkg_config(&self) -> &Vec<String> {
    &self.pkg_config
  }

  pub fn get_warnings_in_message(&self) -> bool {
    self.warnings_in_message
  }

  pub fn get_on_failure(&self) -> Option<BuildFailurePolicy> {
    self.on_failure
  }

  pub fn get_enable_asan(&self) -> bool {
    self.enable_asan
  }

  pub fn get_reject_symbols(&self) -> &Vec<String> {
    &self.reject_symbols
  }

  pub fn get_objcopy_args(&self) -> &Vec<String> {
    &self.objcopy_args
  }

  pub fn get_name(&self) -> &str {
    &self.name
  }

  pub fn get_points(&self) -> f64 {
    self.points
  }

  pub fn get_field(&self) -> Option<&str> {
    self.field.as_deref()
  }
}
