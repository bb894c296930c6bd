use std::{
  fmt::Display,
  fs,
  path::{Path, PathBuf},
};

use log::{debug, error, info, warn};

use crate::config::BuildFailurePolicy;
use crate::runner::{self, RunOptions};
use crate::utils::permission::{absolute, change_mode, ModeChange};
use crate::utils::split_command;
use crate::validator;
use crate::GraderError;

pub use options::CompileOptions;

mod options;

/// Compile and link flags of an AddressSanitizer build
pub const ASAN_FLAGS: [&str; 4] = ["-fsanitize=address", "-static-libasan", "-g", "-O0"];

/// Steps of a build, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
  Compile,
  Validate,
  CompileAdded,
  Link,
}

/// One student translation unit and its object file.
///
/// The object path is only usable while the artifact is valid; invalidating
/// removes the file so no later step can pick it up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledArtifact {
  source: PathBuf,
  object: PathBuf,
  valid: bool,
}

/// What a build left behind
#[derive(Debug, Clone)]
pub struct BuildOutput {
  output: String,
  messages: String,
  artifacts: Vec<CompiledArtifact>,
  added_objects: Vec<PathBuf>,
  executable: Option<PathBuf>,
  requested_executable: bool,
  failed: Option<BuildStage>,
}

/// Drives compiler, validator and linker for one [`CompileOptions`]
pub struct BuildPipeline<'a> {
  compiler: String,
  policy: BuildFailurePolicy,
  options: &'a CompileOptions,
}

impl Display for BuildStage {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      BuildStage::Compile => f.write_str("compile"),
      BuildStage::Validate => f.write_str("validate"),
      BuildStage::CompileAdded => f.write_str("compile added units"),
      BuildStage::Link => f.write_str("link"),
    }
  }
}

impl CompiledArtifact {
  /// Valid when the compiler actually produced `object`
  pub fn new<SP: Into<PathBuf>, OP: Into<PathBuf>>(source: SP, object: OP) -> Self {
    let object = object.into();
    let valid = object.is_file();
    CompiledArtifact {
      source: source.into(),
      object,
      valid,
    }
  }

  pub fn source(&self) -> &PathBuf {
    &self.source
  }

  pub fn object(&self) -> &PathBuf {
    &self.object
  }

  pub fn is_valid(&self) -> bool {
    self.valid && self.object.is_file()
  }

  /// Delete the object file
  pub fn invalidate(&mut self) {
    self.valid = false;
    if let Err(err) = fs::remove_file(&self.object) {
      if self.object.exists() {
        error!("Remove {} fails: {}", self.object.to_string_lossy(), err);
      }
    }
  }
}

impl BuildOutput {
  /// Combined compiler, validator and linker output
  pub fn output(&self) -> &str {
    &self.output
  }

  /// Warning sections for the report message
  pub fn messages(&self) -> &str {
    &self.messages
  }

  pub fn artifacts(&self) -> &Vec<CompiledArtifact> {
    &self.artifacts
  }

  pub fn added_objects(&self) -> &Vec<PathBuf> {
    &self.added_objects
  }

  /// Student objects first, then the added ones
  pub fn objects(&self) -> Vec<PathBuf> {
    self
      .artifacts
      .iter()
      .map(|a| a.object.clone())
      .chain(self.added_objects.iter().cloned())
      .collect()
  }

  pub fn executable(&self) -> Option<&PathBuf> {
    self.executable.as_ref()
  }

  pub fn failed(&self) -> Option<BuildStage> {
    self.failed
  }

  /// The executable exists, or without one every object does
  pub fn success(&self) -> bool {
    if self.requested_executable {
      self.executable.as_ref().map_or(false, |e| e.is_file())
    } else {
      self.artifacts.iter().all(|a| a.is_valid())
        && self.added_objects.iter().all(|o| o.is_file())
    }
  }
}

impl<'a> BuildPipeline<'a> {
  pub fn new(
    default_compiler: &str,
    default_policy: BuildFailurePolicy,
    options: &'a CompileOptions,
  ) -> Self {
    BuildPipeline {
      compiler: options
        .get_compiler()
        .unwrap_or(default_compiler)
        .to_string(),
      policy: options.get_on_failure().unwrap_or(default_policy),
      options,
    }
  }

  pub fn compiler(&self) -> &str {
    &self.compiler
  }

  /// compile -> validate -> compile added -> link -> chmod
  pub fn run(&self) -> Result<BuildOutput, GraderError> {
    let cflags = self.compile_flags();
    let mut output = String::new();
    let mut failed = None;

    let mut artifacts = vec![];
    for source in self.options.get_sources() {
      let mut artifact = self.compile(source, &cflags, &mut output)?;
      if !artifact.is_valid() {
        failed.get_or_insert(BuildStage::Compile);
      } else {
        let findings = validator::validate(&mut artifact, self.options.get_reject_symbols());
        if !findings.is_empty() {
          output += &findings.diagnostic();
          failed.get_or_insert(BuildStage::Validate);
        } else if !self.options.get_objcopy_args().is_empty() {
          self.objcopy(&artifact);
        }
      }
      artifacts.push(artifact);
    }

    let mut added_objects = vec![];
    if artifacts.iter().all(|a| a.is_valid()) {
      for source in self.options.get_added() {
        let object = self.compile_added(source, &cflags, &mut output)?;
        if !object.is_file() {
          failed.get_or_insert(BuildStage::CompileAdded);
        }
        added_objects.push(object);
      }
    }

    let objects_ready = artifacts.iter().all(|a| a.is_valid())
      && added_objects.iter().all(|o| o.is_file());

    if !objects_ready && self.policy == BuildFailurePolicy::Ungradable {
      info!("Build stopped at {} stage", failed.unwrap_or(BuildStage::Compile));
      return Err(GraderError::ungradable(
        "Compilation errors",
        format!("Compilation errors, please fix and try again.\n\n{}\n", output),
      ));
    }

    let mut messages = String::new();
    if !output.is_empty() && self.options.get_warnings_in_message() {
      messages += &format!("Compilation warnings:\n\n{}\n", output);
    }

    let mut executable = None;
    if let Some(target) = self.options.get_executable() {
      if objects_ready {
        let student = artifacts
          .iter()
          .map(|a| a.object.clone())
          .collect::<Vec<PathBuf>>();
        let link_output = self.link(&student, &added_objects, target);
        output += &link_output;

        if target.is_file() {
          change_mode(target, ModeChange::Set(0o755), true);
          executable = Some(target.clone());
        } else {
          failed.get_or_insert(BuildStage::Link);
          if self.policy == BuildFailurePolicy::Ungradable {
            return Err(GraderError::ungradable(
              "Linker errors",
              format!(
                "{}Linker errors, please fix and try again.\n\n{}\n",
                messages, link_output
              ),
            ));
          }
        }

        if !link_output.is_empty() && self.options.get_warnings_in_message() {
          messages += &format!("Linker warnings:\n\n{}\n", link_output);
        }
      } else {
        debug!("Skip linking {}, objects are missing", target.to_string_lossy());
      }
    }

    if let Some(stage) = failed {
      warn!("Build failed at {} stage", stage);
    }

    Ok(BuildOutput {
      output,
      messages,
      artifacts,
      added_objects,
      executable,
      requested_executable: self.options.get_executable().is_some(),
      failed,
    })
  }

  /// Flags for every `-c` invocation
  pub fn compile_flags(&self) -> Vec<String> {
    let mut flags = self.options.get_flags().clone();
    if self.options.get_enable_asan() {
      flags.extend(ASAN_FLAGS.iter().map(|f| f.to_string()));
    }
    flags.extend(self.pkg_config("--cflags"));
    flags
  }

  /// Flags for the link invocation
  pub fn link_flags(&self, has_added: bool) -> Vec<String> {
    let mut flags = self.options.get_flags().clone();
    if self.options.get_enable_asan() {
      flags.extend(ASAN_FLAGS.iter().map(|f| f.to_string()));
    }
    if has_added {
      flags.push("-Wl,--allow-multiple-definition".to_string());
    }
    flags.extend(self.pkg_config("--libs"));
    flags
  }

  fn pkg_config(&self, mode: &str) -> Vec<String> {
    let packages = self.options.get_pkg_config();
    if packages.is_empty() {
      return vec![];
    }
    let options = RunOptions::new("pkg-config", vec![mode.to_string()]).arguments(packages.clone());
    split_command(&runner::run_text(&options))
  }

  fn compile(
    &self,
    source: &Path,
    cflags: &[String],
    output: &mut String,
  ) -> Result<CompiledArtifact, GraderError> {
    let object = object_path(source)?;
    remove_stale(&object);

    let mut arguments = vec![
      "-save-temps=obj".to_string(),
      "-c".to_string(),
      source.to_string_lossy().to_string(),
      "-o".to_string(),
      object.to_string_lossy().to_string(),
    ];
    arguments.extend(cflags.iter().cloned());

    info!(
      "Compile {} -> {}",
      source.to_string_lossy(),
      object.to_string_lossy()
    );
    *output += &runner::run_text(&RunOptions::new(self.compiler.clone(), arguments));

    Ok(CompiledArtifact::new(source, object))
  }

  fn compile_added(
    &self,
    source: &Path,
    cflags: &[String],
    output: &mut String,
  ) -> Result<PathBuf, GraderError> {
    let object = object_path(source)?;
    remove_stale(&object);

    let mut arguments = vec![
      "-c".to_string(),
      source.to_string_lossy().to_string(),
      "-o".to_string(),
      object.to_string_lossy().to_string(),
    ];
    arguments.extend(cflags.iter().cloned());

    info!(
      "Compile added unit {} -> {}",
      source.to_string_lossy(),
      object.to_string_lossy()
    );
    *output += &runner::run_text(&RunOptions::new(self.compiler.clone(), arguments));

    Ok(object)
  }

  fn objcopy(&self, artifact: &CompiledArtifact) {
    let options = RunOptions::new(
      "objcopy",
      vec![artifact.object.to_string_lossy().to_string()],
    )
    .arguments(self.options.get_objcopy_args().clone());
    let out = runner::run_text(&options);
    if !out.is_empty() {
      warn!("objcopy {}: {}", artifact.object.to_string_lossy(), out.trim_end());
    }
  }

  /// Added objects go first, their definitions override the student's
  fn link(&self, student: &[PathBuf], added: &[PathBuf], target: &Path) -> String {
    remove_stale(target);

    let mut arguments = vec![];
    arguments.extend(added.iter().map(|o| o.to_string_lossy().to_string()));
    arguments.extend(student.iter().map(|o| o.to_string_lossy().to_string()));
    arguments.push("-o".to_string());
    arguments.push(target.to_string_lossy().to_string());
    arguments.push("-lm".to_string());
    arguments.extend(self.link_flags(!added.is_empty()));

    info!("Link {}", target.to_string_lossy());
    runner::run_text(&RunOptions::new(self.compiler.clone(), arguments))
  }
}

/// `dir/foo.c` -> absolute `dir/foo.o`
pub fn object_path(source: &Path) -> Result<PathBuf, GraderError> {
  absolute(&source.with_extension("o"))
}

fn remove_stale(path: &Path) {
  if path.is_file() {
    debug!("Remove stale {}", path.to_string_lossy());
    if let Err(err) = fs::remove_file(path) {
      warn!("Remove {} fails: {}", path.to_string_lossy(), err);
    }
  }
}
