use std::{
  collections::{BTreeSet, HashSet},
  fs,
  path::{Path, PathBuf},
};

use lazy_static::lazy_static;
use log::{debug, info, warn};

use crate::build::CompiledArtifact;
use crate::runner::{self, RunOptions};

lazy_static! {
  /// Sanitizer runtime hooks a submission could define or call to silence instrumentation
  pub static ref INVALID_SYMBOLS: HashSet<&'static str> = {
    let mut set = HashSet::new();
    set.insert("__asan_default_options");
    set.insert("__asan_on_error");
    set.insert("__asan_malloc_hook");
    set.insert("__asan_free_hook");
    set.insert("__asan_unpoison_memory_region");
    set.insert("__asan_set_error_exit_code");
    set.insert("__asan_set_death_callback");
    set.insert("__asan_set_error_report_callback");
    set.insert("__msan_default_options");
    set.insert("__msan_malloc_hook");
    set.insert("__msan_free_hook");
    set.insert("__msan_unpoison");
    set.insert("__msan_unpoison_string");
    set.insert("__msan_set_exit_code");
    set.insert("__lsan_is_turned_off");
    set.insert("__lsan_default_suppressions");
    set.insert("__lsan_do_leak_check");
    set.insert("__lsan_disable");
    set.insert("__lsan_enable");
    set.insert("__lsan_ignore_object");
    set.insert("__lsan_register_root_region");
    set.insert("__lsan_unregister_root_region");
    set.insert("__sanitizer_set_death_callback");
    set.insert("__sanitizer_set_report_path");
    set.insert("__sanitizer_sandbox_on_notify");
    set
  };

  /// Attributes that switch sanitizer instrumentation off for a function
  pub static ref INVALID_PRIMITIVES: HashSet<&'static str> = {
    let mut set = HashSet::new();
    set.insert("no_sanitize");
    set.insert("disable_sanitizer_instrumentation");
    set
  };
}

const PREPROCESSED_EXTENSIONS: [&str; 3] = ["i", "ii", "mi"];

/// Forbidden things found in one translation unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Findings {
  primitives: Vec<String>,
  symbols: Vec<String>,
}

impl Findings {
  pub fn is_empty(&self) -> bool {
    self.primitives.is_empty() && self.symbols.is_empty()
  }

  pub fn primitives(&self) -> &Vec<String> {
    &self.primitives
  }

  pub fn symbols(&self) -> &Vec<String> {
    &self.symbols
  }

  /// Red highlighted text for the compiler output section
  pub fn diagnostic(&self) -> String {
    let mut text = String::new();
    if !self.primitives.is_empty() {
      text += &format!(
        "\n\x1b[31mThe following unauthorized primitives were found in the submitted code:\n\t{}\x1b[0m",
        self.primitives.join(", ")
      );
    }
    if !self.symbols.is_empty() {
      text += &format!(
        "\n\x1b[31mThe following unauthorized function(s) and/or variable(s) were found in the submitted code:\n\t{}\x1b[0m",
        self.symbols.join(", ")
      );
    }
    text
  }
}

/// Directives found in macro-expanded source text
pub fn find_primitives(preprocessed: &str) -> Vec<String> {
  let found = INVALID_PRIMITIVES
    .iter()
    .filter(|p| preprocessed.contains(*p))
    .map(|p| p.to_string())
    .collect::<BTreeSet<String>>();
  found.into_iter().collect()
}

/// Deny-listed or caller-rejected names among an object's global symbols
pub fn find_symbols<S: AsRef<str>>(symbols: &[S], reject_symbols: &[String]) -> Vec<String> {
  let found = symbols
    .iter()
    .map(|s| s.as_ref().trim())
    .filter(|s| INVALID_SYMBOLS.contains(s) || reject_symbols.iter().any(|r| r == s))
    .map(|s| s.to_string())
    .collect::<BTreeSet<String>>();
  found.into_iter().collect()
}

/// Defined and referenced global symbols, one per line of `nm -j`
pub fn list_symbols(object: &Path) -> Vec<String> {
  let options = RunOptions::new("nm", vec!["-j".to_string(), object.to_string_lossy().to_string()]);
  runner::run_text(&options)
    .lines()
    .map(|line| line.trim().to_string())
    .filter(|line| !line.is_empty())
    .collect()
}

/// The `-save-temps` output next to `source`
pub fn preprocessed_source(source: &Path) -> Option<PathBuf> {
  PREPROCESSED_EXTENSIONS
    .iter()
    .map(|ext| source.with_extension(ext))
    .find(|path| path.is_file())
}

/// Check a freshly compiled unit, deleting its object on any finding
pub fn validate(artifact: &mut CompiledArtifact, reject_symbols: &[String]) -> Findings {
  if !artifact.is_valid() {
    return Findings::default();
  }

  let primitives = match preprocessed_source(artifact.source()) {
    Some(path) => match fs::read(&path) {
      Ok(bytes) => find_primitives(&String::from_utf8_lossy(&bytes)),
      Err(err) => {
        warn!("Read {} fails: {}", path.to_string_lossy(), err);
        vec![]
      }
    },
    None => {
      debug!(
        "No preprocessed text for {}",
        artifact.source().to_string_lossy()
      );
      vec![]
    }
  };

  let symbols = find_symbols(&list_symbols(artifact.object()), reject_symbols);

  let findings = Findings {
    primitives,
    symbols,
  };
  if !findings.is_empty() {
    info!(
      "Reject {}: primitives {:?}, symbols {:?}",
      artifact.source().to_string_lossy(),
      findings.primitives,
      findings.symbols
    );
    artifact.invalidate();
  }
  findings
}
