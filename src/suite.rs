use std::{
  fs,
  io::ErrorKind,
  path::Path,
};

use log::{debug, info, warn};
use nix::unistd::{getgid, getuid};
use roxmltree::{Document, Node};

use crate::report::TestResult;
use crate::runner::{self, RunOptions, SandboxIdentity};
use crate::utils::permission::{change_mode, copy_with_backup, ModeChange};
use crate::GraderError;

pub const LOG_ENV: &str = "CK_XML_LOG_FILE_NAME";

pub const LOG_COPY: &str = "check_log.xml";

pub const MALLOC_DEBUG_LIBRARY: &str = "/lib/x86_64-linux-gnu/libc_malloc_debug.so";

/// Which parts of a case make up its test name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuiteNaming {
  suite_title: bool,
  case_name: bool,
  unit_test_id: bool,
  iteration: bool,
}

/// One `<test>` of a Check XML log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteCase {
  title: String,
  id: String,
  iteration: String,
  description: String,
  message: String,
  success: bool,
}

/// An externally built Check test binary to run and score
#[derive(Debug, Clone)]
pub struct SuiteRun {
  exec_file: String,
  args: Vec<String>,
  naming: SuiteNaming,
  sandboxed: bool,
  malloc_debug: bool,
  env: Vec<(String, String)>,
}

impl Default for SuiteNaming {
  /// Case description and id, e.g. `Core - test_money_create`
  fn default() -> Self {
    SuiteNaming {
      suite_title: false,
      case_name: true,
      unit_test_id: true,
      iteration: false,
    }
  }
}

impl SuiteNaming {
  pub fn suite_title(mut self, flag: bool) -> Self {
    self.suite_title = flag;
    self
  }

  pub fn case_name(mut self, flag: bool) -> Self {
    self.case_name = flag;
    self
  }

  pub fn unit_test_id(mut self, flag: bool) -> Self {
    self.unit_test_id = flag;
    self
  }

  pub fn iteration(mut self, flag: bool) -> Self {
    self.iteration = flag;
    self
  }

  /// `{title}: {case} - {id} (run N)`, a separator only shows up between two present parts
  pub fn format(&self, case: &SuiteCase) -> String {
    let title = if self.suite_title { case.title.as_str() } else { "" };
    let name = if self.case_name { case.description.as_str() } else { "" };
    let id = if self.unit_test_id { case.id.as_str() } else { "" };
    let sep1 = if self.suite_title && self.case_name { ": " } else { "" };
    let sep2 = if self.unit_test_id && (self.suite_title || self.case_name) {
      " - "
    } else {
      ""
    };
    let iteration = if self.iteration {
      format!(" (run {})", case.iteration)
    } else {
      String::new()
    };
    format!("{}{}{}{}{}{}", title, sep1, name, sep2, id, iteration)
  }
}

impl SuiteCase {
  pub fn title(&self) -> &str {
    &self.title
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn iteration(&self) -> &str {
    &self.iteration
  }

  pub fn description(&self) -> &str {
    &self.description
  }

  pub fn message(&self) -> &str {
    &self.message
  }

  pub fn success(&self) -> bool {
    self.success
  }

  /// One point, all or nothing, the case message as output
  pub fn into_test_result(self, naming: &SuiteNaming) -> TestResult {
    TestResult::new(naming.format(&self))
      .passed(self.success)
      .output(self.message)
  }
}

impl SuiteRun {
  pub fn new<S: Into<String>>(exec_file: S) -> Self {
    SuiteRun {
      exec_file: exec_file.into(),
      args: vec![],
      naming: SuiteNaming::default(),
      sandboxed: false,
      malloc_debug: false,
      env: vec![],
    }
  }

  pub fn args<S: Into<String>>(mut self, args: Vec<S>) -> Self {
    self.args.extend(args.into_iter().map(|a| a.into()));
    self
  }

  pub fn naming(mut self, naming: SuiteNaming) -> Self {
    self.naming = naming;
    self
  }

  pub fn sandboxed(mut self, flag: bool) -> Self {
    self.sandboxed = flag;
    self
  }

  /// Preload glibc's malloc debug library into the test binary
  pub fn malloc_debug(mut self, flag: bool) -> Self {
    self.malloc_debug = flag;
    self
  }

  pub fn env<KS: Into<String>, VS: Into<String>>(mut self, key: KS, value: VS) -> Self {
    self.env.push((key.into(), value.into()));
    self
  }

  pub fn get_exec_file(&self) -> &str {
    &self.exec_file
  }

  pub fn get_naming(&self) -> &SuiteNaming {
    &self.naming
  }

  pub fn get_sandboxed(&self) -> bool {
    self.sandboxed
  }

  /// Run the binary, keep a copy of its log in `results_dir` and turn every case into a test.
  ///
  /// `sandbox` is only used when the run is sandboxed.
  pub fn run(
    &self,
    sandbox: Option<&SandboxIdentity>,
    results_dir: &Path,
  ) -> Result<Vec<TestResult>, GraderError> {
    let log_dir = tempfile::Builder::new().prefix("catgrader-check").tempdir()?;
    let log_file = log_dir.path().join("tests.xml");

    let mut options = RunOptions::new(self.exec_file.clone(), self.args.clone())
      .env("TEMP", "/tmp")
      .env(LOG_ENV, log_file.to_string_lossy())
      .envs(
        self
          .env
          .iter()
          .filter(|(key, _)| key != "TEMP" && key != LOG_ENV)
          .cloned()
          .collect(),
      );

    let sandbox = if self.sandboxed { sandbox } else { None };
    match sandbox {
      Some(identity) => {
        change_mode(log_dir.path(), ModeChange::Set(0o777), false);
        options = options.sandbox(identity.clone());
      }
      None => {
        options = options
          .env("SANDBOX_UID", getuid().as_raw().to_string())
          .env("SANDBOX_GID", getgid().as_raw().to_string());
      }
    }
    if self.malloc_debug {
      options = options.env("LD_PRELOAD", MALLOC_DEBUG_LIBRARY);
    }

    info!("Run check suite {}", options.command_line());
    let output = runner::run_text(&options);
    info!("{}", output);

    if log_file.is_file() {
      fs::create_dir_all(results_dir)?;
      copy_with_backup(&log_file, results_dir.join(LOG_COPY))?;
    } else {
      warn!("Check log {} is missing", log_file.to_string_lossy());
    }

    let content = match fs::read(&log_file) {
      Ok(content) => String::from_utf8_lossy(&content).into_owned(),
      Err(err) if err.kind() == ErrorKind::NotFound => {
        return Err(GraderError::ungradable(
          "Test suite log file not found.",
          "Test suite log file not found. Consult the instructor.\n",
        ))
      }
      Err(err) => return Err(err.into()),
    };

    let cases = parse_check_log(&content)?;
    Ok(
      cases
        .into_iter()
        .map(|case| case.into_test_result(&self.naming))
        .collect(),
    )
  }
}

/// Read every `<suite>/<test>` of a Check XML log, whatever namespace it uses
pub fn parse_check_log(xml: &str) -> Result<Vec<SuiteCase>, GraderError> {
  let document = Document::parse(xml).map_err(|err| {
    GraderError::ungradable(
      "Error parsing test suite log.",
      format!("Error parsing test suite log.\n\n{}\n", err),
    )
  })?;

  let mut cases = vec![];
  for suite in elements(document.root_element(), "suite") {
    let title = child_text(suite, "title");
    for test in elements(suite, "test") {
      let case = SuiteCase {
        title: title.clone(),
        id: child_text(test, "id"),
        iteration: child_text(test, "iteration"),
        description: child_text(test, "description"),
        message: child_text(test, "message"),
        success: test.attribute("result") == Some("success"),
      };
      debug!("Check case {:?}", case);
      cases.push(case);
    }
  }
  Ok(cases)
}

fn elements<'a, 'input: 'a>(
  node: Node<'a, 'input>,
  name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
  node
    .children()
    .filter(move |child| child.is_element() && child.tag_name().name() == name)
}

/// Text of the first `name` child, empty when missing
fn child_text(node: Node, name: &str) -> String {
  elements(node, name)
    .next()
    .and_then(|child| child.text())
    .unwrap_or("")
    .to_string()
}
