use std::str::FromStr;

use log::debug;

use crate::GraderError;

pub use pattern::{Pattern, PatternSpec};

mod pattern;

/// Any captured text containing this scores zero when a time limit was set
pub const TIMEOUT_MARKER: &str = "TIMEOUT";

pub const NO_OUTPUT: &str = "(NO OUTPUT)";

pub const NO_ENDING_LINE_BREAK: &str = "\n(NO ENDING LINE BREAK)";

pub const TRUNCATED: &str = "\nTRUNCATED: Output too long.";

/// How many expected patterns must match for credit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
  All,
  Any,
  /// Credit proportional to the matched share
  Partial,
}

/// Why an output scored zero before the expected patterns were looked at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disqualification {
  Timeout,
  SizeLimit,
  Rejected,
}

/// Match settings for one test
#[derive(Debug, Clone)]
pub struct MatchConfig {
  quantifier: Quantifier,
  ignore_case: bool,
  collapse_whitespace: bool,
  size_limit: Option<usize>,
  highlight_matches: bool,
  message: Option<String>,
  detect_timeout: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
  fraction: f64,
  message: String,
  display: String,
  disqualified: Option<Disqualification>,
}

impl Default for Quantifier {
  fn default() -> Self {
    Quantifier::Any
  }
}

impl From<bool> for Quantifier {
  /// `true` means every pattern must match
  fn from(all: bool) -> Self {
    if all {
      Quantifier::All
    } else {
      Quantifier::Any
    }
  }
}

impl FromStr for Quantifier {
  type Err = GraderError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "all" => Ok(Quantifier::All),
      "any" => Ok(Quantifier::Any),
      "partial" => Ok(Quantifier::Partial),
      _ => Err(GraderError::config(format!("Unknown quantifier {}", s))),
    }
  }
}

impl Default for MatchConfig {
  /// any, case-insensitive, collapsed whitespace, 10240 characters, no highlight
  fn default() -> Self {
    MatchConfig {
      quantifier: Quantifier::Any,
      ignore_case: true,
      collapse_whitespace: true,
      size_limit: Some(10240),
      highlight_matches: false,
      message: None,
      detect_timeout: true,
    }
  }
}

impl MatchConfig {
  pub fn quantifier(mut self, quantifier: Quantifier) -> Self {
    self.quantifier = quantifier;
    self
  }

  pub fn ignore_case(mut self, flag: bool) -> Self {
    self.ignore_case = flag;
    self
  }

  pub fn collapse_whitespace(mut self, flag: bool) -> Self {
    self.collapse_whitespace = flag;
    self
  }

  /// Outputs longer than this many characters score zero, `None` disables the check
  pub fn size_limit(mut self, limit: Option<usize>) -> Self {
    self.size_limit = limit;
    self
  }

  pub fn highlight_matches(mut self, flag: bool) -> Self {
    self.highlight_matches = flag;
    self
  }

  /// Replace the synthesized "Expected ..." message
  pub fn message<S: Into<String>>(mut self, message: S) -> Self {
    self.message = Some(message.into());
    self
  }

  pub fn detect_timeout(mut self, flag: bool) -> Self {
    self.detect_timeout = flag;
    self
  }

  pub fn get_quantifier(&self) -> Quantifier {
    self.quantifier
  }

  pub fn get_ignore_case(&self) -> bool {
    self.ignore_case
  }

  pub fn get_collapse_whitespace(&self) -> bool {
    self.collapse_whitespace
  }

  pub fn get_size_limit(&self) -> Option<usize> {
    self.size_limit
  }

  pub fn get_highlight_matches(&self) -> bool {
    self.highlight_matches
  }

  pub fn get_detect_timeout(&self) -> bool {
    self.detect_timeout
  }

  pub fn compile(&self, patterns: &[Pattern]) -> Result<Vec<PatternSpec>, GraderError> {
    patterns
      .iter()
      .map(|p| PatternSpec::compile(p, self.ignore_case, self.collapse_whitespace))
      .collect()
  }
}

impl MatchOutcome {
  /// Share of the test's points earned, in `[0, 1]`
  pub fn fraction(&self) -> f64 {
    self.fraction
  }

  pub fn message(&self) -> &str {
    &self.message
  }

  /// Output as shown to the submitter, with markers and highlights
  pub fn display(&self) -> &str {
    &self.display
  }

  pub fn disqualified(&self) -> Option<Disqualification> {
    self.disqualified
  }
}

/// Compile the patterns and score `text` against them
pub fn match_output(
  text: &str,
  expected: &[Pattern],
  rejected: &[Pattern],
  config: &MatchConfig,
) -> Result<MatchOutcome, GraderError> {
  let expected = config.compile(expected)?;
  let rejected = config.compile(rejected)?;
  Ok(score(text, &expected, &rejected, config))
}

/// Score `text` against compiled patterns
pub fn score(
  text: &str,
  expected: &[PatternSpec],
  rejected: &[PatternSpec],
  config: &MatchConfig,
) -> MatchOutcome {
  let mut display = text.to_string();
  if config.highlight_matches && !text.is_empty() {
    for pattern in expected {
      display = pattern
        .regex()
        .replace_all(&display, "\x1b[32m${0}\x1b[0m")
        .into_owned();
    }
    for pattern in rejected {
      display = pattern
        .regex()
        .replace_all(&display, "\x1b[31m${0}\x1b[0m")
        .into_owned();
    }
  }
  let mut display = render_output(display);

  let message = match &config.message {
    Some(message) => message.clone(),
    None => describe(text, expected, rejected, config),
  };

  let size_exceeded = config
    .size_limit
    .filter(|limit| text.chars().count() > *limit);

  let (fraction, disqualified) = if config.detect_timeout && text.contains(TIMEOUT_MARKER) {
    (0.0, Some(Disqualification::Timeout))
  } else if let Some(limit) = size_exceeded {
    display = display.chars().take(limit).collect::<String>() + TRUNCATED;
    (0.0, Some(Disqualification::SizeLimit))
  } else if rejected.iter().any(|r| r.is_match(text)) {
    (0.0, Some(Disqualification::Rejected))
  } else {
    (credit(text, expected, config.quantifier), None)
  };

  debug!(
    "Match {:?}: fraction {}, disqualified {:?}",
    config.quantifier, fraction, disqualified
  );

  MatchOutcome {
    fraction,
    message,
    display,
    disqualified,
  }
}

/// Make empty output and a missing final newline visible
pub fn render_output(text: String) -> String {
  if text.is_empty() {
    NO_OUTPUT.to_string()
  } else if !text.ends_with('\n') {
    text + NO_ENDING_LINE_BREAK
  } else {
    text
  }
}

fn credit(text: &str, expected: &[PatternSpec], quantifier: Quantifier) -> f64 {
  if expected.is_empty() {
    return 1.0;
  }
  let matched = expected.iter().filter(|p| p.is_match(text)).count();
  match quantifier {
    Quantifier::All if matched == expected.len() => 1.0,
    Quantifier::Any if matched > 0 => 1.0,
    Quantifier::Partial => matched as f64 / expected.len() as f64,
    _ => 0.0,
  }
}

/// `Expected one of:` / `Expected all of:` listing, plus `But not:` for rejects
fn describe(
  text: &str,
  expected: &[PatternSpec],
  rejected: &[PatternSpec],
  config: &MatchConfig,
) -> String {
  if expected.is_empty() {
    return String::new();
  }

  let quantifier = if expected.len() > 1 {
    match config.quantifier {
      Quantifier::Any => " one of",
      Quantifier::All | Quantifier::Partial => " all of",
    }
  } else {
    ""
  };

  let mut message = format!(
    "Expected{}:{}",
    quantifier,
    list_patterns(text, expected, "\x1b[32m", config.highlight_matches)
  );
  if !rejected.is_empty() {
    message += &format!(
      "\nBut not:{}",
      list_patterns(text, rejected, "\x1b[31m", config.highlight_matches)
    );
  }
  message
}

fn list_patterns(text: &str, patterns: &[PatternSpec], color: &str, highlight: bool) -> String {
  let join = if patterns.iter().any(|p| p.raw().contains('\n')) {
    "\n\n"
  } else {
    "\n\t"
  };
  let items = patterns
    .iter()
    .map(|p| {
      if highlight && p.is_match(text) {
        format!("{}{}\x1b[0m", color, p.raw())
      } else {
        p.raw().to_string()
      }
    })
    .collect::<Vec<String>>();
  format!("{}{}", join, items.join(join))
}
