use std::fmt::Display;

use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};

use crate::GraderError;

lazy_static! {
  static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("whitespace regex should compile");
}

/// An expected or rejected output as the question author wrote it
#[derive(Debug, Clone)]
pub enum Pattern {
  /// Literal text, escaped before compiling
  Text(String),
  /// Used verbatim, case and whitespace options do not apply
  Regex(Regex),
}

/// A [`Pattern`] compiled for one match configuration.
///
/// `raw` is only for diagnostics, matching always goes through `regex`.
#[derive(Debug, Clone)]
pub struct PatternSpec {
  raw: String,
  regex: Regex,
}

impl Pattern {
  /// Stringify any value, `Pattern::display(42)` expects the text `42`
  pub fn display<T: Display>(value: T) -> Self {
    Pattern::Text(value.to_string())
  }
}

impl From<&str> for Pattern {
  fn from(text: &str) -> Self {
    Pattern::Text(text.to_string())
  }
}

impl From<String> for Pattern {
  fn from(text: String) -> Self {
    Pattern::Text(text)
  }
}

impl From<&String> for Pattern {
  fn from(text: &String) -> Self {
    Pattern::Text(text.clone())
  }
}

impl From<Regex> for Pattern {
  fn from(regex: Regex) -> Self {
    Pattern::Regex(regex)
  }
}

macro_rules! pattern_from_display {
  ($($t:ty),*) => {
    $(
      impl From<$t> for Pattern {
        fn from(value: $t) -> Self {
          Pattern::display(value)
        }
      }
    )*
  };
}

pattern_from_display!(i32, i64, u32, u64, usize, f32, f64, bool, char);

impl PatternSpec {
  pub fn compile(
    pattern: &Pattern,
    ignore_case: bool,
    collapse_whitespace: bool,
  ) -> Result<Self, GraderError> {
    match pattern {
      Pattern::Regex(regex) => Ok(PatternSpec {
        raw: regex.as_str().to_string(),
        regex: regex.clone(),
      }),
      Pattern::Text(text) => {
        let (raw, source) = if collapse_whitespace {
          let parts = WHITESPACE
            .split(text)
            .map(regex::escape)
            .collect::<Vec<String>>();
          (text.trim().to_string(), parts.join(r"\s+"))
        } else {
          (text.trim_end().to_string(), regex::escape(text))
        };
        let regex = RegexBuilder::new(&source)
          .case_insensitive(ignore_case)
          .build()?;
        Ok(PatternSpec { raw, regex })
      }
    }
  }

  pub fn raw(&self) -> &str {
    &self.raw
  }

  pub fn regex(&self) -> &Regex {
    &self.regex
  }

  pub fn is_match(&self, text: &str) -> bool {
    self.regex.is_match(text)
  }
}
