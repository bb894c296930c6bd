use std::{
  error::Error,
  fmt::{Debug, Display},
};

use flexi_logger::FlexiLoggerError;
use nix::errno::Errno;

pub enum GraderError {
  /// No verdict could be produced, the session must stop and report `gradable: false`
  Ungradable { reason: String, diagnostic: String },
  Exec(String),
  Nix(Errno),
  Fs(String),
  Config(String),
  Pattern(String),
  Report(String),
  Logger(FlexiLoggerError),
}

impl GraderError {
  /// `diagnostic` is appended to the report message shown to the submitter
  pub fn ungradable<RS: Into<String>, DS: Into<String>>(reason: RS, diagnostic: DS) -> GraderError {
    GraderError::Ungradable {
      reason: reason.into(),
      diagnostic: diagnostic.into(),
    }
  }

  pub fn exec<MS: Into<String>>(msg: MS) -> GraderError {
    GraderError::Exec(msg.into())
  }

  pub fn fs<MS: Into<String>>(msg: MS) -> GraderError {
    GraderError::Fs(msg.into())
  }

  pub fn config<MS: Into<String>>(msg: MS) -> GraderError {
    GraderError::Config(msg.into())
  }

  pub fn report<MS: Into<String>>(msg: MS) -> GraderError {
    GraderError::Report(msg.into())
  }

  pub fn is_ungradable(&self) -> bool {
    matches!(self, GraderError::Ungradable { .. })
  }
}

impl Debug for GraderError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    std::fmt::Display::fmt(&self, f)
  }
}

impl Display for GraderError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match &self {
      GraderError::Ungradable { reason, .. } => {
        f.write_fmt(format_args!("Grader Ungradable: {}", reason))
      }
      GraderError::Exec(msg) => f.write_fmt(format_args!("Grader Exec Error: {}", msg)),
      GraderError::Nix(errno) => f.write_fmt(format_args!("Grader Nix Error: {}", errno)),
      GraderError::Fs(msg) => f.write_fmt(format_args!("Grader File System Error: {}", msg)),
      GraderError::Config(msg) => f.write_fmt(format_args!("Grader Config Error: {}", msg)),
      GraderError::Pattern(msg) => f.write_fmt(format_args!("Grader Pattern Error: {}", msg)),
      GraderError::Report(msg) => f.write_fmt(format_args!("Grader Report Error: {}", msg)),
      GraderError::Logger(err) => f.write_fmt(format_args!("Grader Logger Error: {}", err)),
    }
  }
}

impl From<Errno> for GraderError {
  fn from(errno: Errno) -> Self {
    GraderError::Nix(errno)
  }
}

impl From<std::io::Error> for GraderError {
  fn from(err: std::io::Error) -> Self {
    GraderError::Fs(err.to_string())
  }
}

impl From<FlexiLoggerError> for GraderError {
  fn from(err: FlexiLoggerError) -> Self {
    GraderError::Logger(err)
  }
}

impl From<regex::Error> for GraderError {
  fn from(err: regex::Error) -> Self {
    GraderError::Pattern(err.to_string())
  }
}

impl From<serde_json::Error> for GraderError {
  fn from(err: serde_json::Error) -> Self {
    GraderError::Report(err.to_string())
  }
}

impl Error for GraderError {}
