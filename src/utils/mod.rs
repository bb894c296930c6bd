use std::{
  env,
  ffi::CString,
};

use flexi_logger::{DeferredNow, Duplicate, FileSpec, Logger, LoggerHandle};
use log::{error, info, Record};

pub use pipe::{ExecPipe, ExecReadPipe, ExecWritePipe};

use crate::GraderError;

pub mod permission;
pub mod pipe;

/// A logline-formatter that produces log lines like <br>
/// ```[datetime: INFO] Compile main.c -> main.o```
pub fn default_format(
  w: &mut dyn std::io::Write,
  now: &mut DeferredNow,
  record: &Record,
) -> Result<(), std::io::Error> {
  write!(
    w,
    "[{}: {:5}] {}",
    now.format("%Y-%m-%d %H:%M:%S"),
    record.level(),
    record.args()
  )
}

/// Start a file logger under `LOG_DIR` (default `./logs/`), warnings are duplicated to stderr
pub fn setup_logger(spec: &str) -> Result<LoggerHandle, GraderError> {
  let handle = Logger::try_with_str(spec)?
    .log_to_file(
      FileSpec::default()
        .directory(env::var("LOG_DIR").unwrap_or("./logs/".into()))
        .basename("catgrader")
        .discriminant(format!("{}", chrono::offset::Local::now().format("%Y-%m-%d")))
        .suppress_timestamp(),
    )
    .append()
    .duplicate_to_stderr(Duplicate::Warn)
    .format_for_files(default_format)
    .start()?;
  Ok(handle)
}

pub(crate) fn into_c_string(string: &str) -> Result<CString, GraderError> {
  CString::new(string).map_err(|_| GraderError::exec(format!("Nul byte in \"{}\"", string)))
}

pub(crate) fn parse_env(text: String) -> Result<(String, String), GraderError> {
  match text.split_once('=') {
    Some((key, _)) if key.is_empty() => {
      error!("Wrong environment variable string ({}) format", &text);
      Err(GraderError::config("Wrong environment variable string format"))
    }
    Some((key, value)) => Ok((key.to_string(), value.to_string())),
    None => {
      let value = env::var(&text).unwrap_or("".to_string());
      info!("Read environment variable {} = {}", &text, value);
      Ok((text, value))
    }
  }
}

/// Split a command line on whitespace
pub fn split_command(command: &str) -> Vec<String> {
  command.split_whitespace().map(|s| s.to_string()).collect()
}
