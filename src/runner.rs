use std::{
  env,
  ffi::CString,
  fs::File,
  io::{Read, Seek, SeekFrom, Write},
  os::unix::io::{AsRawFd, RawFd},
  thread::sleep,
  time::{Duration, Instant},
};

use log::{debug, info, warn};
use nix::errno::Errno;
use nix::libc::{self, STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO};
use nix::sys::resource::{setrlimit, Resource};
use nix::sys::signal::{kill, killpg, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{dup2, execvpe, fork, setgid, setgroups, setpgid, setuid, ForkResult, Gid, Pid, Uid, User};
use tempfile::tempfile;

use crate::utils::{into_c_string, parse_env, split_command, ExecPipe};
use crate::GraderError;

/// Appended to the captured output when the time limit kills the program
pub const TIMEOUT_MESSAGE: &str = "

TIMEOUT! Typically this means the program took too long,
requested more inputs than provided, or an infinite loop was found.
If your program is reading data using scanf inside a loop, this
could also mean that scanf does not support the input provided
(e.g., reading an int if the input is a double).
";

const DEFAULT_CAPTURE_LIMIT: usize = 16 * 1024 * 1024;

const DEFAULT_FILE_SIZE_LIMIT: u64 = 256 * 1024 * 1024;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Unprivileged user the submission runs as, with its restricted PATH
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxIdentity {
  user: String,
  path: String,
}

/// One external command to run
#[derive(Debug, Clone)]
pub struct RunOptions {
  program: String,
  arguments: Vec<String>,
  input: Option<Vec<u8>>,
  timeout: Option<Duration>,
  env: Option<Vec<(String, String)>>,
  sandbox: Option<SandboxIdentity>,
  capture_limit: usize,
  file_size_limit: Option<u64>,
}

/// Captured result of one command
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionOutcome {
  text: String,
  timed_out: bool,
  truncated: bool,
  status: Option<i32>,
  signal: Option<Signal>,
}

struct Prepared {
  program: CString,
  args: Vec<CString>,
  env: Vec<CString>,
  identity: Option<(Uid, Gid)>,
  file_size_limit: Option<u64>,
}

struct Waited {
  timed_out: bool,
  status: Option<i32>,
  signal: Option<Signal>,
}

impl SandboxIdentity {
  pub fn new<US: Into<String>, PS: Into<String>>(user: US, path: PS) -> Self {
    SandboxIdentity {
      user: user.into(),
      path: path.into(),
    }
  }

  pub fn user(&self) -> &str {
    &self.user
  }

  pub fn path(&self) -> &str {
    &self.path
  }

  fn resolve(&self) -> Result<(Uid, Gid), GraderError> {
    let user = User::from_name(&self.user)?
      .ok_or(GraderError::exec(format!("Sandbox user {} not found", self.user)))?;
    Ok((user.uid, user.gid))
  }
}

impl RunOptions {
  pub fn new<PS: Into<String>, AS: Into<String>>(program: PS, arguments: Vec<AS>) -> Self {
    RunOptions {
      program: program.into(),
      arguments: arguments.into_iter().map(|a| a.into()).collect(),
      input: None,
      timeout: None,
      env: None,
      sandbox: None,
      capture_limit: DEFAULT_CAPTURE_LIMIT,
      file_size_limit: Some(DEFAULT_FILE_SIZE_LIMIT),
    }
  }

  /// First element is the program
  pub fn from_argv<AS: Into<String>>(argv: Vec<AS>) -> Self {
    let mut argv = argv.into_iter().map(|a| a.into());
    let program = argv.next().unwrap_or_default();
    RunOptions::new(program, argv.collect())
  }

  /// Whitespace separated command line
  pub fn from_command_line(command: &str) -> Self {
    RunOptions::from_argv(split_command(command))
  }

  /// Append arguments
  pub fn arguments<AS: Into<String>>(mut self, arguments: Vec<AS>) -> Self {
    self
      .arguments
      .extend(arguments.into_iter().map(|a| a.into()));
    self
  }

  /// Feed the stringified value to stdin
  pub fn input<S: ToString>(mut self, input: S) -> Self {
    self.input = Some(input.to_string().into_bytes());
    self
  }

  pub fn input_bytes(mut self, input: Vec<u8>) -> Self {
    self.input = Some(input);
    self
  }

  pub fn set_input<S: ToString>(mut self, input: Option<S>) -> Self {
    self.input = input.map(|i| i.to_string().into_bytes());
    self
  }

  pub fn timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  pub fn set_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.timeout = timeout;
    self
  }

  /// Pass env, the first call replaces the inherited environment
  pub fn env<KS: Into<String>, VS: Into<String>>(mut self, key: KS, value: VS) -> Self {
    self
      .env
      .get_or_insert_with(Vec::new)
      .push((key.into(), value.into()));
    self
  }

  pub fn envs(mut self, list: Vec<(String, String)>) -> Self {
    self.env.get_or_insert_with(Vec::new).extend(list);
    self
  }

  /// Parse `KEY=VALUE` (or `KEY`, read from the grader's env) list
  pub fn parse_env_list(mut self, list: Vec<String>) -> Result<Self, GraderError> {
    for text in list {
      let pair = parse_env(text)?;
      self.env.get_or_insert_with(Vec::new).push(pair);
    }
    Ok(self)
  }

  pub fn sandbox(mut self, identity: SandboxIdentity) -> Self {
    self.sandbox = Some(identity);
    self
  }

  pub fn set_sandbox(mut self, identity: Option<SandboxIdentity>) -> Self {
    self.sandbox = identity;
    self
  }

  /// Max captured bytes (default 16 MiB)
  pub fn capture_limit(mut self, limit: usize) -> Self {
    self.capture_limit = limit;
    self
  }

  /// Largest file the program may write, its output included (default 256 MiB)
  pub fn file_size_limit(mut self, limit: Option<u64>) -> Self {
    self.file_size_limit = limit;
    self
  }

  pub fn get_program(&self) -> &str {
    &self.program
  }

  pub fn get_arguments(&self) -> &Vec<String> {
    &self.arguments
  }

  pub fn get_timeout(&self) -> Option<Duration> {
    self.timeout
  }

  pub fn command_line(&self) -> String {
    [vec![self.program.clone()], self.arguments.clone()]
      .concat()
      .join(" ")
  }

  fn prepare(&self) -> Result<Prepared, GraderError> {
    if self.program.is_empty() {
      return Err(GraderError::exec("Empty command"));
    }

    let identity = match &self.sandbox {
      Some(sandbox) => Some(sandbox.resolve()?),
      None => None,
    };

    let mut pairs = match &self.env {
      Some(list) => list.clone(),
      None => env::vars().collect(),
    };
    if let Some(sandbox) = &self.sandbox {
      pairs.retain(|(key, _)| key != "PATH");
      pairs.push(("PATH".to_string(), sandbox.path.clone()));
    }
    let env = pairs
      .iter()
      .map(|(key, value)| into_c_string(&format!("{}={}", key, value)))
      .collect::<Result<Vec<CString>, GraderError>>()?;

    let program = into_c_string(&self.program)?;
    let mut args = vec![program.clone()];
    for arg in self.arguments.iter() {
      args.push(into_c_string(arg)?);
    }

    Ok(Prepared {
      program,
      args,
      env,
      identity,
      file_size_limit: self.file_size_limit,
    })
  }
}

impl ExecutionOutcome {
  pub fn text(&self) -> &str {
    &self.text
  }

  pub fn timed_out(&self) -> bool {
    self.timed_out
  }

  pub fn truncated(&self) -> bool {
    self.truncated
  }

  pub fn status(&self) -> Option<i32> {
    self.status
  }

  pub fn signal(&self) -> Option<Signal> {
    self.signal
  }

  /// Captured text, followed by [`TIMEOUT_MESSAGE`] when the program was killed
  pub fn into_text(self) -> String {
    if self.timed_out {
      self.text + TIMEOUT_MESSAGE
    } else {
      self.text
    }
  }
}

/// Run a command and capture its merged stdout/stderr.
///
/// Never fails: a command that can not be started yields an empty outcome,
/// which the matcher later renders as "no output".
pub fn run(options: &RunOptions) -> ExecutionOutcome {
  match execute(options) {
    Ok(outcome) => outcome,
    Err(err) => {
      warn!("Run {} fails: {}", options.command_line(), err);
      ExecutionOutcome::default()
    }
  }
}

/// [`run`] and return the text, with the timeout diagnostic appended
pub fn run_text(options: &RunOptions) -> String {
  run(options).into_text()
}

fn execute(options: &RunOptions) -> Result<ExecutionOutcome, GraderError> {
  let prepared = options.prepare()?;

  // stdin and the merged output both go through unlinked temp files, so a
  // killed program still leaves everything it wrote behind
  let mut stdin_file = tempfile()?;
  if let Some(input) = &options.input {
    stdin_file.write_all(input)?;
    stdin_file.seek(SeekFrom::Start(0))?;
  }
  let mut output_file = tempfile()?;

  let pipe = ExecPipe::new()?;
  debug!("Start running {}", options.command_line());

  match unsafe { fork() }? {
    ForkResult::Parent { child } => {
      let pipe = pipe.read()?;
      let _ = setpgid(child, child);

      let waited = wait_child(child, options.timeout)?;

      if let Some(errno) = pipe.read_errno() {
        warn!("Spawn {} fails: {}", options.command_line(), errno.desc());
        return Ok(ExecutionOutcome::default());
      }

      let (text, truncated) = read_capture(&mut output_file, options.capture_limit)?;
      if truncated {
        warn!(
          "Output of {} exceeds {} bytes, truncated",
          options.command_line(),
          options.capture_limit
        );
      }

      Ok(ExecutionOutcome {
        text,
        timed_out: waited.timed_out,
        truncated,
        status: waited.status,
        signal: waited.signal,
      })
    }
    ForkResult::Child => {
      let pipe = match pipe.write() {
        Ok(pipe) => pipe,
        Err(_) => unsafe { libc::_exit(127) },
      };
      let errno = exec_child(&prepared, stdin_file.as_raw_fd(), output_file.as_raw_fd());
      pipe.write_errno(errno);
      unsafe { libc::_exit(127) };
    }
  }
}

/// Runs in the forked child, returns only when something failed
fn exec_child(prepared: &Prepared, stdin_fd: RawFd, output_fd: RawFd) -> Errno {
  if let Err(errno) = setpgid(Pid::from_raw(0), Pid::from_raw(0)) {
    return errno;
  }

  for (fd, target) in [
    (stdin_fd, STDIN_FILENO),
    (output_fd, STDOUT_FILENO),
    (output_fd, STDERR_FILENO),
  ] {
    if let Err(errno) = dup2(fd, target) {
      return errno;
    }
  }

  // Writing past it raises SIGXFSZ
  if let Some(limit) = prepared.file_size_limit {
    if let Err(errno) = setrlimit(Resource::RLIMIT_FSIZE, limit, limit) {
      return errno;
    }
  }

  if let Some((uid, gid)) = prepared.identity {
    if let Err(errno) = setgroups(&[gid]) {
      return errno;
    }
    if let Err(errno) = setgid(gid) {
      return errno;
    }
    if let Err(errno) = setuid(uid) {
      return errno;
    }
  }

  match execvpe(&prepared.program, &prepared.args, &prepared.env) {
    Err(errno) => errno,
    Ok(never) => match never {},
  }
}

fn wait_child(child: Pid, timeout: Option<Duration>) -> Result<Waited, GraderError> {
  let deadline = timeout.map(|t| Instant::now() + t);

  loop {
    let flag = deadline.map(|_| WaitPidFlag::WNOHANG);
    match waitpid(child, flag) {
      Ok(WaitStatus::Exited(pid, status)) => {
        debug!("Child process #{}. exited with status {}", pid, status);
        kill_group(child);
        return Ok(Waited {
          timed_out: false,
          status: Some(status),
          signal: None,
        });
      }
      Ok(WaitStatus::Signaled(pid, signal, _)) => {
        debug!("Child process #{}. is signaled by {}", pid, signal);
        kill_group(child);
        return Ok(Waited {
          timed_out: false,
          status: None,
          signal: Some(signal),
        });
      }
      Ok(WaitStatus::StillAlive) => {
        if deadline.map_or(false, |deadline| Instant::now() >= deadline) {
          info!("Child process #{}. exceeded the time limit, killing", child);
          kill_group(child);
          let _ = kill(child, Signal::SIGKILL);
          loop {
            match waitpid(child, None) {
              Err(Errno::EINTR) => continue,
              _ => break,
            }
          }
          return Ok(Waited {
            timed_out: true,
            status: None,
            signal: Some(Signal::SIGKILL),
          });
        }
        sleep(POLL_INTERVAL);
      }
      Ok(_) => continue,
      Err(Errno::EINTR) => continue,
      Err(errno) => return Err(errno.into()),
    }
  }
}

/// Also reaps background processes the program left in its group
fn kill_group(child: Pid) {
  let _ = killpg(child, Signal::SIGKILL);
}

fn read_capture(file: &mut File, limit: usize) -> Result<(String, bool), GraderError> {
  file.seek(SeekFrom::Start(0))?;
  let mut buf = vec![];
  Read::by_ref(file).take(limit as u64 + 1).read_to_end(&mut buf)?;
  let truncated = buf.len() > limit;
  buf.truncate(limit);
  // Invalid UTF-8 becomes U+FFFD
  Ok((String::from_utf8_lossy(&buf).into_owned(), truncated))
}
