use std::os::unix::prelude::RawFd;

use nix::{
  errno::Errno,
  fcntl::OFlag,
  unistd::{self, close, pipe2},
};

use crate::error::GraderError;

/// Close-on-exec pipe, the forked child writes its errno here when `execvpe` fails
pub struct ExecPipe(RawFd, RawFd);

pub struct ExecReadPipe(RawFd);

pub struct ExecWritePipe(RawFd);

impl ExecPipe {
  pub fn new() -> Result<Self, GraderError> {
    let result = pipe2(OFlag::O_CLOEXEC | OFlag::O_NONBLOCK)?;
    Ok(ExecPipe(result.0, result.1))
  }

  pub fn read(self) -> Result<ExecReadPipe, GraderError> {
    close(self.1)?;
    Ok(ExecReadPipe(self.0))
  }

  pub fn write(self) -> Result<ExecWritePipe, GraderError> {
    close(self.0)?;
    Ok(ExecWritePipe(self.1))
  }
}

impl ExecReadPipe {
  /// `None` when the child reached `execvpe` successfully
  pub fn read_errno(&self) -> Option<Errno> {
    let mut buf = [0u8; 4];
    match unistd::read(self.0, &mut buf) {
      Ok(4) => Some(Errno::from_i32(i32::from_ne_bytes(buf))),
      _ => None,
    }
  }
}

impl Drop for ExecReadPipe {
  fn drop(&mut self) {
    let _ = close(self.0);
  }
}

impl ExecWritePipe {
  /// Only async-signal-safe calls here, it runs between fork and exec
  pub fn write_errno(&self, errno: Errno) {
    let bytes = (errno as i32).to_ne_bytes();
    let _ = unistd::write(self.0, &bytes);
  }
}

impl Drop for ExecWritePipe {
  fn drop(&mut self) {
    let _ = close(self.0);
  }
}
