use std::{
  borrow::Cow,
  fs::{self, Permissions},
  os::unix::fs::PermissionsExt,
  path::{Path, PathBuf},
};

use log::{debug, warn};
use path_absolutize::Absolutize;

use crate::GraderError;

/// chmod flavours used by the grader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeChange {
  /// Replace permission bits, e.g. `0o755`
  Set(u32),
  /// `a+x`
  AddExecute,
}

impl ModeChange {
  fn apply(&self, current: u32) -> u32 {
    match self {
      ModeChange::Set(mode) => *mode,
      ModeChange::AddExecute => current | 0o111,
    }
  }
}

pub fn absolute(path: &Path) -> Result<PathBuf, GraderError> {
  let path: Cow<Path> = path.absolutize()?;
  Ok(path.into_owned())
}

/// Change the mode of `file`, and with `change_parent` make every ancestor
/// directory searchable so the sandbox user can resolve the path
pub fn change_mode<P: AsRef<Path>>(file: P, mode: ModeChange, change_parent: bool) {
  let file = match absolute(file.as_ref()) {
    Ok(file) => file,
    Err(err) => {
      warn!("Resolve {} fails: {}", file.as_ref().to_string_lossy(), err);
      return;
    }
  };

  match fs::metadata(&file) {
    Ok(meta) => {
      let next = mode.apply(meta.permissions().mode() & 0o7777);
      debug!("chmod {:o} {}", next, file.to_string_lossy());
      if let Err(err) = fs::set_permissions(&file, Permissions::from_mode(next)) {
        warn!("chmod {} fails: {}", file.to_string_lossy(), err);
      }
    }
    Err(err) => {
      warn!("chmod {} fails: {}", file.to_string_lossy(), err);
    }
  }

  if change_parent {
    if let Some(parent) = file.parent() {
      if parent != file.as_path() && !parent.as_os_str().is_empty() {
        change_mode(parent, ModeChange::AddExecute, true);
      }
    }
  }
}

/// `chmod -R`, symlinks are left untouched
pub fn change_mode_recursive<P: AsRef<Path>>(root: P, mode: u32) -> Result<(), GraderError> {
  let root = root.as_ref();
  let meta = fs::symlink_metadata(root)?;
  if meta.file_type().is_symlink() {
    return Ok(());
  }
  fs::set_permissions(root, Permissions::from_mode(mode))?;
  if meta.is_dir() {
    for entry in fs::read_dir(root)? {
      change_mode_recursive(entry?.path(), mode)?;
    }
  }
  Ok(())
}

/// Copy `src` to `dst`, an existing `dst` is kept as `dst.~N~` like `cp --backup=numbered`
pub fn copy_with_backup<S: AsRef<Path>, D: AsRef<Path>>(src: S, dst: D) -> Result<(), GraderError> {
  let dst = dst.as_ref();
  if dst.exists() {
    let backup = next_backup_path(dst)?;
    debug!(
      "Backup {} -> {}",
      dst.to_string_lossy(),
      backup.to_string_lossy()
    );
    fs::rename(dst, &backup)?;
  }
  fs::copy(src, dst)?;
  Ok(())
}

fn next_backup_path(dst: &Path) -> Result<PathBuf, GraderError> {
  let name = dst
    .file_name()
    .map(|n| n.to_string_lossy().to_string())
    .ok_or(GraderError::fs(format!("No file name in {}", dst.to_string_lossy())))?;
  let dir = match dst.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
    _ => PathBuf::from("."),
  };
  let prefix = format!("{}.~", name);

  let mut last = 0u32;
  for entry in fs::read_dir(&dir)? {
    let entry = entry?.file_name().to_string_lossy().to_string();
    if let Some(number) = entry
      .strip_prefix(&prefix)
      .and_then(|rest| rest.strip_suffix('~'))
      .and_then(|n| n.parse::<u32>().ok())
    {
      last = last.max(number);
    }
  }

  Ok(dir.join(format!("{}{}~", prefix, last + 1)))
}
