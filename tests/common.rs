#![allow(dead_code)]

use std::{
  path::{Path, PathBuf},
  sync::Once,
};

use flexi_logger::Logger;

static INIT: Once = Once::new();

pub fn setup() {
  INIT.call_once(|| {
    Logger::try_with_str("catgrader=debug,info")
      .unwrap()
      .start()
      .unwrap();
  });
}

pub fn fixture(path: &str) -> PathBuf {
  Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures").join(path)
}

/// Toolchain tests are skipped on machines without it
pub fn has_tool(name: &str) -> bool {
  std::env::var_os("PATH")
    .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(name).is_file()))
    .unwrap_or(false)
}
