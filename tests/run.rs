use std::time::{Duration, Instant};

use log::info;
use nix::sys::signal::Signal;
use nix::unistd::{getuid, User};

use catgrader::runner::{run, run_text, RunOptions, SandboxIdentity, TIMEOUT_MESSAGE};

mod common;

fn shell(script: &str) -> RunOptions {
  RunOptions::new("/bin/sh", vec!["-c", script])
}

#[test]
fn it_should_capture_output() {
  common::setup();

  let outcome = run(&shell("echo hello; echo oops 1>&2"));
  info!("Captured: {:?}", outcome.text());
  assert_eq!(outcome.text(), "hello\noops\n");
  assert_eq!(outcome.status(), Some(0));
  assert!(!outcome.timed_out());
}

#[test]
fn it_should_feed_input() {
  common::setup();

  let options = RunOptions::new("/bin/cat", Vec::<String>::new()).input("1 2\n3\n");
  assert_eq!(run_text(&options), "1 2\n3\n");

  let options = RunOptions::new("/bin/cat", Vec::<String>::new()).input(42);
  assert_eq!(run_text(&options), "42");
}

#[test]
fn it_should_report_exit_status() {
  common::setup();

  let outcome = run(&shell("exit 3"));
  assert_eq!(outcome.status(), Some(3));
  assert_eq!(outcome.text(), "");
}

#[test]
fn it_should_kill_on_timeout() {
  common::setup();

  let options = shell("echo started; sleep 5; echo finished").timeout(Duration::from_millis(300));
  let start = Instant::now();
  let outcome = run(&options);
  info!("Timeout run took {:?}", start.elapsed());

  assert!(outcome.timed_out());
  assert!(start.elapsed() < Duration::from_secs(4));
  assert_eq!(outcome.text(), "started\n");
  assert_eq!(outcome.into_text(), format!("started\n{}", TIMEOUT_MESSAGE));
}

#[test]
fn it_should_return_nothing_when_spawn_fails() {
  common::setup();

  let options = RunOptions::new("/nonexistent/program", Vec::<String>::new());
  assert_eq!(run_text(&options), "");

  let options = RunOptions::from_argv(Vec::<String>::new());
  assert_eq!(run_text(&options), "");
}

#[test]
fn it_should_replace_invalid_utf8() {
  common::setup();

  let text = run_text(&shell("printf 'a\\377b\\n'"));
  assert_eq!(text, "a\u{FFFD}b\n");
}

#[test]
fn it_should_pass_env() {
  common::setup();

  let options = RunOptions::from_command_line("/usr/bin/env")
    .parse_env_list(vec!["GREETING=hi".to_string()])
    .unwrap();
  assert_eq!(run_text(&options), "GREETING=hi\n");

  let options = RunOptions::from_command_line("/usr/bin/env").parse_env_list(vec!["=bad".to_string()]);
  assert!(options.is_err());
}

#[test]
fn it_should_truncate_capture() {
  common::setup();

  let options = shell("printf 'abcdefgh'").capture_limit(4);
  let outcome = run(&options);
  assert!(outcome.truncated());
  assert_eq!(outcome.text(), "abcd");
}

#[test]
fn it_should_stop_oversized_writes() {
  common::setup();

  let options = RunOptions::new("yes", Vec::<String>::new())
    .capture_limit(4)
    .file_size_limit(Some(64))
    .timeout(Duration::from_secs(5));
  let outcome = run(&options);

  assert!(!outcome.timed_out());
  assert_eq!(outcome.signal(), Some(Signal::SIGXFSZ));
  assert!(outcome.truncated());
  assert_eq!(outcome.text(), "y\ny\n");
}

#[test]
fn it_should_run_as_sandbox_user() {
  common::setup();
  let nobody = match User::from_name("nobody") {
    Ok(Some(user)) if getuid().is_root() => user,
    _ => {
      info!("Not root or no nobody user, skip");
      return;
    }
  };

  let options = shell("id -u; echo $PATH").sandbox(SandboxIdentity::new("nobody", "/usr/bin:/bin"));
  assert_eq!(run_text(&options), format!("{}\n/usr/bin:/bin\n", nobody.uid));

  let options = shell("id -u").sandbox(SandboxIdentity::new("no-such-grader-user", "/usr/bin:/bin"));
  assert_eq!(run_text(&options), "");
}
