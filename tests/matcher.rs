use regex::Regex;

use catgrader::matcher::{
  match_output, render_output, Disqualification, MatchConfig, Pattern, Quantifier, NO_OUTPUT,
  TRUNCATED,
};

mod common;

fn fraction(text: &str, expected: Vec<Pattern>, rejected: Vec<Pattern>, config: MatchConfig) -> f64 {
  match_output(text, &expected, &rejected, &config)
    .unwrap()
    .fraction()
}

#[test]
fn it_should_require_all() {
  common::setup();

  let config = MatchConfig::default().quantifier(Quantifier::All);
  let expected = vec![Pattern::from("Hello"), Pattern::from("World")];
  assert_eq!(fraction("Hello World\n", expected.clone(), vec![], config.clone()), 1.0);
  assert_eq!(fraction("Hello\n", expected, vec![], config), 0.0);
}

#[test]
fn it_should_accept_any() {
  common::setup();

  let expected = vec![Pattern::from("foo"), Pattern::from("bar")];
  assert_eq!(fraction("bar baz", expected.clone(), vec![], MatchConfig::default()), 1.0);
  assert_eq!(fraction("qux\n", expected, vec![], MatchConfig::default()), 0.0);
}

#[test]
fn it_should_give_partial_credit() {
  common::setup();

  let config = MatchConfig::default().quantifier(Quantifier::Partial);
  let expected = vec!["a", "b", "c", "d"]
    .into_iter()
    .map(Pattern::from)
    .collect::<Vec<Pattern>>();
  assert_eq!(fraction("a c\n", expected, vec![], config), 0.5);
}

#[test]
fn it_should_give_full_credit_without_expectations() {
  common::setup();

  assert_eq!(fraction("anything\n", vec![], vec![], MatchConfig::default()), 1.0);
  let config = MatchConfig::default().quantifier(Quantifier::All);
  assert_eq!(fraction("", vec![], vec![], config), 1.0);
}

#[test]
fn it_should_let_reject_win() {
  common::setup();

  let outcome = match_output(
    "ok, error occurred",
    &[Pattern::from("ok")],
    &[Pattern::from("error")],
    &MatchConfig::default(),
  )
  .unwrap();
  assert_eq!(outcome.fraction(), 0.0);
  assert_eq!(outcome.disqualified(), Some(Disqualification::Rejected));
}

#[test]
fn it_should_zero_timeouts() {
  common::setup();

  let text = "Hello\n\nTIMEOUT! Typically this means the program took too long\n";
  let outcome = match_output(text, &[Pattern::from("Hello")], &[], &MatchConfig::default()).unwrap();
  assert_eq!(outcome.fraction(), 0.0);
  assert_eq!(outcome.disqualified(), Some(Disqualification::Timeout));

  let config = MatchConfig::default().detect_timeout(false);
  assert_eq!(fraction(text, vec![Pattern::from("Hello")], vec![], config), 1.0);
}

#[test]
fn it_should_truncate_long_output() {
  common::setup();

  let text = "x".repeat(20) + "\n";
  let config = MatchConfig::default().size_limit(Some(10));
  let outcome = match_output(&text, &[Pattern::from("x")], &[], &config).unwrap();
  assert_eq!(outcome.fraction(), 0.0);
  assert_eq!(outcome.disqualified(), Some(Disqualification::SizeLimit));
  assert_eq!(outcome.display(), format!("{}{}", "x".repeat(10), TRUNCATED));

  let config = MatchConfig::default().size_limit(None);
  assert_eq!(fraction(&text, vec![Pattern::from("x")], vec![], config), 1.0);
}

#[test]
fn it_should_collapse_whitespace() {
  common::setup();

  let expected = vec![Pattern::from("a   b")];
  assert_eq!(fraction("a\nb\n", expected.clone(), vec![], MatchConfig::default()), 1.0);
  let config = MatchConfig::default().collapse_whitespace(false);
  assert_eq!(fraction("a\nb\n", expected, vec![], config), 0.0);
}

#[test]
fn it_should_ignore_case_by_default() {
  common::setup();

  let expected = vec![Pattern::from("hello")];
  assert_eq!(fraction("HELLO\n", expected.clone(), vec![], MatchConfig::default()), 1.0);
  let config = MatchConfig::default().ignore_case(false);
  assert_eq!(fraction("HELLO\n", expected, vec![], config), 0.0);
}

#[test]
fn it_should_escape_text_and_keep_regex() {
  common::setup();

  assert_eq!(
    fraction("1+1=2\n", vec![Pattern::from("1+1")], vec![], MatchConfig::default()),
    1.0
  );
  assert_eq!(
    fraction("11\n", vec![Pattern::from("1+1")], vec![], MatchConfig::default()),
    0.0
  );

  let regex = Regex::new(r"^Sum: \d+$").unwrap();
  assert_eq!(
    fraction("Sum: 42", vec![Pattern::from(regex.clone())], vec![], MatchConfig::default()),
    1.0
  );
  assert_eq!(
    fraction("sum: 42", vec![Pattern::from(regex)], vec![], MatchConfig::default()),
    0.0
  );
}

#[test]
fn it_should_stringify_values() {
  common::setup();

  assert_eq!(
    fraction("answer 42\n", vec![Pattern::from(42)], vec![], MatchConfig::default()),
    1.0
  );
  assert_eq!(
    fraction("2.5\n", vec![Pattern::display(2.5)], vec![], MatchConfig::default()),
    1.0
  );
}

#[test]
fn it_should_render_markers() {
  common::setup();

  assert_eq!(render_output(String::new()), NO_OUTPUT);
  assert_eq!(render_output("abc".to_string()), "abc\n(NO ENDING LINE BREAK)");
  assert_eq!(render_output("abc\n".to_string()), "abc\n");

  let outcome = match_output("", &[Pattern::from("x")], &[], &MatchConfig::default()).unwrap();
  assert_eq!(outcome.display(), "(NO OUTPUT)");
}

#[test]
fn it_should_describe_expectations() {
  common::setup();

  let outcome = match_output(
    "nothing\n",
    &[Pattern::from("  foo "), Pattern::from("bar")],
    &[Pattern::from("error")],
    &MatchConfig::default(),
  )
  .unwrap();
  assert_eq!(
    outcome.message(),
    "Expected one of:\n\tfoo\n\tbar\nBut not:\n\terror"
  );

  let config = MatchConfig::default().quantifier(Quantifier::All);
  let outcome = match_output("nothing\n", &[Pattern::from("a"), Pattern::from("b")], &[], &config).unwrap();
  assert_eq!(outcome.message(), "Expected all of:\n\ta\n\tb");

  let outcome = match_output("nothing\n", &[Pattern::from("Hello")], &[], &MatchConfig::default()).unwrap();
  assert_eq!(outcome.message(), "Expected:\n\tHello");

  let config = MatchConfig::default().message("Print the sum");
  let outcome = match_output("nothing\n", &[Pattern::from("Hello")], &[], &config).unwrap();
  assert_eq!(outcome.message(), "Print the sum");
}

#[test]
fn it_should_highlight_matches() {
  common::setup();

  let config = MatchConfig::default().highlight_matches(true);
  let outcome = match_output("Hello World\n", &[Pattern::from("World")], &[], &config).unwrap();
  assert_eq!(outcome.display(), "Hello \x1b[32mWorld\x1b[0m\n");
  assert_eq!(outcome.message(), "Expected:\n\t\x1b[32mWorld\x1b[0m");
}

#[test]
fn it_should_parse_quantifiers() {
  assert_eq!("all".parse::<Quantifier>().unwrap(), Quantifier::All);
  assert_eq!("partial".parse::<Quantifier>().unwrap(), Quantifier::Partial);
  assert_eq!(Quantifier::from(false), Quantifier::Any);
  assert!("most".parse::<Quantifier>().is_err());
}
