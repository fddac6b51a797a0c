//! Regex driven stylesheet minifier.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::BundlingResult;

use super::{ProcessingStatus, Processor, ids};

const STRING_PLACEHOLDER: &str = "______'JAWR_STRING'______";
const LICENCE_PLACEHOLDER: &str = "______'LICENCE'______";

fn rules_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| Regex::new(r"([^{}]*)(\{[^{}]*\})").expect("invalid css rules regex"))
}

fn new_lines_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| Regex::new(r"\r|\n|\t|\x0C").expect("invalid css new line regex"))
}

fn spaces_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(
      r"(?s)(\s*\{\s*)|(\s+-\s+)|(\s+\+\s+)|(\s+\*\s+)|(\s+/\s+)|(\s*\}\s*)|(\s*\(\s*)|(\s*;\s*)|(\s*:\s*)|(\s*\))|( +)",
    )
    .expect("invalid css spaces regex")
  })
}

const PAREN_GROUP: usize = 7;

/// Minify a stylesheet. `/*!` comments are kept when `keep_licence` is set.
pub fn minify_css(css: &str, keep_licence: bool) -> String {
  let (compressed, licences) = strip_comments(css, keep_licence);
  let (compressed, strings) = protect_strings(&compressed);

  let compressed = rules_pattern().replace_all(&compressed, |caps: &regex::Captures<'_>| {
    let selector = new_lines_pattern().replace_all(&caps[1], " ");
    format!("{}{}", selector.trim(), &caps[2])
  });
  let compressed = new_lines_pattern().replace_all(&compressed, " ");
  let compressed = collapse_spaces(&compressed);

  let compressed = restore(&compressed, STRING_PLACEHOLDER, &strings);
  restore(&compressed, LICENCE_PLACEHOLDER, &licences)
}

/// Drop comments. Licence comments are swapped for a placeholder when kept.
fn strip_comments(css: &str, keep_licence: bool) -> (String, Vec<String>) {
  let mut out = String::with_capacity(css.len());
  let mut licences = Vec::new();
  let mut rest = css;
  while let Some(start) = rest.find("/*") {
    let Some(len) = rest[start + 2..].find("*/") else {
      break;
    };
    let end = start + 2 + len + 2;
    out.push_str(&rest[..start]);
    let comment = &rest[start..end];
    if keep_licence && comment.starts_with("/*!") {
      licences.push(comment.to_string());
      out.push_str(LICENCE_PLACEHOLDER);
    }
    rest = &rest[end..];
  }
  out.push_str(rest);
  (out, licences)
}

fn protect_strings(css: &str) -> (String, Vec<String>) {
  let mut out = String::with_capacity(css.len());
  let mut strings = Vec::new();
  let mut rest = css;
  while let Some(start) = rest.find(['"', '\'']) {
    let quote = &rest[start..=start];
    let Some(len) = rest[start + 1..].find(quote) else {
      break;
    };
    let end = start + 1 + len + 1;
    out.push_str(&rest[..start]);
    strings.push(rest[start..end].to_string());
    out.push_str(STRING_PLACEHOLDER);
    rest = &rest[end..];
  }
  out.push_str(rest);
  (out, strings)
}

/// Whitespace around punctuation collapses to the punctuation alone. Space before `(` survives
/// after `and`, as in media queries.
fn collapse_spaces(css: &str) -> String {
  let pattern = spaces_pattern();
  let mut out = String::with_capacity(css.len());
  let mut position = 0;
  while let Some(caps) = pattern.captures_at(css, position) {
    let Some(whole) = caps.get(0) else {
      break;
    };
    out.push_str(&css[position..whole.start()]);

    if caps.get(PAREN_GROUP).is_some() && follows_and(&css[..whole.start()]) {
      let spaces = css[whole.start()..].len() - css[whole.start()..].trim_start_matches(' ').len();
      if spaces > 0 {
        out.push(' ');
        position = whole.start() + spaces;
      } else {
        out.push('(');
        position = whole.start() + 1;
      }
      continue;
    }

    out.push_str(replacement(whole.as_str()));
    position = whole.end();
  }
  if position < css.len() {
    out.push_str(&css[position..]);
  }
  out
}

fn follows_and(before: &str) -> bool {
  before
    .strip_suffix("and")
    .and_then(|head| head.chars().next_back())
    .is_some_and(char::is_whitespace)
}

fn replacement(matched: &str) -> &'static str {
  const ORDER: &[(&str, &str)] = &[
    ("+", " + "),
    ("-", " - "),
    ("*", " * "),
    ("/", " / "),
    ("{", "{"),
    ("}", "}"),
    ("(", "("),
    (":", ":"),
    (";", ";"),
    (")", ")"),
  ];
  ORDER
    .iter()
    .find(|(needle, _)| matched.contains(needle))
    .map(|(_, replacement)| *replacement)
    .unwrap_or(" ")
}

fn restore(css: &str, placeholder: &str, originals: &[String]) -> String {
  if originals.is_empty() {
    return css.to_string();
  }
  let mut out = String::with_capacity(css.len());
  let mut originals = originals.iter();
  let mut parts = css.split(placeholder);
  if let Some(first) = parts.next() {
    out.push_str(first);
  }
  for part in parts {
    if let Some(original) = originals.next() {
      out.push_str(original);
    }
    out.push_str(part);
  }
  out
}

/// `cssminify` processor.
#[derive(Debug, Default, Clone, Copy)]
pub struct CssMinProcessor;

impl Processor for CssMinProcessor {
  fn id(&self) -> &str {
    ids::CSS_MINIFY
  }

  fn apply(&self, status: &mut ProcessingStatus<'_>, content: String) -> BundlingResult<String> {
    Ok(minify_css(&content, status.settings.css_keep_licence))
  }
}
