//! Keeps a single `@charset` rule, at the very start of a stylesheet bundle.

use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

use crate::error::BundlingResult;

use super::{ProcessingStatus, Processor, ids};

fn charset_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| Regex::new(r#"@charset "([^"]+)";"#).expect("invalid charset regex"))
}

/// Result of [`filter_charset`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharsetFiltered {
  /// Stylesheet with at most one `@charset` rule, at offset 0.
  pub css: String,
  /// The declaration that was kept.
  pub charset: Option<String>,
  /// Whether the kept declaration had to be moved to the top.
  pub moved: bool,
  /// Dropped declarations naming a different charset than the kept one.
  pub conflicts: Vec<String>,
}

/// Remove every `@charset` declaration except one at offset 0. The first declaration seen wins;
/// it is moved to the top when the bundle did not start with it.
pub fn filter_charset(css: &str) -> CharsetFiltered {
  let mut out = String::with_capacity(css.len());
  let mut current: Option<&str> = None;
  let mut defined_at_start = false;
  let mut conflicts = Vec::new();
  let mut position = 0;

  for caps in charset_pattern().captures_iter(css) {
    let (Some(whole), Some(value)) = (caps.get(0), caps.get(1)) else {
      continue;
    };
    if whole.start() == 0 {
      current = Some(value.as_str());
      defined_at_start = true;
      continue;
    }

    match current {
      Some(charset) if !charset.eq_ignore_ascii_case(value.as_str()) => {
        conflicts.push(value.as_str().to_string());
      }
      Some(_) => {}
      None => current = Some(value.as_str()),
    }
    out.push_str(&css[position..whole.start()]);
    position = whole.end();
  }
  out.push_str(&css[position..]);

  let moved = current.is_some() && !defined_at_start;
  let css = match current {
    Some(charset) if moved => format!("@charset \"{charset}\";\n{out}"),
    _ => out,
  };
  CharsetFiltered {
    css,
    charset: current.map(str::to_string),
    moved,
    conflicts,
  }
}

/// `csscharset` processor.
#[derive(Debug, Default, Clone, Copy)]
pub struct CharsetFilterProcessor;

impl Processor for CharsetFilterProcessor {
  fn id(&self) -> &str {
    ids::CSS_CHARSET
  }

  fn apply(&self, status: &mut ProcessingStatus<'_>, content: String) -> BundlingResult<String> {
    let filtered = filter_charset(&content);
    let kept = filtered.charset.as_deref().unwrap_or_default();
    if filtered.moved {
      warn!(
        bundle = %status.bundle.id,
        charset = kept,
        "charset declaration is not at the top of the bundle, moving it"
      );
    }
    for dropped in &filtered.conflicts {
      warn!(
        bundle = %status.bundle.id,
        kept,
        dropped = %dropped,
        "bundle contains stylesheets with different charset declarations"
      );
    }
    Ok(filtered.css)
  }
}
