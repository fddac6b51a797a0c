//! Inlines small stylesheet images as `data:` urls.
//!
//! A declaration can opt in or out with a trailing annotation comment:
//!
//! ```css
//! .logo { background: url(img/logo.png) no-repeat; /** jawr:base64 */ }
//! .big  { background: url(img/big.png); /** jawr:base64-skip */ }
//! ```
//!
//! Declarations without an annotation follow
//! `jawr.css.postprocessor.base64ImageEncoder.encode.by.default`. Images that cannot be inlined
//! are rewritten like the `csspathrewriter` processor does.

use std::sync::OnceLock;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use tracing::{debug, warn};

use crate::error::BundlingResult;
use crate::generator::is_binary_resource;
use crate::paths::as_path;

use super::css_url::{full_bundle_path, image_source_path, published_image_url, rewrite_css_urls};
use super::{ProcessingMode, ProcessingStatus, Processor, ids};

const SPRITE_PREFIX: &str = "sprite:";

fn declaration_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r"(?i)((?:url\(\s*(?:\\\)|[^)])*?\s*\)\s*)+)([^;]*);?(\s*/\*\*(?s:.)*?\*/)?")
      .expect("invalid base64 declaration regex")
  })
}

fn annotation_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r"jawr\s*:\s*base64(-skip)?").expect("invalid base64 annotation regex")
  })
}

/// Whether a declaration carrying `annotation` should be inlined.
fn should_encode(annotation: Option<&str>, encode_by_default: bool) -> bool {
  match annotation.and_then(|text| annotation_pattern().captures(text)) {
    Some(caps) => caps.get(1).is_none(),
    None => encode_by_default,
  }
}

/// `base64ImageEncoder` processor. Runs on members only.
#[derive(Debug, Default, Clone, Copy)]
pub struct Base64ImageProcessor;

impl Processor for Base64ImageProcessor {
  fn id(&self) -> &str {
    ids::BASE64_IMAGE_ENCODER
  }

  fn apply(&self, status: &mut ProcessingStatus<'_>, content: String) -> BundlingResult<String> {
    if status.mode != ProcessingMode::File {
      return Ok(content);
    }

    let original_path = status.current_path().to_string();
    let new_css_path = if status.debug {
      as_path(&original_path)
    } else {
      full_bundle_path(status)
    };
    let context_path = status.settings.context_path.clone();

    let mut out = String::with_capacity(content.len());
    let mut position = 0;
    for caps in declaration_pattern().captures_iter(&content) {
      let Some(whole) = caps.get(0) else {
        continue;
      };
      out.push_str(&content[position..whole.start()]);
      position = whole.end();

      let encode = should_encode(
        caps.get(3).map(|m| m.as_str()),
        status.settings.base64_encode_by_default,
      );
      let rewritten = rewrite_css_urls(whole.as_str(), &original_path, context_path.as_deref(), |url| {
        if url.starts_with(SPRITE_PREFIX) {
          return Ok(url.to_string());
        }
        let Some(image) = image_source_path(status, &original_path, url) else {
          warn!(url, css = %original_path, "url points out of the application context, left as is");
          return Ok(url.to_string());
        };
        if encode && let Some(data) = encode_image(status, &image) {
          return Ok(data);
        }
        Ok(published_image_url(status, &image, &new_css_path))
      })?;
      out.push_str(&rewritten);
    }
    out.push_str(&content[position..]);
    Ok(out)
  }
}

/// `data:` url of `image`, `None` when it is missing, too large or not an image.
fn encode_image(status: &mut ProcessingStatus<'_>, image: &str) -> Option<String> {
  if !is_binary_resource(image) {
    return None;
  }
  let mime = mime_guess::from_path(image).first()?;

  let bytes = match status.registry.read_binary(image, status.reader) {
    Ok(bytes) => bytes,
    Err(err) => {
      warn!(image, css = status.current_path(), %err, "unable to read image, it will not be inlined");
      return None;
    }
  };

  let limit = status.settings.base64_max_file_size;
  if bytes.len() > limit {
    warn!(
      image,
      size = bytes.len(),
      limit,
      "image is larger than the base64 size limit, it will not be inlined"
    );
    return None;
  }

  debug!(image, size = bytes.len(), "inlining image");
  status.add_file_mapping(image);
  Some(format!("data:{mime};base64,{}", STANDARD.encode(bytes)))
}
