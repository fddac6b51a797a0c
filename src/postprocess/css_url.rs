//! Rewriting of `url(...)` references in stylesheets.
//!
//! Member stylesheets are joined into a bundle served from a different location, so every
//! relative url must be recomputed against the bundle's path. Binary resources also get a
//! cache-busting segment derived from their checksum.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::BundlingResult;
use crate::generator::{PREFIX_SEPARATOR, is_binary_resource};
use crate::paths::{
  as_dir_path, as_path, cache_busted_url, concat_web_path, join_paths, parent_path,
  relative_web_path, root_relative_path,
};

use super::{ProcessingMode, ProcessingStatus, Processor, ids};

/// Segment standing in for the hash prefix of a production bundle path. Only its depth matters.
pub const HASH_SEGMENT_PLACEHOLDER: &str = "prefix";

const UNTOUCHED_SCHEMES: &[&str] = &["data:", "mhtml:", "cid:", "sprite:"];

pub(crate) fn url_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r"(?i)url\(\s*((?:\\\)|[^)])*?)\s*\)").expect("invalid css url regex")
  })
}

/// Replace every url in `css` with the result of `rewrite_image`, called with the cleaned,
/// stylesheet relative url. Quotes, query strings and fragments are preserved. Absolute urls and
/// `data:`, `mhtml:`, `cid:` and `sprite:` urls are left alone.
///
/// When `context_path` is set, absolute urls starting with it are first turned into urls relative
/// to `css_path`.
pub fn rewrite_css_urls<F>(
  css: &str,
  css_path: &str,
  context_path: Option<&str>,
  mut rewrite_image: F,
) -> BundlingResult<String>
where
  F: FnMut(&str) -> BundlingResult<String>,
{
  let context_path = context_path.map(as_dir_path);
  let mut out = String::with_capacity(css.len());
  let mut position = 0;

  for caps in url_pattern().captures_iter(css) {
    let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
      continue;
    };
    out.push_str(&css[position..whole.start()]);
    position = whole.end();

    match rewrite_declaration(inner.as_str(), css_path, context_path.as_deref(), &mut rewrite_image)? {
      Some(rewritten) => out.push_str(&rewritten),
      None => out.push_str(whole.as_str()),
    }
  }
  out.push_str(&css[position..]);
  Ok(out)
}

fn rewrite_declaration<F>(
  inner: &str,
  css_path: &str,
  context_path: Option<&str>,
  rewrite_image: &mut F,
) -> BundlingResult<Option<String>>
where
  F: FnMut(&str) -> BundlingResult<String>,
{
  let inner = inner.trim();
  let (quote, url) = match inner.chars().next() {
    Some(quote @ ('"' | '\'')) => (quote.to_string(), inner.trim_matches(quote).trim()),
    _ => (String::new(), inner),
  };

  let lowered = url.to_ascii_lowercase();
  if url.is_empty() || UNTOUCHED_SCHEMES.iter().any(|scheme| lowered.starts_with(scheme)) {
    return Ok(None);
  }

  let (url, suffix) = match url.find(['?', '#']) {
    Some(idx) => url.split_at(idx),
    None => (url, ""),
  };

  let mut url = url.to_string();
  if let Some(context) = context_path
    && url.starts_with(context)
  {
    url = format!("{}{}", root_relative_path(css_path), &url[context.len()..]);
  }

  if is_absolute_url(&url) {
    return Ok(Some(format!("url({quote}{url}{suffix}{quote})")));
  }

  let relative = url.strip_prefix("./").unwrap_or(&url);
  let image = rewrite_image(relative)?;
  Ok(Some(format!("url({quote}{image}{suffix}{quote})")))
}

/// Root relative (`/img/a.png`) or with a scheme (`http://...`).
fn is_absolute_url(url: &str) -> bool {
  match url.find('/') {
    Some(0) => true,
    Some(idx) => url[idx + 1..].starts_with('/'),
    None => false,
  }
}

/// Path a bundle is served from in production: `/<hash>/<bundle id>`, below the servlet mapping
/// of its type when there is one.
pub fn full_bundle_path(status: &ProcessingStatus<'_>) -> String {
  let mut prefix = match &status.settings.servlet_mapping {
    Some(mapping) => join_paths(mapping, HASH_SEGMENT_PLACEHOLDER),
    None => as_path(HASH_SEGMENT_PLACEHOLDER),
  };
  prefix.push('/');
  concat_web_path(&prefix, &status.bundle.id)
    .unwrap_or_else(|| join_paths(&prefix, &status.bundle.id))
}

/// Location, in web path terms, of the image `url` found in stylesheet `css_path`.
/// `None` when the url climbs above the web root.
pub(crate) fn image_source_path(status: &ProcessingStatus<'_>, css_path: &str, url: &str) -> Option<String> {
  let registry = status.registry;
  if registry.is_generated_binary_resource(url) {
    return Some(url.to_string());
  }
  if registry.is_handling_css_image(css_path) {
    return concat_web_path(css_path, url);
  }
  let root = if registry.is_path_generated(css_path) {
    css_path
      .split_once(PREFIX_SEPARATOR)
      .map(|(_, rest)| rest)
      .unwrap_or(css_path)
  } else {
    css_path
  };
  concat_web_path(root, url)
}

/// Cache-busted url of a binary resource, memoized in the status and the shared cache. Missing
/// images keep their url.
pub(crate) fn cache_busted_image(status: &mut ProcessingStatus<'_>, image: &str) -> String {
  if let Some(busted) = status.image_cache_busters.get(image) {
    return busted.clone();
  }
  if let Some(busted) = status.binary_cache.get(image) {
    status
      .image_cache_busters
      .insert(image.to_string(), busted.clone());
    return busted;
  }

  match cache_busted_url(
    image,
    status.reader,
    status.registry,
    status.settings.binary_hash_algorithm,
  ) {
    Ok(busted) => {
      debug!(image, busted = %busted, "cache busting image");
      status.binary_cache.insert(image, busted.clone());
      status
        .image_cache_busters
        .insert(image.to_string(), busted.clone());
      busted
    }
    Err(err) => {
      info!(image, css = status.current_path(), %err, "image not found, url left as is");
      status
        .image_cache_busters
        .insert(image.to_string(), image.to_string());
      image.to_string()
    }
  }
}

/// Url of `image` as seen from the stylesheet served at `new_css_path`.
pub(crate) fn published_image_url(
  status: &mut ProcessingStatus<'_>,
  image: &str,
  new_css_path: &str,
) -> String {
  let mut url = if is_binary_resource(image) {
    cache_busted_image(status, image)
  } else {
    image.to_string()
  };
  if let Some(mapping) = &status.settings.binary_servlet_mapping {
    url = join_paths(mapping, &url);
  }
  relative_web_path(&parent_path(new_css_path), &as_path(&url))
}

/// Rewrite the urls of a member stylesheet so they resolve from the bundle's production path.
pub fn rewrite_for_bundle(status: &mut ProcessingStatus<'_>, css: &str) -> BundlingResult<String> {
  let original_path = status.current_path().to_string();
  let new_css_path = if status.debug {
    as_path(&original_path)
  } else {
    full_bundle_path(status)
  };
  let context_path = status.settings.context_path.clone();

  rewrite_css_urls(css, &original_path, context_path.as_deref(), |url| {
    match image_source_path(status, &original_path, url) {
      Some(image) => Ok(published_image_url(status, &image, &new_css_path)),
      None => {
        warn!(url, css = %original_path, "url points out of the application context, left as is");
        Ok(url.to_string())
      }
    }
  })
}

/// `csspathrewriter` processor.
#[derive(Debug, Default, Clone, Copy)]
pub struct CssPathRewriterProcessor;

impl Processor for CssPathRewriterProcessor {
  fn id(&self) -> &str {
    ids::CSS_PATH_REWRITER
  }

  fn apply(&self, status: &mut ProcessingStatus<'_>, content: String) -> BundlingResult<String> {
    if status.mode != ProcessingMode::File {
      debug!(bundle = %status.bundle.id, "url rewriting only applies to member stylesheets");
      return Ok(content);
    }
    rewrite_for_bundle(status, &content)
  }
}

#[cfg(test)]
mod tests {
  use std::fs;

  use pretty_assertions::assert_eq;
  use tempfile::tempdir;

  use super::*;
  use crate::generator::{GeneratorRegistry, GeneratorRegistryBuilder};
  use crate::models::{Bundle, ResourceType};
  use crate::paths::{BinaryHashAlgorithm, BinaryPathCache, binary_checksum};
  use crate::postprocess::ProcessingSettings;
  use crate::reader::FileSystemReader;

  #[test]
  fn leaves_absolute_and_data_urls_alone() {
    let css = "a{background:url(data:image/png;base64,AAA)} b{background:url( 'http://x.org/a.png' )} c{src:url(/fonts/a.eot?#iefix)}";
    let out = rewrite_css_urls(css, "/css/a.css", None, |url| Ok(format!("X{url}"))).unwrap();
    assert_eq!(
      out,
      "a{background:url(data:image/png;base64,AAA)} b{background:url('http://x.org/a.png')} c{src:url(/fonts/a.eot?#iefix)}"
    );
  }

  #[test]
  fn sprite_references_survive_path_rewriting() {
    let reader = FileSystemReader::new(".");
    let registry = GeneratorRegistry::default();
    let settings = ProcessingSettings::default();
    let cache = BinaryPathCache::new();
    let bundle = Bundle::new("/bundles/all.css", "all", ResourceType::Css);
    let mut status = ProcessingStatus::new(&bundle, &reader, &registry, &settings, &cache);
    status.start_file("/css/a.css");

    let css = "a{background:url(sprite:icons/a.png)} b{background:url('SPRITE:b.png')}";
    let out = CssPathRewriterProcessor.apply(&mut status, css.into()).unwrap();
    assert_eq!(out, css);
  }

  #[test]
  fn keeps_quotes_and_suffixes() {
    let css = "a{background:url(\"./img/a.png?v=1\")} b{src:url(font.woff#x)}";
    let out = rewrite_css_urls(css, "/css/a.css", None, |url| Ok(format!("../{url}"))).unwrap();
    assert_eq!(out, "a{background:url(\"../img/a.png?v=1\")} b{src:url(../font.woff#x)}");
  }

  #[test]
  fn context_path_urls_become_relative() {
    let css = "a{background:url(/app/img/a.png)}";
    let out = rewrite_css_urls(css, "/css/a.css", Some("/app"), |url| Ok(url.to_string())).unwrap();
    assert_eq!(out, "a{background:url(../img/a.png)}");
  }

  #[test]
  fn rewrites_relative_to_the_bundle_and_busts_images() -> std::io::Result<()> {
    let temp = tempdir()?;
    fs::create_dir_all(temp.path().join("css/sub"))?;
    fs::create_dir_all(temp.path().join("img"))?;
    fs::write(temp.path().join("img/logo.png"), [1u8, 2, 3])?;

    let reader = FileSystemReader::new(temp.path());
    let registry = GeneratorRegistry::default();
    let settings = ProcessingSettings::default();
    let cache = BinaryPathCache::new();
    let bundle = Bundle::new("/bundles/all.css", "all", ResourceType::Css);
    let mut status = ProcessingStatus::new(&bundle, &reader, &registry, &settings, &cache);
    status.start_file("/css/sub/a.css");

    let css = "a{background:url(../../img/logo.png)} b{cursor:url(../missing.cur)} c{behavior:url(x.htc)}";
    let out = CssPathRewriterProcessor.apply(&mut status, css.into()).unwrap();

    let checksum = binary_checksum(&[1, 2, 3], BinaryHashAlgorithm::Crc32);
    assert_eq!(
      out,
      format!(
        "a{{background:url(../../cb{checksum}/img/logo.png)}} b{{cursor:url(../../css/missing.cur)}} c{{behavior:url(../../css/sub/x.htc)}}"
      )
    );
    assert_eq!(cache.get("/img/logo.png"), Some(format!("/cb{checksum}/img/logo.png")));
    Ok(())
  }

  #[test]
  fn binary_servlet_mapping_and_generated_images() -> std::io::Result<()> {
    let temp = tempdir()?;
    let classes = temp.path().join("classes");
    fs::create_dir_all(classes.join("img"))?;
    fs::write(classes.join("img/icon.png"), [9u8])?;

    let reader = FileSystemReader::new(temp.path()).with_classpath([&classes]);
    let registry = GeneratorRegistryBuilder::with_builtin_generators()
      .unwrap()
      .build();
    let settings = ProcessingSettings {
      binary_servlet_mapping: Some("bin".into()),
      ..ProcessingSettings::default()
    };
    let cache = BinaryPathCache::new();
    let bundle = Bundle::new("/all.css", "all", ResourceType::Css);
    let mut status = ProcessingStatus::new(&bundle, &reader, &registry, &settings, &cache);
    status.start_file("/css/a.css");

    let out = CssPathRewriterProcessor
      .apply(&mut status, "a{background:url(jar:img/icon.png)}".into())
      .unwrap();
    let checksum = binary_checksum(&[9], BinaryHashAlgorithm::Crc32);
    assert_eq!(out, format!("a{{background:url(../bin/jar_cb{checksum}/img/icon.png)}}"));
    Ok(())
  }

  #[test]
  fn full_bundle_path_honours_servlet_mapping() {
    let reader = FileSystemReader::new(".");
    let registry = GeneratorRegistry::default();
    let cache = BinaryPathCache::new();
    let bundle = Bundle::new("/bundles/all.css", "all", ResourceType::Css);

    let settings = ProcessingSettings::default();
    let status = ProcessingStatus::new(&bundle, &reader, &registry, &settings, &cache);
    assert_eq!(full_bundle_path(&status), "/prefix/bundles/all.css");

    let settings = ProcessingSettings {
      servlet_mapping: Some("/cssJawrPath/".into()),
      ..ProcessingSettings::default()
    };
    let status = ProcessingStatus::new(&bundle, &reader, &registry, &settings, &cache);
    assert_eq!(full_bundle_path(&status), "/cssJawrPath/prefix/bundles/all.css");
  }
}
