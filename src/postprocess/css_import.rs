//! Inlines `@import` rules.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::error::{BundlingError, BundlingResult};
use crate::paths::{as_path, concat_web_path, is_external_url, parent_path, relative_web_path};

use super::css_url::rewrite_css_urls;
use super::{ProcessingStatus, Processor, ids};

fn import_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(
      r#"(?i)@import\s*(?:url\(\s*["']?([^"')]*)["']?\s*\)|["']([^"']*)["'])([^;\n]*);?"#,
    )
    .expect("invalid css import regex")
  })
}

/// `cssimport` processor. Imports are resolved against the stylesheet being processed, nested
/// imports are followed, and urls of imported content are rewritten to stay valid from the
/// importing stylesheet.
#[derive(Debug, Default, Clone, Copy)]
pub struct CssImportProcessor;

impl Processor for CssImportProcessor {
  fn id(&self) -> &str {
    ids::CSS_IMPORT
  }

  fn apply(&self, status: &mut ProcessingStatus<'_>, content: String) -> BundlingResult<String> {
    let css_path = status.current_path().to_string();
    let mut chain = vec![css_path.clone()];
    inline_imports(status, &content, &css_path, &mut chain)
  }
}

fn inline_imports(
  status: &mut ProcessingStatus<'_>,
  css: &str,
  css_path: &str,
  chain: &mut Vec<String>,
) -> BundlingResult<String> {
  let mut out = String::with_capacity(css.len());
  let mut position = 0;

  for caps in import_pattern().captures_iter(css) {
    let Some(whole) = caps.get(0) else {
      continue;
    };
    out.push_str(&css[position..whole.start()]);
    position = whole.end();

    let target = caps
      .get(1)
      .or_else(|| caps.get(2))
      .map(|m| m.as_str().trim())
      .unwrap_or_default();
    let media = caps.get(3).map(|m| m.as_str().trim()).unwrap_or_default();

    if is_external_url(target) {
      warn!(css = css_path, import = target, "external stylesheet imports are not inlined, dropping the rule");
      continue;
    }

    let imported = import_path(status, css_path, target)?;
    if chain.contains(&imported) {
      return Err(BundlingError::processing(
        imported.as_str(),
        format!("circular @import: {} -> {imported}", chain.join(" -> ")),
      ));
    }

    debug!(css = css_path, import = %imported, "inlining stylesheet");
    let content = status
      .registry
      .read_resource(&imported, &status.variants, status.reader)?;
    status.add_file_mapping(&imported);

    chain.push(imported.clone());
    let content = inline_imports(status, &content, &imported, chain)?;
    chain.pop();

    let content = rewrite_imported_urls(status, &content, &imported, css_path)?;
    if media.is_empty() {
      out.push_str(&content);
    } else {
      out.push_str(&format!("@media {media} {{\n{content}\n}}\n"));
    }
  }
  out.push_str(&css[position..]);
  Ok(out)
}

fn import_path(status: &ProcessingStatus<'_>, css_path: &str, target: &str) -> BundlingResult<String> {
  let registry = status.registry;
  if target.starts_with('/') {
    return Ok(as_path(target));
  }
  if registry.is_path_generated(target) && !is_suffix_generated(status, target) {
    return Ok(target.to_string());
  }
  concat_web_path(css_path, target).ok_or_else(|| {
    BundlingError::processing(
      css_path,
      format!("@import '{target}' points out of the application context"),
    )
  })
}

fn is_suffix_generated(status: &ProcessingStatus<'_>, path: &str) -> bool {
  status
    .registry
    .resolvers()
    .any(|resolver| resolver.is_suffixed() && resolver.matches(path))
}

fn rewrite_imported_urls(
  status: &ProcessingStatus<'_>,
  css: &str,
  imported_path: &str,
  css_path: &str,
) -> BundlingResult<String> {
  let registry = status.registry;
  let handles_images = registry.is_handling_css_image(css_path);
  rewrite_css_urls(css, imported_path, status.settings.context_path.as_deref(), |url| {
    if registry.is_generated_binary_resource(url) {
      return Ok(url.to_string());
    }
    let Some(image) = concat_web_path(imported_path, url) else {
      warn!(url, css = imported_path, "url points out of the application context, left as is");
      return Ok(url.to_string());
    };
    if handles_images {
      Ok(image)
    } else {
      Ok(relative_web_path(&parent_path(css_path), &image))
    }
  })
}

#[cfg(test)]
mod tests {
  use std::fs;
  use std::path::Path;

  use pretty_assertions::assert_eq;
  use tempfile::tempdir;

  use super::*;
  use crate::generator::GeneratorRegistry;
  use crate::models::{Bundle, ResourceType};
  use crate::paths::BinaryPathCache;
  use crate::postprocess::ProcessingSettings;
  use crate::reader::FileSystemReader;

  fn write(root: &Path, relative: &str, content: &str) -> std::io::Result<()> {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
  }

  #[test]
  fn inlines_nested_imports_with_media_and_urls() -> std::io::Result<()> {
    let temp = tempdir()?;
    write(temp.path(), "css/theme/colors.css", "@import 'base/reset.css';\n.c{background:url(img/c.png)}")?;
    write(temp.path(), "css/theme/base/reset.css", "*{margin:0;background:url(../r.png)}")?;
    write(temp.path(), "css/print.css", ".p{}")?;

    let reader = FileSystemReader::new(temp.path());
    let registry = GeneratorRegistry::default();
    let settings = ProcessingSettings::default();
    let cache = BinaryPathCache::new();
    let bundle = Bundle::new("/all.css", "all", ResourceType::Css);
    let mut status = ProcessingStatus::new(&bundle, &reader, &registry, &settings, &cache);
    status.start_file("/css/main.css");

    let css = "@import url(\"theme/colors.css\");\n@import \"/css/print.css\" print;\n@import url(http://cdn.org/x.css);\nbody{}";
    let out = CssImportProcessor.apply(&mut status, css.into()).unwrap();
    assert_eq!(
      out,
      "*{margin:0;background:url(theme/r.png)}\n.c{background:url(theme/img/c.png)}\n@media print {\n.p{}\n}\n\n\nbody{}"
    );
    assert_eq!(status.file_mappings().len(), 3);
    Ok(())
  }

  #[test]
  fn detects_circular_imports() -> std::io::Result<()> {
    let temp = tempdir()?;
    write(temp.path(), "css/a.css", "@import 'b.css';")?;
    write(temp.path(), "css/b.css", "@import 'a.css';")?;

    let reader = FileSystemReader::new(temp.path());
    let registry = GeneratorRegistry::default();
    let settings = ProcessingSettings::default();
    let cache = BinaryPathCache::new();
    let bundle = Bundle::new("/all.css", "all", ResourceType::Css);
    let mut status = ProcessingStatus::new(&bundle, &reader, &registry, &settings, &cache);
    status.start_file("/css/a.css");

    let err = CssImportProcessor
      .apply(&mut status, "@import 'b.css';".into())
      .unwrap_err();
    assert!(err.to_string().contains("circular @import"));
    Ok(())
  }

  #[test]
  fn missing_import_fails() -> std::io::Result<()> {
    let temp = tempdir()?;
    let reader = FileSystemReader::new(temp.path());
    let registry = GeneratorRegistry::default();
    let settings = ProcessingSettings::default();
    let cache = BinaryPathCache::new();
    let bundle = Bundle::new("/all.css", "all", ResourceType::Css);
    let mut status = ProcessingStatus::new(&bundle, &reader, &registry, &settings, &cache);
    status.start_file("/css/a.css");

    let err = CssImportProcessor
      .apply(&mut status, "@import 'gone.css';".into())
      .unwrap_err();
    assert!(matches!(err, BundlingError::ResourceNotFound { .. }));
    Ok(())
  }
}
