//! Content processors applied to members and to joined bundles.
//!
//! A [`ProcessorChain`] is an ordered list of [`Processor`]s. Each one receives the output of
//! the previous one together with the mutable [`ProcessingStatus`] of the render. Chains are
//! built by a [`ChainFactory`] from comma separated processor ids:
//!
//! | id | processor |
//! |---|---|
//! | `JSMin` | [`JsMinProcessor`] |
//! | `cssminify` | [`CssMinProcessor`] |
//! | `csspathrewriter` | [`CssPathRewriterProcessor`] |
//! | `cssimport` | [`CssImportProcessor`] |
//! | `csscharset` | [`CharsetFilterProcessor`] |
//! | `cssCombineMedia` | [`CombineMediaProcessor`] |
//! | `license` | [`LicenseIncluderProcessor`] |
//! | `base64ImageEncoder` | [`Base64ImageProcessor`] |
//! | `none` | empty chain |

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::properties::{FACTORY_FILE_POSTPROCESSORS, FACTORY_POSTPROCESSORS, PropertiesConfig, split_list};
use crate::error::{BundlingError, BundlingResult};
use crate::models::{Bundle, ResourceType};

mod base64_image;
mod charset;
mod combine_media;
mod css_import;
mod css_min;
mod css_url;
mod custom;
mod jsmin;
mod license;
mod status;

pub use base64_image::Base64ImageProcessor;
pub use charset::{CharsetFilterProcessor, CharsetFiltered, filter_charset};
pub use combine_media::{CombineMediaProcessor, DEFAULT_MEDIA};
pub use css_import::CssImportProcessor;
pub use css_min::{CssMinProcessor, minify_css};
pub use css_url::{
  CssPathRewriterProcessor, HASH_SEGMENT_PLACEHOLDER, full_bundle_path, rewrite_css_urls,
  rewrite_for_bundle,
};
pub use custom::CustomProcessor;
pub use jsmin::{JsMinProcessor, minify};
pub use license::LicenseIncluderProcessor;
pub use status::{DEFAULT_BASE64_MAX_FILE_SIZE, ProcessingMode, ProcessingSettings, ProcessingStatus};

/// Built-in processor ids.
pub mod ids {
  /// JavaScript minifier.
  pub const JSMIN: &str = "JSMin";
  /// Stylesheet minifier.
  pub const CSS_MINIFY: &str = "cssminify";
  /// Stylesheet url rewriter.
  pub const CSS_PATH_REWRITER: &str = "csspathrewriter";
  /// `@import` inliner.
  pub const CSS_IMPORT: &str = "cssimport";
  /// `@charset` filter.
  pub const CSS_CHARSET: &str = "csscharset";
  /// Media rule wrapper.
  pub const CSS_COMBINE_MEDIA: &str = "cssCombineMedia";
  /// License includer.
  pub const LICENSE: &str = "license";
  /// Image inliner.
  pub const BASE64_IMAGE_ENCODER: &str = "base64ImageEncoder";
  /// No processing at all.
  pub const NONE: &str = "none";

  /// Canonical id for `id`, resolving the accepted aliases.
  pub fn canonical(id: &str) -> &str {
    match id {
      "jsmin" => JSMIN,
      "cssMin" => CSS_MINIFY,
      "cssUrlRewriter" => CSS_PATH_REWRITER,
      "cssImport" => CSS_IMPORT,
      "charsetFilter" => CSS_CHARSET,
      other => other,
    }
  }
}

/// One content transformation.
pub trait Processor: Send + Sync {
  /// Id the processor is configured with.
  fn id(&self) -> &str;

  /// Transform `content`.
  fn apply(&self, status: &mut ProcessingStatus<'_>, content: String) -> BundlingResult<String>;

  /// Whether the output depends on the variant being rendered beyond the content itself.
  fn is_variant_aware(&self) -> bool {
    false
  }
}

/// Processors applied in order.
#[derive(Default)]
pub struct ProcessorChain {
  processors: Vec<Box<dyn Processor>>,
}

impl std::fmt::Debug for ProcessorChain {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_list().entries(self.ids()).finish()
  }
}

impl ProcessorChain {
  /// Chain running `processors` in order.
  pub fn new(processors: Vec<Box<dyn Processor>>) -> Self {
    Self { processors }
  }

  /// Append a processor.
  pub fn push(&mut self, processor: Box<dyn Processor>) {
    self.processors.push(processor);
  }

  /// Run every processor over `content`. The first failure stops the chain.
  pub fn apply(&self, status: &mut ProcessingStatus<'_>, content: String) -> BundlingResult<String> {
    self.processors.iter().try_fold(content, |content, processor| {
      debug!(processor = processor.id(), path = status.current_path(), "applying processor");
      processor.apply(status, content)
    })
  }

  /// Ids in application order.
  pub fn ids(&self) -> Vec<&str> {
    self.processors.iter().map(|processor| processor.id()).collect()
  }

  /// Whether the chain does nothing.
  pub fn is_empty(&self) -> bool {
    self.processors.is_empty()
  }

  /// Whether any processor is variant aware.
  pub fn is_variant_aware(&self) -> bool {
    self.processors.iter().any(|processor| processor.is_variant_aware())
  }

  /// Whether a processor with `id` is part of the chain.
  pub fn contains(&self, id: &str) -> bool {
    self.processors.iter().any(|processor| processor.id() == id)
  }
}

const DEFAULT_JS_BUNDLE_CHAIN: &str = "JSMin,license";
const DEFAULT_JS_FILE_CHAIN: &str = "none";
const DEFAULT_CSS_BUNDLE_CHAIN: &str = "cssminify,license";
const DEFAULT_CSS_FILE_CHAIN: &str = "cssimport,csspathrewriter";

/// Builds processor chains from ids, including custom processors registered by the host.
#[derive(Clone, Default)]
pub struct ChainFactory {
  custom: BTreeMap<String, Arc<dyn Processor>>,
}

impl std::fmt::Debug for ChainFactory {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ChainFactory")
      .field("custom", &self.custom.keys().collect::<Vec<_>>())
      .finish()
  }
}

impl ChainFactory {
  /// Factory knowing only the built-in processors.
  pub fn new() -> Self {
    Self::default()
  }

  /// Make `processor` available under `id`. Built-in ids cannot be taken.
  pub fn register(&mut self, id: impl Into<String>, processor: Arc<dyn Processor>) -> BundlingResult<&mut Self> {
    let id = id.into();
    if builtin(&id).is_some() || id == ids::NONE {
      return Err(BundlingError::config(format!(
        "custom processor id '{id}' clashes with a built-in processor"
      )));
    }
    self.custom.insert(id, processor);
    Ok(self)
  }

  /// Ids of the registered custom processors.
  pub fn custom_ids(&self) -> impl Iterator<Item = &str> {
    self.custom.keys().map(String::as_str)
  }

  /// Chain for a comma separated list of ids. `none` yields an empty chain.
  pub fn build(&self, processor_ids: &str) -> BundlingResult<ProcessorChain> {
    let mut chain = ProcessorChain::default();
    for id in split_list(processor_ids) {
      if id == ids::NONE {
        continue;
      }
      chain.push(self.processor(&id)?);
    }
    Ok(chain)
  }

  fn processor(&self, id: &str) -> BundlingResult<Box<dyn Processor>> {
    if let Some(processor) = builtin(id) {
      return Ok(processor);
    }
    match self.custom.get(id) {
      Some(inner) => Ok(Box::new(CustomProcessor::new(id, Arc::clone(inner)))),
      None => Err(BundlingError::UnknownProcessor { id: id.to_string() }),
    }
  }

  /// Chain applied to the joined content of `bundle`.
  pub fn bundle_chain(&self, bundle: &Bundle, config: &PropertiesConfig<'_>) -> BundlingResult<ProcessorChain> {
    let default = match bundle.resource_type {
      ResourceType::Js => DEFAULT_JS_BUNDLE_CHAIN,
      ResourceType::Css => DEFAULT_CSS_BUNDLE_CHAIN,
    };
    let processor_ids = bundle
      .bundle_postprocessors
      .as_deref()
      .or_else(|| config.property(FACTORY_POSTPROCESSORS))
      .unwrap_or(default);
    let mut chain = self.build(processor_ids)?;

    let has_media = bundle
      .media
      .as_deref()
      .is_some_and(|media| !media.trim().is_empty());
    if bundle.resource_type == ResourceType::Css && has_media && !chain.contains(ids::CSS_COMBINE_MEDIA) {
      chain.push(Box::new(CombineMediaProcessor));
    }
    debug!(bundle = %bundle.id, chain = ?chain, "bundle processors");
    Ok(chain)
  }

  /// Chain applied to every member of `bundle` before joining.
  pub fn file_chain(&self, bundle: &Bundle, config: &PropertiesConfig<'_>) -> BundlingResult<ProcessorChain> {
    let default = match bundle.resource_type {
      ResourceType::Js => DEFAULT_JS_FILE_CHAIN,
      ResourceType::Css => DEFAULT_CSS_FILE_CHAIN,
    };
    let processor_ids = bundle
      .file_postprocessors
      .as_deref()
      .or_else(|| config.property(FACTORY_FILE_POSTPROCESSORS))
      .unwrap_or(default);
    let chain = self.build(processor_ids)?;
    debug!(bundle = %bundle.id, chain = ?chain, "file processors");
    Ok(chain)
  }
}

fn builtin(id: &str) -> Option<Box<dyn Processor>> {
  let processor: Box<dyn Processor> = match ids::canonical(id) {
    ids::JSMIN => Box::new(JsMinProcessor),
    ids::CSS_MINIFY => Box::new(CssMinProcessor),
    ids::CSS_PATH_REWRITER => Box::new(CssPathRewriterProcessor),
    ids::CSS_IMPORT => Box::new(CssImportProcessor),
    ids::CSS_CHARSET => Box::new(CharsetFilterProcessor),
    ids::CSS_COMBINE_MEDIA => Box::new(CombineMediaProcessor),
    ids::LICENSE => Box::new(LicenseIncluderProcessor),
    ids::BASE64_IMAGE_ENCODER => Box::new(Base64ImageProcessor),
    _ => return None,
  };
  Some(processor)
}
