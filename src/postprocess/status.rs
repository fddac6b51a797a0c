//! Mutable context threaded through one render of a bundle.

use std::collections::HashMap;

use tracing::debug;

use crate::bundle::modified_millis;
use crate::config::properties::PropertiesConfig;
use crate::error::{BundlingError, BundlingResult};
use crate::generator::GeneratorRegistry;
use crate::models::{Bundle, FilePathMapping};
use crate::paths::{BinaryHashAlgorithm, BinaryPathCache};
use crate::reader::ResourceReaderHandler;
use crate::variant::VariantMap;

/// Default maximum size of an image inlined by the base64 encoder.
pub const DEFAULT_BASE64_MAX_FILE_SIZE: usize = 30_000;

const CHARSET: &str = "charset.name";
const BINARY_HASH_ALGORITHM: &str = "binary.hash.algorithm";
const BINARY_SERVLET_MAPPING: &str = "binary.servlet.mapping";
const URL_CONTEXT_PATH_OVERRIDE: &str = "url.context.path.override";
const SERVLET_MAPPING: &str = "servlet.mapping";
const CSS_URL_REWRITER_CONTEXT_PATH: &str = "css.url.rewriter.context.path";
const BASE64_ENCODE_BY_DEFAULT: &str = "css.postprocessor.base64ImageEncoder.encode.by.default";
const BASE64_MAX_FILE_SIZE: &str = "css.postprocessor.base64ImageEncoder.maxFileLength";
const CSSMIN_KEEP_LICENCE: &str = "css.postprocessor.cssmin.keepLicence";

/// Whether processors run over one member or over the joined bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingMode {
  /// Member level, before concatenation.
  File,
  /// Bundle level, after concatenation.
  Bundle,
}

/// Processor settings read once from the properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingSettings {
  /// Charset the bundles are written in.
  pub charset: String,
  /// Servlet mapping bundles of the processed type are served under.
  pub servlet_mapping: Option<String>,
  /// Servlet mapping binary resources are served under.
  pub binary_servlet_mapping: Option<String>,
  /// Context path that absolute stylesheet urls are rewritten from.
  pub context_path: Option<String>,
  /// Checksum algorithm of cache-busted binary urls.
  pub binary_hash_algorithm: BinaryHashAlgorithm,
  /// Inline images unless annotated otherwise.
  pub base64_encode_by_default: bool,
  /// Largest image, in bytes, the base64 encoder inlines.
  pub base64_max_file_size: usize,
  /// Keep `/*!` comments when minifying stylesheets.
  pub css_keep_licence: bool,
}

impl Default for ProcessingSettings {
  fn default() -> Self {
    Self {
      charset: "UTF-8".to_string(),
      servlet_mapping: None,
      binary_servlet_mapping: None,
      context_path: None,
      binary_hash_algorithm: BinaryHashAlgorithm::default(),
      base64_encode_by_default: true,
      base64_max_file_size: DEFAULT_BASE64_MAX_FILE_SIZE,
      css_keep_licence: false,
    }
  }
}

impl ProcessingSettings {
  /// Read the settings relevant to the resource type of `config`.
  pub fn from_properties(config: &PropertiesConfig<'_>) -> BundlingResult<Self> {
    let defaults = Self::default();
    let common_flag = |key: &str, default: bool| {
      config
        .common_property(key)
        .map(|value| value.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(default)
    };
    let non_empty = |value: Option<&str>| {
      value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
    };

    let base64_max_file_size = match config.common_property(BASE64_MAX_FILE_SIZE) {
      Some(raw) => raw.trim().parse().map_err(|_| {
        BundlingError::config(format!(
          "invalid base64 image size limit '{raw}', expected a number of bytes"
        ))
      })?,
      None => defaults.base64_max_file_size,
    };

    debug!(resource_type = %config.resource_type(), "reading processing settings");
    Ok(Self {
      charset: config.common_property_or(CHARSET, "UTF-8").trim().to_string(),
      servlet_mapping: non_empty(config.property(SERVLET_MAPPING)),
      binary_servlet_mapping: non_empty(config.common_property(BINARY_SERVLET_MAPPING)),
      context_path: non_empty(config.common_property(CSS_URL_REWRITER_CONTEXT_PATH))
        .or_else(|| non_empty(config.common_property(URL_CONTEXT_PATH_OVERRIDE))),
      binary_hash_algorithm: config
        .common_property(BINARY_HASH_ALGORITHM)
        .map(str::parse)
        .transpose()?
        .unwrap_or_default(),
      base64_encode_by_default: common_flag(BASE64_ENCODE_BY_DEFAULT, defaults.base64_encode_by_default),
      base64_max_file_size,
      css_keep_licence: common_flag(CSSMIN_KEEP_LICENCE, defaults.css_keep_licence),
    })
  }
}

/// Context of one render: the bundle, the variant being rendered and what was read so far.
pub struct ProcessingStatus<'a> {
  /// Bundle being rendered.
  pub bundle: &'a Bundle,
  /// Member or bundle level.
  pub mode: ProcessingMode,
  /// Variant combination being rendered.
  pub variants: VariantMap,
  /// Member most recently added to the content.
  pub last_path_added: Option<String>,
  /// Whether this render serves debug mode.
  pub debug: bool,
  /// Cache-busted urls already computed in this render, keyed by image path.
  pub image_cache_busters: HashMap<String, String>,
  /// Source reader.
  pub reader: &'a dyn ResourceReaderHandler,
  /// Generator lookup.
  pub registry: &'a GeneratorRegistry,
  /// Settings shared by every render.
  pub settings: &'a ProcessingSettings,
  /// Cache-busted urls shared across bundles.
  pub binary_cache: &'a BinaryPathCache,
  file_mappings: Vec<FilePathMapping>,
}

impl<'a> ProcessingStatus<'a> {
  /// Status for rendering `bundle` in bundle mode with no variant.
  pub fn new(
    bundle: &'a Bundle,
    reader: &'a dyn ResourceReaderHandler,
    registry: &'a GeneratorRegistry,
    settings: &'a ProcessingSettings,
    binary_cache: &'a BinaryPathCache,
  ) -> Self {
    Self {
      bundle,
      mode: ProcessingMode::Bundle,
      variants: VariantMap::new(),
      last_path_added: None,
      debug: false,
      image_cache_busters: HashMap::new(),
      reader,
      registry,
      settings,
      binary_cache,
      file_mappings: Vec::new(),
    }
  }

  /// Resource the content currently belongs to: the member in file mode, the bundle otherwise.
  pub fn current_path(&self) -> &str {
    match (self.mode, &self.last_path_added) {
      (ProcessingMode::File, Some(path)) => path,
      _ => &self.bundle.id,
    }
  }

  /// Enter file mode for `path`.
  pub fn start_file(&mut self, path: &str) {
    self.mode = ProcessingMode::File;
    self.last_path_added = Some(path.to_string());
  }

  /// Record that the content read `path`. Paths without a physical file are ignored.
  pub fn add_file_mapping(&mut self, path: &str) {
    let Some(physical) = self.reader.physical_path(path) else {
      return;
    };
    let Some(last_modified) = modified_millis(&physical) else {
      return;
    };
    let physical = physical.to_string_lossy().into_owned();
    match self.file_mappings.iter_mut().find(|mapping| mapping.path == physical) {
      Some(existing) => existing.last_modified = last_modified,
      None => self.file_mappings.push(FilePathMapping {
        bundle: self.bundle.id.clone(),
        path: physical,
        last_modified,
      }),
    }
  }

  /// Mappings recorded so far.
  pub fn file_mappings(&self) -> &[FilePathMapping] {
    &self.file_mappings
  }

  /// Take the recorded mappings, leaving none.
  pub fn take_file_mappings(&mut self) -> Vec<FilePathMapping> {
    std::mem::take(&mut self.file_mappings)
  }
}
