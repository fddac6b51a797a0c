//! Generators produce resource content for paths that do not map to a plain source file.
//!
//! Each generator claims paths through a [`ResourceResolver`]. Generators are collected in a
//! [`GeneratorRegistryBuilder`] while configuration loads and frozen into a read-only
//! [`GeneratorRegistry`] before any bundle is processed.

use std::collections::BTreeSet;

use crate::error::BundlingResult;
use crate::reader::ResourceReaderHandler;
use crate::variant::{VariantMap, VariantSets};

mod classpath;
mod messages;
mod registry;
mod resolver;

pub use classpath::ClasspathGenerator;
pub use messages::MessagesGenerator;
pub use registry::{
  GeneratorRegistry, GeneratorRegistryBuilder, RESERVED_PREFIXES, RESERVED_SUFFIXES,
  is_binary_resource,
};
pub use resolver::{PREFIX_SEPARATOR, ResourceResolver};

/// Inputs available to a generator while it renders one resource.
pub struct GeneratorContext<'a> {
  /// Path as written in the bundle mapping, e.g. `messages:app.messages`.
  pub requested_path: &'a str,
  /// Path after the resolver stripped its prefix, e.g. `app.messages`.
  pub path: &'a str,
  /// Variant combination being rendered.
  pub variants: &'a VariantMap,
  /// Reader for source and classpath resources.
  pub reader: &'a dyn ResourceReaderHandler,
}

/// A pluggable content producer.
pub trait Generator: Send + Sync {
  /// Paths this generator claims.
  fn resolver(&self) -> ResourceResolver;

  /// Render the text content of a resource.
  fn create_resource(&self, context: &GeneratorContext<'_>) -> BundlingResult<String>;

  /// Render the bytes of a binary resource. Defaults to the text rendering.
  fn create_binary(&self, context: &GeneratorContext<'_>) -> BundlingResult<Vec<u8>> {
    self.create_resource(context).map(String::into_bytes)
  }

  /// Variant axes the generated content depends on.
  fn variant_types(&self) -> BTreeSet<String> {
    BTreeSet::new()
  }

  /// Variant values available for `path` (the resolved resource path).
  fn available_variants(
    &self,
    _path: &str,
    _reader: &dyn ResourceReaderHandler,
  ) -> BundlingResult<VariantSets> {
    Ok(VariantSets::new())
  }

  /// Output sub path, below the generator directory, for a build-time generation parameter.
  fn generation_path(&self, parameter: &str) -> String {
    parameter.replacen(PREFIX_SEPARATOR, "/", 1)
  }

  /// Whether the generator can serve binary resources such as images.
  fn is_binary(&self) -> bool {
    false
  }

  /// Whether image urls inside generated stylesheets resolve through this generator too.
  fn handles_css_images(&self) -> bool {
    false
  }
}
