use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::error::{BundlingError, BundlingResult};
use crate::reader::ResourceReaderHandler;
use crate::variant::{VariantMap, VariantSets};

use super::{ClasspathGenerator, Generator, GeneratorContext, MessagesGenerator, PREFIX_SEPARATOR, ResourceResolver};

/// Generator prefixes with a well known meaning. Using one without a registered generator is
/// a configuration error rather than a missing file.
pub const RESERVED_PREFIXES: &[&str] = &[
  "messages",
  "jar",
  "webjars",
  "acv",
  "ieCssGen",
  "sprite",
  "skin",
  "skinSwitcher",
];

/// Extensions reserved for compiled languages.
pub const RESERVED_SUFFIXES: &[&str] = &["less", "coffee"];

const BINARY_EXTENSIONS: &[&str] = &[
  "png", "gif", "jpg", "jpeg", "bmp", "ico", "svg", "webp", "cur", "woff", "woff2", "ttf", "eot",
  "otf",
];

/// Whether `path` names an image or font, judged by its extension.
pub fn is_binary_resource(path: &str) -> bool {
  let path = path.split(['?', '#']).next().unwrap_or(path);
  path
    .rsplit_once('.')
    .map(|(_, extension)| extension.to_ascii_lowercase())
    .is_some_and(|extension| BINARY_EXTENSIONS.contains(&extension.as_str()))
}

/// Collects generators during configuration loading.
#[derive(Default)]
pub struct GeneratorRegistryBuilder {
  entries: Vec<(ResourceResolver, Arc<dyn Generator>)>,
}

impl GeneratorRegistryBuilder {
  /// Empty builder.
  pub fn new() -> Self {
    Self::default()
  }

  /// Builder preloaded with the `jar:` and `messages:` generators.
  pub fn with_builtin_generators() -> BundlingResult<Self> {
    let mut builder = Self::new();
    builder.register(Arc::new(ClasspathGenerator))?;
    builder.register(Arc::new(MessagesGenerator))?;
    Ok(builder)
  }

  /// Add a generator, rejecting a resolver that duplicates an existing one.
  pub fn register(&mut self, generator: Arc<dyn Generator>) -> BundlingResult<&mut Self> {
    let resolver = generator.resolver();
    if self
      .entries
      .iter()
      .any(|(existing, _)| existing.is_same_as(&resolver))
    {
      return Err(BundlingError::DuplicateResolver {
        resolver: resolver.to_string(),
      });
    }
    debug!(%resolver, "registered generator");
    self.entries.push((resolver, generator));
    Ok(self)
  }

  /// Freeze into a read-only registry. Suffix resolvers are tried before prefix resolvers;
  /// registration order is kept within each group.
  pub fn build(self) -> GeneratorRegistry {
    let mut entries = self.entries;
    entries.sort_by_key(|(resolver, _)| !resolver.is_suffixed());
    GeneratorRegistry { entries }
  }
}

/// Immutable lookup from resource paths to generators.
#[derive(Clone)]
pub struct GeneratorRegistry {
  entries: Vec<(ResourceResolver, Arc<dyn Generator>)>,
}

impl std::fmt::Debug for GeneratorRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_list()
      .entries(self.entries.iter().map(|(resolver, _)| resolver.to_string()))
      .finish()
  }
}

impl Default for GeneratorRegistry {
  fn default() -> Self {
    GeneratorRegistryBuilder::new().build()
  }
}

impl GeneratorRegistry {
  /// Resolvers in lookup order.
  pub fn resolvers(&self) -> impl Iterator<Item = &ResourceResolver> {
    self.entries.iter().map(|(resolver, _)| resolver)
  }

  /// First generator claiming `path`, with the resolved resource path.
  pub fn resolve(&self, path: &str) -> Option<(&dyn Generator, String)> {
    self.entries.iter().find_map(|(resolver, generator)| {
      resolver
        .resolve(path)
        .map(|resource| (generator.as_ref(), resource))
    })
  }

  /// Whether a generator claims `path`.
  pub fn is_path_generated(&self, path: &str) -> bool {
    self.resolve(path).is_some()
  }

  /// Whether `path` is an image or font served by a binary capable generator.
  pub fn is_generated_binary_resource(&self, path: &str) -> bool {
    is_binary_resource(path)
      && self
        .resolve(path)
        .is_some_and(|(generator, _)| generator.is_binary())
  }

  /// Whether images referenced by the stylesheet at `path` resolve through its generator.
  pub fn is_handling_css_image(&self, path: &str) -> bool {
    self
      .resolve(path)
      .is_some_and(|(generator, _)| generator.handles_css_images())
  }

  /// Variant axes a generated path depends on; empty for plain files.
  pub fn generated_resource_variant_types(&self, path: &str) -> BTreeSet<String> {
    self
      .resolve(path)
      .map(|(generator, _)| generator.variant_types())
      .unwrap_or_default()
  }

  /// Variant values a generated path can be rendered for.
  pub fn available_variants(
    &self,
    path: &str,
    reader: &dyn ResourceReaderHandler,
  ) -> BundlingResult<VariantSets> {
    match self.resolve(path) {
      Some((generator, resource)) => generator.available_variants(&resource, reader),
      None => Ok(VariantSets::new()),
    }
  }

  /// Reserved prefix or suffix used by `path` that no registered generator claims.
  pub fn unregistered_reserved_token(&self, path: &str) -> Option<String> {
    if self.is_path_generated(path) {
      return None;
    }
    if let Some((prefix, _)) = path.split_once(PREFIX_SEPARATOR) {
      if RESERVED_PREFIXES.contains(&prefix) {
        return Some(format!("{prefix}{PREFIX_SEPARATOR}"));
      }
    }
    path
      .rsplit_once('.')
      .map(|(_, extension)| extension)
      .filter(|extension| RESERVED_SUFFIXES.contains(extension))
      .map(|extension| format!("*.{extension}"))
  }

  /// Text content of a member, generated or read from the sources.
  pub fn read_resource(
    &self,
    path: &str,
    variants: &VariantMap,
    reader: &dyn ResourceReaderHandler,
  ) -> BundlingResult<String> {
    match self.resolve(path) {
      Some((generator, resource)) => generator.create_resource(&GeneratorContext {
        requested_path: path,
        path: &resource,
        variants,
        reader,
      }),
      None => reader.resource(path),
    }
  }

  /// Bytes of a binary resource, generated or read from the sources.
  pub fn read_binary(
    &self,
    path: &str,
    reader: &dyn ResourceReaderHandler,
  ) -> BundlingResult<Vec<u8>> {
    match self.resolve(path) {
      Some((generator, resource)) => generator.create_binary(&GeneratorContext {
        requested_path: path,
        path: &resource,
        variants: &VariantMap::new(),
        reader,
      }),
      None => reader.resource_bytes(path),
    }
  }

  /// Output sub path for a build-time generation parameter such as `messages:app@fr`.
  pub fn generation_path(&self, parameter: &str) -> String {
    match self.resolve(parameter) {
      Some((generator, _)) => generator.generation_path(parameter),
      None => parameter.replacen(PREFIX_SEPARATOR, "/", 1),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  struct Fixed(ResourceResolver, &'static str);

  impl Generator for Fixed {
    fn resolver(&self) -> ResourceResolver {
      self.0.clone()
    }

    fn create_resource(&self, _context: &GeneratorContext<'_>) -> BundlingResult<String> {
      Ok(self.1.to_string())
    }
  }

  #[test]
  fn rejects_duplicate_resolvers() {
    let mut builder = GeneratorRegistryBuilder::new();
    builder
      .register(Arc::new(Fixed(ResourceResolver::prefixed("tpl"), "a")))
      .unwrap();
    let err = builder
      .register(Arc::new(Fixed(ResourceResolver::prefixed("tpl"), "b")))
      .err()
      .unwrap();
    assert!(matches!(err, BundlingError::DuplicateResolver { .. }));
  }

  #[test]
  fn suffix_resolvers_win_over_prefix_resolvers() {
    let mut builder = GeneratorRegistryBuilder::new();
    builder
      .register(Arc::new(Fixed(ResourceResolver::prefixed("jar"), "prefix")))
      .unwrap()
      .register(Arc::new(Fixed(ResourceResolver::suffixed("less"), "suffix")))
      .unwrap();
    let registry = builder.build();

    let (generator, resource) = registry.resolve("jar:css/site.less").unwrap();
    assert_eq!(resource, "jar:css/site.less");
    assert_eq!(generator.resolver(), ResourceResolver::suffixed("less"));

    let (_, resource) = registry.resolve("jar:css/site.css").unwrap();
    assert_eq!(resource, "css/site.css");
    assert!(!registry.is_path_generated("/css/site.css"));
  }

  #[test]
  fn reports_reserved_tokens_without_generator() {
    let registry = GeneratorRegistryBuilder::with_builtin_generators()
      .unwrap()
      .build();
    assert_eq!(
      registry.unregistered_reserved_token("webjars:jquery.js").as_deref(),
      Some("webjars:")
    );
    assert_eq!(
      registry.unregistered_reserved_token("/css/site.less").as_deref(),
      Some("*.less")
    );
    assert_eq!(registry.unregistered_reserved_token("jar:a.js"), None);
    assert_eq!(registry.unregistered_reserved_token("/js/a.js"), None);
  }

  #[test]
  fn identifies_generated_binary_resources() {
    let registry = GeneratorRegistryBuilder::with_builtin_generators()
      .unwrap()
      .build();
    assert!(registry.is_generated_binary_resource("jar:img/logo.png"));
    assert!(!registry.is_generated_binary_resource("jar:js/app.js"));
    assert!(!registry.is_generated_binary_resource("/img/logo.png"));
    assert_eq!(
      registry.generation_path("messages:messages@fr"),
      "messages/messages_fr.js"
    );
    assert_eq!(registry.generation_path("jar:css/a.css"), "jar/css/a.css");
  }
}
