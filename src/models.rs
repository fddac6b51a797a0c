//! Data structures describing configured bundles and the paths they publish.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BundlingError;
use crate::generator::GeneratorRegistry;
use crate::variant::{
  VariantMap, VariantSets, available_variant_map, variant_bundle_name_with_suffix, variant_key,
  variant_key_for_types,
};

/// Kind of text resource a bundle aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
  /// JavaScript bundles.
  Js,
  /// Stylesheet bundles.
  Css,
}

impl ResourceType {
  /// Both resource types, JavaScript first.
  pub const ALL: [ResourceType; 2] = [ResourceType::Js, ResourceType::Css];

  /// File extension and properties namespace of the type.
  pub fn extension(self) -> &'static str {
    match self {
      Self::Js => "js",
      Self::Css => "css",
    }
  }

  /// Type of the resource at `path`, judged by its extension.
  pub fn from_path(path: &str) -> Option<Self> {
    let (_, extension) = path.rsplit_once('.')?;
    extension.parse().ok()
  }
}

impl fmt::Display for ResourceType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.extension())
  }
}

impl FromStr for ResourceType {
  type Err = BundlingError;

  fn from_str(value: &str) -> Result<Self, Self::Err> {
    match value.to_ascii_lowercase().as_str() {
      "js" => Ok(Self::Js),
      "css" => Ok(Self::Css),
      other => Err(BundlingError::config(format!("unknown resource type '{other}'"))),
    }
  }
}

/// When a bundle is rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionPattern {
  /// Loaded on every page, ahead of regular bundles.
  pub global: bool,
  /// Only emitted in debug mode.
  pub include_only_on_debug: bool,
  /// Never emitted in debug mode.
  pub exclude_on_debug: bool,
  /// Position among global bundles; lower values come first.
  pub order: i32,
}

/// One configured logical bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
  /// Published path, such as `/bundles/all.js`.
  pub id: String,
  /// Name used in the properties keys.
  pub name: String,
  /// JavaScript or stylesheet.
  pub resource_type: ResourceType,
  /// Ordered member paths, plain files or generator paths.
  pub item_paths: Vec<String>,
  /// License files prepended by the license processor.
  pub license_paths: Vec<String>,
  /// Debug and ordering flags.
  pub inclusion: InclusionPattern,
  /// Variant axes the bundle is rendered for.
  pub variants: VariantSets,
  /// Names of bundles that must be loaded before this one.
  pub dependencies: Vec<String>,
  /// External URL used instead of the bundle in production.
  pub alternate_production_url: Option<String>,
  /// URL used instead of the members in debug mode.
  pub debug_url: Option<String>,
  /// Internet Explorer conditional comment expression.
  pub explorer_condition: Option<String>,
  /// Bundle level processor ids, overriding the type defaults.
  pub bundle_postprocessors: Option<String>,
  /// File level processor ids, overriding the type defaults.
  pub file_postprocessors: Option<String>,
  /// Media query for stylesheet bundles.
  pub media: Option<String>,
  /// Prefix prepended to every path the bundle publishes.
  pub bundle_prefix: String,
  /// Whether a member changed since the last run.
  pub dirty: bool,
  hash_prefixes: BTreeMap<String, String>,
}

impl Bundle {
  /// Bundle with no members and default settings.
  pub fn new(id: impl Into<String>, name: impl Into<String>, resource_type: ResourceType) -> Self {
    Self {
      id: id.into(),
      name: name.into(),
      resource_type,
      item_paths: Vec::new(),
      license_paths: Vec::new(),
      inclusion: InclusionPattern::default(),
      variants: VariantSets::new(),
      dependencies: Vec::new(),
      alternate_production_url: None,
      debug_url: None,
      explorer_condition: None,
      bundle_postprocessors: None,
      file_postprocessors: None,
      media: None,
      bundle_prefix: String::new(),
      dirty: true,
      hash_prefixes: BTreeMap::new(),
    }
  }

  /// Record the content hash of the rendering for `variant_key`; the empty key is the default.
  pub fn set_hash_prefix(&mut self, variant_key: impl Into<String>, hash: impl Into<String>) {
    self.hash_prefixes.insert(variant_key.into(), hash.into());
  }

  /// Content hash recorded for `variant_key`.
  pub fn hash_prefix(&self, variant_key: &str) -> Option<&str> {
    self.hash_prefixes.get(variant_key).map(String::as_str)
  }

  /// Variant key of the rendering served for `requested`.
  pub fn available_variant_key(&self, requested: &VariantMap) -> String {
    if self.variants.is_empty() {
      return String::new();
    }
    variant_key(Some(&available_variant_map(&self.variants, requested)))
  }

  /// Leading segment of the production URL: `<hash>/` or `<hash>.<variant key>/`.
  ///
  /// Returns `None` until the hash of the matching rendering is recorded.
  pub fn url_prefix(&self, requested: &VariantMap) -> Option<String> {
    let key = self.available_variant_key(requested);
    let hash = self.hash_prefix(&key)?;
    if key.is_empty() {
      Some(format!("{hash}/"))
    } else {
      Some(format!("{hash}.{key}/"))
    }
  }

  /// Debug paths of the members. Generated members carry the variant suffix of the axes
  /// their generator depends on.
  pub fn item_debug_paths(&self, requested: &VariantMap, registry: &GeneratorRegistry) -> Vec<String> {
    if requested.is_empty() {
      return self.item_paths.clone();
    }
    self
      .item_paths
      .iter()
      .map(|path| {
        if !registry.is_path_generated(path) {
          return path.clone();
        }
        let types = registry.generated_resource_variant_types(path);
        let key = variant_key_for_types(Some(requested), &types);
        variant_bundle_name_with_suffix(path, Some(&key), true)
      })
      .collect()
  }

  /// Every recorded hash, keyed by variant key.
  pub fn hash_prefixes(&self) -> &BTreeMap<String, String> {
    &self.hash_prefixes
  }
}

/// One path produced by a bundle path iterator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BundlePath {
  /// Bundle prefix the path is served under.
  pub prefix: String,
  /// Path of the resource.
  pub path: String,
  /// Whether the path is an alternate URL rather than one produced by the bundler.
  pub is_external: bool,
}

impl BundlePath {
  /// Path produced by the bundler.
  pub fn new(prefix: impl Into<String>, path: impl Into<String>) -> Self {
    Self {
      prefix: prefix.into(),
      path: path.into(),
      is_external: false,
    }
  }

  /// Alternate URL configured for the bundle.
  pub fn external(prefix: impl Into<String>, path: impl Into<String>) -> Self {
    Self {
      prefix: prefix.into(),
      path: path.into(),
      is_external: true,
    }
  }
}

/// A source file that contributed to a bundle, with its modification time when read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePathMapping {
  /// Id of the bundle the file belongs to.
  pub bundle: String,
  /// Physical path of the file.
  pub path: String,
  /// Milliseconds since the Unix epoch.
  pub last_modified: u64,
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::generator::GeneratorRegistryBuilder;
  use crate::variant::{VariantSet, variant_sets};

  fn locale_bundle() -> Bundle {
    let mut bundle = Bundle::new("/js/bundle/msg.js", "msg", ResourceType::Js);
    bundle.variants = variant_sets([VariantSet::new("locale", "", ["", "fr", "en"]).unwrap()]);
    bundle.set_hash_prefix("", "N1785986402");
    bundle.set_hash_prefix("fr", "12345");
    bundle
  }

  #[test]
  fn url_prefix_uses_available_variant() {
    let bundle = locale_bundle();
    let fr = VariantMap::from([("locale".to_string(), Some("fr".to_string()))]);
    let de = VariantMap::from([("locale".to_string(), Some("de".to_string()))]);

    assert_eq!(bundle.url_prefix(&VariantMap::new()).as_deref(), Some("N1785986402/"));
    assert_eq!(bundle.url_prefix(&fr).as_deref(), Some("12345.fr/"));
    assert_eq!(bundle.url_prefix(&de).as_deref(), Some("N1785986402/"));
  }

  #[test]
  fn missing_hash_yields_no_prefix() {
    let bundle = Bundle::new("/js/a.js", "a", ResourceType::Js);
    assert_eq!(bundle.url_prefix(&VariantMap::new()), None);
  }

  #[test]
  fn generated_members_carry_variant_suffix_in_debug() {
    let registry = GeneratorRegistryBuilder::with_builtin_generators()
      .unwrap()
      .build();
    let mut bundle = locale_bundle();
    bundle.item_paths = vec!["/js/app.js".into(), "messages:app.messages".into()];
    let fr = VariantMap::from([("locale".to_string(), Some("fr".to_string()))]);

    assert_eq!(bundle.item_debug_paths(&fr, &registry), vec![
      "/js/app.js".to_string(),
      "messages:app.messages@fr".to_string()
    ]);
  }

  #[test]
  fn resource_type_from_extension() {
    assert_eq!(ResourceType::from_path("/css/site.css"), Some(ResourceType::Css));
    assert_eq!(ResourceType::from_path("/img/logo.png"), None);
  }
}
