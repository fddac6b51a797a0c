//! Flat key/value bundle definitions using the `jawr.<type>.bundle.<name>.<suffix>` grammar.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use regex::Regex;

use crate::error::{BundlingError, BundlingResult};
use crate::models::ResourceType;
use crate::variant::{VariantSet, VariantSets};

/// Namespace every key starts with.
pub const PROPS_PREFIX: &str = "jawr.";

/// Bundle output path.
pub const BUNDLE_ID: &str = ".id";
/// Comma separated member mappings.
pub const BUNDLE_MAPPINGS: &str = ".mappings";
/// Only emitted in debug mode.
pub const BUNDLE_DEBUG_ONLY: &str = ".debugonly";
/// Never emitted in debug mode.
pub const BUNDLE_DEBUG_NEVER: &str = ".debugnever";
/// Marks a bundle loaded on every page, before the others.
pub const BUNDLE_GLOBAL: &str = ".global";
/// Relative ordering among global bundles.
pub const BUNDLE_ORDER: &str = ".order";
/// Prefix the bundle is published under.
pub const BUNDLE_PREFIX: &str = ".bundle.prefix";
/// Names of bundles this bundle depends on.
pub const BUNDLE_DEPENDENCIES: &str = ".dependencies";
/// Bundle level processor ids.
pub const BUNDLE_POSTPROCESSORS: &str = ".bundlepostprocessors";
/// File level processor ids.
pub const BUNDLE_FILE_POSTPROCESSORS: &str = ".filepostprocessors";
/// Conditional comment expression.
pub const BUNDLE_IE_CONDITION: &str = ".ieonly.condition";
/// External URL used in production instead of the generated bundle.
pub const BUNDLE_PRODUCTION_URL: &str = ".productionURL";
/// URL used in debug mode instead of member paths.
pub const BUNDLE_DEBUG_URL: &str = ".debugURL";
/// Declared variants, `type:default:v1,v2;type2:...`.
pub const BUNDLE_VARIANTS: &str = ".variants";
/// Media query used by the media combiner.
pub const BUNDLE_MEDIA: &str = ".media";

/// Factory wide bundle level processors.
pub const FACTORY_POSTPROCESSORS: &str = "bundle.factory.bundlepostprocessors";
/// Factory wide file level processors.
pub const FACTORY_FILE_POSTPROCESSORS: &str = "bundle.factory.filepostprocessors";
/// Base directory prepended to relative mappings.
pub const RESOURCES_BASEDIR: &str = "bundle.basedir";

const CUSTOM_POSTPROCESSORS: &str = "jawr.custom.postprocessors";

/// Ordered, raw key/value pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
  entries: IndexMap<String, String>,
}

impl Properties {
  /// Parse `.properties` formatted text.
  pub fn parse(text: &str) -> Self {
    Self {
      entries: parse_properties(text),
    }
  }

  /// Read and parse a `.properties` file.
  pub fn load(path: &Path) -> Result<Self> {
    let text = fs::read_to_string(path)
      .with_context(|| format!("failed to read properties file {}", path.display()))?;
    Ok(Self::parse(&text))
  }

  /// Raw lookup.
  pub fn get(&self, key: &str) -> Option<&str> {
    self.entries.get(key).map(String::as_str)
  }

  /// Set or replace a value, keeping the original position of existing keys.
  pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
    self.entries.insert(key.into(), value.into());
  }

  /// Copy every entry of `other` over this set.
  pub fn extend(&mut self, other: &Properties) {
    for (key, value) in &other.entries {
      self.entries.insert(key.clone(), value.clone());
    }
  }

  /// Entries in declaration order.
  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self
      .entries
      .iter()
      .map(|(key, value)| (key.as_str(), value.as_str()))
  }

  /// Number of entries.
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  /// Whether there are no entries.
  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Boolean value of `key`, `default` when missing.
  pub fn boolean(&self, key: &str, default: bool) -> bool {
    self
      .get(key)
      .map(|value| value.trim().eq_ignore_ascii_case("true"))
      .unwrap_or(default)
  }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Properties {
  fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
    Self {
      entries: iter
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect(),
    }
  }
}

/// Typed accessors over [`Properties`] scoped to one resource type.
#[derive(Debug, Clone, Copy)]
pub struct PropertiesConfig<'a> {
  props: &'a Properties,
  resource_type: ResourceType,
}

impl<'a> PropertiesConfig<'a> {
  /// Accessors for the `jawr.<type>.` namespace.
  pub fn new(props: &'a Properties, resource_type: ResourceType) -> Self {
    Self {
      props,
      resource_type,
    }
  }

  /// Underlying properties.
  pub fn properties(&self) -> &'a Properties {
    self.props
  }

  /// Resource type the accessors are scoped to.
  pub fn resource_type(&self) -> ResourceType {
    self.resource_type
  }

  fn prefix(&self) -> String {
    format!("{PROPS_PREFIX}{}.", self.resource_type.extension())
  }

  fn bundle_key(&self, bundle_name: &str, key: &str) -> String {
    format!("{}bundle.{bundle_name}{key}", self.prefix())
  }

  /// `jawr.<key>`.
  pub fn common_property(&self, key: &str) -> Option<&'a str> {
    self.props.get(&format!("{PROPS_PREFIX}{key}"))
  }

  /// `jawr.<key>` with a fallback.
  pub fn common_property_or(&self, key: &str, default: &'a str) -> &'a str {
    self.common_property(key).unwrap_or(default)
  }

  /// Comma separated `jawr.<key>` as a set.
  pub fn common_property_as_set(&self, key: &str) -> BTreeSet<String> {
    split_list(self.common_property(key).unwrap_or_default()).collect()
  }

  /// `jawr.<type>.<key>`.
  pub fn property(&self, key: &str) -> Option<&'a str> {
    self.props.get(&format!("{}{key}", self.prefix()))
  }

  /// Comma separated `jawr.<type>.<key>` as a set.
  pub fn property_as_set(&self, key: &str) -> BTreeSet<String> {
    split_list(self.property(key).unwrap_or_default()).collect()
  }

  /// `jawr.<type>.bundle.<name><key>`.
  pub fn custom_bundle_property(&self, bundle_name: &str, key: &str) -> Option<&'a str> {
    self.props.get(&self.bundle_key(bundle_name, key))
  }

  /// Comma separated bundle property as an ordered list.
  pub fn custom_bundle_property_as_list(&self, bundle_name: &str, key: &str) -> Vec<String> {
    split_list(self.custom_bundle_property(bundle_name, key).unwrap_or_default()).collect()
  }

  /// Comma separated bundle property as a set.
  pub fn custom_bundle_property_as_set(&self, bundle_name: &str, key: &str) -> BTreeSet<String> {
    split_list(self.custom_bundle_property(bundle_name, key).unwrap_or_default()).collect()
  }

  /// Bundle property of the form `key:v1,v2;key2:v3`.
  pub fn custom_bundle_property_as_map(
    &self,
    bundle_name: &str,
    key: &str,
  ) -> BundlingResult<BTreeMap<String, Vec<String>>> {
    let raw = self.custom_bundle_property(bundle_name, key).unwrap_or_default();
    let mut map = BTreeMap::new();
    for entry in raw.split(';').map(str::trim).filter(|entry| !entry.is_empty()) {
      let (map_key, values) = entry.split_once(':').ok_or_else(|| {
        BundlingError::config(format!(
          "malformed map entry '{entry}' in {}",
          self.bundle_key(bundle_name, key)
        ))
      })?;
      map.insert(map_key.trim().to_string(), split_list(values).collect());
    }
    Ok(map)
  }

  /// Variant sets declared with `type:default:v1,v2;...`.
  ///
  /// An empty default is written as nothing between the colons (`locale::,fr`).
  pub fn custom_bundle_variant_sets(&self, bundle_name: &str) -> BundlingResult<VariantSets> {
    let raw = self
      .custom_bundle_property(bundle_name, BUNDLE_VARIANTS)
      .unwrap_or_default();
    let mut sets = VariantSets::new();
    for entry in raw.split(';').map(str::trim).filter(|entry| !entry.is_empty()) {
      let parts: Vec<&str> = entry.splitn(3, ':').collect();
      let [variant_type, default_variant, values] = parts.as_slice() else {
        return Err(BundlingError::config(format!(
          "malformed variant declaration '{entry}' for bundle '{bundle_name}', expected type:default:values"
        )));
      };
      let values: Vec<String> = values.split(',').map(|v| v.trim().to_string()).collect();
      let set = VariantSet::new(variant_type.trim(), default_variant.trim(), values)?;
      sets.insert(set.variant_type().to_string(), set);
    }
    Ok(sets)
  }

  /// Names of bundles declaring an `.id`, in declaration order.
  pub fn bundle_names(&self) -> Vec<String> {
    let pattern = format!("{}bundle.", self.prefix());
    self
      .props
      .iter()
      .filter_map(|(key, _)| {
        let name = key.strip_prefix(&pattern)?.strip_suffix(BUNDLE_ID)?;
        is_bundle_name(name).then(|| name.to_string())
      })
      .collect()
  }

  /// Custom processor ids mapped to the plugin names they refer to.
  pub fn custom_postprocessor_map(&self) -> BTreeMap<String, String> {
    match self.props.get(&format!("{CUSTOM_POSTPROCESSORS}.names")) {
      Some(names) => split_list(names)
        .filter_map(|id| {
          let plugin = self.props.get(&format!("{CUSTOM_POSTPROCESSORS}.{id}.class"))?;
          Some((id, plugin.trim().to_string()))
        })
        .collect(),
      None => self.custom_map(postprocessor_class_pattern()),
    }
  }

  /// Custom global preprocessors by id.
  pub fn custom_global_preprocessor_map(&self) -> BTreeMap<String, String> {
    self.custom_map(global_preprocessor_class_pattern())
  }

  /// Custom global postprocessors by id.
  pub fn custom_global_postprocessor_map(&self) -> BTreeMap<String, String> {
    self.custom_map(global_postprocessor_class_pattern())
  }

  fn custom_map(&self, pattern: &Regex) -> BTreeMap<String, String> {
    self
      .props
      .iter()
      .filter_map(|(key, value)| {
        let captures = pattern.captures(key)?;
        Some((captures[1].to_string(), value.trim().to_string()))
      })
      .collect()
  }
}

fn is_bundle_name(name: &str) -> bool {
  !name.is_empty()
    && name
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn postprocessor_class_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r"^jawr\.custom\.postprocessors\.([-_a-zA-Z0-9]+)\.class$")
      .expect("invalid custom postprocessor regex")
  })
}

fn global_preprocessor_class_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r"^jawr\.custom\.global\.preprocessor\.([-_a-zA-Z0-9]+)\.class$")
      .expect("invalid global preprocessor regex")
  })
}

fn global_postprocessor_class_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r"^jawr\.custom\.global\.postprocessor\.([-_a-zA-Z0-9]+)\.class$")
      .expect("invalid global postprocessor regex")
  })
}

/// Split a comma separated list, trimming entries and dropping empty ones.
pub fn split_list(raw: &str) -> impl Iterator<Item = String> + '_ {
  raw
    .split(',')
    .map(str::trim)
    .filter(|value| !value.is_empty())
    .map(str::to_string)
}

/// Parse `.properties` text: `#`/`!` comments, `=`/`:`/whitespace separators,
/// backslash continuations and escapes including `\uXXXX`.
pub fn parse_properties(text: &str) -> IndexMap<String, String> {
  let mut entries = IndexMap::new();
  let mut lines = text.lines();

  while let Some(line) = lines.next() {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
      continue;
    }

    let mut logical = String::from(trimmed);
    while ends_with_continuation(&logical) {
      logical.pop();
      match lines.next() {
        Some(next) => logical.push_str(next.trim_start()),
        None => break,
      }
    }

    let (key, value) = split_key_value(&logical);
    entries.insert(unescape(key), unescape(value));
  }

  entries
}

fn ends_with_continuation(line: &str) -> bool {
  line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

fn split_key_value(line: &str) -> (&str, &str) {
  let mut escaped = false;
  let mut key_end = line.len();
  for (idx, c) in line.char_indices() {
    if escaped {
      escaped = false;
      continue;
    }
    match c {
      '\\' => escaped = true,
      '=' | ':' | ' ' | '\t' | '\x0c' => {
        key_end = idx;
        break;
      }
      _ => {}
    }
  }

  let key = &line[..key_end];
  let mut rest = line[key_end..].trim_start_matches([' ', '\t', '\x0c']);
  if let Some(stripped) = rest.strip_prefix(['=', ':']) {
    rest = stripped.trim_start_matches([' ', '\t', '\x0c']);
  }
  (key, rest)
}

fn unescape(raw: &str) -> String {
  let mut out = String::with_capacity(raw.len());
  let mut chars = raw.chars();
  while let Some(c) = chars.next() {
    if c != '\\' {
      out.push(c);
      continue;
    }
    match chars.next() {
      Some('t') => out.push('\t'),
      Some('n') => out.push('\n'),
      Some('r') => out.push('\r'),
      Some('f') => out.push('\x0c'),
      Some('u') => {
        let hex: String = chars.by_ref().take(4).collect();
        match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
          Some(decoded) => out.push(decoded),
          None => {
            out.push_str("\\u");
            out.push_str(&hex);
          }
        }
      }
      Some(other) => out.push(other),
      None => {}
    }
  }
  out
}
