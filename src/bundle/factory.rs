//! Builds [`Bundle`] values from the flat properties configuration.

use tracing::{debug, info};

use crate::config::properties::{
  BUNDLE_DEBUG_NEVER, BUNDLE_DEBUG_ONLY, BUNDLE_DEBUG_URL, BUNDLE_DEPENDENCIES,
  BUNDLE_FILE_POSTPROCESSORS, BUNDLE_GLOBAL, BUNDLE_ID, BUNDLE_IE_CONDITION, BUNDLE_MAPPINGS,
  BUNDLE_MEDIA, BUNDLE_ORDER, BUNDLE_POSTPROCESSORS, BUNDLE_PREFIX, BUNDLE_PRODUCTION_URL,
  Properties, PropertiesConfig, RESOURCES_BASEDIR,
};
use crate::error::{BundlingError, BundlingResult};
use crate::generator::GeneratorRegistry;
use crate::models::{Bundle, InclusionPattern, ResourceType};
use crate::paths::{as_path, join_paths, normalize_path};
use crate::reader::ResourceReaderHandler;
use crate::variant::concat_variants;

/// File listing the preferred order of a directory's members.
pub const SORT_FILE_NAME: &str = ".sorting";

/// File holding license text for the members of a directory.
pub const LICENSES_FILE_NAME: &str = ".license";

const FORBIDDEN_ID_PREFIXES: &[&str] = &["/WEB-INF/", "/META-INF/"];

/// Outcome of configuring every bundle of one resource type.
#[derive(Debug, Default)]
pub struct BundleSet {
  /// Bundles ready to render, in load order.
  pub bundles: Vec<Bundle>,
  /// Bundles that could not be configured, in the order they failed.
  pub failures: Vec<BundleFailure>,
}

/// A declared bundle that could not be configured.
#[derive(Debug)]
pub struct BundleFailure {
  /// Declared id, or the name when the id is missing.
  pub id: String,
  /// Name used in the properties.
  pub name: String,
  /// Why it failed.
  pub error: BundlingError,
}

/// Creates the bundles of one resource type.
pub struct BundleFactory<'a> {
  config: PropertiesConfig<'a>,
  registry: &'a GeneratorRegistry,
  reader: &'a dyn ResourceReaderHandler,
}

impl<'a> BundleFactory<'a> {
  /// Factory for `resource_type` bundles declared in `props`.
  pub fn new(
    props: &'a Properties,
    resource_type: ResourceType,
    registry: &'a GeneratorRegistry,
    reader: &'a dyn ResourceReaderHandler,
  ) -> Self {
    Self {
      config: PropertiesConfig::new(props, resource_type),
      registry,
      reader,
    }
  }

  /// Every declared bundle, global bundles first by order, then the rest in declaration order.
  /// Dependencies are flattened to the full load order of each bundle.
  ///
  /// A bundle that cannot be built is returned as a [`BundleFailure`], and so is every bundle
  /// depending on it. Cycles and dependencies on undeclared names fail the whole type.
  pub fn create_bundles(&self) -> BundlingResult<BundleSet> {
    let mut set = BundleSet::default();
    for name in &self.config.bundle_names() {
      match self.create_bundle(name) {
        Ok(bundle) => set.bundles.push(bundle),
        Err(error) => {
          let id = self
            .config
            .custom_bundle_property(name, BUNDLE_ID)
            .map_or_else(|| name.clone(), as_path);
          set.failures.push(BundleFailure { id, name: name.clone(), error });
        }
      }
    }

    loop {
      let Some(idx) = set.bundles.iter().position(|bundle| {
        bundle
          .dependencies
          .iter()
          .any(|dependency| set.failures.iter().any(|failure| &failure.name == dependency))
      }) else {
        break;
      };
      let bundle = set.bundles.remove(idx);
      let failed = bundle
        .dependencies
        .iter()
        .find(|dependency| set.failures.iter().any(|failure| &failure.name == *dependency))
        .cloned()
        .unwrap_or_default();
      debug!(bundle = %bundle.name, dependency = %failed, "dependency failed");
      set.failures.push(BundleFailure {
        id: bundle.id,
        name: bundle.name,
        error: BundlingError::config(format!("dependency '{failed}' failed")),
      });
    }

    resolve_dependencies(&mut set.bundles)?;
    order_bundles(&mut set.bundles);
    info!(
      resource_type = %self.config.resource_type(),
      count = set.bundles.len(),
      failed = set.failures.len(),
      "configured bundles"
    );
    Ok(set)
  }

  /// Build the bundle declared under `name`.
  pub fn create_bundle(&self, name: &str) -> BundlingResult<Bundle> {
    let resource_type = self.config.resource_type();
    let id = self
      .config
      .custom_bundle_property(name, BUNDLE_ID)
      .ok_or_else(|| BundlingError::config(format!("bundle '{name}' has no id")))?;
    let id = as_path(id);
    self.validate_id(name, &id)?;

    let flag = |key: &str| {
      self
        .config
        .custom_bundle_property(name, key)
        .is_some_and(|value| value.trim().eq_ignore_ascii_case("true"))
    };
    let text = |key: &str| {
      self
        .config
        .custom_bundle_property(name, key)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
    };

    let mut bundle = Bundle::new(id, name, resource_type);
    let order = match text(BUNDLE_ORDER) {
      Some(order) => order.parse().map_err(|_| {
        BundlingError::config(format!("bundle '{name}' has a non numeric order '{order}'"))
      })?,
      None => 0,
    };
    bundle.inclusion = InclusionPattern {
      global: flag(BUNDLE_GLOBAL),
      include_only_on_debug: flag(BUNDLE_DEBUG_ONLY),
      exclude_on_debug: flag(BUNDLE_DEBUG_NEVER),
      order,
    };
    if bundle.inclusion.include_only_on_debug && bundle.inclusion.exclude_on_debug {
      return Err(BundlingError::config(format!(
        "bundle '{name}' cannot be both debug only and never included in debug mode"
      )));
    }

    bundle.dependencies = self
      .config
      .custom_bundle_property_as_list(name, BUNDLE_DEPENDENCIES);
    bundle.alternate_production_url = text(BUNDLE_PRODUCTION_URL);
    bundle.debug_url = text(BUNDLE_DEBUG_URL);
    bundle.explorer_condition = text(BUNDLE_IE_CONDITION);
    bundle.bundle_postprocessors = text(BUNDLE_POSTPROCESSORS);
    bundle.file_postprocessors = text(BUNDLE_FILE_POSTPROCESSORS);
    bundle.media = text(BUNDLE_MEDIA);
    bundle.bundle_prefix = text(BUNDLE_PREFIX).unwrap_or_default();

    let mappings = self.config.custom_bundle_property_as_list(name, BUNDLE_MAPPINGS);
    let base_dir = self.config.property(RESOURCES_BASEDIR);
    for mapping in &mappings {
      let mapping = match base_dir {
        Some(base) if !self.registry.is_path_generated(mapping) => {
          let joined = join_paths(base, mapping);
          if mapping.ends_with('/') { format!("{joined}/") } else { joined }
        }
        _ => mapping.clone(),
      };
      self.add_mapping(&mut bundle, &mapping)?;
    }

    let mut variants = self.config.custom_bundle_variant_sets(name)?;
    for path in bundle.item_paths.iter().filter(|path| self.registry.is_path_generated(path)) {
      let generated = self.registry.available_variants(path, self.reader)?;
      variants = concat_variants(Some(&variants), Some(&generated))?;
    }
    bundle.variants = variants;

    debug!(
      bundle = name,
      members = bundle.item_paths.len(),
      licenses = bundle.license_paths.len(),
      variants = bundle.variants.len(),
      "created bundle"
    );
    Ok(bundle)
  }

  fn validate_id(&self, name: &str, id: &str) -> BundlingResult<()> {
    let extension = format!(".{}", self.config.resource_type().extension());
    if !id.ends_with(&extension) {
      return Err(BundlingError::config(format!(
        "the id '{id}' of bundle '{name}' does not end with '{extension}'"
      )));
    }
    if FORBIDDEN_ID_PREFIXES.iter().any(|prefix| id.starts_with(prefix)) {
      return Err(BundlingError::config(format!(
        "the id '{id}' of bundle '{name}' points inside a protected directory"
      )));
    }
    Ok(())
  }

  fn add_mapping(&self, bundle: &mut Bundle, mapping: &str) -> BundlingResult<()> {
    if let Some(token) = self.registry.unregistered_reserved_token(mapping) {
      return Err(BundlingError::config(format!(
        "mapping '{mapping}' of bundle '{}' uses '{token}' but no generator is registered for it",
        bundle.name
      )));
    }

    let generated = self.registry.is_path_generated(mapping);
    if let Some(dir) = mapping.strip_suffix("**") {
      self.add_items_from_dir(bundle, dir, true)
    } else if mapping.ends_with('/') {
      self.add_items_from_dir(bundle, mapping, false)
    } else if generated {
      bundle.item_paths.push(mapping.to_string());
      Ok(())
    } else if mapping.ends_with(&format!(".{}", bundle.resource_type.extension())) {
      bundle.item_paths.push(as_path(mapping));
      Ok(())
    } else if mapping.ends_with(LICENSES_FILE_NAME) {
      bundle.license_paths.push(as_path(mapping));
      Ok(())
    } else {
      Err(BundlingError::config(format!(
        "wrong mapping '{mapping}' for bundle '{}'",
        bundle.name
      )))
    }
  }

  fn add_items_from_dir(&self, bundle: &mut Bundle, dir: &str, recursive: bool) -> BundlingResult<()> {
    let generated = self.registry.is_path_generated(dir);
    let join = |name: &str| {
      if generated {
        format!("{}/{}", dir.trim_end_matches('/'), name.trim_start_matches('/'))
      } else {
        join_paths(dir, name)
      }
    };
    let extension = format!(".{}", bundle.resource_type.extension());
    let mut remaining: Vec<String> = self.reader.resource_names(dir)?.into_iter().collect();
    debug!(bundle = %bundle.name, dir, count = remaining.len(), "adding directory members");

    if let Some(idx) = remaining.iter().position(|name| name == SORT_FILE_NAME) {
      remaining.remove(idx);
      let sort_file = self.reader.resource(&join(SORT_FILE_NAME))?;
      for line in sort_file.lines() {
        let wanted = normalize_path(line.trim());
        if wanted.is_empty() {
          continue;
        }
        let Some(idx) = remaining
          .iter()
          .position(|available| normalize_path(available) == wanted)
        else {
          continue;
        };
        let name = remaining.remove(idx);
        let path = join(&name);
        if name.ends_with('/') {
          if recursive {
            self.add_items_from_dir(bundle, &format!("{path}/"), true)?;
          }
        } else if name.ends_with(&extension) {
          bundle.item_paths.push(path);
        }
      }
    }

    if let Some(idx) = remaining.iter().position(|name| name == LICENSES_FILE_NAME) {
      remaining.remove(idx);
      bundle.license_paths.push(join(LICENSES_FILE_NAME));
    }

    let mut folders = Vec::new();
    for name in remaining {
      if name.ends_with('/') {
        if recursive {
          folders.push(name);
        }
      } else if name.ends_with(&extension) {
        bundle.item_paths.push(join(&name));
      }
    }

    for folder in folders {
      self.add_items_from_dir(bundle, &format!("{}/", join(&folder)), true)?;
    }
    Ok(())
  }
}

/// Replace each bundle's declared dependencies with its full, transitive load order.
///
/// Global bundles are always loaded and never listed as dependencies; declaring
/// dependencies on a global bundle or a cycle is a configuration error.
pub fn resolve_dependencies(bundles: &mut [Bundle]) -> BundlingResult<()> {
  let mut resolved = Vec::with_capacity(bundles.len());
  for bundle in bundles.iter() {
    if bundle.inclusion.global && !bundle.dependencies.is_empty() {
      return Err(BundlingError::config(format!(
        "global bundle '{}' cannot declare dependencies, use its order instead",
        bundle.name
      )));
    }
    let mut order = Vec::new();
    let mut visiting = vec![bundle.name.clone()];
    collect_dependencies(bundles, &bundle.name, bundle, &mut visiting, &mut order)?;
    resolved.push(order);
  }

  for (bundle, order) in bundles.iter_mut().zip(resolved) {
    bundle.dependencies = order;
  }
  Ok(())
}

fn collect_dependencies(
  bundles: &[Bundle],
  root: &str,
  current: &Bundle,
  visiting: &mut Vec<String>,
  order: &mut Vec<String>,
) -> BundlingResult<()> {
  for dependency in &current.dependencies {
    let target = bundles
      .iter()
      .find(|bundle| &bundle.name == dependency)
      .ok_or_else(|| {
        BundlingError::config(format!(
          "bundle '{root}' depends on unknown bundle '{dependency}'"
        ))
      })?;
    if target.inclusion.global {
      info!(bundle = root, dependency, "global bundles are not listed as dependencies");
      continue;
    }
    if visiting.contains(dependency) {
      return Err(BundlingError::config(format!(
        "circular dependency in bundle '{root}' involving '{dependency}'"
      )));
    }
    if order.contains(dependency) {
      continue;
    }
    visiting.push(dependency.clone());
    collect_dependencies(bundles, root, target, visiting, order)?;
    visiting.pop();
    order.push(dependency.clone());
  }
  Ok(())
}

/// Global bundles by ascending order, then regular bundles in their existing order.
pub fn order_bundles(bundles: &mut [Bundle]) {
  bundles.sort_by_key(|bundle| {
    if bundle.inclusion.global {
      (0, bundle.inclusion.order)
    } else {
      (1, 0)
    }
  });
}

#[cfg(test)]
mod tests {
  use std::fs;
  use std::path::Path;

  use tempfile::tempdir;

  use super::*;
  use crate::generator::GeneratorRegistryBuilder;
  use crate::reader::FileSystemReader;

  fn write(root: &Path, relative: &str, content: &str) -> std::io::Result<()> {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
  }

  fn registry() -> GeneratorRegistry {
    GeneratorRegistryBuilder::with_builtin_generators()
      .unwrap()
      .build()
  }

  #[test]
  fn expands_directory_mappings() -> std::io::Result<()> {
    let temp = tempdir()?;
    let root = temp.path();
    write(root, "js/lib/b.js", "b")?;
    write(root, "js/lib/a.js", "a")?;
    write(root, "js/lib/readme.txt", "skip")?;
    write(root, "js/lib/.license", "MIT")?;
    write(root, "js/lib/sub/c.js", "c")?;
    write(root, "js/app/main.js", "main")?;
    write(root, "js/app/nested/deep.js", "deep")?;

    let props: Properties = [
      ("jawr.js.bundle.lib.id", "/bundles/lib.js"),
      ("jawr.js.bundle.lib.mappings", "/js/lib/"),
      ("jawr.js.bundle.app.id", "/bundles/app.js"),
      ("jawr.js.bundle.app.mappings", "/js/app/**"),
    ]
    .into_iter()
    .collect();

    let registry = registry();
    let reader = FileSystemReader::new(root);
    let factory = BundleFactory::new(&props, ResourceType::Js, &registry, &reader);

    let lib = factory.create_bundle("lib").unwrap();
    assert_eq!(lib.item_paths, vec!["/js/lib/a.js", "/js/lib/b.js"]);
    assert_eq!(lib.license_paths, vec!["/js/lib/.license"]);

    let app = factory.create_bundle("app").unwrap();
    assert_eq!(app.item_paths, vec!["/js/app/main.js", "/js/app/nested/deep.js"]);
    Ok(())
  }

  #[test]
  fn sorting_file_orders_members_first() -> std::io::Result<()> {
    let temp = tempdir()?;
    let root = temp.path();
    write(root, "js/a.js", "a")?;
    write(root, "js/b.js", "b")?;
    write(root, "js/c.js", "c")?;
    write(root, "js/.sorting", "c.js\nmissing.js\nb.js\n")?;

    let props: Properties = [
      ("jawr.js.bundle.all.id", "/all.js"),
      ("jawr.js.bundle.all.mappings", "/js/"),
    ]
    .into_iter()
    .collect();
    let registry = registry();
    let reader = FileSystemReader::new(root);
    let bundle = BundleFactory::new(&props, ResourceType::Js, &registry, &reader)
      .create_bundle("all")
      .unwrap();

    assert_eq!(bundle.item_paths, vec!["/js/c.js", "/js/b.js", "/js/a.js"]);
    Ok(())
  }

  #[test]
  fn generated_members_contribute_variants() -> std::io::Result<()> {
    let temp = tempdir()?;
    let root = temp.path();
    write(root, "app/messages.properties", "label.ok=OK\n")?;
    write(root, "app/messages_fr.properties", "label.ok=D'accord\n")?;

    let props: Properties = [
      ("jawr.js.bundle.msg.id", "/js/bundle/msg.js"),
      ("jawr.js.bundle.msg.mappings", "messages:app.messages"),
      ("jawr.js.bundle.msg.variants", "skin:summer:summer,winter"),
    ]
    .into_iter()
    .collect();
    let registry = registry();
    let reader = FileSystemReader::new(root);
    let bundle = BundleFactory::new(&props, ResourceType::Js, &registry, &reader)
      .create_bundle("msg")
      .unwrap();

    assert_eq!(bundle.item_paths, vec!["messages:app.messages"]);
    let locales: Vec<&str> = bundle.variants["locale"].variants().collect();
    assert!(locales.contains(&"fr"));
    assert!(bundle.variants.contains_key("skin"));
    Ok(())
  }

  #[test]
  fn rejects_bad_configuration() {
    let registry = registry();
    let reader = FileSystemReader::new(".");
    let props: Properties = [
      ("jawr.js.bundle.wrong.id", "/bundles/wrong.css"),
      ("jawr.js.bundle.protected.id", "/WEB-INF/app.js"),
      ("jawr.js.bundle.less.id", "/less.js"),
      ("jawr.js.bundle.less.mappings", "/css/site.less"),
      ("jawr.js.bundle.odd.id", "/odd.js"),
      ("jawr.js.bundle.odd.mappings", "/js/readme.txt"),
    ]
    .into_iter()
    .collect();
    let factory = BundleFactory::new(&props, ResourceType::Js, &registry, &reader);

    for name in ["wrong", "protected", "less", "odd"] {
      assert!(
        matches!(factory.create_bundle(name), Err(BundlingError::Config(_))),
        "{name} should be rejected"
      );
    }
  }

  #[test]
  fn flattens_dependencies_and_orders_globals() {
    let mut bundles = vec![
      Bundle::new("/a.js", "a", ResourceType::Js),
      Bundle::new("/b.js", "b", ResourceType::Js),
      Bundle::new("/c.js", "c", ResourceType::Js),
      Bundle::new("/g2.js", "g2", ResourceType::Js),
      Bundle::new("/g1.js", "g1", ResourceType::Js),
    ];
    bundles[0].dependencies = vec!["b".into(), "g1".into()];
    bundles[1].dependencies = vec!["c".into()];
    bundles[3].inclusion.global = true;
    bundles[3].inclusion.order = 2;
    bundles[4].inclusion.global = true;
    bundles[4].inclusion.order = 1;

    resolve_dependencies(&mut bundles).unwrap();
    order_bundles(&mut bundles);

    let names: Vec<&str> = bundles.iter().map(|bundle| bundle.name.as_str()).collect();
    assert_eq!(names, vec!["g1", "g2", "a", "b", "c"]);
    assert_eq!(bundles[2].dependencies, vec!["c", "b"]);
  }

  #[test]
  fn create_bundles_fails_dependents_of_broken_bundles() -> std::io::Result<()> {
    let temp = tempdir()?;
    let root = temp.path();
    write(root, "js/a.js", "a")?;

    let props: Properties = [
      ("jawr.js.bundle.lib.id", "/lib.js"),
      ("jawr.js.bundle.lib.mappings", "/js/readme.txt"),
      ("jawr.js.bundle.mid.id", "/mid.js"),
      ("jawr.js.bundle.mid.mappings", "/js/a.js"),
      ("jawr.js.bundle.mid.dependencies", "lib"),
      ("jawr.js.bundle.top.id", "/top.js"),
      ("jawr.js.bundle.top.mappings", "/js/a.js"),
      ("jawr.js.bundle.top.dependencies", "mid"),
      ("jawr.js.bundle.alone.id", "/alone.js"),
      ("jawr.js.bundle.alone.mappings", "/js/a.js"),
    ]
    .into_iter()
    .collect();
    let registry = registry();
    let reader = FileSystemReader::new(root);
    let set = BundleFactory::new(&props, ResourceType::Js, &registry, &reader)
      .create_bundles()
      .unwrap();

    let built: Vec<&str> = set.bundles.iter().map(|bundle| bundle.name.as_str()).collect();
    assert_eq!(built, vec!["alone"]);
    let failed: Vec<(&str, String)> = set
      .failures
      .iter()
      .map(|failure| (failure.id.as_str(), failure.error.to_string()))
      .collect();
    assert_eq!(failed.len(), 3);
    assert_eq!(failed[0].0, "/lib.js");
    assert!(failed[1].1.contains("dependency 'lib' failed"));
    assert!(failed[2].1.contains("dependency 'mid' failed"));
    Ok(())
  }

  #[test]
  fn detects_dependency_cycles() {
    let mut bundles = vec![
      Bundle::new("/a.js", "a", ResourceType::Js),
      Bundle::new("/b.js", "b", ResourceType::Js),
    ];
    bundles[0].dependencies = vec!["b".into()];
    bundles[1].dependencies = vec!["a".into()];
    assert!(resolve_dependencies(&mut bundles).is_err());
  }
}
