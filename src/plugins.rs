//! Explicit registration of host supplied processors and generators.
//!
//! Properties refer to plugins by name, e.g. `jawr.custom.postprocessors.shout.class=upper`
//! publishes the processor registered as `upper` under the chain id `shout`. Every name used by
//! the properties must have been registered before the pipeline runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::properties::{Properties, PropertiesConfig, split_list};
use crate::error::{BundlingError, BundlingResult};
use crate::generator::{Generator, GeneratorRegistry, GeneratorRegistryBuilder};
use crate::models::{Bundle, ResourceType};
use crate::postprocess::{ChainFactory, Processor};

const CUSTOM_GENERATORS: &str = "custom.generators";

/// A processor working on every bundle of one resource type at once.
pub trait GlobalProcessor: Send + Sync {
  /// Name used in diagnostics.
  fn id(&self) -> &str;

  /// Inspect or adjust `bundles`. Preprocessors run before rendering, postprocessors after.
  fn process(&self, resource_type: ResourceType, bundles: &mut [Bundle]) -> BundlingResult<()>;
}

/// Plugins registered by the host program.
#[derive(Clone, Default)]
pub struct PluginRegistry {
  processors: BTreeMap<String, Arc<dyn Processor>>,
  generators: BTreeMap<String, Arc<dyn Generator>>,
  global_processors: BTreeMap<String, Arc<dyn GlobalProcessor>>,
}

impl std::fmt::Debug for PluginRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PluginRegistry")
      .field("processors", &self.processors.keys().collect::<Vec<_>>())
      .field("generators", &self.generators.keys().collect::<Vec<_>>())
      .field("global_processors", &self.global_processors.keys().collect::<Vec<_>>())
      .finish()
  }
}

impl PluginRegistry {
  /// Registry with no plugins.
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a processor under `name`. It is also usable in chains under that name.
  pub fn register_processor(&mut self, name: impl Into<String>, processor: Arc<dyn Processor>) -> &mut Self {
    self.processors.insert(name.into(), processor);
    self
  }

  /// Register a generator under `name`.
  pub fn register_generator(&mut self, name: impl Into<String>, generator: Arc<dyn Generator>) -> &mut Self {
    self.generators.insert(name.into(), generator);
    self
  }

  /// Register a global processor under `name`.
  pub fn register_global_processor(
    &mut self,
    name: impl Into<String>,
    processor: Arc<dyn GlobalProcessor>,
  ) -> &mut Self {
    self.global_processors.insert(name.into(), processor);
    self
  }

  /// Chain factory knowing the built-ins, every registered processor under its own name and the
  /// custom ids the properties declare.
  pub fn chain_factory(&self, config: &PropertiesConfig<'_>) -> BundlingResult<ChainFactory> {
    let mut factory = ChainFactory::new();
    for (name, processor) in &self.processors {
      factory.register(name.clone(), Arc::clone(processor))?;
    }
    for (id, plugin) in config.custom_postprocessor_map() {
      let processor = self.processors.get(&plugin).ok_or_else(|| {
        BundlingError::config(format!(
          "custom processor '{id}' refers to '{plugin}', which is not a registered processor"
        ))
      })?;
      debug!(id, plugin, "custom processor");
      factory.register(id, Arc::clone(processor))?;
    }
    Ok(factory)
  }

  /// Registry with the built-in generators and every registered one. Names listed in
  /// `jawr.custom.generators` must be registered.
  pub fn generator_registry(&self, props: &Properties) -> BundlingResult<GeneratorRegistry> {
    let config = PropertiesConfig::new(props, ResourceType::Js);
    if let Some(names) = config.common_property(CUSTOM_GENERATORS) {
      for name in split_list(names) {
        if !self.generators.contains_key(&name) {
          return Err(BundlingError::config(format!(
            "custom generator '{name}' is not registered"
          )));
        }
      }
    }

    let mut builder = GeneratorRegistryBuilder::with_builtin_generators()?;
    for (name, generator) in &self.generators {
      debug!(name, resolver = %generator.resolver(), "custom generator");
      builder.register(Arc::clone(generator))?;
    }
    Ok(builder.build())
  }

  /// Global preprocessors declared for the type of `config`, in id order.
  pub fn global_preprocessors(&self, config: &PropertiesConfig<'_>) -> BundlingResult<Vec<Arc<dyn GlobalProcessor>>> {
    self.global_processors_for(config.custom_global_preprocessor_map())
  }

  /// Global postprocessors declared for the type of `config`, in id order.
  pub fn global_postprocessors(&self, config: &PropertiesConfig<'_>) -> BundlingResult<Vec<Arc<dyn GlobalProcessor>>> {
    self.global_processors_for(config.custom_global_postprocessor_map())
  }

  fn global_processors_for(&self, declared: BTreeMap<String, String>) -> BundlingResult<Vec<Arc<dyn GlobalProcessor>>> {
    declared
      .into_iter()
      .map(|(id, plugin)| {
        self.global_processors.get(&plugin).cloned().ok_or_else(|| {
          BundlingError::config(format!(
            "global processor '{id}' refers to '{plugin}', which is not registered"
          ))
        })
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::generator::{GeneratorContext, ResourceResolver};
  use crate::postprocess::ProcessingStatus;

  struct Upper;

  impl Processor for Upper {
    fn id(&self) -> &str {
      "upper"
    }

    fn apply(&self, _status: &mut ProcessingStatus<'_>, content: String) -> BundlingResult<String> {
      Ok(content.to_uppercase())
    }
  }

  struct Less;

  impl Generator for Less {
    fn resolver(&self) -> ResourceResolver {
      ResourceResolver::suffixed("less")
    }

    fn create_resource(&self, context: &GeneratorContext<'_>) -> BundlingResult<String> {
      context.reader.resource(context.path)
    }
  }

  struct Count;

  impl GlobalProcessor for Count {
    fn id(&self) -> &str {
      "count"
    }

    fn process(&self, _resource_type: ResourceType, bundles: &mut [Bundle]) -> BundlingResult<()> {
      for bundle in bundles {
        bundle.dirty = true;
      }
      Ok(())
    }
  }

  #[test]
  fn publishes_processors_under_declared_ids() {
    let props = Properties::parse("jawr.custom.postprocessors.shout.class=upper\n");
    let config = PropertiesConfig::new(&props, ResourceType::Js);
    let mut plugins = PluginRegistry::new();
    plugins.register_processor("upper", Arc::new(Upper));

    let factory = plugins.chain_factory(&config).unwrap();
    assert_eq!(factory.build("shout,upper").unwrap().ids(), vec!["shout", "upper"]);

    let props = Properties::parse("jawr.custom.postprocessors.shout.class=missing\n");
    let config = PropertiesConfig::new(&props, ResourceType::Js);
    assert!(matches!(plugins.chain_factory(&config), Err(BundlingError::Config(_))));
  }

  #[test]
  fn registers_custom_generators() {
    let mut plugins = PluginRegistry::new();
    plugins.register_generator("less", Arc::new(Less));

    let props = Properties::parse("jawr.custom.generators=less\n");
    let registry = plugins.generator_registry(&props).unwrap();
    assert!(registry.is_path_generated("/css/site.less"));
    assert!(registry.is_path_generated("jar:css/site.css"));
    assert_eq!(registry.unregistered_reserved_token("/css/site.less"), None);

    let props = Properties::parse("jawr.custom.generators=less,sass\n");
    assert!(plugins.generator_registry(&props).is_err());
  }

  #[test]
  fn resolves_global_processors() {
    let props = Properties::parse("jawr.custom.global.preprocessor.touch.class=count\n");
    let config = PropertiesConfig::new(&props, ResourceType::Css);
    let mut plugins = PluginRegistry::new();
    plugins.register_global_processor("count", Arc::new(Count));

    let pre = plugins.global_preprocessors(&config).unwrap();
    assert_eq!(pre.len(), 1);
    let mut bundles = vec![Bundle::new("/a.css", "a", ResourceType::Css)];
    bundles[0].dirty = false;
    pre[0].process(ResourceType::Css, &mut bundles).unwrap();
    assert!(bundles[0].dirty);
    assert!(plugins.global_postprocessors(&config).unwrap().is_empty());
  }
}
