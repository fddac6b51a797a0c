//! Build orchestrator: renders every configured bundle of a source tree into an output tree.
//!
//! A run reads the configuration and properties, builds the bundles of each resource type,
//! renders the dirty ones through their processor chains for every variant combination and
//! writes the results under their production (or remapped) paths. Binary resources referenced
//! by stylesheets are installed under their cache-busted paths. Anything in the destination
//! that the run did not produce is pruned.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use same_file::is_same_file;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::bundle::{
  BundleFactory, BundleSet, FilePathMappings, MAPPINGS_FILE, NoConditionalComments,
  ProductionPathIterator, modified_millis,
};
use crate::config::properties::{PROPS_PREFIX, Properties, PropertiesConfig};
use crate::config::{BUNDLE_HASHCODE_GENERATOR, BundlerConfig, DEBUG_ON};
use crate::error::BundlingResult;
use crate::generator::GeneratorRegistry;
use crate::models::{Bundle, FilePathMapping, ResourceType};
use crate::paths::{
  BinaryPathCache, BundleHashAlgorithm, GENERATION_PARAM, GENERATOR_DIR, as_path,
  build_time_generation_path, bundle_hashcode, escape_to_physical_path, final_bundle_path,
  final_image_path, join_paths,
};
use crate::plugins::PluginRegistry;
use crate::postprocess::{
  ChainFactory, ProcessingMode, ProcessingSettings, ProcessingStatus, ProcessorChain,
};
use crate::reader::{FileSystemReader, ResourceReaderHandler};
use crate::selection::{BundleInclusion, BundleSelection};
use crate::variant::{VariantMap, all_bundle_variants, variant_key};

/// Report written to the destination root after every run.
pub const REPORT_FILE: &str = "bundle-report.json";

/// Directory, relative to the destination root, holding the debug mode rendering.
pub const DEBUG_DIR: &str = "debug";

const STAGING_DIR: &str = "staging";

/// Inputs of one run.
#[derive(Debug, Clone, Default)]
pub struct ProcessRequest {
  /// Root of the web sources; relative configuration paths resolve against it.
  pub source_dir: PathBuf,
  /// Scratch directory. Defaults to the configured one.
  pub temp_dir: Option<PathBuf>,
  /// Output directory. Defaults to the configured one.
  pub dest_dir: Option<PathBuf>,
  /// Configuration file to use instead of discovering one in the source directory.
  pub config_path: Option<PathBuf>,
  /// Roots searched for `jar:` resources, after the configured ones.
  pub classpath: Vec<PathBuf>,
  /// Write bundles under their logical names instead of hash prefixed paths.
  pub use_file_remapping: bool,
  /// Requested gzip output. Compression is left to the server, the flag is only logged.
  pub gzip: bool,
  /// Keep the servlet mapping of each type as the leading directory of its outputs.
  pub servlet_mapped: bool,
  /// Servlet API version of the target container, only logged.
  pub servlet_api_version: Option<String>,
  /// Bundles to render, merged with the configured selection file.
  pub selection: BundleSelection,
  /// Render every bundle even when its sources did not change.
  pub force: bool,
}

impl ProcessRequest {
  /// Request for `source_dir` with every other setting taken from the configuration.
  pub fn new(source_dir: impl Into<PathBuf>) -> Self {
    Self {
      source_dir: source_dir.into(),
      ..Self::default()
    }
  }
}

/// What happened to one bundle during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleOutcome {
  /// Rendered and written.
  Written,
  /// Sources unchanged; the outputs of the previous run were kept.
  Unchanged,
  /// Left out by the bundle selection.
  Excluded,
  /// Rendering failed; no output was written for it.
  Failed,
}

/// Per bundle entry of a [`ProcessReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleReport {
  /// Bundle id, or its name when the bundle could not be configured.
  pub id: String,
  /// Name used in the properties.
  pub name: String,
  /// JavaScript or stylesheet.
  pub resource_type: ResourceType,
  /// Outcome of the run.
  pub outcome: BundleOutcome,
  /// Files written, relative to the destination root.
  #[serde(default)]
  pub outputs: Vec<String>,
  /// Content hash per variant key.
  #[serde(default)]
  pub hashes: BTreeMap<String, String>,
  /// Cache-busted path of every binary resource the bundle references, keyed by source path.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub binaries: BTreeMap<String, String>,
  /// Failure message of failed bundles.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl BundleReport {
  fn new(id: impl Into<String>, name: impl Into<String>, resource_type: ResourceType, outcome: BundleOutcome) -> Self {
    Self {
      id: id.into(),
      name: name.into(),
      resource_type,
      outcome,
      outputs: Vec::new(),
      hashes: BTreeMap::new(),
      binaries: BTreeMap::new(),
      error: None,
    }
  }

  fn failed(id: impl Into<String>, name: impl Into<String>, resource_type: ResourceType, error: &anyhow::Error) -> Self {
    let mut report = Self::new(id, name, resource_type, BundleOutcome::Failed);
    report.error = Some(format!("{error:#}"));
    report
  }
}

/// A binary resource installed under its cache-busted path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryReport {
  /// Source path of the resource.
  pub source: String,
  /// Files written, relative to the destination root.
  pub outputs: Vec<String>,
}

/// Summary of one run, also persisted as [`REPORT_FILE`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessReport {
  /// Every configured bundle, JavaScript first.
  pub bundles: Vec<BundleReport>,
  /// Installed binary resources.
  #[serde(default)]
  pub binaries: Vec<BinaryReport>,
}

impl ProcessReport {
  /// Whether any bundle failed.
  pub fn has_failures(&self) -> bool {
    self
      .bundles
      .iter()
      .any(|bundle| bundle.outcome == BundleOutcome::Failed)
  }

  /// Entry of the bundle with `id`.
  pub fn bundle(&self, id: &str) -> Option<&BundleReport> {
    self.bundles.iter().find(|bundle| bundle.id == id)
  }

  /// Number of bundles with `outcome`.
  pub fn count(&self, outcome: BundleOutcome) -> usize {
    self
      .bundles
      .iter()
      .filter(|bundle| bundle.outcome == outcome)
      .count()
  }

  fn load(path: &Path) -> Option<Self> {
    let contents = match fs::read_to_string(path) {
      Ok(contents) => contents,
      Err(err) if err.kind() == ErrorKind::NotFound => return None,
      Err(err) => {
        warn!(path = %path.display(), error = %err, "failed to read previous report");
        return None;
      }
    };
    match serde_json::from_str(&contents) {
      Ok(report) => Some(report),
      Err(err) => {
        warn!(path = %path.display(), error = %err, "ignoring unreadable previous report");
        None
      }
    }
  }

  fn save(&self, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(self)?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
  }

  fn previous_output(&self, id: &str) -> Option<&BundleReport> {
    self
      .bundle(id)
      .filter(|bundle| matches!(bundle.outcome, BundleOutcome::Written | BundleOutcome::Unchanged))
  }
}

/// Renders bundles with the processors and generators of a [`PluginRegistry`].
#[derive(Debug, Default)]
pub struct BundleProcessor {
  plugins: PluginRegistry,
}

impl BundleProcessor {
  /// Processor with only the built-in processors and generators.
  pub fn new() -> Self {
    Self::default()
  }

  /// Processor that also knows the plugins of `plugins`.
  pub fn with_plugins(plugins: PluginRegistry) -> Self {
    Self { plugins }
  }

  /// Run the whole pipeline for `request`.
  ///
  /// Configuration errors abort the run. A bundle that fails to render is recorded in the
  /// report and leaves the other bundles untouched.
  pub fn process(&self, request: &ProcessRequest) -> Result<ProcessReport> {
    let source_dir = &request.source_dir;
    let config = match &request.config_path {
      Some(path) => BundlerConfig::from_path(path)?,
      None => BundlerConfig::discover(source_dir)?,
    };
    let temp_dir = request
      .temp_dir
      .clone()
      .unwrap_or_else(|| source_dir.join(&config.temp_dir));
    let dest_dir = request
      .dest_dir
      .clone()
      .unwrap_or_else(|| source_dir.join(&config.dest_dir));
    if temp_dir == dest_dir {
      bail!(
        "the temp and destination directories must differ ({})",
        dest_dir.display()
      );
    }

    let props = config.load_properties(source_dir)?;
    let selection = BundleSelection::load_from_path(config.selection_path(source_dir))?
      .merged_with(request.selection.clone());
    let classpath: Vec<PathBuf> = config
      .classpath
      .iter()
      .map(|root| source_dir.join(root))
      .chain(request.classpath.iter().cloned())
      .collect();
    let reader = FileSystemReader::new(source_dir).with_classpath(classpath);
    let registry = self.plugins.generator_registry(&props)?;

    if request.gzip {
      debug!("gzip output is left to the server, writing uncompressed bundles");
    }
    if let Some(version) = &request.servlet_api_version {
      debug!(version = %version, "servlet api version");
    }

    let staging = temp_dir.join(STAGING_DIR);
    reset_dir(&staging)?;
    fs::create_dir_all(&dest_dir)
      .with_context(|| format!("failed to create {}", dest_dir.display()))?;

    let mappings_path = temp_dir.join(MAPPINGS_FILE);
    let mut mappings = FilePathMappings::load(&mappings_path)?;
    let previous = ProcessReport::load(&dest_dir.join(REPORT_FILE)).unwrap_or_default();

    let cache = BinaryPathCache::new();
    let run = BuildRun {
      request,
      props: &props,
      reader: &reader,
      registry: &registry,
      plugins: &self.plugins,
      cache: &cache,
      debug: props.boolean(&format!("{PROPS_PREFIX}{DEBUG_ON}"), false),
      remap: request.use_file_remapping || config.file_remapping,
      properties_path: config.properties_path(source_dir),
      staging,
      dest_dir: dest_dir.clone(),
    };
    info!(
      source = %source_dir.display(),
      dest = %dest_dir.display(),
      debug = run.debug,
      remap = run.remap,
      "processing bundles"
    );

    let mut report = ProcessReport::default();
    let mut keep = BTreeSet::new();
    for resource_type in ResourceType::ALL {
      run.process_type(resource_type, &selection, &previous, &mut mappings, &mut report, &mut keep)?;
    }

    report.binaries = run.install_binaries(&mut keep);
    keep.insert(PathBuf::from(REPORT_FILE));
    prune_output_tree(&dest_dir, &keep)?;

    report.save(&dest_dir.join(REPORT_FILE))?;
    mappings.save(&mappings_path)?;
    info!(
      written = report.count(BundleOutcome::Written),
      unchanged = report.count(BundleOutcome::Unchanged),
      excluded = report.count(BundleOutcome::Excluded),
      failed = report.count(BundleOutcome::Failed),
      binaries = report.binaries.len(),
      "processing finished"
    );
    Ok(report)
  }
}

/// State shared by every bundle of one run.
struct BuildRun<'a> {
  request: &'a ProcessRequest,
  props: &'a Properties,
  reader: &'a FileSystemReader,
  registry: &'a GeneratorRegistry,
  plugins: &'a PluginRegistry,
  cache: &'a BinaryPathCache,
  debug: bool,
  remap: bool,
  properties_path: PathBuf,
  staging: PathBuf,
  dest_dir: PathBuf,
}

/// Settings of the resource type being processed.
struct TypeContext<'a> {
  config: PropertiesConfig<'a>,
  settings: ProcessingSettings,
  chains: ChainFactory,
  algorithm: BundleHashAlgorithm,
}

struct RenderedVariant {
  variants: VariantMap,
  key: String,
  hash: String,
  content: String,
}

struct BuiltBundle {
  outputs: Vec<String>,
  mappings: Vec<FilePathMapping>,
  binaries: BTreeMap<String, String>,
}

#[derive(Default)]
struct RenderedBundle {
  variants: Vec<RenderedVariant>,
  debug_files: BTreeMap<String, String>,
  mappings: Vec<FilePathMapping>,
  binaries: BTreeMap<String, String>,
}

impl BuildRun<'_> {
  fn process_type(
    &self,
    resource_type: ResourceType,
    selection: &BundleSelection,
    previous: &ProcessReport,
    mappings: &mut FilePathMappings,
    report: &mut ProcessReport,
    keep: &mut BTreeSet<PathBuf>,
  ) -> Result<()> {
    let config = PropertiesConfig::new(self.props, resource_type);
    let names = config.bundle_names();
    if names.is_empty() {
      debug!(%resource_type, "no bundles configured");
      return Ok(());
    }

    let settings = ProcessingSettings::from_properties(&config)?;
    if !settings.charset.eq_ignore_ascii_case("UTF-8") {
      warn!(%resource_type, charset = %settings.charset, "bundles are always written as UTF-8");
    }
    let ctx = TypeContext {
      algorithm: config
        .common_property(BUNDLE_HASHCODE_GENERATOR)
        .map(str::parse)
        .transpose()?
        .unwrap_or_default(),
      chains: self.plugins.chain_factory(&config)?,
      settings,
      config,
    };

    let factory = BundleFactory::new(self.props, resource_type, self.registry, self.reader);
    let BundleSet { mut bundles, failures } = factory.create_bundles()?;
    for failure in failures {
      let err = anyhow::Error::from(failure.error);
      warn!(bundle = %failure.name, error = %err, "failed to configure bundle");
      report.bundles.push(BundleReport::failed(failure.id, failure.name, resource_type, &err));
    }

    for processor in self.plugins.global_preprocessors(&ctx.config)? {
      debug!(id = processor.id(), %resource_type, "running global preprocessor");
      processor.process(resource_type, &mut bundles)?;
    }

    let dirty = if self.request.force {
      bundles.iter_mut().for_each(|bundle| bundle.dirty = true);
      bundles.len()
    } else {
      mappings.refresh_dirty_flags(&mut bundles)
    };
    info!(%resource_type, bundles = bundles.len(), dirty, "configured bundles");

    for bundle in &mut bundles {
      if !selection.is_included(bundle) {
        debug!(bundle = %bundle.id, "excluded by selection");
        report.bundles.push(BundleReport::new(&bundle.id, &bundle.name, resource_type, BundleOutcome::Excluded));
        continue;
      }

      if !bundle.dirty
        && let Some(earlier) = previous.previous_output(&bundle.id)
        && earlier.outputs.iter().all(|output| self.dest_dir.join(output).is_file())
      {
        debug!(bundle = %bundle.id, "unchanged, keeping previous outputs");
        for (key, hash) in &earlier.hashes {
          bundle.set_hash_prefix(key, hash);
        }
        for (source, busted) in &earlier.binaries {
          self.cache.insert(source.clone(), busted.clone());
        }
        keep.extend(earlier.outputs.iter().map(PathBuf::from));
        let mut entry = earlier.clone();
        entry.outcome = BundleOutcome::Unchanged;
        report.bundles.push(entry);
        continue;
      }

      match self.build_bundle(bundle, &ctx) {
        Ok(built) => {
          info!(bundle = %bundle.id, outputs = built.outputs.len(), "wrote bundle");
          let mut file_mappings = built.mappings;
          if let Some(last_modified) = modified_millis(&self.properties_path) {
            file_mappings.push(FilePathMapping {
              bundle: bundle.id.clone(),
              path: self.properties_path.to_string_lossy().into_owned(),
              last_modified,
            });
          }
          mappings.replace(&bundle.id, file_mappings);
          keep.extend(built.outputs.iter().map(PathBuf::from));

          let mut entry = BundleReport::new(&bundle.id, &bundle.name, resource_type, BundleOutcome::Written);
          entry.outputs = built.outputs;
          entry.hashes = bundle.hash_prefixes().clone();
          entry.binaries = built.binaries;
          report.bundles.push(entry);
        }
        Err(err) => {
          warn!(bundle = %bundle.id, error = %format!("{err:#}"), "failed to render bundle");
          mappings.replace(&bundle.id, []);
          report.bundles.push(BundleReport::failed(&bundle.id, &bundle.name, resource_type, &err));
        }
      }
    }

    for processor in self.plugins.global_postprocessors(&ctx.config)? {
      debug!(id = processor.id(), %resource_type, "running global postprocessor");
      processor.process(resource_type, &mut bundles)?;
    }
    Ok(())
  }

  /// Render, hash and write one bundle. Returns the written outputs and the files read.
  fn build_bundle(&self, bundle: &mut Bundle, ctx: &TypeContext<'_>) -> Result<BuiltBundle> {
    let rendered = self
      .render_bundle(bundle, ctx)
      .with_context(|| format!("failed to render bundle {}", bundle.id))?;
    for variant in &rendered.variants {
      bundle.set_hash_prefix(&variant.key, &variant.hash);
    }

    let mut files = BTreeMap::new();
    for variant in rendered.variants {
      match self.production_file(bundle, &variant.variants, ctx) {
        Some(relative) => {
          files.insert(relative, variant.content);
        }
        None => debug!(bundle = %bundle.id, key = %variant.key, "no production output"),
      }
    }
    files.extend(rendered.debug_files);

    Ok(BuiltBundle {
      outputs: self.commit(&files)?,
      mappings: rendered.mappings,
      binaries: rendered.binaries,
    })
  }

  fn render_bundle(&self, bundle: &Bundle, ctx: &TypeContext<'_>) -> BundlingResult<RenderedBundle> {
    let file_chain = ctx.chains.file_chain(bundle, &ctx.config)?;
    let bundle_chain = ctx.chains.bundle_chain(bundle, &ctx.config)?;
    debug!(
      bundle = %bundle.id,
      file_chain = ?file_chain.ids(),
      bundle_chain = ?bundle_chain.ids(),
      "rendering bundle"
    );

    let mut rendered = RenderedBundle::default();
    let mut processed: HashMap<String, String> = HashMap::new();
    for variants in all_bundle_variants(&bundle.variants) {
      let mut status = ProcessingStatus::new(bundle, self.reader, self.registry, &ctx.settings, self.cache);
      status.variants = variants.clone();

      let mut joined = String::new();
      for member in &bundle.item_paths {
        let content = process_member(&mut status, &file_chain, member)?;
        joined.push_str(&content);
        if !content.is_empty() && !content.ends_with('\n') {
          joined.push('\n');
        }
      }

      status.mode = ProcessingMode::Bundle;
      status.last_path_added = None;
      let reused = if bundle_chain.is_variant_aware() {
        None
      } else {
        processed.get(&joined).cloned()
      };
      let content = match reused {
        Some(content) => content,
        None => {
          let output = bundle_chain.apply(&mut status, joined.clone())?;
          processed.insert(joined, output.clone());
          output
        }
      };

      let key = if bundle.variants.is_empty() {
        String::new()
      } else {
        variant_key(Some(&variants))
      };
      let hash = bundle_hashcode(&content, ctx.algorithm);
      debug!(bundle = %bundle.id, key = %key, hash = %hash, "rendered variant");
      rendered.mappings.extend(status.take_file_mappings());
      rendered.binaries.extend(status.image_cache_busters.drain());
      rendered.variants.push(RenderedVariant {
        variants,
        key,
        hash,
        content,
      });
    }

    if self.debug && !bundle.inclusion.exclude_on_debug {
      rendered.debug_files = self.render_debug_members(bundle, &file_chain, ctx, &mut rendered.binaries)?;
    }
    Ok(rendered)
  }

  /// Members processed individually, laid out under [`DEBUG_DIR`] the way debug mode links them.
  fn render_debug_members(
    &self,
    bundle: &Bundle,
    file_chain: &ProcessorChain,
    ctx: &TypeContext<'_>,
    binaries: &mut BTreeMap<String, String>,
  ) -> BundlingResult<BTreeMap<String, String>> {
    let mut files = BTreeMap::new();
    if bundle.debug_url.is_some() {
      return Ok(files);
    }

    for variants in all_bundle_variants(&bundle.variants) {
      let mut status = ProcessingStatus::new(bundle, self.reader, self.registry, &ctx.settings, self.cache);
      status.variants = variants.clone();
      status.debug = true;

      let debug_paths = bundle.item_debug_paths(&variants, self.registry);
      for (member, debug_path) in bundle.item_paths.iter().zip(debug_paths) {
        let link = if self.registry.is_path_generated(member) {
          build_time_generation_path(
            &format!(
              "/{GENERATOR_DIR}.{}?{GENERATION_PARAM}={debug_path}",
              bundle.resource_type.extension()
            ),
            self.registry,
          )
        } else {
          as_path(member)
        };
        let relative = output_relative(&join_paths(DEBUG_DIR, &link));
        if files.contains_key(&relative) {
          continue;
        }
        let content = process_member(&mut status, file_chain, member)?;
        files.insert(relative, content);
      }
      binaries.extend(status.image_cache_busters.drain());
    }
    Ok(files)
  }

  /// Destination of the production rendering for `variants`, `None` for bundles served from
  /// an alternate URL or only in debug mode.
  fn production_file(&self, bundle: &Bundle, variants: &VariantMap, ctx: &TypeContext<'_>) -> Option<String> {
    let mut handler = NoConditionalComments;
    let path = ProductionPathIterator::new(std::slice::from_ref(bundle), &mut handler, variants).next()?;
    if path.is_external {
      debug!(bundle = %bundle.id, url = %path.path, "served from an alternate url");
      return None;
    }

    let relative = if self.remap {
      let naming = if bundle.variants.is_empty() {
        VariantMap::new()
      } else {
        variants.clone()
      };
      final_bundle_path(&path.path, &naming, false, None, self.registry)
    } else {
      path.path
    };
    let relative = match ctx.settings.servlet_mapping.as_deref() {
      Some(mapping) if self.request.servlet_mapped => join_paths(mapping, &relative),
      _ => relative,
    };
    Some(output_relative(&join_paths(&path.prefix, &relative)))
  }

  /// Stage `files` under the temp directory, then move them into the destination.
  fn commit(&self, files: &BTreeMap<String, String>) -> Result<Vec<String>> {
    let mut staged = Vec::with_capacity(files.len());
    for (relative, content) in files {
      let target = self.staging.join(relative);
      create_parent(&target)?;
      fs::write(&target, content).with_context(|| format!("failed to write {}", target.display()))?;
      staged.push((target, relative.clone()));
    }

    let mut outputs = Vec::with_capacity(staged.len());
    for (staged_path, relative) in staged {
      let destination = self.dest_dir.join(&relative);
      create_parent(&destination)?;
      move_file(&staged_path, &destination)?;
      outputs.push(relative);
    }
    Ok(outputs)
  }

  /// Install every binary resource a stylesheet referenced under its cache-busted path.
  fn install_binaries(&self, keep: &mut BTreeSet<PathBuf>) -> Vec<BinaryReport> {
    let css = PropertiesConfig::new(self.props, ResourceType::Css);
    let binary_mapping = ProcessingSettings::from_properties(&css)
      .ok()
      .and_then(|settings| settings.binary_servlet_mapping);

    let mut installed = Vec::new();
    for (source, busted) in self.cache.snapshot() {
      let published = if self.remap {
        final_image_path(&busted, None)
      } else {
        match &binary_mapping {
          Some(mapping) if self.request.servlet_mapped => join_paths(mapping, &busted),
          _ => busted.clone(),
        }
      };

      let mut relatives = vec![output_relative(&published)];
      if self.debug {
        relatives.push(output_relative(&join_paths(DEBUG_DIR, &published)));
      }

      let mut outputs = Vec::new();
      for relative in relatives {
        let destination = self.dest_dir.join(&relative);
        match self.install_binary_output(&source, &destination) {
          Ok(()) => {
            keep.insert(PathBuf::from(&relative));
            outputs.push(relative);
          }
          Err(err) => warn!(source = %source, error = %format!("{err:#}"), "failed to install binary resource"),
        }
      }
      if !outputs.is_empty() {
        debug!(source = %source, busted = %busted, "installed binary resource");
        installed.push(BinaryReport { source, outputs });
      }
    }
    installed
  }

  fn install_binary_output(&self, source: &str, destination: &Path) -> Result<()> {
    create_parent(destination)?;
    if !self.registry.is_path_generated(source)
      && let Some(physical) = self.reader.physical_path(source)
      && physical.is_file()
    {
      return install_binary(&physical, destination)
        .with_context(|| format!("failed to install {}", destination.display()));
    }
    let bytes = self.registry.read_binary(source, self.reader)?;
    fs::write(destination, bytes).with_context(|| format!("failed to write {}", destination.display()))
  }
}

fn process_member(status: &mut ProcessingStatus<'_>, chain: &ProcessorChain, member: &str) -> BundlingResult<String> {
  status.start_file(member);
  let content = status
    .registry
    .read_resource(member, &status.variants, status.reader)?;
  status.add_file_mapping(member);
  chain.apply(status, content)
}

/// Web path to a destination relative file path.
fn output_relative(path: &str) -> String {
  escape_to_physical_path(path.trim_start_matches('/'))
}

fn create_parent(path: &Path) -> Result<()> {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
  }
  Ok(())
}

fn reset_dir(dir: &Path) -> Result<()> {
  match fs::remove_dir_all(dir) {
    Ok(()) => {}
    Err(err) if err.kind() == ErrorKind::NotFound => {}
    Err(err) => return Err(err).with_context(|| format!("failed to clear {}", dir.display())),
  }
  fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))
}

fn move_file(from: &Path, to: &Path) -> Result<()> {
  if fs::rename(from, to).is_ok() {
    return Ok(());
  }
  fs::copy(from, to).with_context(|| format!("failed to copy {} to {}", from.display(), to.display()))?;
  fs::remove_file(from).with_context(|| format!("failed to remove {}", from.display()))
}

/// Remove every file below `root` not listed in `keep_files`, then any directory left empty.
fn prune_output_tree(root: &Path, keep_files: &BTreeSet<PathBuf>) -> Result<()> {
  if !root.exists() {
    return Ok(());
  }

  for entry in WalkDir::new(root).min_depth(1).contents_first(true) {
    let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
    let path = entry.path();
    if entry.file_type().is_dir() {
      let empty = fs::read_dir(path)
        .with_context(|| format!("failed to read {}", path.display()))?
        .next()
        .is_none();
      if empty {
        fs::remove_dir(path).with_context(|| format!("failed to remove {}", path.display()))?;
      }
      continue;
    }

    let relative = path.strip_prefix(root)?;
    if !keep_files.contains(relative) {
      debug!(path = %relative.display(), "pruning stale output");
      fs::remove_file(path).with_context(|| format!("failed to remove {}", path.display()))?;
    }
  }
  Ok(())
}

/// Hard link `source` to `destination`, copying when linking is not possible.
fn install_binary(source: &Path, destination: &Path) -> std::io::Result<()> {
  if destination.exists() {
    if is_same_file(source, destination)? {
      return Ok(());
    }
    fs::remove_file(destination)?;
  }

  match fs::hard_link(source, destination) {
    Ok(_) => Ok(()),
    Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(()),
    Err(_) => fs::copy(source, destination).map(|_| ()),
  }
}

#[cfg(test)]
mod tests {
  use std::fs::File;
  use std::time::{Duration, SystemTime};

  use pretty_assertions::assert_eq;
  use tempfile::{TempDir, tempdir};

  use super::*;
  use crate::paths::{BinaryHashAlgorithm, binary_checksum};

  const PROPERTIES: &str = "\
jawr.js.bundle.app.id=/bundles/app.js
jawr.js.bundle.app.mappings=/js/a.js,/js/b.js
jawr.css.bundle.site.id=/bundles/site.css
jawr.css.bundle.site.mappings=/css/site.css
";

  fn write(root: &Path, relative: &str, content: &[u8]) -> std::io::Result<()> {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
    }
    fs::write(path, content)
  }

  fn project(properties: &str) -> std::io::Result<TempDir> {
    let temp = tempdir()?;
    let src = temp.path().join("src");
    write(&src, "jawr.properties", properties.as_bytes())?;
    write(&src, "js/a.js", b"// first\nvar a = 1;\n")?;
    write(&src, "js/b.js", b"var b = 2;")?;
    write(&src, "css/site.css", b".logo { background: url(../img/logo.png); }\n")?;
    write(&src, "img/logo.png", b"\x89PNG not really")?;
    Ok(temp)
  }

  fn request(temp: &TempDir) -> ProcessRequest {
    let mut request = ProcessRequest::new(temp.path().join("src"));
    request.temp_dir = Some(temp.path().join("tmp"));
    request.dest_dir = Some(temp.path().join("dist"));
    request
  }

  fn touch(path: &Path, content: &[u8]) -> std::io::Result<()> {
    fs::write(path, content)?;
    File::options()
      .write(true)
      .open(path)?
      .set_modified(SystemTime::now() + Duration::from_secs(10))
  }

  #[test]
  fn prune_output_tree_removes_stale_entries() -> anyhow::Result<()> {
    let temp = tempdir()?;
    let dist = temp.path().join("dist");

    fs::create_dir_all(dist.join("N12/bundles"))?;
    fs::write(dist.join("N12/bundles/all.js"), b"keep")?;
    fs::create_dir_all(dist.join("N12/tmp"))?;
    fs::write(dist.join("N12/tmp/unused.js"), b"unused")?;
    fs::create_dir_all(dist.join("34/bundles"))?;
    fs::write(dist.join("34/bundles/all.js"), b"stale")?;

    let mut keep = BTreeSet::new();
    keep.insert(PathBuf::from("N12/bundles/all.js"));

    prune_output_tree(&dist, &keep)?;

    assert!(dist.join("N12/bundles/all.js").exists());
    assert!(!dist.join("N12/tmp").exists());
    assert!(!dist.join("34").exists());
    Ok(())
  }

  #[test]
  fn install_binary_reuses_existing_links() -> std::io::Result<()> {
    let temp = tempdir()?;
    let source = temp.path().join("logo.png");
    fs::write(&source, b"png")?;
    let destination_dir = temp.path().join("dist/cb1");
    fs::create_dir_all(&destination_dir)?;
    let destination = destination_dir.join("logo.png");

    install_binary(&source, &destination)?;
    assert!(same_file::is_same_file(&source, &destination)?);

    install_binary(&source, &destination)?;
    assert!(same_file::is_same_file(&source, &destination)?);
    Ok(())
  }

  #[test]
  fn writes_hashed_bundles_and_binaries() -> anyhow::Result<()> {
    let temp = project(PROPERTIES)?;
    let report = BundleProcessor::new().process(&request(&temp))?;
    let dist = temp.path().join("dist");
    assert!(!report.has_failures());

    let app = report.bundle("/bundles/app.js").expect("app bundle reported");
    assert_eq!(app.outcome, BundleOutcome::Written);
    let hash = &app.hashes[""];
    assert_eq!(app.outputs, vec![format!("{hash}/bundles/app.js")]);
    let js = fs::read_to_string(dist.join(&app.outputs[0]))?;
    assert!(js.contains("var a=1;"));
    assert!(js.contains("var b=2;"));
    assert!(!js.contains("first"));
    assert_eq!(&bundle_hashcode(&js, BundleHashAlgorithm::Hashcode), hash);

    let checksum = binary_checksum(b"\x89PNG not really", BinaryHashAlgorithm::Crc32);
    let site = report.bundle("/bundles/site.css").expect("site bundle reported");
    let css = fs::read_to_string(dist.join(&site.outputs[0]))?;
    assert!(css.contains(&format!("url(../../cb{checksum}/img/logo.png)")));
    assert!(dist.join(format!("cb{checksum}/img/logo.png")).is_file());
    assert_eq!(report.binaries.len(), 1);

    assert!(dist.join(REPORT_FILE).is_file());
    assert!(temp.path().join("tmp").join(MAPPINGS_FILE).is_file());
    Ok(())
  }

  #[test]
  fn skips_unchanged_bundles_and_rebuilds_changed_ones() -> anyhow::Result<()> {
    let temp = project(PROPERTIES)?;
    let processor = BundleProcessor::new();
    let first = processor.process(&request(&temp))?;

    let second = processor.process(&request(&temp))?;
    let app = second.bundle("/bundles/app.js").expect("app bundle reported");
    assert_eq!(app.outcome, BundleOutcome::Unchanged);
    assert_eq!(second.binaries.len(), 1);
    for output in &second.binaries[0].outputs {
      assert!(temp.path().join("dist").join(output).is_file());
    }
    assert_eq!(app.outputs, first.bundle("/bundles/app.js").expect("first run").outputs);
    assert!(temp.path().join("dist").join(&app.outputs[0]).is_file());

    touch(&temp.path().join("src/js/b.js"), b"var b = 3;")?;
    let third = processor.process(&request(&temp))?;
    let app = third.bundle("/bundles/app.js").expect("app bundle reported");
    assert_eq!(app.outcome, BundleOutcome::Written);
    assert_eq!(
      third.bundle("/bundles/site.css").map(|site| site.outcome),
      Some(BundleOutcome::Unchanged)
    );
    let dist = temp.path().join("dist");
    assert!(fs::read_to_string(dist.join(&app.outputs[0]))?.contains("var b=3;"));
    let stale = &first.bundle("/bundles/app.js").expect("first run").outputs[0];
    assert!(!dist.join(stale).exists());
    Ok(())
  }

  #[test]
  fn failing_bundle_does_not_stop_the_others() -> anyhow::Result<()> {
    let properties = format!(
      "{PROPERTIES}jawr.js.bundle.broken.id=/bundles/broken.js\njawr.js.bundle.broken.mappings=/js/missing.js\n"
    );
    let temp = project(&properties)?;
    let report = BundleProcessor::new().process(&request(&temp))?;

    assert!(report.has_failures());
    let broken = report.bundle("/bundles/broken.js").expect("broken bundle reported");
    assert_eq!(broken.outcome, BundleOutcome::Failed);
    assert!(broken.error.as_deref().is_some_and(|error| error.contains("missing.js")));
    assert!(broken.outputs.is_empty());
    assert_eq!(
      report.bundle("/bundles/app.js").map(|app| app.outcome),
      Some(BundleOutcome::Written)
    );
    Ok(())
  }

  #[test]
  fn dependents_of_a_failed_bundle_fail_alone() -> anyhow::Result<()> {
    let properties = format!(
      "{PROPERTIES}jawr.js.bundle.app.dependencies=broken\njawr.js.bundle.broken.id=/bundles/broken.js\njawr.js.bundle.broken.mappings=/js/x.txt\n"
    );
    let temp = project(&properties)?;
    let report = BundleProcessor::new().process(&request(&temp))?;

    let app = report.bundle("/bundles/app.js").expect("app reported");
    assert_eq!(app.outcome, BundleOutcome::Failed);
    assert!(app.error.as_deref().is_some_and(|error| error.contains("dependency 'broken' failed")));
    assert_eq!(
      report.bundle("/bundles/broken.js").map(|broken| broken.outcome),
      Some(BundleOutcome::Failed)
    );
    assert_eq!(
      report.bundle("/bundles/site.css").map(|site| site.outcome),
      Some(BundleOutcome::Written)
    );
    Ok(())
  }

  #[test]
  fn undeclared_dependencies_abort_the_run() -> anyhow::Result<()> {
    let properties = format!("{PROPERTIES}jawr.js.bundle.app.dependencies=nowhere\n");
    let temp = project(&properties)?;
    let err = BundleProcessor::new()
      .process(&request(&temp))
      .expect_err("undeclared dependency");
    assert!(format!("{err:#}").contains("unknown bundle 'nowhere'"));
    Ok(())
  }

  #[test]
  fn remaps_variant_bundles_to_logical_names() -> anyhow::Result<()> {
    let properties = format!(
      "{PROPERTIES}jawr.js.bundle.msg.id=/bundles/msg.js\njawr.js.bundle.msg.mappings=/js/a.js\njawr.js.bundle.msg.variants=locale:en:en,fr\n"
    );
    let temp = project(&properties)?;
    let mut request = request(&temp);
    request.use_file_remapping = true;
    let report = BundleProcessor::new().process(&request)?;

    let msg = report.bundle("/bundles/msg.js").expect("msg bundle reported");
    assert_eq!(
      msg.outputs,
      vec!["bundles/msg@en.js".to_string(), "bundles/msg@fr.js".to_string()]
    );
    assert_eq!(msg.hashes.keys().collect::<Vec<_>>(), vec!["en", "fr"]);
    assert_eq!(
      report.bundle("/bundles/app.js").map(|app| app.outputs.clone()),
      Some(vec!["bundles/app.js".to_string()])
    );
    let dist = temp.path().join("dist");
    assert!(dist.join("bundles/msg@fr.js").is_file());
    Ok(())
  }

  #[test]
  fn hashed_variant_outputs_carry_the_variant_key() -> anyhow::Result<()> {
    let properties = "\
jawr.js.bundle.msg.id=/bundles/msg.js
jawr.js.bundle.msg.mappings=/js/a.js
jawr.js.bundle.msg.variants=locale:en:en,fr
";
    let temp = project(properties)?;
    let report = BundleProcessor::new().process(&request(&temp))?;

    let msg = report.bundle("/bundles/msg.js").expect("msg bundle reported");
    let hash = &msg.hashes["en"];
    assert_eq!(msg.hashes["fr"], *hash);
    assert_eq!(
      msg.outputs,
      vec![format!("{hash}.en/bundles/msg.js"), format!("{hash}.fr/bundles/msg.js")]
    );
    Ok(())
  }

  #[test]
  fn debug_mode_writes_members_separately() -> anyhow::Result<()> {
    let properties = format!(
      "{PROPERTIES}jawr.debug.on=true\njawr.js.bundle.dbg.id=/bundles/dbg.js\njawr.js.bundle.dbg.mappings=/js/b.js\njawr.js.bundle.dbg.debugonly=true\n"
    );
    let temp = project(&properties)?;
    let report = BundleProcessor::new().process(&request(&temp))?;
    let dist = temp.path().join("dist");

    assert_eq!(fs::read_to_string(dist.join("debug/js/a.js"))?, "// first\nvar a = 1;\n");
    assert!(dist.join("debug/css/site.css").is_file());

    let dbg = report.bundle("/bundles/dbg.js").expect("debug only bundle reported");
    assert_eq!(dbg.outputs, vec!["debug/js/b.js".to_string()]);

    let checksum = binary_checksum(b"\x89PNG not really", BinaryHashAlgorithm::Crc32);
    assert!(dist.join(format!("debug/cb{checksum}/img/logo.png")).is_file());
    Ok(())
  }

  #[test]
  fn selection_excludes_bundles() -> anyhow::Result<()> {
    let temp = project(PROPERTIES)?;
    let mut request = request(&temp);
    request.selection = BundleSelection::new(Vec::new(), vec!["site".to_string()]);
    let report = BundleProcessor::new().process(&request)?;

    assert_eq!(
      report.bundle("/bundles/site.css").map(|site| site.outcome),
      Some(BundleOutcome::Excluded)
    );
    assert!(report.binaries.is_empty());
    assert_eq!(report.count(BundleOutcome::Written), 1);
    Ok(())
  }

  #[test]
  fn rejects_shared_temp_and_destination() -> anyhow::Result<()> {
    let temp = project(PROPERTIES)?;
    let mut request = request(&temp);
    request.dest_dir = request.temp_dir.clone();
    assert!(BundleProcessor::new().process(&request).is_err());
    Ok(())
  }
}
