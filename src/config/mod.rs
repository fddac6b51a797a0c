//! Project configuration: the discoverable `asset-bundler` file and the bundle properties.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use serde::Deserialize;
use tracing::debug;

use crate::paths::{BinaryHashAlgorithm, BundleHashAlgorithm};

pub mod properties;

use properties::{PROPS_PREFIX, Properties};

const CONFIG_FILE_NAMES: &[&str] = &["asset-bundler.json", "asset-bundler.yaml", "asset-bundler.yml"];

/// `jawr.debug.on`: render bundles for debug mode.
pub const DEBUG_ON: &str = "debug.on";
/// `jawr.bundle.hashcode.generator`: `hashcode` or `md5`.
pub const BUNDLE_HASHCODE_GENERATOR: &str = "bundle.hashcode.generator";
/// `jawr.binary.hash.algorithm`: `CRC32` or `MD5`.
pub const BINARY_HASH_ALGORITHM: &str = "binary.hash.algorithm";

/// Discoverable configuration of one bundling project.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BundlerConfig {
  /// Properties file declaring the bundles, relative to the source directory.
  pub properties_file: String,
  /// Properties applied over the properties file.
  pub properties: IndexMap<String, String>,
  /// Scratch directory, relative to the source directory unless given on the command line.
  pub temp_dir: String,
  /// Output directory, relative to the source directory unless given on the command line.
  pub dest_dir: String,
  /// Extra roots searched for `jar:` resources.
  pub classpath: Vec<String>,
  /// JSON file with `include`/`exclude` bundle names, relative to the source directory.
  pub selection_file: String,
  /// Render for debug mode unless the properties say otherwise.
  pub debug: bool,
  /// Write bundles under their logical names instead of hash prefixed paths.
  pub file_remapping: bool,
  /// Default bundle hash algorithm.
  pub bundle_hash_algorithm: BundleHashAlgorithm,
  /// Default binary checksum algorithm.
  pub binary_hash_algorithm: BinaryHashAlgorithm,
}

impl Default for BundlerConfig {
  fn default() -> Self {
    Self {
      properties_file: "jawr.properties".into(),
      properties: IndexMap::new(),
      temp_dir: "target/asset-bundler/tmp".into(),
      dest_dir: "target/asset-bundler/dist".into(),
      classpath: Vec::new(),
      selection_file: "bundles.local.json".into(),
      debug: false,
      file_remapping: false,
      bundle_hash_algorithm: BundleHashAlgorithm::default(),
      binary_hash_algorithm: BinaryHashAlgorithm::default(),
    }
  }
}

impl BundlerConfig {
  /// Look for `asset-bundler.json`, `.yaml` or `.yml` in `dir`, falling back to the defaults.
  pub fn discover(dir: &Path) -> Result<Self> {
    for name in CONFIG_FILE_NAMES {
      let candidate = dir.join(name);
      if candidate.is_file() {
        return Self::from_path(&candidate);
      }
    }
    debug!(dir = %dir.display(), "no configuration file, using defaults");
    Ok(Self::default())
  }

  /// Read configuration from a JSON or YAML file, chosen by extension.
  pub fn from_path(path: &Path) -> Result<Self> {
    let content = fs::read_to_string(path)
      .with_context(|| format!("failed to read configuration {}", path.display()))?;
    let config = match path.extension().and_then(|ext| ext.to_str()) {
      Some("json") => serde_json::from_str(&content)
        .with_context(|| format!("failed to parse configuration {}", path.display()))?,
      Some("yaml" | "yml") => serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse configuration {}", path.display()))?,
      _ => bail!("unsupported configuration format {}", path.display()),
    };
    debug!(path = %path.display(), "loaded configuration");
    Ok(config)
  }

  /// Path of the properties file below `source_dir`.
  pub fn properties_path(&self, source_dir: &Path) -> PathBuf {
    source_dir.join(&self.properties_file)
  }

  /// Path of the selection file below `source_dir`.
  pub fn selection_path(&self, source_dir: &Path) -> PathBuf {
    source_dir.join(&self.selection_file)
  }

  /// Merged bundle properties: the properties file, then the inline properties, then the
  /// configuration defaults for keys neither of them sets.
  pub fn load_properties(&self, source_dir: &Path) -> Result<Properties> {
    let path = self.properties_path(source_dir);
    let mut props = if path.is_file() {
      Properties::load(&path)?
    } else if self.properties.is_empty() {
      bail!(
        "no bundle properties: {} does not exist and the configuration declares none",
        path.display()
      );
    } else {
      Properties::default()
    };

    for (key, value) in &self.properties {
      props.insert(key.clone(), value.clone());
    }

    let defaults = [
      (DEBUG_ON, self.debug.to_string()),
      (BUNDLE_HASHCODE_GENERATOR, bundle_algorithm_name(self.bundle_hash_algorithm).to_string()),
      (BINARY_HASH_ALGORITHM, binary_algorithm_name(self.binary_hash_algorithm).to_string()),
    ];
    for (key, value) in defaults {
      let key = format!("{PROPS_PREFIX}{key}");
      if props.get(&key).is_none() {
        props.insert(key, value);
      }
    }
    Ok(props)
  }
}

fn bundle_algorithm_name(algorithm: BundleHashAlgorithm) -> &'static str {
  match algorithm {
    BundleHashAlgorithm::Hashcode => "hashcode",
    BundleHashAlgorithm::Md5 => "md5",
  }
}

fn binary_algorithm_name(algorithm: BinaryHashAlgorithm) -> &'static str {
  match algorithm {
    BinaryHashAlgorithm::Crc32 => "CRC32",
    BinaryHashAlgorithm::Md5 => "MD5",
  }
}
