//! Filters deciding which bundles a run renders.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::models::Bundle;

/// Selection filter over configured bundles.
pub trait BundleInclusion {
  /// Returns `true` when `bundle` should be rendered.
  fn is_included(&self, bundle: &Bundle) -> bool;
}

/// Selection that keeps every bundle.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllBundles;

impl BundleInclusion for AllBundles {
  fn is_included(&self, _bundle: &Bundle) -> bool {
    true
  }
}

#[derive(Debug, Default, Deserialize)]
struct BundleSelectionFile {
  #[serde(default)]
  include: Vec<String>,
  #[serde(default)]
  exclude: Vec<String>,
}

/// Include/exclude rules over bundle names and ids.
///
/// A rule matches a bundle whose name equals it, or whose id equals it or lies below it
/// (`/bundles` matches `/bundles/all.js`). Exclusions win over inclusions; with no inclusions
/// every bundle not excluded is rendered.
#[derive(Debug, Clone, Default)]
pub struct BundleSelection {
  include: Option<BTreeSet<String>>,
  exclude: BTreeSet<String>,
}

/// Errors that can occur while loading a selection file.
#[derive(Debug, Error)]
pub enum BundleSelectionError {
  /// Failed to read the selection file from disk.
  #[error("failed to read {}: {source}", path.display())]
  Io {
    /// Path that caused the error.
    path: PathBuf,
    /// Source I/O error.
    #[source]
    source: std::io::Error,
  },
  /// Failed to parse the JSON selection file.
  #[error("failed to parse {}: {source}", path.display())]
  Parse {
    /// Path that caused the error.
    path: PathBuf,
    /// Source parse error.
    #[source]
    source: serde_json::Error,
  },
}

impl BundleSelection {
  /// Selection from explicit rule lists.
  pub fn new(include: impl IntoIterator<Item = String>, exclude: impl IntoIterator<Item = String>) -> Self {
    Self::from(BundleSelectionFile {
      include: include.into_iter().collect(),
      exclude: exclude.into_iter().collect(),
    })
  }

  /// Load rules from a JSON file; a missing file selects everything.
  pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, BundleSelectionError> {
    let path = path.as_ref();
    let contents = match fs::read_to_string(path) {
      Ok(contents) => contents,
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
        return Ok(Self::default());
      }
      Err(err) => {
        return Err(BundleSelectionError::Io {
          path: path.to_path_buf(),
          source: err,
        });
      }
    };

    let file: BundleSelectionFile =
      serde_json::from_str(&contents).map_err(|err| BundleSelectionError::Parse {
        path: path.to_path_buf(),
        source: err,
      })?;
    Ok(Self::from(file))
  }

  /// Rules of `other` added to this selection.
  pub fn merged_with(mut self, other: BundleSelection) -> Self {
    self.exclude.extend(other.exclude);
    self.include = match (self.include, other.include) {
      (Some(mut mine), Some(theirs)) => {
        mine.extend(theirs);
        Some(mine)
      }
      (mine, theirs) => mine.or(theirs),
    };
    self
  }

  /// Whether no rule is active.
  pub fn is_unfiltered(&self) -> bool {
    self.include.is_none() && self.exclude.is_empty()
  }

  fn matches(rules: &BTreeSet<String>, bundle: &Bundle) -> bool {
    rules
      .iter()
      .any(|rule| rule == &bundle.name || scope_matches(rule, &bundle.id))
  }
}

impl BundleInclusion for BundleSelection {
  fn is_included(&self, bundle: &Bundle) -> bool {
    if Self::matches(&self.exclude, bundle) {
      return false;
    }
    match &self.include {
      Some(include) => Self::matches(include, bundle),
      None => true,
    }
  }
}

impl From<BundleSelectionFile> for BundleSelection {
  fn from(file: BundleSelectionFile) -> Self {
    let include = normalise_list(file.include);
    let exclude = normalise_list(file.exclude);

    Self {
      include: (!include.is_empty()).then_some(include),
      exclude,
    }
  }
}

fn normalise_list(values: impl IntoIterator<Item = String>) -> BTreeSet<String> {
  values
    .into_iter()
    .map(|value| value.trim().to_string())
    .filter(|value| !value.is_empty())
    .collect()
}

fn scope_matches(rule: &str, id: &str) -> bool {
  let rule = rule.trim_end_matches('/');
  if id == rule {
    return true;
  }
  rule.starts_with('/')
    && id
      .strip_prefix(rule)
      .is_some_and(|suffix| suffix.starts_with('/'))
}

#[cfg(test)]
mod tests {
  use tempfile::tempdir;

  use super::*;
  use crate::models::ResourceType;

  fn bundle(id: &str, name: &str) -> Bundle {
    Bundle::new(id, name, ResourceType::Js)
  }

  #[test]
  fn defaults_to_including_all_bundles() {
    let selection = BundleSelection::default();
    assert!(selection.is_included(&bundle("/all.js", "all")));
    assert!(selection.is_unfiltered());
  }

  #[test]
  fn matches_names_and_id_scopes() {
    let selection = BundleSelection::new(
      vec!["/bundles/".into(), "vendor".into()],
      vec![" /bundles/admin.js ".into(), String::new()],
    );

    assert!(selection.is_included(&bundle("/bundles/all.js", "all")));
    assert!(selection.is_included(&bundle("/lib/v.js", "vendor")));
    assert!(!selection.is_included(&bundle("/bundles/admin.js", "admin")));
    assert!(!selection.is_included(&bundle("/bundlesx/a.js", "a")));
    assert!(!selection.is_included(&bundle("/other.js", "other")));
  }

  #[test]
  fn merges_rules() {
    let file = BundleSelection::new(vec!["a".into()], Vec::new());
    let cli = BundleSelection::new(Vec::new(), vec!["a".into()]);
    let merged = file.merged_with(cli);
    assert!(!merged.is_included(&bundle("/a.js", "a")));
    assert!(!merged.is_included(&bundle("/b.js", "b")));
  }

  #[test]
  fn load_from_path_returns_default_for_missing_file() -> std::io::Result<()> {
    let temp = tempdir()?;
    let selection = BundleSelection::load_from_path(temp.path().join("bundles.local.json"))
      .expect("missing files should not produce an error");
    assert!(selection.is_unfiltered());
    Ok(())
  }

  #[test]
  fn load_from_path_reads_configuration() -> std::io::Result<()> {
    let temp = tempdir()?;
    let path = temp.path().join("bundles.local.json");
    fs::write(&path, r#"{"include": ["a", "b"], "exclude": ["b", ""]}"#)?;

    let selection = BundleSelection::load_from_path(&path).expect("configuration should load");
    assert!(selection.is_included(&bundle("/a.js", "a")));
    assert!(!selection.is_included(&bundle("/b.js", "b")));
    assert!(!selection.is_included(&bundle("/c.js", "c")));

    fs::write(&path, "{")?;
    assert!(matches!(
      BundleSelection::load_from_path(&path),
      Err(BundleSelectionError::Parse { .. })
    ));
    Ok(())
  }
}
