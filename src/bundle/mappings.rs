//! Records which source files each bundle was built from, to skip unchanged bundles.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{Bundle, FilePathMapping};

/// File name of the persisted store inside the temp directory.
pub const MAPPINGS_FILE: &str = ".bundle-mappings.json";

/// Source files per bundle id, with the modification time seen when each was read.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePathMappings {
  bundles: BTreeMap<String, Vec<FilePathMapping>>,
}

impl FilePathMappings {
  /// Load the store, or start empty when the file does not exist.
  pub fn load(path: &Path) -> Result<Self> {
    match fs::read_to_string(path) {
      Ok(contents) => serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse {}", path.display())),
      Err(err) if err.kind() == ErrorKind::NotFound => Ok(Self::default()),
      Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
  }

  /// Persist the store as JSON.
  pub fn save(&self, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)
        .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(self)?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
  }

  /// Add a mapping. A path already recorded for the bundle only has its time updated.
  pub fn add(&mut self, mapping: FilePathMapping) {
    let entries = self.bundles.entry(mapping.bundle.clone()).or_default();
    match entries.iter_mut().find(|existing| existing.path == mapping.path) {
      Some(existing) => existing.last_modified = mapping.last_modified,
      None => entries.push(mapping),
    }
  }

  /// Replace everything recorded for `bundle_id`.
  pub fn replace(&mut self, bundle_id: &str, mappings: impl IntoIterator<Item = FilePathMapping>) {
    self.bundles.remove(bundle_id);
    for mapping in mappings {
      self.add(mapping);
    }
  }

  /// Mappings recorded for `bundle_id`.
  pub fn mappings(&self, bundle_id: &str) -> &[FilePathMapping] {
    self
      .bundles
      .get(bundle_id)
      .map(Vec::as_slice)
      .unwrap_or_default()
  }

  /// Whether a recorded file changed or vanished. Bundles never built are dirty.
  pub fn is_dirty(&self, bundle_id: &str) -> bool {
    let Some(mappings) = self.bundles.get(bundle_id) else {
      return true;
    };
    mappings.is_empty()
      || mappings.iter().any(|mapping| {
        let current = modified_millis(Path::new(&mapping.path));
        let changed = current != Some(mapping.last_modified);
        if changed {
          debug!(bundle = bundle_id, path = %mapping.path, "source changed");
        }
        changed
      })
  }

  /// Set the dirty flag of every bundle and return how many are dirty.
  pub fn refresh_dirty_flags(&self, bundles: &mut [Bundle]) -> usize {
    bundles
      .iter_mut()
      .map(|bundle| {
        bundle.dirty = self.is_dirty(&bundle.id);
        bundle.dirty
      })
      .filter(|dirty| *dirty)
      .count()
  }
}

/// Modification time of `path` in milliseconds since the Unix epoch.
pub fn modified_millis(path: &Path) -> Option<u64> {
  let modified = fs::metadata(path).and_then(|meta| meta.modified()).ok()?;
  system_time_millis(modified)
}

/// Milliseconds since the Unix epoch.
pub fn system_time_millis(time: SystemTime) -> Option<u64> {
  let elapsed = time.duration_since(UNIX_EPOCH).ok()?;
  u64::try_from(elapsed.as_millis()).ok()
}

#[cfg(test)]
mod tests {
  use std::fs::File;
  use std::time::Duration;

  use tempfile::tempdir;

  use super::*;
  use crate::models::ResourceType;

  fn mapping(bundle: &str, path: &Path) -> FilePathMapping {
    FilePathMapping {
      bundle: bundle.to_string(),
      path: path.to_string_lossy().into_owned(),
      last_modified: modified_millis(path).unwrap(),
    }
  }

  #[test]
  fn touching_a_member_only_dirties_its_bundle() -> std::io::Result<()> {
    let temp = tempdir()?;
    let a = temp.path().join("a.js");
    let b = temp.path().join("b.js");
    fs::write(&a, "a")?;
    fs::write(&b, "b")?;

    let mut store = FilePathMappings::default();
    store.add(mapping("/a.js", &a));
    store.add(mapping("/b.js", &b));

    let mut bundles = vec![
      Bundle::new("/a.js", "a", ResourceType::Js),
      Bundle::new("/b.js", "b", ResourceType::Js),
    ];
    assert_eq!(store.refresh_dirty_flags(&mut bundles), 0);

    let later = SystemTime::now() + Duration::from_secs(60);
    File::options().write(true).open(&a)?.set_modified(later)?;

    assert_eq!(store.refresh_dirty_flags(&mut bundles), 1);
    assert!(bundles[0].dirty);
    assert!(!bundles[1].dirty);
    Ok(())
  }

  #[test]
  fn unknown_or_deleted_sources_are_dirty() -> std::io::Result<()> {
    let temp = tempdir()?;
    let a = temp.path().join("a.js");
    fs::write(&a, "a")?;

    let mut store = FilePathMappings::default();
    assert!(store.is_dirty("/a.js"));

    store.add(mapping("/a.js", &a));
    assert!(!store.is_dirty("/a.js"));

    fs::remove_file(&a)?;
    assert!(store.is_dirty("/a.js"));
    Ok(())
  }

  #[test]
  fn re_adding_a_path_updates_its_time() {
    let mut store = FilePathMappings::default();
    let mut first = FilePathMapping {
      bundle: "/a.js".into(),
      path: "/src/a.js".into(),
      last_modified: 1,
    };
    store.add(first.clone());
    first.last_modified = 2;
    store.add(first);

    assert_eq!(store.mappings("/a.js").len(), 1);
    assert_eq!(store.mappings("/a.js")[0].last_modified, 2);
  }

  #[test]
  fn persists_as_json() -> anyhow::Result<()> {
    let temp = tempdir()?;
    let path = temp.path().join("nested").join(MAPPINGS_FILE);
    let mut store = FilePathMappings::default();
    store.add(FilePathMapping {
      bundle: "/a.js".into(),
      path: "/src/a.js".into(),
      last_modified: 42,
    });
    store.save(&path)?;

    assert_eq!(FilePathMappings::load(&path)?, store);
    assert_eq!(
      FilePathMappings::load(&temp.path().join("missing.json"))?,
      FilePathMappings::default()
    );
    Ok(())
  }
}
