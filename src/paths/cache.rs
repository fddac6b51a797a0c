use std::collections::HashMap;

use parking_lot::RwLock;

/// Shared map from binary resource paths to their cache-busted URLs.
///
/// Reads never block each other. Concurrent inserts for the same key store the same value,
/// so the last write winning is harmless.
#[derive(Debug, Default)]
pub struct BinaryPathCache {
  entries: RwLock<HashMap<String, String>>,
}

impl BinaryPathCache {
  /// Empty cache.
  pub fn new() -> Self {
    Self::default()
  }

  /// Cache-busted URL recorded for `path`.
  pub fn get(&self, path: &str) -> Option<String> {
    self.entries.read().get(path).cloned()
  }

  /// Record the cache-busted URL of `path`.
  pub fn insert(&self, path: impl Into<String>, busted: impl Into<String>) {
    self.entries.write().insert(path.into(), busted.into());
  }

  /// Number of recorded paths.
  pub fn len(&self) -> usize {
    self.entries.read().len()
  }

  /// Whether nothing has been recorded.
  pub fn is_empty(&self) -> bool {
    self.entries.read().is_empty()
  }

  /// Copy of every mapping, sorted by source path.
  pub fn snapshot(&self) -> Vec<(String, String)> {
    let mut entries: Vec<_> = self
      .entries
      .read()
      .iter()
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect();
    entries.sort();
    entries
  }
}
