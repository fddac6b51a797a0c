//! Access to source resources, independent of where they physically live.

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use crate::error::{BundlingError, BundlingResult};

/// Prefix marking classpath resources.
pub const CLASSPATH_PREFIX: &str = "jar:";

/// Contract the pipeline uses to read source files.
///
/// Paths are web paths relative to the source root (`/js/app.js`). Paths prefixed with
/// `jar:` are looked up on the classpath roots instead.
pub trait ResourceReaderHandler: Send + Sync {
  /// Read a text resource.
  fn resource(&self, path: &str) -> BundlingResult<String> {
    let bytes = self.resource_bytes(path)?;
    String::from_utf8(bytes)
      .map_err(|err| BundlingError::processing(path, format!("resource is not valid UTF-8: {err}")))
  }

  /// Read a binary resource.
  fn resource_bytes(&self, path: &str) -> BundlingResult<Vec<u8>>;

  /// Names under a directory; sub directories end with `/`.
  fn resource_names(&self, dir: &str) -> BundlingResult<BTreeSet<String>>;

  /// Whether `path` is a directory.
  fn is_directory(&self, path: &str) -> bool;

  /// Root directory resources are read from.
  fn working_directory(&self) -> &Path;

  /// Last modification time, `None` when the resource does not exist.
  fn last_modified(&self, path: &str) -> Option<SystemTime>;

  /// Physical file backing `path`, if there is one.
  fn physical_path(&self, path: &str) -> Option<PathBuf>;
}

/// Reader over a source directory plus extra classpath roots.
#[derive(Debug, Clone)]
pub struct FileSystemReader {
  root: PathBuf,
  classpath: Vec<PathBuf>,
}

impl FileSystemReader {
  /// Reader rooted at `root`.
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      classpath: Vec::new(),
    }
  }

  /// Add roots searched, in order, for `jar:` resources.
  pub fn with_classpath<I, P>(mut self, roots: I) -> Self
  where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
  {
    self.classpath.extend(roots.into_iter().map(Into::into));
    self
  }

  fn locate(&self, path: &str) -> Option<PathBuf> {
    if let Some(classpath_path) = path.strip_prefix(CLASSPATH_PREFIX) {
      let relative = safe_relative(classpath_path)?;
      return self
        .classpath
        .iter()
        .map(|root| root.join(&relative))
        .find(|candidate| candidate.exists());
    }

    let relative = safe_relative(path)?;
    Some(self.root.join(relative))
  }
}

fn safe_relative(path: &str) -> Option<PathBuf> {
  let mut relative = PathBuf::new();
  for segment in path.split('/') {
    match segment {
      "" | "." => {}
      ".." => return None,
      other => relative.push(other),
    }
  }
  Some(relative)
}

impl ResourceReaderHandler for FileSystemReader {
  fn resource_bytes(&self, path: &str) -> BundlingResult<Vec<u8>> {
    let not_found = || BundlingError::ResourceNotFound {
      path: path.to_string(),
    };
    let physical = self.locate(path).ok_or_else(not_found)?;
    debug!(path, file = %physical.display(), "reading resource");
    match fs::read(&physical) {
      Ok(bytes) => Ok(bytes),
      Err(err) if err.kind() == ErrorKind::NotFound => Err(not_found()),
      Err(err) if physical.is_dir() => Err(BundlingError::processing(
        path,
        format!("expected a file but found a directory ({err})"),
      )),
      Err(err) => Err(BundlingError::io(physical, err)),
    }
  }

  fn resource_names(&self, dir: &str) -> BundlingResult<BTreeSet<String>> {
    let physical = self.locate(dir).ok_or_else(|| BundlingError::ResourceNotFound {
      path: dir.to_string(),
    })?;
    let entries = match fs::read_dir(&physical) {
      Ok(entries) => entries,
      Err(err) if err.kind() == ErrorKind::NotFound => {
        return Err(BundlingError::ResourceNotFound {
          path: dir.to_string(),
        });
      }
      Err(err) => return Err(BundlingError::io(physical, err)),
    };

    let mut names = BTreeSet::new();
    for entry in entries {
      let entry = entry.map_err(|err| BundlingError::io(&physical, err))?;
      let Some(name) = entry.file_name().to_str().map(str::to_string) else {
        continue;
      };
      let is_dir = entry
        .file_type()
        .map_err(|err| BundlingError::io(entry.path(), err))?
        .is_dir();
      names.insert(if is_dir { format!("{name}/") } else { name });
    }
    Ok(names)
  }

  fn is_directory(&self, path: &str) -> bool {
    self.locate(path).is_some_and(|physical| physical.is_dir())
  }

  fn working_directory(&self) -> &Path {
    &self.root
  }

  fn last_modified(&self, path: &str) -> Option<SystemTime> {
    let physical = self.locate(path)?;
    fs::metadata(physical).and_then(|meta| meta.modified()).ok()
  }

  fn physical_path(&self, path: &str) -> Option<PathBuf> {
    self.locate(path).filter(|physical| physical.is_file())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  #[test]
  fn reads_web_and_classpath_resources() -> std::io::Result<()> {
    let temp = tempdir()?;
    let root = temp.path().join("web");
    let classes = temp.path().join("classes");
    fs::create_dir_all(root.join("js/lib"))?;
    fs::create_dir_all(classes.join("img"))?;
    fs::write(root.join("js/app.js"), "var a = 1;")?;
    fs::write(classes.join("img/logo.png"), [1u8, 2, 3])?;

    let reader = FileSystemReader::new(&root).with_classpath([&classes]);
    assert_eq!(reader.resource("/js/app.js").unwrap(), "var a = 1;");
    assert_eq!(reader.resource_bytes("jar:img/logo.png").unwrap(), vec![1, 2, 3]);
    assert!(reader.is_directory("/js/lib"));
    assert!(reader.last_modified("/js/app.js").is_some());

    let names = reader.resource_names("/js").unwrap();
    assert!(names.contains("app.js"));
    assert!(names.contains("lib/"));
    Ok(())
  }

  #[test]
  fn missing_and_escaping_paths_are_not_found() -> std::io::Result<()> {
    let temp = tempdir()?;
    let reader = FileSystemReader::new(temp.path());
    assert!(matches!(
      reader.resource("/missing.js"),
      Err(BundlingError::ResourceNotFound { .. })
    ));
    assert!(matches!(
      reader.resource("/../etc/passwd"),
      Err(BundlingError::ResourceNotFound { .. })
    ));
    Ok(())
  }
}
