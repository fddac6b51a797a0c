//! Prepends the license files collected for a bundle.

use tracing::debug;

use crate::error::{BundlingError, BundlingResult};

use super::{ProcessingStatus, Processor, ids};

/// `license` processor.
#[derive(Debug, Default, Clone, Copy)]
pub struct LicenseIncluderProcessor;

impl Processor for LicenseIncluderProcessor {
  fn id(&self) -> &str {
    ids::LICENSE
  }

  fn apply(&self, status: &mut ProcessingStatus<'_>, content: String) -> BundlingResult<String> {
    let bundle = status.bundle;
    if bundle.license_paths.is_empty() {
      return Ok(content);
    }

    let mut licenses = Vec::with_capacity(bundle.license_paths.len());
    for path in &bundle.license_paths {
      debug!(bundle = %bundle.id, path, "adding license file");
      let text = status.reader.resource(path).map_err(|err| match err {
        BundlingError::ResourceNotFound { .. } => {
          BundlingError::processing(path.as_str(), "license file listed for the bundle is missing")
        }
        other => other,
      })?;
      status.add_file_mapping(path);
      licenses.push(text.lines().collect::<Vec<_>>().join("\n"));
    }

    let mut out = licenses.join("\n");
    out.push_str(&content);
    Ok(out)
  }
}

#[cfg(test)]
mod tests {
  use std::fs;

  use pretty_assertions::assert_eq;
  use tempfile::tempdir;

  use super::*;
  use crate::generator::GeneratorRegistry;
  use crate::models::{Bundle, ResourceType};
  use crate::paths::BinaryPathCache;
  use crate::postprocess::ProcessingSettings;
  use crate::reader::FileSystemReader;

  #[test]
  fn prepends_licenses_in_order() -> std::io::Result<()> {
    let temp = tempdir()?;
    fs::create_dir_all(temp.path().join("js"))?;
    fs::write(temp.path().join("js/.license"), "/* MIT */\r\n")?;
    fs::write(temp.path().join("js/LICENSE.txt"), "/* Apache\n * 2.0 */\n")?;

    let reader = FileSystemReader::new(temp.path());
    let registry = GeneratorRegistry::default();
    let settings = ProcessingSettings::default();
    let cache = BinaryPathCache::new();
    let mut bundle = Bundle::new("/all.js", "all", ResourceType::Js);
    bundle.license_paths = vec!["/js/.license".into(), "/js/LICENSE.txt".into()];
    let mut status = ProcessingStatus::new(&bundle, &reader, &registry, &settings, &cache);

    let out = LicenseIncluderProcessor
      .apply(&mut status, "var a=1;".into())
      .unwrap();
    assert_eq!(out, "/* MIT */\n/* Apache\n * 2.0 */var a=1;");
    assert_eq!(status.file_mappings().len(), 2);
    Ok(())
  }

  #[test]
  fn missing_license_fails_the_bundle() -> std::io::Result<()> {
    let temp = tempdir()?;
    let reader = FileSystemReader::new(temp.path());
    let registry = GeneratorRegistry::default();
    let settings = ProcessingSettings::default();
    let cache = BinaryPathCache::new();
    let mut bundle = Bundle::new("/all.js", "all", ResourceType::Js);
    bundle.license_paths = vec!["/js/.license".into()];
    let mut status = ProcessingStatus::new(&bundle, &reader, &registry, &settings, &cache);

    let err = LicenseIncluderProcessor
      .apply(&mut status, String::new())
      .unwrap_err();
    assert!(matches!(err, BundlingError::Processing { .. }));
    Ok(())
  }
}
