use crate::error::BundlingResult;
use crate::reader::CLASSPATH_PREFIX;

use super::{Generator, GeneratorContext, ResourceResolver};

/// Serves `jar:` resources from the classpath roots handed to the reader.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClasspathGenerator;

impl Generator for ClasspathGenerator {
  fn resolver(&self) -> ResourceResolver {
    ResourceResolver::prefixed("jar")
  }

  fn create_resource(&self, context: &GeneratorContext<'_>) -> BundlingResult<String> {
    context
      .reader
      .resource(&format!("{CLASSPATH_PREFIX}{}", context.path))
  }

  fn create_binary(&self, context: &GeneratorContext<'_>) -> BundlingResult<Vec<u8>> {
    context
      .reader
      .resource_bytes(&format!("{CLASSPATH_PREFIX}{}", context.path))
  }

  fn is_binary(&self) -> bool {
    true
  }

  fn handles_css_images(&self) -> bool {
    true
  }
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::tempdir;

  use super::*;
  use crate::reader::FileSystemReader;
  use crate::variant::VariantMap;

  #[test]
  fn reads_from_classpath_roots() -> std::io::Result<()> {
    let temp = tempdir()?;
    let classes = temp.path().join("classes");
    fs::create_dir_all(classes.join("lib"))?;
    fs::write(classes.join("lib/util.js"), "var util;")?;

    let reader = FileSystemReader::new(temp.path().join("web")).with_classpath([classes]);
    let variants = VariantMap::new();
    let context = GeneratorContext {
      requested_path: "jar:lib/util.js",
      path: "lib/util.js",
      variants: &variants,
      reader: &reader,
    };
    assert_eq!(ClasspathGenerator.create_resource(&context).unwrap(), "var util;");
    Ok(())
  }
}
