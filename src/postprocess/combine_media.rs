//! Wraps a stylesheet bundle in the media rule it is declared for.

use tracing::{debug, warn};

use crate::error::BundlingResult;

use super::{ProcessingStatus, Processor, ids};

/// Media type used when a bundle declares none.
pub const DEFAULT_MEDIA: &str = "screen";

/// `cssCombineMedia` processor.
#[derive(Debug, Default, Clone, Copy)]
pub struct CombineMediaProcessor;

impl Processor for CombineMediaProcessor {
  fn id(&self) -> &str {
    ids::CSS_COMBINE_MEDIA
  }

  fn apply(&self, status: &mut ProcessingStatus<'_>, content: String) -> BundlingResult<String> {
    let media = match status.bundle.media.as_deref().map(str::trim) {
      Some(media) if !media.is_empty() => media,
      _ => {
        warn!(bundle = %status.bundle.id, "no bundle media type provided, using '{DEFAULT_MEDIA}'");
        DEFAULT_MEDIA
      }
    };
    debug!(bundle = %status.bundle.id, media, "wrapping bundle in media rule");
    Ok(format!("@media {media} {{\n{content}}}\n\n"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::generator::GeneratorRegistry;
  use crate::models::{Bundle, ResourceType};
  use crate::paths::BinaryPathCache;
  use crate::postprocess::ProcessingSettings;
  use crate::reader::FileSystemReader;

  #[test]
  fn wraps_in_declared_or_default_media() {
    let reader = FileSystemReader::new(".");
    let registry = GeneratorRegistry::default();
    let settings = ProcessingSettings::default();
    let cache = BinaryPathCache::new();

    let mut bundle = Bundle::new("/print.css", "print", ResourceType::Css);
    bundle.media = Some("print".into());
    let mut status = ProcessingStatus::new(&bundle, &reader, &registry, &settings, &cache);
    assert_eq!(
      CombineMediaProcessor.apply(&mut status, ".a{}\n".into()).unwrap(),
      "@media print {\n.a{}\n}\n\n"
    );

    let plain = Bundle::new("/all.css", "all", ResourceType::Css);
    let mut status = ProcessingStatus::new(&plain, &reader, &registry, &settings, &cache);
    assert!(
      CombineMediaProcessor
        .apply(&mut status, ".a{}".into())
        .unwrap()
        .starts_with("@media screen {\n")
    );
  }
}
