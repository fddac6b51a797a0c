use percent_encoding::percent_decode_str;

use crate::generator::GeneratorRegistry;
use crate::variant::{VariantMap, variant_bundle_name};

use super::normalizer::as_path;

/// Query parameter carrying the generator path in generated resource URLs.
pub const GENERATION_PARAM: &str = "generationConfigParam";

/// Output directory, relative to the destination root, of build-time generated resources.
pub const GENERATOR_DIR: &str = "jawr_generator";

/// Drop everything up to and including the servlet mapping, if the path contains it.
pub fn remove_servlet_mapping(path: &str, mapping: Option<&str>) -> String {
  match mapping.filter(|mapping| !mapping.is_empty()) {
    Some(mapping) => {
      let stripped = match path.find(mapping) {
        Some(idx) => &path[idx + mapping.len()..],
        None => path,
      };
      as_path(stripped)
    }
    None => path.to_string(),
  }
}

/// Map a requested bundle URL to the file it is stored as in the output tree.
///
/// Production paths lose their cache buster segment and gain the variant key before the
/// extension: `/N1785986402.fr/js/bundle/msg.js` with `locale=fr` becomes
/// `js/bundle/msg@fr.js`. Generator URLs (`/jawr_generator.js?generationConfigParam=...`) are
/// decoded into `/jawr_generator/<type>/<generator path>`.
pub fn final_bundle_path(
  path: &str,
  variants: &VariantMap,
  debug: bool,
  servlet_mapping: Option<&str>,
  registry: &GeneratorRegistry,
) -> String {
  if path.contains(GENERATION_PARAM) {
    let decoded = percent_decode_str(path).decode_utf8_lossy();
    let stripped = remove_servlet_mapping(&decoded, servlet_mapping);
    return build_time_generation_path(&stripped, registry);
  }

  let stripped = remove_servlet_mapping(path, servlet_mapping);
  let mut relative = stripped.strip_prefix('/').unwrap_or(&stripped);
  if !debug {
    relative = match relative.find('/') {
      Some(idx) => &relative[idx + 1..],
      None => relative,
    };
  }

  let requested = if variants.is_empty() {
    None
  } else {
    Some(variants)
  };
  variant_bundle_name(relative, requested, false)
}

/// `/jawr_generator.js?generationConfigParam=messages:messages@fr` →
/// `/jawr_generator/js/messages/messages_fr.js`.
pub fn build_time_generation_path(path: &str, registry: &GeneratorRegistry) -> String {
  let (request, query) = path.split_once('?').unwrap_or((path, ""));
  let base = request.replace('.', "/");

  let parameter = query
    .split('&')
    .find_map(|pair| pair.strip_prefix(GENERATION_PARAM)?.strip_prefix('='))
    .unwrap_or_default();

  format!(
    "{}/{}",
    base.trim_end_matches('/'),
    registry.generation_path(parameter)
  )
}

/// Strip the servlet mapping and the cache buster segment (`cb<hash>`, `jar_cb<hash>`) of a
/// binary resource URL.
pub fn final_image_path(path: &str, servlet_mapping: Option<&str>) -> String {
  let stripped = remove_servlet_mapping(path, servlet_mapping);
  let relative = stripped.strip_prefix('/').unwrap_or(&stripped);
  match relative.find('/') {
    Some(idx) => relative[idx + 1..].to_string(),
    None => relative.to_string(),
  }
}
