//! Web path algebra. Every function works on `/`-separated URL paths, never on native paths.

use std::sync::OnceLock;

use regex::Regex;

/// Separator used by all web paths.
pub const URL_SEPARATOR: char = '/';

/// Collapse `//`, drop leading and trailing separators.
pub fn normalize_path(path: &str) -> String {
  path
    .replace("//", "/")
    .split(URL_SEPARATOR)
    .filter(|segment| !segment.is_empty())
    .collect::<Vec<_>>()
    .join("/")
}

/// Normalized path with a single leading `/`.
pub fn as_path(path: &str) -> String {
  format!("/{}", normalize_path(path))
}

/// Normalized path with leading and trailing `/`.
pub fn as_dir_path(path: &str) -> String {
  if path == "/" {
    return path.to_string();
  }
  let normalized = normalize_path(path);
  if normalized.is_empty() {
    "/".to_string()
  } else {
    format!("/{normalized}/")
  }
}

/// Whether `path` is an absolute or protocol relative URL.
pub fn is_external_url(path: &str) -> bool {
  path.starts_with("http://") || path.starts_with("https://") || path.starts_with("//")
}

/// Join a prefix and a path. Prefixes that are URLs keep their scheme and host intact.
pub fn join_paths(prefix: &str, path: &str) -> String {
  if is_external_url(prefix) {
    return join_domain_to_path(prefix, path);
  }

  let normalized_prefix = normalize_path(prefix);
  let mut joined = String::from("/");
  if !normalized_prefix.is_empty() {
    joined.push_str(&normalized_prefix);
    joined.push(URL_SEPARATOR);
  }
  joined.push_str(&normalize_path(path));
  joined
}

/// Append a normalized path to a domain, avoiding a doubled separator.
pub fn join_domain_to_path(domain: &str, path: &str) -> String {
  let domain = domain.strip_suffix('/').unwrap_or(domain);
  format!("{domain}/{}", normalize_path(path))
}

/// Parent directory of `path`, ending with `/`. The root's parent is `/`.
pub fn parent_path(path: &str) -> String {
  if path.is_empty() {
    return String::new();
  }
  let trimmed = if path.len() > 1 {
    path.strip_suffix('/').unwrap_or(path)
  } else {
    path
  };
  match trimmed.rfind(URL_SEPARATOR) {
    Some(idx) if idx > 0 => trimmed[..=idx].to_string(),
    _ => "/".to_string(),
  }
}

/// Last segment of `path`.
pub fn path_name(path: &str) -> String {
  if path.is_empty() {
    return String::new();
  }
  let trimmed = if path.len() > 1 {
    path.strip_suffix('/').unwrap_or(path)
  } else {
    path
  };
  match trimmed.rfind(URL_SEPARATOR) {
    Some(idx) if idx > 0 => trimmed[idx + 1..].to_string(),
    _ if !trimmed.contains(URL_SEPARATOR) => trimmed.to_string(),
    _ => "/".to_string(),
  }
}

/// Resolve `to_add` against the directory of `base`, applying `.` and `..` segments.
///
/// Returns `None` when the result would climb above the root.
pub fn concat_web_path(base: &str, to_add: &str) -> Option<String> {
  let base = if base.len() > 1 && !base.ends_with('/') {
    parent_path(base)
  } else {
    base.to_string()
  };

  if base.is_empty() {
    return resolve_dots(to_add);
  }

  let full = if base.ends_with('/') {
    format!("{base}{to_add}")
  } else {
    format!("{base}/{to_add}")
  };
  resolve_dots(&full)
}

fn resolve_dots(path: &str) -> Option<String> {
  if path.is_empty() {
    return Some(String::new());
  }

  let absolute = path.starts_with('/');
  let trailing = path.ends_with('/') || path.ends_with("/.") || path.ends_with("/..");
  let mut segments: Vec<&str> = Vec::new();

  for segment in path.split('/') {
    match segment {
      "" | "." => {}
      ".." => {
        segments.pop()?;
      }
      other => segments.push(other),
    }
  }

  let mut resolved = String::new();
  if absolute {
    resolved.push('/');
  }
  resolved.push_str(&segments.join("/"));
  if trailing && !segments.is_empty() {
    resolved.push('/');
  }
  Some(resolved)
}

/// Relative path leading from directory `old_path` to `new_path`.
pub fn relative_web_path(old_path: &str, new_path: &str) -> String {
  if old_path.is_empty() || new_path.is_empty() {
    return String::new();
  }

  let from: Vec<&str> = old_path.split('/').filter(|s| !s.is_empty()).collect();
  let to: Vec<&str> = new_path.split('/').filter(|s| !s.is_empty()).collect();
  let common = from
    .iter()
    .zip(to.iter())
    .take_while(|(a, b)| a == b)
    .count();

  let mut segments: Vec<&str> = vec![".."; from.len() - common];
  segments.extend(&to[common..]);
  let mut relative = segments.join("/");

  if new_path.ends_with('/') && !relative.ends_with('/') {
    relative.push('/');
  }
  relative
}

fn url_separator_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| Regex::new(r"([^/]*)/").expect("invalid url separator regex"))
}

/// Relative path from the directory of `url` back to the web root, e.g. `/css/a.css` → `../`.
pub fn root_relative_path(url: &str) -> String {
  url_separator_pattern()
    .find_iter(url)
    .skip(1)
    .map(|_| "../")
    .collect()
}

/// Replace characters that cannot appear in file names.
pub fn escape_to_physical_path(bundle_path: &str) -> String {
  bundle_path.replace(':', "_")
}

/// Strip a trailing `/**` from a normalized mapping.
pub fn normalize_path_mapping(mapping: &str) -> String {
  let normalized = normalize_path(mapping);
  match normalized.strip_suffix("/**") {
    Some(stripped) => stripped.to_string(),
    None => normalized,
  }
}

/// Pieces of a production request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundlePathInfo {
  /// Bundle path after the hash segment.
  pub path: String,
  /// Variant key carried by the hash segment, if any.
  pub variant_key: Option<String>,
  /// Cache buster hash.
  pub hashcode: String,
}

/// Split `/<hash>[.<variant>]/<bundle path>` into its parts.
pub fn extract_bundle_info_from_path(path: &str) -> BundlePathInfo {
  let rest = path.strip_prefix("/gzip_").unwrap_or_else(|| path.strip_prefix('/').unwrap_or(path));
  let (prefix, mut bundle_path) = match rest.find('/') {
    Some(idx) => (&rest[..idx], rest[idx..].to_string()),
    None => ("", rest.to_string()),
  };

  let (hashcode, variant_key) = match prefix.split_once('.') {
    Some((hash, variant)) => (hash.to_string(), Some(variant.to_string())),
    None => (prefix.to_string(), None),
  };

  if bundle_path.starts_with('/') && bundle_path.contains(':') {
    bundle_path.remove(0);
  }

  BundlePathInfo {
    path: bundle_path,
    variant_key,
    hashcode,
  }
}

/// Drop the hash segment of a request path, moving a variant it carries into the file name.
pub fn remove_variant_prefix_from_path(path: &str) -> String {
  let rest = path.strip_prefix('/').unwrap_or(path);
  let Some(slash) = rest.find('/') else {
    return rest.to_string();
  };
  let prefix = &rest[..slash];
  let remainder = &rest[slash..];

  match prefix.split_once('.') {
    Some((_, variant)) => match remainder.rfind('.') {
      Some(dot) => format!("{}@{variant}{}", &remainder[..dot], &remainder[dot..]),
      None => format!("{remainder}@{variant}"),
    },
    None => remainder.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn normalizes_separators() {
    assert_eq!(normalize_path("//js//lib/app.js/"), "js/lib/app.js");
    assert_eq!(as_path("js/app.js"), "/js/app.js");
    assert_eq!(as_dir_path("js/lib"), "/js/lib/");
    assert_eq!(as_dir_path("/"), "/");
  }

  #[test]
  fn joins_prefix_and_path() {
    assert_eq!(join_paths("/N123/", "/js/bundle/msg.js"), "/N123/js/bundle/msg.js");
    assert_eq!(join_paths("", "js/a.js"), "/js/a.js");
    assert_eq!(
      join_paths("http://cdn.example.com/", "/js/a.js"),
      "http://cdn.example.com/js/a.js"
    );
  }

  #[test]
  fn computes_parent_and_name() {
    assert_eq!(parent_path("/css/theme/site.css"), "/css/theme/");
    assert_eq!(parent_path("/css/theme/"), "/css/");
    assert_eq!(parent_path("/site.css"), "/");
    assert_eq!(path_name("/css/theme/site.css"), "site.css");
    assert_eq!(path_name("/css/theme/"), "theme");
  }

  #[test]
  fn concatenates_relative_web_paths() {
    assert_eq!(
      concat_web_path("/css/theme/site.css", "../img/logo.png").as_deref(),
      Some("/css/img/logo.png")
    );
    assert_eq!(
      concat_web_path("/css/", "./a/./b.css").as_deref(),
      Some("/css/a/b.css")
    );
    assert_eq!(concat_web_path("/css/site.css", "../../x.png"), None);
  }

  #[test]
  fn relative_path_between_directories() {
    assert_eq!(relative_web_path("/prefix/css/", "/img/a.png"), "../../img/a.png");
    assert_eq!(relative_web_path("/css/", "/css/img/a.png"), "img/a.png");
    assert_eq!(relative_web_path("/css/", "/img/"), "../img/");
  }

  #[test]
  fn root_relative_path_climbs_each_directory() {
    assert_eq!(root_relative_path("/css/site.css"), "../");
    assert_eq!(root_relative_path("/css/theme/site.css"), "../../");
    assert_eq!(root_relative_path("/site.css"), "");
  }

  #[test]
  fn extracts_hash_and_variant_segments() {
    let info = extract_bundle_info_from_path("/N1785986402.fr/js/bundle/msg.js");
    assert_eq!(info.hashcode, "N1785986402");
    assert_eq!(info.variant_key.as_deref(), Some("fr"));
    assert_eq!(info.path, "/js/bundle/msg.js");

    assert_eq!(
      remove_variant_prefix_from_path("/N1785986402.fr/js/bundle/msg.js"),
      "/js/bundle/msg@fr.js"
    );
    assert_eq!(
      remove_variant_prefix_from_path("/1785986402/js/bundle/msg.js"),
      "/js/bundle/msg.js"
    );
  }
}
