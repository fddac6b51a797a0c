use std::fmt;

/// Separator between a generator prefix and the resource it generates, as in `jar:img/a.png`.
pub const PREFIX_SEPARATOR: char = ':';

/// How a generator claims the resource paths it produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceResolver {
  /// Matches paths starting with `<prefix>:`; the prefix is stripped from the resource path.
  Prefixed {
    /// Prefix without the separator.
    prefix: String,
  },
  /// Matches paths ending with `.<suffix>`; the resource path is left as is.
  Suffixed {
    /// Extension without the dot.
    suffix: String,
  },
}

impl ResourceResolver {
  /// Resolver for `<prefix>:` paths.
  pub fn prefixed(prefix: impl Into<String>) -> Self {
    Self::Prefixed {
      prefix: prefix.into(),
    }
  }

  /// Resolver for `*.<suffix>` paths.
  pub fn suffixed(suffix: impl Into<String>) -> Self {
    Self::Suffixed {
      suffix: suffix.into(),
    }
  }

  /// Whether the resolver claims `path`.
  pub fn matches(&self, path: &str) -> bool {
    match self {
      Self::Prefixed { prefix } => path
        .strip_prefix(prefix.as_str())
        .is_some_and(|rest| rest.starts_with(PREFIX_SEPARATOR)),
      Self::Suffixed { suffix } => path
        .strip_suffix(suffix.as_str())
        .is_some_and(|rest| rest.ends_with('.')),
    }
  }

  /// Resource path handed to the generator for a requested path.
  pub fn resource_path(&self, requested: &str) -> String {
    match self {
      Self::Prefixed { prefix } => requested
        .strip_prefix(prefix.as_str())
        .and_then(|rest| rest.strip_prefix(PREFIX_SEPARATOR))
        .unwrap_or(requested)
        .to_string(),
      Self::Suffixed { .. } => requested.to_string(),
    }
  }

  /// Resolve `path` in one step, `None` when the resolver does not claim it.
  pub fn resolve(&self, path: &str) -> Option<String> {
    self.matches(path).then(|| self.resource_path(path))
  }

  /// Two resolvers are the same when they have the same kind and token.
  pub fn is_same_as(&self, other: &ResourceResolver) -> bool {
    self == other
  }

  pub(crate) fn is_suffixed(&self) -> bool {
    matches!(self, Self::Suffixed { .. })
  }
}

impl fmt::Display for ResourceResolver {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Prefixed { prefix } => write!(f, "{prefix}{PREFIX_SEPARATOR}"),
      Self::Suffixed { suffix } => write!(f, "*.{suffix}"),
    }
  }
}
