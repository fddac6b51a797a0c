//! Error taxonomy shared by the bundling pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide result alias.
pub type BundlingResult<T> = Result<T, BundlingError>;

/// Failures raised while configuring or running the bundling pipeline.
#[derive(Debug, Error)]
pub enum BundlingError {
  /// Invalid or inconsistent configuration. Raised while building chains and registries.
  #[error("configuration error: {0}")]
  Config(String),

  /// A processor id that is neither built in nor registered as a plugin.
  #[error("unknown post processor '{id}'")]
  UnknownProcessor {
    /// Offending processor id.
    id: String,
  },

  /// Two resolvers claiming the same prefix or suffix.
  #[error("a resolver for '{resolver}' is already registered")]
  DuplicateResolver {
    /// Display form of the duplicated resolver.
    resolver: String,
  },

  /// A member, import or license path that the reader could not find.
  #[error("resource not found: {path}")]
  ResourceNotFound {
    /// Requested resource path.
    path: String,
  },

  /// Minifier syntax error inside a bundle.
  #[error("failed to minify {path}: {source}")]
  Minify {
    /// Bundle or resource being minified.
    path: String,
    /// Location and kind of the syntax error.
    #[source]
    source: MinifyError,
  },

  /// I/O failure on a concrete filesystem path.
  #[error("i/o error on {}: {source}", path.display())]
  Io {
    /// Path being read or written.
    path: PathBuf,
    /// Underlying error.
    #[source]
    source: std::io::Error,
  },

  /// Any other failure attributed to a resource path.
  #[error("failed to process {path}: {message}")]
  Processing {
    /// Offending resource path.
    path: String,
    /// Human readable cause.
    message: String,
  },
}

impl BundlingError {
  /// Shorthand for [`BundlingError::Config`].
  pub fn config(message: impl Into<String>) -> Self {
    Self::Config(message.into())
  }

  /// Wrap an I/O error with the path it happened on.
  pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    Self::Io {
      path: path.into(),
      source,
    }
  }

  /// Shorthand for [`BundlingError::Processing`].
  pub fn processing(path: impl Into<String>, message: impl Into<String>) -> Self {
    Self::Processing {
      path: path.into(),
      message: message.into(),
    }
  }
}

/// Kind of syntax error found by the JavaScript minifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinifyErrorKind {
  /// `/*` without a closing `*/`.
  UnterminatedComment,
  /// String literal reaching end of input or an unescaped newline.
  UnterminatedString,
  /// Regular expression literal reaching end of input or a newline.
  UnterminatedRegExp,
}

impl std::fmt::Display for MinifyErrorKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let label = match self {
      Self::UnterminatedComment => "unterminated comment",
      Self::UnterminatedString => "unterminated string literal",
      Self::UnterminatedRegExp => "unterminated regular expression literal",
    };
    f.write_str(label)
  }
}

/// Minifier failure with the position it was detected at.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at byte {byte_index} (line {line}, column {column})")]
pub struct MinifyError {
  /// What went wrong.
  pub kind: MinifyErrorKind,
  /// Zero based offset of the last byte consumed.
  pub byte_index: usize,
  /// One based line number.
  pub line: usize,
  /// Column within the line.
  pub column: usize,
}
