//! Content hashes used as cache busters.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{BundlingError, BundlingResult};
use crate::generator::{GeneratorRegistry, PREFIX_SEPARATOR};
use crate::reader::ResourceReaderHandler;

use super::normalizer::as_path;

/// Prefix of the cache buster segment of binary resources.
pub const CACHE_BUSTER_PREFIX: &str = "cb";

/// Algorithm used to derive a bundle's hash prefix from its content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BundleHashAlgorithm {
  /// Signed 32-bit string hash; negative values are written with a leading `N`.
  #[default]
  Hashcode,
  /// Hex MD5 digest.
  Md5,
}

impl FromStr for BundleHashAlgorithm {
  type Err = BundlingError;

  fn from_str(value: &str) -> Result<Self, Self::Err> {
    match value.trim().to_ascii_lowercase().as_str() {
      "" | "default" | "hashcode" => Ok(Self::Hashcode),
      "md5" => Ok(Self::Md5),
      other => Err(BundlingError::config(format!(
        "unsupported bundle hashcode generator '{other}'"
      ))),
    }
  }
}

/// Algorithm used for binary resource checksums.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BinaryHashAlgorithm {
  /// CRC32 as an unsigned decimal.
  #[default]
  Crc32,
  /// MD5 as lowercase hex without leading zeros.
  Md5,
}

impl FromStr for BinaryHashAlgorithm {
  type Err = BundlingError;

  fn from_str(value: &str) -> Result<Self, Self::Err> {
    match value.trim().to_ascii_uppercase().as_str() {
      "" | "CRC32" => Ok(Self::Crc32),
      "MD5" => Ok(Self::Md5),
      other => Err(BundlingError::config(format!(
        "the checksum algorithm '{other}' is not supported, use CRC32 or MD5"
      ))),
    }
  }
}

/// Signed 32-bit hash over the UTF-16 code units of `content`, `31 * h + c` per unit.
pub fn string_hashcode(content: &str) -> i32 {
  content
    .encode_utf16()
    .fold(0i32, |hash, unit| hash.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

/// Hash prefix identifying one rendering of a bundle.
pub fn bundle_hashcode(content: &str, algorithm: BundleHashAlgorithm) -> String {
  match algorithm {
    BundleHashAlgorithm::Hashcode => {
      let hash = string_hashcode(content);
      if hash < 0 {
        format!("N{}", i64::from(hash).abs())
      } else {
        hash.to_string()
      }
    }
    BundleHashAlgorithm::Md5 => format!("{:x}", md5::compute(content.as_bytes())),
  }
}

/// Checksum of binary content.
pub fn binary_checksum(bytes: &[u8], algorithm: BinaryHashAlgorithm) -> String {
  match algorithm {
    BinaryHashAlgorithm::Crc32 => crc32fast::hash(bytes).to_string(),
    BinaryHashAlgorithm::Md5 => {
      let hex = format!("{:x}", md5::compute(bytes));
      let trimmed = hex.trim_start_matches('0');
      if trimmed.is_empty() { "0".to_string() } else { trimmed.to_string() }
    }
  }
}

/// Cache-busted URL of a binary resource: `/cb<checksum>/img/a.png`, or
/// `/jar_cb<checksum>/img/a.png` for generated resources.
pub fn cache_busted_url(
  url: &str,
  reader: &dyn ResourceReaderHandler,
  registry: &GeneratorRegistry,
  algorithm: BinaryHashAlgorithm,
) -> BundlingResult<String> {
  let generated = registry.is_generated_binary_resource(url);
  let bytes = if generated {
    registry.read_binary(url, reader)?
  } else {
    registry.read_binary(&as_path(url), reader)?
  };
  let checksum = binary_checksum(&bytes, algorithm);

  let (prefix, path) = match url.split_once(PREFIX_SEPARATOR) {
    Some((generator, rest)) if generated => (format!("{generator}_{CACHE_BUSTER_PREFIX}"), rest),
    _ => (CACHE_BUSTER_PREFIX.to_string(), url),
  };

  let mut busted = format!("{prefix}{checksum}");
  if !path.starts_with('/') {
    busted.push('/');
  }
  busted.push_str(path);
  Ok(as_path(&busted))
}
