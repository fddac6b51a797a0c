//! Path algebra for bundle, debug and binary resource URLs.
//!
//! The functions here never touch the filesystem except [`cache_busted_url`], which reads the
//! resource to checksum it.

mod cache;
mod checksum;
mod final_path;
mod normalizer;

pub use cache::BinaryPathCache;
pub use checksum::{
  BinaryHashAlgorithm, BundleHashAlgorithm, CACHE_BUSTER_PREFIX, binary_checksum,
  bundle_hashcode, cache_busted_url, string_hashcode,
};
pub use final_path::{
  GENERATION_PARAM, GENERATOR_DIR, build_time_generation_path, final_bundle_path,
  final_image_path, remove_servlet_mapping,
};
pub use normalizer::{
  BundlePathInfo, URL_SEPARATOR, as_dir_path, as_path, concat_web_path, escape_to_physical_path,
  extract_bundle_info_from_path, is_external_url, join_domain_to_path, join_paths,
  normalize_path, normalize_path_mapping, parent_path, path_name, relative_web_path,
  remove_variant_prefix_from_path, root_relative_path,
};
