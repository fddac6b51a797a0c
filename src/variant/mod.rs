//! Variant axes and the key algebra used to name concrete bundles.
//!
//! Axes are always iterated in axis-name order so that keys and output file names are
//! reproducible from one build to the next.

use std::collections::BTreeMap;

mod keys;
mod set;

pub use keys::{
  AxisValues, VARIANT_SEPARATOR, all_bundle_variants, all_variant_keys, all_variants,
  available_variant_map, concat_variants, default_variant_map, variant_bundle_name,
  variant_bundle_name_with_suffix, variant_key, variant_key_for_types, variant_sets,
  variant_sets_as_axes,
};
pub use set::VariantSet;

/// Chosen value per axis. `Some("")` means "no variant", `None` means "axis not applicable".
pub type VariantMap = BTreeMap<String, Option<String>>;

/// Declared axes of a bundle or generator, keyed by axis name.
pub type VariantSets = BTreeMap<String, VariantSet>;

/// Axis name used by locale-aware generators.
pub const LOCALE_VARIANT_TYPE: &str = "locale";
