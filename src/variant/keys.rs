use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexSet;

use super::{VariantMap, VariantSet, VariantSets};
use crate::error::BundlingResult;

/// Separator between variant segments, and between a bundle name and its variant key.
pub const VARIANT_SEPARATOR: char = '@';

/// Values of one axis when computing cross products. `None` stands for "axis not applicable".
pub type AxisValues = IndexSet<Option<String>>;

/// Merge two variant declarations.
///
/// Values of a type present on both sides are unioned, `a` first. A missing side is the
/// identity. Conflicting defaults for the same type are a configuration error.
pub fn concat_variants(
  a: Option<&VariantSets>,
  b: Option<&VariantSets>,
) -> BundlingResult<VariantSets> {
  let (a, b) = match (a, b) {
    (None, None) => return Ok(VariantSets::new()),
    (Some(a), None) => return Ok(a.clone()),
    (None, Some(b)) => return Ok(b.clone()),
    (Some(a), Some(b)) => (a, b),
  };

  let mut merged = a.clone();
  for (variant_type, set) in b {
    let combined = match merged.get(variant_type) {
      Some(existing) => existing.merged_with(set)?,
      None => set.clone(),
    };
    merged.insert(variant_type.clone(), combined);
  }
  Ok(merged)
}

/// Convert declared variant sets into the axis form used by the cross product helpers.
pub fn variant_sets_as_axes(variants: &VariantSets) -> BTreeMap<String, AxisValues> {
  variants
    .iter()
    .map(|(variant_type, set)| {
      let values = set.variants().map(|value| Some(value.to_string())).collect();
      (variant_type.clone(), values)
    })
    .collect()
}

/// Every `@`-joined key of the cartesian product of `axes`, in axis-name order.
///
/// An empty axis map yields exactly one empty key.
pub fn all_variant_keys(axes: &BTreeMap<String, AxisValues>) -> Vec<String> {
  all_variants(axes)
    .iter()
    .map(|variant| variant_key(Some(variant)))
    .collect()
}

/// Every combination of the cartesian product of `axes` as a variant map.
pub fn all_variants(axes: &BTreeMap<String, AxisValues>) -> Vec<VariantMap> {
  let mut combinations = vec![VariantMap::new()];
  for (variant_type, values) in axes {
    if values.is_empty() {
      continue;
    }
    let mut next = Vec::with_capacity(combinations.len() * values.len());
    for combination in &combinations {
      for value in values {
        let mut extended = combination.clone();
        extended.insert(variant_type.clone(), value.clone());
        next.push(extended);
      }
    }
    combinations = next;
  }
  combinations
}

/// Every concrete variant map a bundle with the given declarations must be rendered for.
pub fn all_bundle_variants(variants: &VariantSets) -> Vec<VariantMap> {
  all_variants(&variant_sets_as_axes(variants))
}

/// Join the values of `variants` with `@`, empty and null values keeping their slot.
pub fn variant_key(variants: Option<&VariantMap>) -> String {
  let Some(variants) = variants else {
    return String::new();
  };
  join_values(variants.values())
}

/// Like [`variant_key`] but restricted to `types`. Axes missing from the map are skipped.
pub fn variant_key_for_types(variants: Option<&VariantMap>, types: &BTreeSet<String>) -> String {
  let Some(variants) = variants else {
    return String::new();
  };
  join_values(
    variants
      .iter()
      .filter(|(variant_type, _)| types.contains(*variant_type))
      .map(|(_, value)| value),
  )
}

fn join_values<'a>(values: impl Iterator<Item = &'a Option<String>>) -> String {
  let mut key = String::new();
  let mut first = true;
  for value in values {
    if !first {
      key.push(VARIANT_SEPARATOR);
    }
    first = false;
    if let Some(value) = value {
      key.push_str(value);
    }
  }
  key
}

/// Name of the bundle rendered for `variants`.
///
/// The key goes before the extension (`msg.js` → `msg@fr.js`). Generated resources such as
/// `messages:app.messages` get it appended instead.
pub fn variant_bundle_name(name: &str, variants: Option<&VariantMap>, generated: bool) -> String {
  let key = variant_key(variants);
  insert_variant_suffix(name, &key, generated)
}

/// Variant bundle name from a precomputed suffix.
///
/// A suffix starting with `@` is used verbatim, anything else is prefixed with `@`.
/// A missing or empty suffix returns `name` unchanged.
pub fn variant_bundle_name_with_suffix(name: &str, suffix: Option<&str>, generated: bool) -> String {
  match suffix {
    None | Some("") => name.to_string(),
    Some(suffix) => {
      let key = suffix.strip_prefix(VARIANT_SEPARATOR).unwrap_or(suffix);
      insert_variant_suffix(name, key, generated)
    }
  }
}

fn insert_variant_suffix(name: &str, key: &str, generated: bool) -> String {
  if key.is_empty() {
    return name.to_string();
  }

  match name.rfind('.') {
    Some(idx) if !generated && !name[idx..].contains('/') => format!(
      "{}{VARIANT_SEPARATOR}{key}{}",
      &name[..idx],
      &name[idx..]
    ),
    _ => format!("{name}{VARIANT_SEPARATOR}{key}"),
  }
}

/// Pick, for every declared axis, the requested value when supported or the axis default.
pub fn available_variant_map(declared: &VariantSets, requested: &VariantMap) -> VariantMap {
  declared
    .iter()
    .map(|(variant_type, set)| {
      let value = match requested.get(variant_type) {
        Some(Some(value)) if set.contains(value) => value.clone(),
        _ => set.default_variant().to_string(),
      };
      (variant_type.clone(), Some(value))
    })
    .collect()
}

/// Key of the default combination of `declared`.
pub fn default_variant_map(declared: &VariantSets) -> VariantMap {
  available_variant_map(declared, &VariantMap::new())
}

/// Build a [`VariantSets`] map from a list of sets.
pub fn variant_sets<I: IntoIterator<Item = VariantSet>>(sets: I) -> VariantSets {
  sets
    .into_iter()
    .map(|set| (set.variant_type().to_string(), set))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn axis(values: &[Option<&str>]) -> AxisValues {
    values.iter().map(|value| value.map(str::to_string)).collect()
  }

  fn map(entries: &[(&str, Option<&str>)]) -> VariantMap {
    entries
      .iter()
      .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
      .collect()
  }

  fn sample_axes() -> BTreeMap<String, AxisValues> {
    let mut axes = BTreeMap::new();
    axes.insert(
      "locale".to_string(),
      axis(&[Some(""), Some("fr_FR"), Some("en_US")]),
    );
    axes.insert("skin".to_string(), axis(&[Some("winter"), Some("summer")]));
    axes.insert(
      "browser".to_string(),
      axis(&[None, Some("ie"), Some("firefox")]),
    );
    axes
  }

  #[test]
  fn cross_product_produces_every_key_once() {
    let keys = all_variant_keys(&sample_axes());
    assert_eq!(keys.len(), 18);
    let distinct: BTreeSet<_> = keys.iter().collect();
    assert_eq!(distinct.len(), 18);
    assert!(keys.contains(&"@@winter".to_string()));
    assert!(keys.contains(&"ie@fr_FR@summer".to_string()));
    assert!(keys.iter().all(|key| key.matches('@').count() == 2));
  }

  #[test]
  fn cross_product_of_nothing_is_the_empty_key() {
    assert_eq!(all_variant_keys(&BTreeMap::new()), vec![String::new()]);
    assert_eq!(all_variants(&BTreeMap::new()), vec![VariantMap::new()]);
  }

  #[test]
  fn all_variants_returns_maps_matching_keys() {
    let variants = all_variants(&sample_axes());
    assert_eq!(variants.len(), 18);
    assert!(variants.contains(&map(&[
      ("browser", None),
      ("locale", Some("")),
      ("skin", Some("winter"))
    ])));
  }

  #[test]
  fn variant_key_keeps_empty_and_null_slots() {
    let variants = map(&[
      ("browser", None),
      ("locale", Some("")),
      ("skin", Some("winter")),
    ]);
    assert_eq!(variant_key(Some(&variants)), "@@winter");
    assert_eq!(variant_key(None), "");
    assert_eq!(variant_key(Some(&VariantMap::new())), "");
  }

  #[test]
  fn variant_key_filters_by_type_and_skips_absent_axes() {
    let variants = map(&[
      ("browser", Some("ie")),
      ("locale", Some("fr_FR")),
      ("skin", Some("summer")),
    ]);
    let types: BTreeSet<String> = ["browser", "skin", "connectionType"]
      .into_iter()
      .map(String::from)
      .collect();
    assert_eq!(variant_key_for_types(Some(&variants), &types), "ie@summer");

    let locale_only: BTreeSet<String> = ["locale".to_string()].into_iter().collect();
    assert_eq!(variant_key_for_types(Some(&variants), &locale_only), "fr_FR");
    assert_eq!(variant_key_for_types(None, &locale_only), "");
  }

  #[test]
  fn bundle_name_inserts_suffix_before_extension() {
    assert_eq!(
      variant_bundle_name_with_suffix("msgBundle.js", Some("@fr"), false),
      "msgBundle@fr.js"
    );
    assert_eq!(
      variant_bundle_name_with_suffix("msgBundle.js", Some("fr"), false),
      "msgBundle@fr.js"
    );
    assert_eq!(
      variant_bundle_name_with_suffix("msgBundle.js", None, false),
      "msgBundle.js"
    );
    assert_eq!(
      variant_bundle_name_with_suffix("msgBundle.js", Some(""), false),
      "msgBundle.js"
    );
  }

  #[test]
  fn bundle_name_from_map_keeps_placeholder_segments() {
    let variants = map(&[
      ("browser", None),
      ("locale", Some("")),
      ("skin", Some("winter")),
    ]);
    assert_eq!(
      variant_bundle_name("myBundle.js", Some(&variants), false),
      "myBundle@@@winter.js"
    );
    assert_eq!(variant_bundle_name("myBundle.js", None, false), "myBundle.js");
  }

  #[test]
  fn generated_resources_get_the_suffix_appended() {
    assert_eq!(
      variant_bundle_name_with_suffix("messages:app.messages", Some("en_US"), true),
      "messages:app.messages@en_US"
    );
    assert_eq!(
      variant_bundle_name_with_suffix("/js/noext", Some("fr"), false),
      "/js/noext@fr"
    );
  }

  #[test]
  fn concat_unions_values_and_treats_none_as_identity() {
    let a = variant_sets([VariantSet::new("locale", "", ["", "fr"]).unwrap()]);
    let b = variant_sets([
      VariantSet::new("locale", "", ["", "en_US", "fr"]).unwrap(),
      VariantSet::new("skin", "summer", ["summer", "winter"]).unwrap(),
    ]);

    let ab = concat_variants(Some(&a), Some(&b)).unwrap();
    let ba = concat_variants(Some(&b), Some(&a)).unwrap();
    let values = |sets: &VariantSets, t: &str| -> BTreeSet<String> {
      sets[t].variants().map(String::from).collect()
    };
    assert_eq!(values(&ab, "locale"), values(&ba, "locale"));
    assert_eq!(values(&ab, "skin"), values(&ba, "skin"));
    assert_eq!(
      ab["locale"].variants().collect::<Vec<_>>(),
      vec!["", "fr", "en_US"]
    );

    assert_eq!(concat_variants(None, Some(&b)).unwrap(), b);
    assert_eq!(concat_variants(Some(&b), None).unwrap(), b);
  }

  #[test]
  fn concat_rejects_conflicting_defaults() {
    let a = variant_sets([VariantSet::new("skin", "summer", ["summer", "winter"]).unwrap()]);
    let b = variant_sets([VariantSet::new("skin", "winter", ["summer", "winter"]).unwrap()]);
    assert!(concat_variants(Some(&a), Some(&b)).is_err());
  }

  #[test]
  fn available_map_falls_back_to_defaults() {
    let declared = variant_sets([
      VariantSet::new("locale", "", ["", "fr"]).unwrap(),
      VariantSet::new("skin", "summer", ["summer", "winter"]).unwrap(),
    ]);
    let requested = map(&[("locale", Some("de")), ("skin", Some("winter"))]);
    let available = available_variant_map(&declared, &requested);
    assert_eq!(variant_key(Some(&available)), "@winter");
    assert_eq!(variant_key(Some(&default_variant_map(&declared))), "@summer");
  }
}
