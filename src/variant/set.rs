use indexmap::IndexSet;

use crate::error::{BundlingError, BundlingResult};

/// Allowed values of one variant axis together with its default.
///
/// Values keep their declaration order; the empty string is a legitimate value meaning
/// "no variant" for that axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantSet {
  variant_type: String,
  default_variant: String,
  variants: IndexSet<String>,
}

impl VariantSet {
  /// Build a variant set, rejecting a default that is not one of the values.
  pub fn new<I, S>(
    variant_type: impl Into<String>,
    default_variant: impl Into<String>,
    variants: I,
  ) -> BundlingResult<Self>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let variant_type = variant_type.into();
    let default_variant = default_variant.into();
    let variants: IndexSet<String> = variants.into_iter().map(Into::into).collect();

    if variants.is_empty() {
      return Err(BundlingError::config(format!(
        "variant set '{variant_type}' declares no values"
      )));
    }
    if !variants.contains(&default_variant) {
      return Err(BundlingError::config(format!(
        "default variant '{default_variant}' is not part of the '{variant_type}' values {:?}",
        variants
      )));
    }

    Ok(Self {
      variant_type,
      default_variant,
      variants,
    })
  }

  /// Axis name, e.g. `locale` or `skin`.
  pub fn variant_type(&self) -> &str {
    &self.variant_type
  }

  /// Value used when a request does not pick one this axis supports.
  pub fn default_variant(&self) -> &str {
    &self.default_variant
  }

  /// Values in declaration order.
  pub fn variants(&self) -> impl Iterator<Item = &str> {
    self.variants.iter().map(String::as_str)
  }

  /// Number of values on this axis.
  pub fn len(&self) -> usize {
    self.variants.len()
  }

  /// Always `false` for a constructed set; provided for API symmetry with [`VariantSet::len`].
  pub fn is_empty(&self) -> bool {
    self.variants.is_empty()
  }

  /// Whether `value` is one of the declared values.
  pub fn contains(&self, value: &str) -> bool {
    self.variants.contains(value)
  }

  pub(crate) fn merged_with(&self, other: &VariantSet) -> BundlingResult<VariantSet> {
    if self.default_variant != other.default_variant {
      return Err(BundlingError::config(format!(
        "unable to merge variant sets for '{}': defaults '{}' and '{}' differ",
        self.variant_type, self.default_variant, other.default_variant
      )));
    }

    let mut variants = self.variants.clone();
    variants.extend(other.variants.iter().cloned());
    Ok(VariantSet {
      variant_type: self.variant_type.clone(),
      default_variant: self.default_variant.clone(),
      variants,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::VariantSet;

  #[test]
  fn rejects_default_outside_values() {
    let err = VariantSet::new("locale", "de", ["", "fr"]).unwrap_err();
    assert!(err.to_string().contains("'de'"));
  }

  #[test]
  fn rejects_empty_value_list() {
    assert!(VariantSet::new("skin", "", Vec::<String>::new()).is_err());
  }

  #[test]
  fn deduplicates_and_keeps_declaration_order() {
    let set = VariantSet::new("skin", "summer", ["winter", "summer", "winter"]).unwrap();
    assert_eq!(set.variants().collect::<Vec<_>>(), vec!["winter", "summer"]);
    assert_eq!(set.len(), 2);
  }
}
