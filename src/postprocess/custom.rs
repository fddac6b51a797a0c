use std::sync::Arc;

use tracing::debug;

use crate::error::BundlingResult;

use super::{ProcessingStatus, Processor};

/// A processor registered by the host program, published under the id the properties use.
#[derive(Clone)]
pub struct CustomProcessor {
  id: String,
  inner: Arc<dyn Processor>,
}

impl CustomProcessor {
  /// Publish `inner` under `id`.
  pub fn new(id: impl Into<String>, inner: Arc<dyn Processor>) -> Self {
    Self {
      id: id.into(),
      inner,
    }
  }
}

impl std::fmt::Debug for CustomProcessor {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("CustomProcessor")
      .field("id", &self.id)
      .field("plugin", &self.inner.id())
      .finish()
  }
}

impl Processor for CustomProcessor {
  fn id(&self) -> &str {
    &self.id
  }

  fn apply(&self, status: &mut ProcessingStatus<'_>, content: String) -> BundlingResult<String> {
    debug!(id = %self.id, plugin = self.inner.id(), path = status.current_path(), "running custom processor");
    self.inner.apply(status, content)
  }

  fn is_variant_aware(&self) -> bool {
    self.inner.is_variant_aware()
  }
}
