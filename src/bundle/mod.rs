//! Bundle construction from configuration, dirty tracking and path iteration.

mod factory;
mod iterator;
mod mappings;

pub use factory::{
  BundleFailure, BundleFactory, BundleSet, LICENSES_FILE_NAME, SORT_FILE_NAME, order_bundles,
  resolve_dependencies,
};
pub use iterator::{
  ConditionalCommentHandler, DebugPathIterator, NoConditionalComments, ProductionPathIterator,
};
pub use mappings::{FilePathMappings, MAPPINGS_FILE, modified_millis, system_time_millis};
