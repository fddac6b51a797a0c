//! Iterators over the paths a list of bundles publishes, in production or debug form.
//!
//! Both iterators bracket the paths of a bundle carrying an Internet Explorer condition with
//! [`ConditionalCommentHandler::open_conditional_comment`] and
//! [`ConditionalCommentHandler::close_conditional_comment`]. The calls stay balanced for bundles
//! publishing no path and for iterators dropped before exhaustion.

use std::collections::VecDeque;

use crate::generator::GeneratorRegistry;
use crate::models::{Bundle, BundlePath};
use crate::paths::join_paths;
use crate::variant::VariantMap;

/// Receives the conditional comment boundaries of the bundles being iterated.
pub trait ConditionalCommentHandler {
  /// A bundle guarded by `expression` starts.
  fn open_conditional_comment(&mut self, expression: &str);

  /// The guarded bundle ended.
  fn close_conditional_comment(&mut self);
}

/// Handler ignoring conditional comments.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoConditionalComments;

impl ConditionalCommentHandler for NoConditionalComments {
  fn open_conditional_comment(&mut self, _expression: &str) {}

  fn close_conditional_comment(&mut self) {}
}

enum ProductionState {
  BeforeBundle,
  EmittingBundle { conditional: bool },
  Done,
}

/// One path per bundle: the alternate production URL or the hashed bundle URL.
/// Debug-only bundles are skipped.
pub struct ProductionPathIterator<'a, H: ConditionalCommentHandler> {
  bundles: std::slice::Iter<'a, Bundle>,
  handler: &'a mut H,
  variants: &'a VariantMap,
  state: ProductionState,
}

impl<'a, H: ConditionalCommentHandler> ProductionPathIterator<'a, H> {
  /// Iterate `bundles` for the requested variant combination.
  pub fn new(bundles: &'a [Bundle], handler: &'a mut H, variants: &'a VariantMap) -> Self {
    Self {
      bundles: bundles.iter(),
      handler,
      variants,
      state: ProductionState::BeforeBundle,
    }
  }

  fn close_current(&mut self) {
    if let ProductionState::EmittingBundle { conditional: true } = self.state {
      self.handler.close_conditional_comment();
    }
    self.state = ProductionState::BeforeBundle;
  }
}

impl<H: ConditionalCommentHandler> Iterator for ProductionPathIterator<'_, H> {
  type Item = BundlePath;

  fn next(&mut self) -> Option<BundlePath> {
    if matches!(self.state, ProductionState::Done) {
      return None;
    }
    self.close_current();

    let Some(bundle) = self
      .bundles
      .by_ref()
      .find(|bundle| !bundle.inclusion.include_only_on_debug)
    else {
      self.state = ProductionState::Done;
      return None;
    };

    let conditional = match &bundle.explorer_condition {
      Some(expression) => {
        self.handler.open_conditional_comment(expression);
        true
      }
      None => false,
    };
    self.state = ProductionState::EmittingBundle { conditional };

    let path = match &bundle.alternate_production_url {
      Some(url) => BundlePath::external(&bundle.bundle_prefix, url),
      None => {
        let prefix = bundle.url_prefix(self.variants).unwrap_or_default();
        BundlePath::new(&bundle.bundle_prefix, join_paths(&prefix, &bundle.id))
      }
    };
    Some(path)
  }
}

impl<H: ConditionalCommentHandler> Drop for ProductionPathIterator<'_, H> {
  fn drop(&mut self) {
    self.close_current();
  }
}

enum DebugState {
  BeforeBundle,
  InMemberList {
    paths: VecDeque<BundlePath>,
    conditional: bool,
  },
  Done,
}

/// Every member path of every bundle, or the debug URL of bundles declaring one.
/// Bundles excluded from debug mode are skipped.
pub struct DebugPathIterator<'a, H: ConditionalCommentHandler> {
  bundles: std::slice::Iter<'a, Bundle>,
  handler: &'a mut H,
  variants: &'a VariantMap,
  registry: &'a GeneratorRegistry,
  state: DebugState,
}

impl<'a, H: ConditionalCommentHandler> DebugPathIterator<'a, H> {
  /// Iterate `bundles` for the requested variant combination.
  pub fn new(
    bundles: &'a [Bundle],
    handler: &'a mut H,
    variants: &'a VariantMap,
    registry: &'a GeneratorRegistry,
  ) -> Self {
    Self {
      bundles: bundles.iter(),
      handler,
      variants,
      registry,
      state: DebugState::BeforeBundle,
    }
  }

  fn member_paths(&self, bundle: &Bundle) -> VecDeque<BundlePath> {
    match &bundle.debug_url {
      Some(url) => VecDeque::from([BundlePath::external(&bundle.bundle_prefix, url)]),
      None => bundle
        .item_debug_paths(self.variants, self.registry)
        .into_iter()
        .map(|path| BundlePath::new(&bundle.bundle_prefix, path))
        .collect(),
    }
  }

  fn close_current(&mut self) {
    if let DebugState::InMemberList {
      conditional: true, ..
    } = self.state
    {
      self.handler.close_conditional_comment();
    }
    self.state = DebugState::BeforeBundle;
  }
}

impl<H: ConditionalCommentHandler> Iterator for DebugPathIterator<'_, H> {
  type Item = BundlePath;

  fn next(&mut self) -> Option<BundlePath> {
    loop {
      match &mut self.state {
        DebugState::Done => return None,
        DebugState::InMemberList { paths, .. } => {
          if let Some(path) = paths.pop_front() {
            return Some(path);
          }
          self.close_current();
        }
        DebugState::BeforeBundle => {
          let Some(bundle) = self
            .bundles
            .by_ref()
            .find(|bundle| !bundle.inclusion.exclude_on_debug)
          else {
            self.state = DebugState::Done;
            return None;
          };
          let conditional = match &bundle.explorer_condition {
            Some(expression) => {
              self.handler.open_conditional_comment(expression);
              true
            }
            None => false,
          };
          let paths = self.member_paths(bundle);
          self.state = DebugState::InMemberList { paths, conditional };
        }
      }
    }
  }
}

impl<H: ConditionalCommentHandler> Drop for DebugPathIterator<'_, H> {
  fn drop(&mut self) {
    self.close_current();
  }
}
