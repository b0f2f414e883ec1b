//! The detection memo shared by every candidate of one detect run.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::detect::types::DetectOutputs;

/// Probe outcomes keyed by `"{Kind} {id}@{version}"`.
///
/// Entries are only ever added. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct DetectRuns {
  inner: Arc<Mutex<HashMap<String, DetectOutputs>>>,
}

impl DetectRuns {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, key: &str) -> Option<DetectOutputs> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner).get(key).cloned()
  }

  pub fn contains(&self, key: &str) -> bool {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner).contains_key(key)
  }

  /// Store an outcome unless the key already has one.
  ///
  /// Returns the outcome that ends up in the map.
  pub fn insert(&self, key: String, outputs: DetectOutputs) -> DetectOutputs {
    self
      .inner
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .entry(key)
      .or_insert(outputs)
      .clone()
  }

  pub fn len(&self) -> usize {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
