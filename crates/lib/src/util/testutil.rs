//! Test fakes for cairn-lib.
//!
//! An in-memory module store, an executor that replays canned outcomes and
//! counts invocations, and helpers for writing real detect scripts.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::detect::types::{DetectConfig, DetectOutputs};
use crate::execute::DetectExecutor;
use crate::log::Logger;
use crate::module::{DirStore, Kind, ModuleDescriptor, StoreError};

/// Descriptors held in memory, keyed by kind, id and version.
#[derive(Default)]
pub struct MemoryStore {
  descriptors: HashMap<(Kind, String, String), Arc<ModuleDescriptor>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with(mut self, descriptor: ModuleDescriptor) -> Self {
    let key = (
      descriptor.kind,
      descriptor.info.id.clone(),
      descriptor.info.version.clone(),
    );
    self.descriptors.insert(key, Arc::new(descriptor));
    self
  }

  pub fn with_buildpack(self, descriptor: ModuleDescriptor) -> Self {
    self.with(ModuleDescriptor {
      kind: Kind::Buildpack,
      ..descriptor
    })
  }

  pub fn with_extension(self, descriptor: ModuleDescriptor) -> Self {
    self.with(ModuleDescriptor {
      kind: Kind::Extension,
      ..descriptor
    })
  }

  /// Register plain buildpacks for each `(id, version)`.
  pub fn with_buildpacks(self, modules: &[(&str, &str)]) -> Self {
    modules.iter().fold(self, |store, (id, version)| {
      store.with_buildpack(ModuleDescriptor::new(Kind::Buildpack, *id, *version))
    })
  }
}

impl DirStore for MemoryStore {
  fn lookup(&self, kind: Kind, id: &str, version: &str) -> Result<Arc<ModuleDescriptor>, StoreError> {
    self
      .descriptors
      .get(&(kind, id.to_string(), version.to_string()))
      .cloned()
      .ok_or_else(|| StoreError::NotFound {
        kind,
        id: id.to_string(),
        version: version.to_string(),
        path: Path::new("/memory").join(id).join(version),
      })
  }
}

/// Replays canned outcomes per memo key and counts how often each key ran.
///
/// Keys without a canned outcome pass with an empty plan.
#[derive(Default)]
pub struct RecordingExecutor {
  outcomes: HashMap<String, DetectOutputs>,
  calls: Mutex<HashMap<String, usize>>,
}

impl RecordingExecutor {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_outcome(mut self, key: &str, outputs: DetectOutputs) -> Self {
    self.outcomes.insert(key.to_string(), outputs);
    self
  }

  pub fn calls(&self, key: &str) -> usize {
    self.calls.lock().unwrap().get(key).copied().unwrap_or(0)
  }

  pub fn total_calls(&self) -> usize {
    self.calls.lock().unwrap().values().sum()
  }
}

#[async_trait]
impl DetectExecutor for RecordingExecutor {
  async fn detect(&self, descriptor: &ModuleDescriptor, _config: &DetectConfig, _logger: &dyn Logger) -> DetectOutputs {
    let key = descriptor.key();
    *self.calls.lock().unwrap().entry(key.clone()).or_insert(0) += 1;
    tokio::task::yield_now().await;
    self.outcomes.get(&key).cloned().unwrap_or_default()
  }
}

/// Write `<root>/bin/detect` as an executable `/bin/sh` script.
#[cfg(unix)]
pub fn write_detect_script(root: &Path, body: &str) {
  use std::os::unix::fs::PermissionsExt;

  let bin = root.join("bin");
  std::fs::create_dir_all(&bin).unwrap();
  let path = bin.join("detect");
  std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
  std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}
