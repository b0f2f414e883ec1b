use std::path::{Path, PathBuf};
use std::sync::Arc;

use cairn_lib::api::{ApiSet, ApiVerifier, DeprecationMode};
use cairn_lib::detect::{DetectConfig, Detector, DetectorFactory};
use cairn_lib::execute::env::BuildEnv;
use cairn_lib::execute::process::ProcessExecutor;
use cairn_lib::log::RecordingLogger;
use cairn_lib::module::FsDirStore;
use tempfile::TempDir;

/// A scratch lifecycle layout: modules, app, platform and layers dirs.
pub struct Workspace {
  pub temp: TempDir,
}

impl Workspace {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    for dir in ["buildpacks", "extensions", "app", "platform", "layers"] {
      std::fs::create_dir_all(temp.path().join(dir)).unwrap();
    }
    Self { temp }
  }

  pub fn path(&self, rel: &str) -> PathBuf {
    self.temp.path().join(rel)
  }

  /// Write `buildpack.toml` and a `bin/detect` script for `id@version`.
  pub fn buildpack(&self, id: &str, version: &str, api: &str, detect: &str) -> PathBuf {
    let root = self.path("buildpacks").join(id.replace('/', "_")).join(version);
    write(
      &root.join("buildpack.toml"),
      &format!("api = \"{api}\"\n\n[buildpack]\nid = \"{id}\"\nversion = \"{version}\"\n"),
    );
    write_script(&root.join("bin").join("detect"), detect);
    root
  }

  pub fn order(&self, text: &str) -> PathBuf {
    let path = self.path("layers").join("order.toml");
    write(&path, text);
    path
  }

  pub fn detector(&self, order_path: &Path, logger: Arc<RecordingLogger>) -> Detector {
    let store = FsDirStore::new(self.path("buildpacks"), self.path("extensions"));
    let executor = ProcessExecutor::new(BuildEnv::from_process());
    let factory = DetectorFactory::new(
      Arc::new(store),
      Arc::new(executor),
      ApiVerifier::new(ApiSet::buildpack(), DeprecationMode::Quiet),
    );
    let config = DetectConfig::new(&self.path("app"), &self.path("platform"));
    factory
      .new_detector(order_path, &self.path("layers").join("analyzed.toml"), config, logger)
      .unwrap()
  }
}

pub fn write(path: &Path, text: &str) {
  std::fs::create_dir_all(path.parent().unwrap()).unwrap();
  std::fs::write(path, text).unwrap();
}

#[cfg(unix)]
fn write_script(path: &Path, body: &str) {
  use std::os::unix::fs::PermissionsExt;

  write(path, &format!("#!/bin/sh\n{body}\n"));
  std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

#[cfg(not(unix))]
fn write_script(path: &Path, body: &str) {
  write(path, body);
}
