mod candidates;
mod detect;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use cairn_lib::api::ApiVerifier;
use cairn_lib::detect::{DetectConfig, Detector, DetectorFactory};
use cairn_lib::execute::{BuildEnv, ProcessExecutor};
use cairn_lib::log::TracingLogger;
use cairn_lib::module::FsDirStore;
use cairn_lib::platform::paths;

pub use candidates::{CandidatesArgs, cmd_candidates};
pub use detect::{DetectArgs, cmd_detect};

/// Locations and run image overrides shared by every subcommand.
///
/// Unset paths fall back to the `CNB_*` environment, then the CNB defaults.
#[derive(Args, Debug, Clone, Default)]
pub struct LifecycleArgs {
  /// Application directory probes run in
  #[arg(long)]
  pub app: Option<PathBuf>,

  /// Directory of buildpacks (<id>/<version>/buildpack.toml)
  #[arg(long)]
  pub buildpacks: Option<PathBuf>,

  /// Directory of extensions (<id>/<version>/extension.toml)
  #[arg(long)]
  pub extensions: Option<PathBuf>,

  /// Path to order.toml
  #[arg(long)]
  pub order: Option<PathBuf>,

  /// Platform directory handed to probes
  #[arg(long)]
  pub platform: Option<PathBuf>,

  /// Path to analyzed.toml
  #[arg(long)]
  pub analyzed: Option<PathBuf>,

  /// Build config directory; <dir>/env files are applied to every probe
  #[arg(long)]
  pub build_config: Option<PathBuf>,

  /// Layers directory holding order.toml, analyzed.toml and the outputs
  #[arg(long)]
  pub layers: Option<PathBuf>,

  /// Run image OS, overriding analyzed.toml
  #[arg(long)]
  pub run_os: Option<String>,

  /// Run image architecture, overriding analyzed.toml
  #[arg(long)]
  pub run_arch: Option<String>,
}

impl LifecycleArgs {
  pub fn layers_dir(&self) -> PathBuf {
    self.layers.clone().unwrap_or_else(paths::layers_dir)
  }

  pub fn order_path(&self) -> PathBuf {
    self.order.clone().unwrap_or_else(|| paths::order_path(&self.layers_dir()))
  }

  pub fn analyzed_path(&self) -> PathBuf {
    self
      .analyzed
      .clone()
      .unwrap_or_else(|| paths::analyzed_path(&self.layers_dir()))
  }

  pub fn detect_config(&self) -> DetectConfig {
    let mut config = DetectConfig {
      app_dir: self.app.clone().unwrap_or_else(paths::app_dir),
      platform_dir: self.platform.clone().unwrap_or_else(paths::platform_dir),
      build_config_dir: self.build_config.clone().unwrap_or_else(paths::build_config_dir),
      ..DetectConfig::default()
    };
    if let Some(os) = &self.run_os {
      config.run_image.os = os.clone();
    }
    if let Some(arch) = &self.run_arch {
      config.run_image.arch = arch.clone();
    }
    config
  }

  /// Read the order and analyzed files, verify module APIs and build a detector.
  pub fn detector(&self) -> Result<Detector> {
    let store = FsDirStore::new(
      self.buildpacks.clone().unwrap_or_else(paths::buildpacks_dir),
      self.extensions.clone().unwrap_or_else(paths::extensions_dir),
    );
    let factory = DetectorFactory::new(
      Arc::new(store),
      Arc::new(ProcessExecutor::new(BuildEnv::from_process())),
      ApiVerifier::default(),
    );

    let order_path = self.order_path();
    let detector = factory
      .new_detector(
        &order_path,
        &self.analyzed_path(),
        self.detect_config(),
        Arc::new(TracingLogger),
      )
      .with_context(|| format!("Failed to prepare detection from {}", order_path.display()))?;
    Ok(detector)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;
  use std::path::Path;
  use temp_env::with_vars;

  #[test]
  #[serial]
  fn explicit_layers_dir_locates_inputs() {
    with_vars([("CNB_ORDER_PATH", None::<&str>), ("CNB_ANALYZED_PATH", None)], || {
      let args = LifecycleArgs {
        layers: Some(PathBuf::from("/tmp/cairn-missing-layers")),
        ..Default::default()
      };

      assert_eq!(args.analyzed_path(), Path::new("/tmp/cairn-missing-layers/analyzed.toml"));
      // No order.toml in the layers dir, so the CNB default applies.
      assert_eq!(args.order_path(), Path::new("/cnb/order.toml"));
    });
  }

  #[test]
  #[serial]
  fn exported_order_path_wins_over_layers_dir() {
    with_vars([("CNB_ORDER_PATH", Some("/custom/order.toml"))], || {
      let args = LifecycleArgs {
        layers: Some(PathBuf::from("/tmp/cairn-missing-layers")),
        ..Default::default()
      };

      assert_eq!(args.order_path(), Path::new("/custom/order.toml"));
    });
  }

  #[test]
  fn run_image_flags_override_target() {
    let args = LifecycleArgs {
      run_os: Some("linux".into()),
      run_arch: Some("arm64".into()),
      app: Some(PathBuf::from("app")),
      ..Default::default()
    };

    let config = args.detect_config();
    assert_eq!(config.run_image.os, "linux");
    assert_eq!(config.run_image.arch, "arm64");
    assert_eq!(config.app_dir, Path::new("app"));
  }
}
