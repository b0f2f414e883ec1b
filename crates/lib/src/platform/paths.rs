//! Default lifecycle locations.
//!
//! Each location can be overridden through its `CNB_*` environment variable.

use std::path::{Path, PathBuf};

pub const DEFAULT_BUILDPACKS_DIR: &str = "/cnb/buildpacks";
pub const DEFAULT_EXTENSIONS_DIR: &str = "/cnb/extensions";
pub const DEFAULT_APP_DIR: &str = "/workspace";
pub const DEFAULT_PLATFORM_DIR: &str = "/platform";
pub const DEFAULT_LAYERS_DIR: &str = "/layers";
pub const DEFAULT_BUILD_CONFIG_DIR: &str = "/cnb/build-config";
pub const DEFAULT_ORDER_PATH: &str = "/cnb/order.toml";

fn env_or(var: &str, default: impl FnOnce() -> PathBuf) -> PathBuf {
  match std::env::var(var) {
    Ok(value) if !value.is_empty() => PathBuf::from(value),
    _ => default(),
  }
}

pub fn buildpacks_dir() -> PathBuf {
  env_or("CNB_BUILDPACKS_DIR", || PathBuf::from(DEFAULT_BUILDPACKS_DIR))
}

pub fn extensions_dir() -> PathBuf {
  env_or("CNB_EXTENSIONS_DIR", || PathBuf::from(DEFAULT_EXTENSIONS_DIR))
}

pub fn app_dir() -> PathBuf {
  env_or("CNB_APP_DIR", || PathBuf::from(DEFAULT_APP_DIR))
}

pub fn platform_dir() -> PathBuf {
  env_or("CNB_PLATFORM_DIR", || PathBuf::from(DEFAULT_PLATFORM_DIR))
}

pub fn layers_dir() -> PathBuf {
  env_or("CNB_LAYERS_DIR", || PathBuf::from(DEFAULT_LAYERS_DIR))
}

pub fn build_config_dir() -> PathBuf {
  env_or("CNB_BUILD_CONFIG_DIR", || PathBuf::from(DEFAULT_BUILD_CONFIG_DIR))
}

/// `order.toml` in the layers directory wins over the one baked into the builder.
pub fn order_path(layers_dir: &Path) -> PathBuf {
  env_or("CNB_ORDER_PATH", || {
    let in_layers = layers_dir.join("order.toml");
    if in_layers.exists() {
      in_layers
    } else {
      PathBuf::from(DEFAULT_ORDER_PATH)
    }
  })
}

pub fn group_path(layers_dir: &Path) -> PathBuf {
  env_or("CNB_GROUP_PATH", || layers_dir.join("group.toml"))
}

pub fn plan_path(layers_dir: &Path) -> PathBuf {
  env_or("CNB_PLAN_PATH", || layers_dir.join("plan.toml"))
}

pub fn analyzed_path(layers_dir: &Path) -> PathBuf {
  env_or("CNB_ANALYZED_PATH", || layers_dir.join("analyzed.toml"))
}
