//! Reading and writing the lifecycle's TOML files.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::module::{Group, Order};
use crate::plan::Plan;
use crate::platform::target::RunImageTarget;

#[derive(Debug, Error)]
pub enum FilesError {
  #[error("failed to read {}: {source}", .path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse {}: {source}", .path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },

  #[error("failed to encode {}: {source}", .path.display())]
  Encode {
    path: PathBuf,
    #[source]
    source: toml::ser::Error,
  },

  #[error("failed to write {}: {source}", .path.display())]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Contents of `order.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFile {
  #[serde(default)]
  pub order: Order,
  #[serde(default, rename = "order-extensions", alias = "order-ext", skip_serializing_if = "Vec::is_empty")]
  pub order_extensions: Order,
}

/// The run image section of `analyzed.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunImage {
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub reference: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub image: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub target: Option<RunImageTarget>,
}

/// The parts of `analyzed.toml` detection reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Analyzed {
  #[serde(default, rename = "run-image", skip_serializing_if = "Option::is_none")]
  pub run_image: Option<RunImage>,
}

impl Analyzed {
  pub fn run_image_target(&self) -> Option<&RunImageTarget> {
    self.run_image.as_ref().and_then(|r| r.target.as_ref())
  }
}

fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T, FilesError> {
  let text = std::fs::read_to_string(path).map_err(|source| FilesError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  toml::from_str(&text).map_err(|source| FilesError::Parse {
    path: path.to_path_buf(),
    source,
  })
}

fn write_toml<T: Serialize>(path: &Path, value: &T) -> Result<(), FilesError> {
  let text = toml::to_string(value).map_err(|source| FilesError::Encode {
    path: path.to_path_buf(),
    source,
  })?;
  let write_err = |source| FilesError::Write {
    path: path.to_path_buf(),
    source,
  };
  if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
    std::fs::create_dir_all(parent).map_err(write_err)?;
  }
  std::fs::write(path, text).map_err(write_err)?;
  debug!(path = %path.display(), "wrote file");
  Ok(())
}

pub fn read_order(path: &Path) -> Result<OrderFile, FilesError> {
  read_toml(path)
}

/// A missing `analyzed.toml` yields an empty value.
pub fn read_analyzed(path: &Path) -> Result<Analyzed, FilesError> {
  if !path.exists() {
    return Ok(Analyzed::default());
  }
  read_toml(path)
}

pub fn read_group(path: &Path) -> Result<Group, FilesError> {
  read_toml(path)
}

pub fn write_group(path: &Path, group: &Group) -> Result<(), FilesError> {
  write_toml(path, group)
}

pub fn read_plan(path: &Path) -> Result<Plan, FilesError> {
  read_toml(path)
}

pub fn write_plan(path: &Path, plan: &Plan) -> Result<(), FilesError> {
  write_toml(path, plan)
}
