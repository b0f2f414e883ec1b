//! Module descriptors and the directory store that looks them up.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::module::types::{Group, Kind, Order};
use crate::platform::target::{OsDistro, TargetMetadata};

/// Stack id whose descriptors predate `[[targets]]`.
const BIONIC_STACK_ID: &str = "io.buildpacks.stacks.bionic";

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("{kind} '{id}@{version}' not found: {}", .path.display())]
  NotFound {
    kind: Kind,
    id: String,
    version: String,
    path: PathBuf,
  },

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

  #[error("descriptor {} has no [{section}] table", .path.display())]
  MissingInfo { path: PathBuf, section: &'static str },
}

/// Identity block of a descriptor (`[buildpack]` or `[extension]`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ModuleInfo {
  pub id: String,
  pub version: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub homepage: String,
  #[serde(default)]
  pub clear_env: bool,
}

/// A parsed `buildpack.toml` or `extension.toml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
  pub kind: Kind,
  pub api: String,
  pub info: ModuleInfo,
  /// Nested order of a composite buildpack. Empty for everything else.
  pub order: Order,
  pub targets: Vec<TargetMetadata>,
  /// Directory the descriptor was loaded from; probes run from here.
  pub root_dir: PathBuf,
}

impl ModuleDescriptor {
  pub fn new(kind: Kind, id: impl Into<String>, version: impl Into<String>) -> Self {
    Self {
      kind,
      api: String::new(),
      info: ModuleInfo {
        id: id.into(),
        version: version.into(),
        ..Default::default()
      },
      order: Vec::new(),
      targets: Vec::new(),
      root_dir: PathBuf::new(),
    }
  }

  /// Same key the detection memo uses for this module.
  pub fn key(&self) -> String {
    format!("{} {}@{}", self.kind, self.info.id, self.info.version)
  }

  pub fn is_composite(&self) -> bool {
    !self.order.is_empty()
  }

  pub fn with_api(mut self, api: impl Into<String>) -> Self {
    self.api = api.into();
    self
  }

  pub fn with_order(mut self, order: Order) -> Self {
    self.order = order;
    self
  }

  pub fn with_targets(mut self, targets: Vec<TargetMetadata>) -> Self {
    self.targets = targets;
    self
  }

  pub fn with_root_dir(mut self, root_dir: impl Into<PathBuf>) -> Self {
    self.root_dir = root_dir.into();
    self
  }

  /// Parse a descriptor from TOML text.
  pub fn parse(kind: Kind, text: &str, root_dir: &Path) -> Result<Self, StoreError> {
    let path = root_dir.join(kind.descriptor_file());
    let raw: DescriptorFile = toml::from_str(text).map_err(|source| StoreError::Parse {
      path: path.clone(),
      source,
    })?;

    let info = match kind {
      Kind::Buildpack => raw.buildpack,
      Kind::Extension => raw.extension,
    };
    let info = info.ok_or(StoreError::MissingInfo {
      path,
      section: match kind {
        Kind::Buildpack => "buildpack",
        Kind::Extension => "extension",
      },
    })?;

    let mut targets = raw.targets;
    if targets.is_empty() && raw.stacks.iter().any(|stack| stack.id == BIONIC_STACK_ID) {
      targets.push(TargetMetadata {
        distros: vec![OsDistro::new("ubuntu", "18.04")],
        ..TargetMetadata::new("linux", "amd64")
      });
    }

    Ok(Self {
      kind,
      api: raw.api,
      info,
      order: raw.order,
      targets,
      root_dir: root_dir.to_path_buf(),
    })
  }
}

#[derive(Deserialize)]
struct DescriptorFile {
  #[serde(default)]
  api: String,
  buildpack: Option<ModuleInfo>,
  extension: Option<ModuleInfo>,
  #[serde(default)]
  order: Vec<Group>,
  #[serde(default)]
  targets: Vec<TargetMetadata>,
  #[serde(default)]
  stacks: Vec<StackEntry>,
}

#[derive(Deserialize)]
struct StackEntry {
  id: String,
}

/// Looks up module descriptors by kind, id and version.
pub trait DirStore: Send + Sync {
  fn lookup(&self, kind: Kind, id: &str, version: &str) -> Result<Arc<ModuleDescriptor>, StoreError>;
}

/// Descriptors laid out as `<dir>/<escaped id>/<version>/<kind>.toml`.
pub struct FsDirStore {
  buildpacks_dir: PathBuf,
  extensions_dir: PathBuf,
  cache: Mutex<HashMap<(Kind, String, String), Arc<ModuleDescriptor>>>,
}

impl FsDirStore {
  pub fn new(buildpacks_dir: impl Into<PathBuf>, extensions_dir: impl Into<PathBuf>) -> Self {
    Self {
      buildpacks_dir: buildpacks_dir.into(),
      extensions_dir: extensions_dir.into(),
      cache: Mutex::new(HashMap::new()),
    }
  }

  /// Directory holding one module version. `/` in ids becomes `_`.
  pub fn module_dir(&self, kind: Kind, id: &str, version: &str) -> PathBuf {
    let base = match kind {
      Kind::Buildpack => &self.buildpacks_dir,
      Kind::Extension => &self.extensions_dir,
    };
    base.join(id.replace('/', "_")).join(version)
  }

  fn load(&self, kind: Kind, id: &str, version: &str) -> Result<ModuleDescriptor, StoreError> {
    let dir = self.module_dir(kind, id, version);
    let path = dir.join(kind.descriptor_file());
    let text = std::fs::read_to_string(&path).map_err(|source| {
      if source.kind() == std::io::ErrorKind::NotFound {
        StoreError::NotFound {
          kind,
          id: id.to_string(),
          version: version.to_string(),
          path: path.clone(),
        }
      } else {
        StoreError::Read {
          path: path.clone(),
          source,
        }
      }
    })?;
    debug!(kind = %kind, id, version, path = %path.display(), "loaded module descriptor");
    ModuleDescriptor::parse(kind, &text, &dir)
  }
}

impl DirStore for FsDirStore {
  fn lookup(&self, kind: Kind, id: &str, version: &str) -> Result<Arc<ModuleDescriptor>, StoreError> {
    let key = (kind, id.to_string(), version.to_string());
    if let Some(found) = self.cache.lock().unwrap_or_else(PoisonError::into_inner).get(&key) {
      return Ok(found.clone());
    }

    let descriptor = Arc::new(self.load(kind, id, version)?);
    self
      .cache
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(key, descriptor.clone());
    Ok(descriptor)
  }
}
