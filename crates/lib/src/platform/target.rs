//! Target platform constraints and the matching rules between module targets
//! and the run image.
//!
//! Every field uses wildcard semantics: an empty value on either side of a
//! comparison matches anything.

use serde::{Deserialize, Serialize};

/// An OS distribution a module supports, or the one the run image ships.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsDistro {
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub name: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub version: String,
}

impl OsDistro {
  pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      version: version.into(),
    }
  }
}

/// A `[[targets]]` entry declared by a module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TargetMetadata {
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub os: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub arch: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub arch_variant: String,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub distros: Vec<OsDistro>,
}

impl TargetMetadata {
  pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
    Self {
      os: os.into(),
      arch: arch.into(),
      ..Default::default()
    }
  }

  pub fn is_wildcard(&self) -> bool {
    self.os.is_empty() && self.arch.is_empty() && self.arch_variant.is_empty() && self.distros.is_empty()
  }
}

/// The target of the image the application will run on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunImageTarget {
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub id: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub os: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub arch: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub arch_variant: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub distro: Option<OsDistro>,
}

impl RunImageTarget {
  pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
    Self {
      os: os.into(),
      arch: arch.into(),
      ..Default::default()
    }
  }

  /// A run image with no target fields places no constraint on modules.
  /// The id is not a constraint.
  pub fn is_wildcard(&self) -> bool {
    self.os.is_empty() && self.arch.is_empty() && self.arch_variant.is_empty() && self.distro.is_none()
  }

  /// This target with every field `overrides` sets replacing its own.
  pub fn overlay(mut self, overrides: &RunImageTarget) -> Self {
    let replace = |field: &mut String, value: &String| {
      if !value.is_empty() {
        field.clone_from(value);
      }
    };
    replace(&mut self.id, &overrides.id);
    replace(&mut self.os, &overrides.os);
    replace(&mut self.arch, &overrides.arch);
    replace(&mut self.arch_variant, &overrides.arch_variant);
    if overrides.distro.is_some() {
      self.distro.clone_from(&overrides.distro);
    }
    self
  }

  /// `CNB_TARGET_*` variables exported to detect probes.
  ///
  /// `CNB_TARGET_ID` is only present when the run image has an id.
  pub fn env_vars(&self) -> Vec<(&'static str, String)> {
    let (distro_name, distro_version) = match &self.distro {
      Some(distro) => (distro.name.clone(), distro.version.clone()),
      None => (String::new(), String::new()),
    };
    let mut vars = vec![
      ("CNB_TARGET_OS", self.os.clone()),
      ("CNB_TARGET_ARCH", self.arch.clone()),
      ("CNB_TARGET_ARCH_VARIANT", self.arch_variant.clone()),
      ("CNB_TARGET_DISTRO_NAME", distro_name),
      ("CNB_TARGET_DISTRO_VERSION", distro_version),
    ];
    if !self.id.is_empty() {
      vars.push(("CNB_TARGET_ID", self.id.clone()));
    }
    vars
  }
}

fn matches(a: &str, b: &str) -> bool {
  a.is_empty() || b.is_empty() || a == b
}

/// Whether a single module target can run on the given run image.
pub fn target_satisfied(module: &TargetMetadata, run_image: &RunImageTarget) -> bool {
  if !matches(&module.os, &run_image.os)
    || !matches(&module.arch, &run_image.arch)
    || !matches(&module.arch_variant, &run_image.arch_variant)
  {
    return false;
  }

  match &run_image.distro {
    Some(distro) if !module.distros.is_empty() => module
      .distros
      .iter()
      .any(|d| matches(&d.name, &distro.name) && matches(&d.version, &distro.version)),
    _ => true,
  }
}

/// Whether any of a module's declared targets is compatible with the run image.
///
/// A module with no targets, a wildcard module target, or a wildcard run image
/// always satisfies.
pub fn satisfies(module_targets: &[TargetMetadata], run_image: &RunImageTarget) -> bool {
  if run_image.is_wildcard() || module_targets.is_empty() {
    return true;
  }
  module_targets
    .iter()
    .any(|target| target.is_wildcard() || target_satisfied(target, run_image))
}
