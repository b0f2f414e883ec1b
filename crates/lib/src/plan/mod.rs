//! Build plan types: what a detect probe emits and what resolution produces.

use serde::{Deserialize, Serialize};

use crate::module::GroupElement;

/// A named dependency a module needs at build time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Require {
  pub name: String,
  /// Deprecated top-level version. Moved into `metadata.version` on read.
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub version: String,
  #[serde(default, skip_serializing_if = "toml::Table::is_empty")]
  pub metadata: toml::Table,
}

impl Require {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      ..Default::default()
    }
  }

  pub fn has_doubly_specified_versions(&self) -> bool {
    !self.version.is_empty() && self.metadata.contains_key("version")
  }

  pub fn has_top_level_version(&self) -> bool {
    !self.version.is_empty()
  }

  /// Move the top-level version into `metadata.version`.
  pub fn convert_version_to_metadata(&mut self) {
    if self.version.is_empty() {
      return;
    }
    let version = std::mem::take(&mut self.version);
    self.metadata.insert("version".to_string(), toml::Value::String(version));
  }
}

/// A named dependency a module can contribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provide {
  pub name: String,
}

impl Provide {
  pub fn new(name: impl Into<String>) -> Self {
    Self { name: name.into() }
  }
}

/// One self-contained set of requires and provides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanSections {
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub requires: Vec<Require>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub provides: Vec<Provide>,
}

impl PlanSections {
  pub fn new(requires: Vec<Require>, provides: Vec<Provide>) -> Self {
    Self { requires, provides }
  }

  pub fn require(name: &str) -> Self {
    Self::new(vec![Require::new(name)], Vec::new())
  }

  pub fn provide(name: &str) -> Self {
    Self::new(Vec::new(), vec![Provide::new(name)])
  }

  pub fn require_and_provide(name: &str) -> Self {
    Self::new(vec![Require::new(name)], vec![Provide::new(name)])
  }
}

/// The plan a detect probe writes: primary sections plus `[[or]]` alternates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "PlanFile", into = "PlanFile")]
pub struct BuildPlan {
  pub sections: PlanSections,
  pub or: Vec<PlanSections>,
}

impl BuildPlan {
  pub fn new(sections: PlanSections) -> Self {
    Self {
      sections,
      or: Vec::new(),
    }
  }

  pub fn with_or(mut self, alternate: PlanSections) -> Self {
    self.or.push(alternate);
    self
  }

  /// Primary sections first, then each alternate in declaration order.
  pub fn options(&self) -> impl Iterator<Item = &PlanSections> {
    std::iter::once(&self.sections).chain(self.or.iter())
  }

  pub fn sections_mut(&mut self) -> impl Iterator<Item = &mut PlanSections> {
    std::iter::once(&mut self.sections).chain(self.or.iter_mut())
  }
}

#[derive(Clone, Default, Serialize, Deserialize)]
struct PlanFile {
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  requires: Vec<Require>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  provides: Vec<Provide>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  or: Vec<PlanSections>,
}

impl From<PlanFile> for BuildPlan {
  fn from(file: PlanFile) -> Self {
    Self {
      sections: PlanSections::new(file.requires, file.provides),
      or: file.or,
    }
  }
}

impl From<BuildPlan> for PlanFile {
  fn from(plan: BuildPlan) -> Self {
    Self {
      requires: plan.sections.requires,
      provides: plan.sections.provides,
      or: plan.or,
    }
  }
}

/// One resolved dependency name with everything that provides and requires it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildPlanEntry {
  #[serde(default)]
  pub providers: Vec<GroupElement>,
  #[serde(default)]
  pub requires: Vec<Require>,
}

impl BuildPlanEntry {
  /// Providers keep only id, version and the extension flag.
  pub fn no_opt(mut self) -> Self {
    self.providers = self
      .providers
      .into_iter()
      .map(|p| p.no_opt().no_api().no_homepage())
      .collect();
    self
  }
}

/// The resolved build plan handed to the build phase (`plan.toml`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
  #[serde(default)]
  pub entries: Vec<BuildPlanEntry>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn probe_plan_reads_alternates() {
    let text = r#"
[[provides]]
name = "node"

[[requires]]
name = "node"
[requires.metadata]
launch = true

[[or]]
[[or.provides]]
name = "yarn"
[[or.requires]]
name = "yarn"
"#;
    let plan: BuildPlan = toml::from_str(text).unwrap();
    assert_eq!(plan.sections.provides, vec![Provide::new("node")]);
    assert_eq!(plan.sections.requires[0].metadata.get("launch"), Some(&toml::Value::Boolean(true)));
    assert_eq!(plan.or.len(), 1);
    assert_eq!(plan.options().count(), 2);
    assert_eq!(plan.options().nth(1).unwrap().provides[0].name, "yarn");
  }

  #[test]
  fn top_level_version_moves_into_metadata() {
    let mut require = Require {
      version: "1.2.3".into(),
      ..Require::new("node")
    };
    assert!(require.has_top_level_version());
    assert!(!require.has_doubly_specified_versions());

    require.convert_version_to_metadata();
    assert!(require.version.is_empty());
    assert_eq!(require.metadata.get("version"), Some(&toml::Value::String("1.2.3".into())));
  }

  #[test]
  fn doubly_specified_version_is_detected() {
    let mut require = Require {
      version: "1".into(),
      ..Require::new("node")
    };
    require.metadata.insert("version".into(), toml::Value::String("2".into()));
    assert!(require.has_doubly_specified_versions());
  }

  #[test]
  fn entry_providers_drop_optional_api_and_homepage() {
    let entry = BuildPlanEntry {
      providers: vec![
        GroupElement::new("A", "v1")
          .with_api("0.9")
          .with_homepage("https://a")
          .optional()
          .extension(),
      ],
      requires: vec![Require::new("dep")],
    }
    .no_opt();
    assert_eq!(entry.providers, vec![GroupElement::new("A", "v1").extension()]);
  }

  #[test]
  fn plan_serializes_entries_tables() {
    let plan = Plan {
      entries: vec![BuildPlanEntry {
        providers: vec![GroupElement::new("A", "v1")],
        requires: vec![Require::new("dep")],
      }],
    };
    let text = toml::to_string(&plan).unwrap();
    assert!(text.contains("[[entries.providers]]"));
    assert!(text.contains("[[entries.requires]]"));
    assert_eq!(toml::from_str::<Plan>(&text).unwrap(), plan);
  }
}
