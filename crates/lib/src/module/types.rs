//! Module identity types shared by orders, groups and resolved plans.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The two kinds of module the detector knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
  Buildpack,
  Extension,
}

impl Kind {
  /// Name of the descriptor file for this kind inside a module directory.
  pub fn descriptor_file(&self) -> &'static str {
    match self {
      Kind::Buildpack => "buildpack.toml",
      Kind::Extension => "extension.toml",
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Kind::Buildpack => "Buildpack",
      Kind::Extension => "Extension",
    }
  }
}

impl fmt::Display for Kind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// One entry of an order or a group.
///
/// Within an order, an element may instead carry `order_extensions`: the
/// extensions order that gets prepended ahead of every buildpack group. Such an
/// element has no id of its own and is expanded like an optional composite.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupElement {
  pub id: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub version: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub api: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub homepage: String,
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub extension: bool,
  #[serde(default, skip_serializing_if = "std::ops::Not::not")]
  pub optional: bool,
  #[serde(skip)]
  pub order_extensions: Order,
}

impl GroupElement {
  pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      version: version.into(),
      ..Default::default()
    }
  }

  pub fn optional(mut self) -> Self {
    self.optional = true;
    self
  }

  pub fn extension(mut self) -> Self {
    self.extension = true;
    self
  }

  pub fn kind(&self) -> Kind {
    if self.extension {
      Kind::Extension
    } else {
      Kind::Buildpack
    }
  }

  /// Stable memo key: `"{Kind} {id}@{version}"`.
  pub fn key(&self) -> String {
    format!("{} {}", self.kind(), self)
  }

  /// True for the synthetic element that holds the extensions order.
  pub fn is_extensions_order(&self) -> bool {
    !self.order_extensions.is_empty()
  }

  pub fn with_api(mut self, api: impl Into<String>) -> Self {
    self.api = api.into();
    self
  }

  pub fn with_homepage(mut self, homepage: impl Into<String>) -> Self {
    self.homepage = homepage.into();
    self
  }

  pub fn no_opt(mut self) -> Self {
    self.optional = false;
    self
  }

  pub fn no_api(mut self) -> Self {
    self.api.clear();
    self
  }

  pub fn no_homepage(mut self) -> Self {
    self.homepage.clear();
    self
  }

  pub fn no_extension(mut self) -> Self {
    self.extension = false;
    self
  }
}

impl fmt::Display for GroupElement {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}@{}", self.id, self.version)
  }
}

/// An ordered candidate list of buildpacks plus the extensions that precede them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
  #[serde(default)]
  pub group: Vec<GroupElement>,
  #[serde(default, rename = "group-extensions", skip_serializing_if = "Vec::is_empty")]
  pub group_extensions: Vec<GroupElement>,
}

impl Group {
  pub fn new(group: Vec<GroupElement>) -> Self {
    Self {
      group,
      group_extensions: Vec::new(),
    }
  }
}

/// Groups tried top to bottom until one resolves.
pub type Order = Vec<Group>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn key_includes_kind() {
    assert_eq!(GroupElement::new("A", "v1").key(), "Buildpack A@v1");
    assert_eq!(GroupElement::new("B", "v1").extension().key(), "Extension B@v1");
  }

  #[test]
  fn strip_helpers_only_touch_their_field() {
    let el = GroupElement::new("A", "v1")
      .with_api("0.9")
      .with_homepage("https://example.com")
      .optional()
      .extension();

    let stripped = el.clone().no_opt().no_api().no_homepage();
    assert!(!stripped.optional);
    assert!(stripped.api.is_empty());
    assert!(stripped.homepage.is_empty());
    assert!(stripped.extension);
    assert!(!el.clone().no_extension().extension);
  }

  #[test]
  fn group_serializes_extensions_under_dashed_key() {
    let group = Group {
      group: vec![GroupElement::new("A", "v1").with_api("0.9")],
      group_extensions: vec![GroupElement::new("X", "v2")],
    };
    let text = toml::to_string(&group).unwrap();
    assert!(text.contains("[[group-extensions]]"));
    assert!(!text.contains("optional"));

    let parsed: Group = toml::from_str(&text).unwrap();
    assert_eq!(parsed, group);
  }
}
