//! The environment detect probes run with.
//!
//! Probes never inherit the full lifecycle environment. Only a small set of
//! variables is kept, then platform and build-config env files are applied.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

/// Variables kept from the lifecycle's own environment as they are.
pub const KEPT_VARS: &[&str] = &[
  "CNB_STACK_ID",
  "HOSTNAME",
  "HOME",
  "HTTPS_PROXY",
  "https_proxy",
  "HTTP_PROXY",
  "http_proxy",
  "NO_PROXY",
  "no_proxy",
];

/// Path-list variables. Kept as well, and platform files prepend to them.
pub const PATH_LIST_VARS: &[&str] = &["PATH", "LD_LIBRARY_PATH", "LIBRARY_PATH", "CPATH", "PKG_CONFIG_PATH"];

#[cfg(windows)]
const PATH_LIST_SEPARATOR: &str = ";";
#[cfg(not(windows))]
const PATH_LIST_SEPARATOR: &str = ":";

/// What an env file without a suffix does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvAction {
  Override,
  Default,
  Prepend,
  Append,
}

impl EnvAction {
  fn from_suffix(suffix: &str) -> Option<Self> {
    match suffix {
      "override" => Some(EnvAction::Override),
      "default" => Some(EnvAction::Default),
      "prepend" => Some(EnvAction::Prepend),
      "append" => Some(EnvAction::Append),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildEnv {
  vars: BTreeMap<String, String>,
}

impl BuildEnv {
  /// Keep only the allowed variables out of `vars`.
  pub fn from_vars<I, K, V>(vars: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    let vars = vars
      .into_iter()
      .map(|(k, v)| (k.into(), v.into()))
      .filter(|(k, _)| KEPT_VARS.contains(&k.as_str()) || PATH_LIST_VARS.contains(&k.as_str()))
      .collect();
    Self { vars }
  }

  pub fn from_process() -> Self {
    Self::from_vars(std::env::vars_os().filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?))))
  }

  pub fn get(&self, key: &str) -> Option<&str> {
    self.vars.get(key).map(String::as_str)
  }

  pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
    self.vars.insert(key.into(), value.into());
  }

  pub fn vars(&self) -> &BTreeMap<String, String> {
    &self.vars
  }

  /// Apply env files from `dir`.
  ///
  /// A file named `NAME.<action>` applies that action; a bare `NAME` applies
  /// `default_action`. `NAME.delim` sets the delimiter for prepend and append.
  /// A missing directory is not an error.
  pub fn add_env_dir(&mut self, dir: &Path, default_action: EnvAction) -> io::Result<()> {
    for (file_name, value) in read_env_files(dir)? {
      let (name, action) = match file_name.split_once('.') {
        Some((name, suffix)) => match EnvAction::from_suffix(suffix) {
          Some(action) => (name.to_string(), action),
          None => continue,
        },
        None => (file_name, default_action),
      };
      let delim = || std::fs::read_to_string(dir.join(format!("{name}.delim"))).unwrap_or_default();
      let current = self.get(&name).unwrap_or_default().to_string();

      let next = match action {
        EnvAction::Override => value,
        EnvAction::Default if !current.is_empty() => continue,
        EnvAction::Default => value,
        EnvAction::Prepend if current.is_empty() => value,
        EnvAction::Prepend => format!("{value}{}{current}", delim()),
        EnvAction::Append if current.is_empty() => value,
        EnvAction::Append => format!("{current}{}{value}", delim()),
      };
      self.set(name, next);
    }
    Ok(())
  }

  /// A copy of this environment with `<platform>/env/*` applied.
  ///
  /// Path-list variables are prepended to, everything else is overridden.
  pub fn with_platform(&self, platform_dir: &Path) -> io::Result<BuildEnv> {
    let mut env = self.clone();
    for (name, value) in read_env_files(&platform_dir.join("env"))? {
      let next = match env.get(&name) {
        Some(current) if PATH_LIST_VARS.contains(&name.as_str()) && !current.is_empty() => {
          format!("{value}{PATH_LIST_SEPARATOR}{current}")
        }
        _ => value,
      };
      env.set(name, next);
    }
    Ok(env)
  }
}

/// `(file name, contents)` for every regular file in `dir`, sorted by name.
fn read_env_files(dir: &Path) -> io::Result<Vec<(String, String)>> {
  let entries = match std::fs::read_dir(dir) {
    Ok(entries) => entries,
    Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
    Err(err) => return Err(err),
  };

  let mut files = Vec::new();
  for entry in entries {
    let entry = entry?;
    if entry.file_type()?.is_dir() {
      continue;
    }
    let Ok(name) = entry.file_name().into_string() else {
      continue;
    };
    let value = std::fs::read_to_string(entry.path())?;
    files.push((name, value));
  }
  files.sort();
  Ok(files)
}
