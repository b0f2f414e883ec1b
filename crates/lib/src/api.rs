//! Buildpack API versions and the check run against every module before detection.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::log::Logger;
use crate::module::Kind;

pub const ENV_DEPRECATION_MODE: &str = "CNB_DEPRECATION_MODE";

/// A `major.minor` buildpack API version. `v` prefixes and a missing minor are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ApiVersion {
  pub major: u64,
  pub minor: u64,
}

impl ApiVersion {
  pub const fn new(major: u64, minor: u64) -> Self {
    Self { major, minor }
  }

  pub fn at_least(&self, other: ApiVersion) -> bool {
    *self >= other
  }

  /// Whether a lifecycle supporting `supported` can run a module asking for `self`.
  ///
  /// Pre-1.0 versions must match exactly; from 1.0 on, lower minors of the same
  /// major are compatible.
  pub fn is_compatible_with(&self, supported: ApiVersion) -> bool {
    if supported.major == 0 {
      return *self == supported;
    }
    self.major == supported.major && self.minor <= supported.minor
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid API version '{0}'")]
pub struct ParseApiVersionError(String);

impl FromStr for ApiVersion {
  type Err = ParseApiVersionError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let invalid = || ParseApiVersionError(s.to_string());
    let trimmed = s.strip_prefix('v').unwrap_or(s);
    let (major, minor) = trimmed.split_once('.').unwrap_or((trimmed, ""));
    let major = major.parse().map_err(|_| invalid())?;
    let minor = if minor.is_empty() {
      0
    } else {
      minor.parse().map_err(|_| invalid())?
    };
    Ok(Self { major, minor })
  }
}

impl fmt::Display for ApiVersion {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}.{}", self.major, self.minor)
  }
}

/// The buildpack APIs this lifecycle supports, and which of those are deprecated.
#[derive(Debug, Clone)]
pub struct ApiSet {
  pub supported: Vec<ApiVersion>,
  pub deprecated: Vec<ApiVersion>,
}

impl ApiSet {
  pub fn buildpack() -> Self {
    Self {
      supported: (7..=11).map(|minor| ApiVersion::new(0, minor)).collect(),
      deprecated: vec![ApiVersion::new(0, 7)],
    }
  }

  pub fn is_supported(&self, version: ApiVersion) -> bool {
    self.supported.iter().any(|s| version.is_compatible_with(*s))
  }

  pub fn is_deprecated(&self, version: ApiVersion) -> bool {
    self.deprecated.iter().any(|d| version.is_compatible_with(*d))
  }

  pub fn latest(&self) -> Option<ApiVersion> {
    self.supported.iter().max().copied()
  }
}

/// How requests for deprecated APIs are reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeprecationMode {
  Quiet,
  #[default]
  Warn,
  Error,
}

impl DeprecationMode {
  /// Reads `CNB_DEPRECATION_MODE`. Unknown values fall back to `warn`.
  pub fn from_env() -> Self {
    match std::env::var(ENV_DEPRECATION_MODE).as_deref() {
      Ok("quiet") => DeprecationMode::Quiet,
      Ok("error") => DeprecationMode::Error,
      _ => DeprecationMode::Warn,
    }
  }
}

#[derive(Debug, Error)]
pub enum ApiError {
  #[error("parse buildpack API '{value}' for {kind} '{name}'")]
  Parse { kind: &'static str, name: String, value: String },

  #[error("set API for {kind} '{name}': buildpack API version '{version}' is incompatible with the lifecycle")]
  Incompatible {
    kind: &'static str,
    name: String,
    version: String,
  },
}

fn kind_name(kind: Kind) -> &'static str {
  match kind {
    Kind::Buildpack => "buildpack",
    Kind::Extension => "extension",
  }
}

/// Checks a module's requested API against an [`ApiSet`].
#[derive(Debug, Clone)]
pub struct ApiVerifier {
  apis: ApiSet,
  mode: DeprecationMode,
}

impl Default for ApiVerifier {
  fn default() -> Self {
    Self::new(ApiSet::buildpack(), DeprecationMode::from_env())
  }
}

impl ApiVerifier {
  pub fn new(apis: ApiSet, mode: DeprecationMode) -> Self {
    Self { apis, mode }
  }

  /// # Arguments
  ///
  /// * `kind` - Buildpack or extension
  /// * `name` - `id@version`, used in messages
  /// * `requested` - the `api` from the module descriptor
  pub fn verify(&self, kind: Kind, name: &str, requested: &str, logger: &dyn Logger) -> Result<(), ApiError> {
    let kind = kind_name(kind);
    let version: ApiVersion = requested.parse().map_err(|_| ApiError::Parse {
      kind,
      name: name.to_string(),
      value: requested.to_string(),
    })?;
    let incompatible = || ApiError::Incompatible {
      kind,
      name: name.to_string(),
      version: requested.to_string(),
    };

    if !self.apis.is_supported(version) {
      return Err(incompatible());
    }
    if self.apis.is_deprecated(version) {
      let message = format!("{kind} '{name}' requests deprecated API '{requested}'");
      match self.mode {
        DeprecationMode::Quiet => {}
        DeprecationMode::Warn => logger.warn(&message),
        DeprecationMode::Error => {
          logger.error(&message);
          logger.error(&format!("Deprecated APIs are disabled by {ENV_DEPRECATION_MODE}=error"));
          return Err(incompatible());
        }
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::log::RecordingLogger;
  use serial_test::serial;

  #[test]
  fn parses_short_and_prefixed_versions() {
    assert_eq!("0.10".parse::<ApiVersion>().unwrap(), ApiVersion::new(0, 10));
    assert_eq!("v1".parse::<ApiVersion>().unwrap(), ApiVersion::new(1, 0));
    assert!("0.x".parse::<ApiVersion>().is_err());
    assert!("".parse::<ApiVersion>().is_err());
  }

  #[test]
  fn ordering_is_numeric() {
    assert!(ApiVersion::new(0, 10).at_least(ApiVersion::new(0, 9)));
    assert!(!ApiVersion::new(0, 7).at_least(ApiVersion::new(0, 8)));
  }

  #[test]
  fn supported_range() {
    let apis = ApiSet::buildpack();
    assert!(apis.is_supported(ApiVersion::new(0, 7)));
    assert!(apis.is_supported(ApiVersion::new(0, 11)));
    assert!(!apis.is_supported(ApiVersion::new(0, 6)));
    assert!(!apis.is_supported(ApiVersion::new(1, 0)));
    assert_eq!(apis.latest(), Some(ApiVersion::new(0, 11)));
  }

  #[test]
  fn unsupported_api_is_incompatible() {
    let verifier = ApiVerifier::new(ApiSet::buildpack(), DeprecationMode::Warn);
    let err = verifier
      .verify(Kind::Buildpack, "A@v1", "0.2", &RecordingLogger::default())
      .unwrap_err();
    assert_eq!(
      err.to_string(),
      "set API for buildpack 'A@v1': buildpack API version '0.2' is incompatible with the lifecycle"
    );
  }

  #[test]
  fn deprecated_api_warns_by_default() {
    let logger = RecordingLogger::default();
    let verifier = ApiVerifier::new(ApiSet::buildpack(), DeprecationMode::Warn);
    verifier.verify(Kind::Extension, "X@v1", "0.7", &logger).unwrap();
    assert_eq!(logger.all_logs(), "extension 'X@v1' requests deprecated API '0.7'\n");
  }

  #[test]
  fn deprecated_api_fails_in_error_mode() {
    let logger = RecordingLogger::default();
    let verifier = ApiVerifier::new(ApiSet::buildpack(), DeprecationMode::Error);
    assert!(matches!(
      verifier.verify(Kind::Buildpack, "A@v1", "0.7", &logger),
      Err(ApiError::Incompatible { .. })
    ));
    assert!(logger.all_logs().contains("Deprecated APIs are disabled"));
  }

  #[test]
  #[serial]
  fn deprecation_mode_reads_env() {
    temp_env::with_var(ENV_DEPRECATION_MODE, Some("quiet"), || {
      assert_eq!(DeprecationMode::from_env(), DeprecationMode::Quiet);
    });
    temp_env::with_var(ENV_DEPRECATION_MODE, Some("bogus"), || {
      assert_eq!(DeprecationMode::from_env(), DeprecationMode::Warn);
    });
  }
}
