//! Running detect probes.
//!
//! [`DetectExecutor`] is the process boundary of the engine. The default
//! implementation, [`ProcessExecutor`], runs `bin/detect` as a subprocess.

pub mod env;
pub mod process;

use async_trait::async_trait;

pub use env::{BuildEnv, EnvAction};
pub use process::ProcessExecutor;

use crate::detect::types::{CODE_DETECT_ERROR, CODE_DETECT_PASS, DetectConfig, DetectOutputs, ProbeError};
use crate::log::Logger;
use crate::module::{Kind, ModuleDescriptor};
use crate::plan::Require;

/// Runs one module's detect probe.
///
/// Failures are reported through the returned outputs (`code` and `err`),
/// never as a separate error, so they can be memoized like any other outcome.
#[async_trait]
pub trait DetectExecutor: Send + Sync {
  async fn detect(&self, descriptor: &ModuleDescriptor, config: &DetectConfig, logger: &dyn Logger) -> DetectOutputs;
}

/// Check a passing probe's plan and normalize deprecated fields.
///
/// - a require with both `version` and `metadata.version` is an error
/// - a top-level `version` is moved into `metadata.version` with a warning
/// - extensions may not output requires at all
pub fn validate_plan(descriptor: &ModuleDescriptor, mut outputs: DetectOutputs, logger: &dyn Logger) -> DetectOutputs {
  if outputs.code != CODE_DETECT_PASS {
    return outputs;
  }
  let module = match descriptor.kind {
    Kind::Buildpack => "buildpack",
    Kind::Extension => "extension",
  };
  let id = &descriptor.info.id;
  let all_requires: Vec<Require> = outputs
    .plan
    .options()
    .flat_map(|s| s.requires.iter().cloned())
    .collect();
  if all_requires.iter().any(Require::has_doubly_specified_versions) {
    outputs.code = CODE_DETECT_ERROR;
    outputs.err = Some(ProbeError::DoublySpecifiedVersion {
      module,
      id: id.clone(),
    });
  } else if all_requires.iter().any(Require::has_top_level_version) {
    logger.warn(&format!(
      "{module} {id} has a \"version\" key. This key is deprecated in build plan requirements in buildpack API 0.3. \"metadata.version\" should be used instead"
    ));
    for sections in outputs.plan.sections_mut() {
      sections.requires.iter_mut().for_each(Require::convert_version_to_metadata);
    }
  }

  if descriptor.kind == Kind::Extension && !all_requires.is_empty() {
    outputs.code = CODE_DETECT_ERROR;
    outputs.err = Some(ProbeError::ExtensionRequires { id: id.clone() });
  }
  outputs
}
