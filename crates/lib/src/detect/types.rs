//! Types for running detection and resolving build plans.
//!
//! This module defines the per-probe outcome, the errors the engine can
//! return, and the configuration handed to every probe.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::api::ApiError;
use crate::files::FilesError;
use crate::module::StoreError;
use crate::plan::BuildPlan;
use crate::platform::paths;
use crate::platform::target::{RunImageTarget, TargetMetadata};

/// The module participates.
pub const CODE_DETECT_PASS: i32 = 0;
/// The module opts out.
pub const CODE_DETECT_FAIL: i32 = 100;
/// Synthesized when a probe could not run or produced unusable output.
pub const CODE_DETECT_ERROR: i32 = -1;

/// Why a single probe did not produce a usable outcome.
///
/// Stored inside [`DetectOutputs`] and shared between candidates, so it must be
/// cloneable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
  #[error("unable to satisfy target os/arch constraints; run image: {run_image}, buildpack: {module_targets}")]
  TargetMismatch { run_image: String, module_targets: String },

  #[error("failed to run {}: {message}", .path.display())]
  Spawn { path: PathBuf, message: String },

  #[error("detect was terminated by a signal")]
  Signaled,

  #[error("failed to read plan {}: {message}", .path.display())]
  ReadPlan { path: PathBuf, message: String },

  #[error("failed to parse plan {}: {message}", .path.display())]
  ParsePlan { path: PathBuf, message: String },

  #[error("extension {id} outputs \"requires\" which is not allowed")]
  ExtensionRequires { id: String },

  #[error(
    "{module} {id} has a \"version\" key and a \"metadata.version\" which cannot be specified together. \"metadata.version\" should be used instead"
  )]
  DoublySpecifiedVersion { module: &'static str, id: String },

  #[error("failed to prepare detect environment: {0}")]
  Environment(String),
}

impl ProbeError {
  /// Render both sides of a failed target check as compact JSON.
  pub fn target_mismatch(run_image: &RunImageTarget, module_targets: &[TargetMetadata]) -> Self {
    ProbeError::TargetMismatch {
      run_image: serde_json::to_string(run_image).unwrap_or_default(),
      module_targets: serde_json::to_string(module_targets).unwrap_or_default(),
    }
  }

  pub fn is_target_mismatch(&self) -> bool {
    matches!(self, ProbeError::TargetMismatch { .. })
  }
}

/// Everything one detect probe produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectOutputs {
  pub plan: BuildPlan,
  /// Combined stdout and stderr of the probe.
  pub output: Vec<u8>,
  pub code: i32,
  pub err: Option<ProbeError>,
}

impl DetectOutputs {
  pub fn pass(plan: BuildPlan) -> Self {
    Self {
      plan,
      ..Default::default()
    }
  }

  pub fn fail() -> Self {
    Self {
      code: CODE_DETECT_FAIL,
      ..Default::default()
    }
  }

  pub fn error(err: ProbeError) -> Self {
    Self {
      code: CODE_DETECT_ERROR,
      err: Some(err),
      ..Default::default()
    }
  }

  pub fn with_code(mut self, code: i32) -> Self {
    self.code = code;
    self
  }

  pub fn with_output(mut self, output: impl Into<Vec<u8>>) -> Self {
    self.output = output.into();
    self
  }
}

/// Errors returned by the detector.
#[derive(Debug, Error)]
pub enum DetectError {
  /// The candidate did not resolve. Retryable until candidates run out.
  #[error("no buildpacks participating")]
  FailedDetection,

  /// A probe failed unexpectedly. Stops detection.
  #[error("buildpack(s) failed with err")]
  Buildpack,

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error(transparent)]
  Api(#[from] ApiError),

  #[error(transparent)]
  Files(#[from] FilesError),

  /// A composite includes itself, directly or through other composites.
  #[error("{0} includes itself in its order")]
  CyclicOrder(String),

  #[error("missing detection of '{0}'")]
  MissingDetection(String),

  /// A probe task panicked or was cancelled.
  #[error("detect task failed: {0}")]
  Task(String),
}

impl DetectError {
  pub fn exit_code(&self) -> i32 {
    match self {
      DetectError::FailedDetection => 20,
      DetectError::Buildpack => 21,
      DetectError::Api(_) => 12,
      DetectError::Files(_) => 1,
      DetectError::Store(_)
      | DetectError::CyclicOrder(_)
      | DetectError::MissingDetection(_)
      | DetectError::Task(_) => 22,
    }
  }

  pub fn is_failed_detection(&self) -> bool {
    matches!(self, DetectError::FailedDetection)
  }
}

/// Inputs shared by every probe of one detect run.
#[derive(Debug, Clone)]
pub struct DetectConfig {
  /// Working directory of every probe. Never written by the engine.
  pub app_dir: PathBuf,
  pub platform_dir: PathBuf,
  pub build_config_dir: PathBuf,
  pub run_image: RunImageTarget,
  /// Maximum number of probes running at once.
  pub parallelism: usize,
}

impl Default for DetectConfig {
  fn default() -> Self {
    Self {
      app_dir: paths::app_dir(),
      platform_dir: paths::platform_dir(),
      build_config_dir: paths::build_config_dir(),
      run_image: RunImageTarget::default(),
      parallelism: num_cpus(),
    }
  }
}

impl DetectConfig {
  pub fn new(app_dir: &Path, platform_dir: &Path) -> Self {
    Self {
      app_dir: app_dir.to_path_buf(),
      platform_dir: platform_dir.to_path_buf(),
      ..Default::default()
    }
  }
}

fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}
