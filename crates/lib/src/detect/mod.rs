//! Detection: expand the order into candidate groups, probe their modules,
//! and resolve the first candidate whose build plan works out.
//!
//! Candidates are tried strictly one after another in expansion order.
//! Probe outcomes are memoized across candidates, so a module is probed at
//! most once per [`Detector::detect`] call.

pub mod expand;
pub mod resolver;
pub mod runner;
pub mod runs;
pub mod types;

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

pub use expand::{Candidate, CandidateModule, OrderExpander, prepend_extensions};
pub use resolver::{DefaultDetectResolver, DetectResolver, Resolution};
pub use runner::DetectRunner;
pub use runs::DetectRuns;
pub use types::{DetectConfig, DetectError, DetectOutputs, ProbeError};

use crate::api::ApiVerifier;
use crate::execute::DetectExecutor;
use crate::files;
use crate::log::Logger;
use crate::module::{DirStore, Group, Order};
use crate::plan::Plan;

/// The resolved group and plan of a successful detection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectOutcome {
  pub group: Group,
  pub plan: Plan,
}

impl DetectOutcome {
  /// Split resolved elements back into buildpacks and extensions.
  fn from_resolution(resolution: Resolution) -> Self {
    let (extensions, buildpacks): (Vec<_>, Vec<_>) = resolution.group.into_iter().partition(|el| el.extension);
    Self {
      group: Group {
        group: buildpacks,
        group_extensions: extensions.into_iter().map(|el| el.no_extension()).collect(),
      },
      plan: Plan {
        entries: resolution.entries,
      },
    }
  }
}

pub struct Detector {
  order: Order,
  store: Arc<dyn DirStore>,
  runner: DetectRunner,
  resolver: Arc<dyn DetectResolver>,
  runs: DetectRuns,
}

impl Detector {
  /// # Arguments
  ///
  /// * `order` - buildpack groups, tried top to bottom
  /// * `order_ext` - extension groups, prepended to every buildpack group
  pub fn new(
    order: &Order,
    order_ext: &Order,
    store: Arc<dyn DirStore>,
    executor: Arc<dyn DetectExecutor>,
    config: DetectConfig,
    logger: Arc<dyn Logger>,
  ) -> Self {
    Self {
      order: prepend_extensions(order, order_ext),
      store,
      runner: DetectRunner::new(executor, config, logger.clone()),
      resolver: Arc::new(DefaultDetectResolver::new(logger)),
      runs: DetectRuns::new(),
    }
  }

  pub fn with_resolver(mut self, resolver: Arc<dyn DetectResolver>) -> Self {
    self.resolver = resolver;
    self
  }

  /// The merged order, extensions included.
  pub fn order(&self) -> &Order {
    &self.order
  }

  pub fn runs(&self) -> &DetectRuns {
    &self.runs
  }

  pub fn config(&self) -> &DetectConfig {
    self.runner.config()
  }

  /// Candidates in the order detection tries them. Nothing is probed.
  pub fn candidates(&self) -> OrderExpander<'_> {
    OrderExpander::new(&self.order, self.store.as_ref())
  }

  /// Run detection.
  ///
  /// Returns the first candidate that resolves. A failed candidate moves on
  /// to the next one; any other error stops detection immediately.
  pub async fn detect(&self) -> Result<DetectOutcome, DetectError> {
    for (index, candidate) in self.candidates().enumerate() {
      let candidate = candidate?;
      debug!(candidate = index + 1, modules = candidate.len(), "detecting candidate group");

      self.runner.ensure_all(&candidate, &self.runs).await?;

      match self.resolver.resolve(&candidate.group(), &self.runs) {
        Ok(resolution) => {
          info!(
            candidate = index + 1,
            probes = self.runs.len(),
            participating = resolution.group.len(),
            "detection succeeded"
          );
          return Ok(DetectOutcome::from_resolution(resolution));
        }
        Err(DetectError::FailedDetection) => continue,
        Err(err) => return Err(err),
      }
    }
    Err(DetectError::FailedDetection)
  }
}

/// Builds a [`Detector`] from the lifecycle's files.
pub struct DetectorFactory {
  store: Arc<dyn DirStore>,
  executor: Arc<dyn DetectExecutor>,
  verifier: ApiVerifier,
}

impl DetectorFactory {
  pub fn new(store: Arc<dyn DirStore>, executor: Arc<dyn DetectExecutor>, verifier: ApiVerifier) -> Self {
    Self {
      store,
      executor,
      verifier,
    }
  }

  /// Read `order.toml` and `analyzed.toml`, verify every module's API, and
  /// build the detector.
  ///
  /// The run image target comes from `analyzed.toml`. Fields already set in
  /// `config.run_image` override the matching fields read from the file.
  pub fn new_detector(
    &self,
    order_path: &Path,
    analyzed_path: &Path,
    mut config: DetectConfig,
    logger: Arc<dyn Logger>,
  ) -> Result<Detector, DetectError> {
    let order_file = files::read_order(order_path)?;
    let analyzed = files::read_analyzed(analyzed_path)?;
    if let Some(target) = analyzed.run_image_target() {
      config.run_image = target.clone().overlay(&config.run_image);
    }

    let detector = Detector::new(
      &order_file.order,
      &order_file.order_extensions,
      self.store.clone(),
      self.executor.clone(),
      config,
      logger.clone(),
    );
    self.verify_apis(detector.order(), logger.as_ref(), &mut HashSet::new())?;
    Ok(detector)
  }

  /// Check the API of every module reachable from `order`, composites and
  /// extensions included. Each module is checked once.
  pub fn verify_apis(&self, order: &Order, logger: &dyn Logger, seen: &mut HashSet<String>) -> Result<(), DetectError> {
    for group in order {
      for element in &group.group {
        if element.is_extensions_order() {
          self.verify_apis(&element.order_extensions, logger, seen)?;
          continue;
        }
        if !seen.insert(element.key()) {
          continue;
        }

        let descriptor = self.store.lookup(element.kind(), &element.id, &element.version)?;
        self
          .verifier
          .verify(element.kind(), &element.to_string(), &descriptor.api, logger)?;
        if descriptor.is_composite() {
          self.verify_apis(&descriptor.order, logger, seen)?;
        }
      }
    }
    Ok(())
  }
}
