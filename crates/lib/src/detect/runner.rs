//! Runs detect probes at most once per module and records the outcome.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::detect::expand::{Candidate, CandidateModule};
use crate::detect::runs::DetectRuns;
use crate::detect::types::{DetectConfig, DetectError, DetectOutputs, ProbeError};
use crate::execute::DetectExecutor;
use crate::log::Logger;
use crate::platform::target::satisfies;

/// Cheap to clone; every field is shared.
#[derive(Clone)]
pub struct DetectRunner {
  executor: Arc<dyn DetectExecutor>,
  config: Arc<DetectConfig>,
  semaphore: Arc<Semaphore>,
  logger: Arc<dyn Logger>,
}

impl DetectRunner {
  pub fn new(executor: Arc<dyn DetectExecutor>, config: DetectConfig, logger: Arc<dyn Logger>) -> Self {
    let semaphore = Arc::new(Semaphore::new(config.parallelism.max(1)));
    Self {
      executor,
      config: Arc::new(config),
      semaphore,
      logger,
    }
  }

  pub fn config(&self) -> &DetectConfig {
    &self.config
  }

  /// Make sure `runs` holds an outcome for `module` and return it.
  ///
  /// A memoized outcome is returned as is. A module whose targets do not fit
  /// the run image gets a synthesized `-1` outcome without running its probe.
  pub async fn ensure(&self, module: &CandidateModule, runs: &DetectRuns) -> DetectOutputs {
    let key = module.element.key();
    if let Some(found) = runs.get(&key) {
      debug!(module = %key, "detect outcome already recorded");
      return found;
    }

    let descriptor = &module.descriptor;
    if !satisfies(&descriptor.targets, &self.config.run_image) {
      debug!(module = %key, "run image target not supported");
      let err = ProbeError::target_mismatch(&self.config.run_image, &descriptor.targets);
      return runs.insert(key, DetectOutputs::error(err));
    }

    let Ok(_permit) = self.semaphore.acquire().await else {
      let err = ProbeError::Environment("detect scheduler closed".to_string());
      return runs.insert(key, DetectOutputs::error(err));
    };
    let outputs = self.executor.detect(descriptor, &self.config, self.logger.as_ref()).await;
    runs.insert(key, outputs)
  }

  /// Probe every module of `candidate` that has no recorded outcome yet.
  ///
  /// Probes run concurrently; this returns once all of them have finished.
  pub async fn ensure_all(&self, candidate: &Candidate, runs: &DetectRuns) -> Result<(), DetectError> {
    let mut join_set = JoinSet::new();

    for module in &candidate.modules {
      if runs.contains(&module.element.key()) {
        continue;
      }
      let runner = self.clone();
      let module = module.clone();
      let runs = runs.clone();
      join_set.spawn(async move {
        runner.ensure(&module, &runs).await;
      });
    }

    collect_join_results(join_set).await
  }
}

/// Wait for every task, then report the first one that panicked or was cancelled.
async fn collect_join_results(mut join_set: JoinSet<()>) -> Result<(), DetectError> {
  let mut first_err = None;

  while let Some(join_result) = join_set.join_next().await {
    if let Err(e) = join_result {
      error!(error = %e, "detect task failed");
      first_err.get_or_insert(DetectError::Task(e.to_string()));
    }
  }

  match first_err {
    Some(err) => Err(err),
    None => Ok(()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detect::expand::OrderExpander;
  use crate::log::RecordingLogger;
  use crate::module::{Group, GroupElement, Kind, ModuleDescriptor};
  use crate::platform::target::{RunImageTarget, TargetMetadata};
  use crate::util::testutil::{MemoryStore, RecordingExecutor};

  fn runner(executor: Arc<RecordingExecutor>, run_image: RunImageTarget) -> DetectRunner {
    let config = DetectConfig {
      run_image,
      parallelism: 2,
      ..DetectConfig::default()
    };
    DetectRunner::new(executor, config, Arc::new(RecordingLogger::default()))
  }

  fn candidate(store: &MemoryStore, group: Vec<GroupElement>) -> Candidate {
    let order = vec![Group::new(group)];
    OrderExpander::new(&order, store).next().unwrap().unwrap()
  }

  #[tokio::test]
  async fn each_module_is_probed_once() {
    let store = MemoryStore::new().with_buildpacks(&[("A", "v1"), ("B", "v1"), ("C", "v1")]);
    let executor = Arc::new(RecordingExecutor::new().with_outcome("Buildpack B@v1", DetectOutputs::fail()));
    let runner = runner(executor.clone(), RunImageTarget::default());
    let runs = DetectRuns::new();

    let first = candidate(&store, vec![GroupElement::new("A", "v1"), GroupElement::new("B", "v1")]);
    let second = candidate(&store, vec![GroupElement::new("B", "v1"), GroupElement::new("C", "v1")]);
    runner.ensure_all(&first, &runs).await.unwrap();
    runner.ensure_all(&second, &runs).await.unwrap();
    runner.ensure_all(&first, &runs).await.unwrap();

    assert_eq!(executor.calls("Buildpack A@v1"), 1);
    assert_eq!(executor.calls("Buildpack B@v1"), 1);
    assert_eq!(executor.calls("Buildpack C@v1"), 1);
    assert_eq!(runs.get("Buildpack B@v1").unwrap().code, 100);
    assert_eq!(runs.len(), 3);
  }

  #[tokio::test]
  async fn memoized_outcome_is_returned_unchanged() {
    let store = MemoryStore::new().with_buildpacks(&[("A", "v1")]);
    let executor = Arc::new(RecordingExecutor::new());
    let runner = runner(executor.clone(), RunImageTarget::default());
    let runs = DetectRuns::new();
    runs.insert("Buildpack A@v1".into(), DetectOutputs::fail().with_output("cached"));

    let module = &candidate(&store, vec![GroupElement::new("A", "v1")]).modules[0];
    let outputs = runner.ensure(module, &runs).await;

    assert_eq!(outputs.output, b"cached");
    assert_eq!(executor.total_calls(), 0);
  }

  #[tokio::test]
  async fn target_mismatch_skips_the_probe() {
    let store = MemoryStore::new().with_buildpack(
      ModuleDescriptor::new(Kind::Buildpack, "A", "v1").with_targets(vec![TargetMetadata::new("Win95", "P6")]),
    );
    let executor = Arc::new(RecordingExecutor::new());
    let runner = runner(executor.clone(), RunImageTarget::new("MacOS", "ARM64"));
    let runs = DetectRuns::new();

    let module = &candidate(&store, vec![GroupElement::new("A", "v1")]).modules[0];
    let outputs = runner.ensure(module, &runs).await;

    assert_eq!(outputs.code, -1);
    let message = outputs.err.unwrap().to_string();
    assert!(message.contains(r#"run image: {"os":"MacOS","arch":"ARM64"}"#));
    assert!(message.contains(r#"buildpack: [{"os":"Win95","arch":"P6"}]"#));
    assert_eq!(executor.total_calls(), 0);
  }

  #[tokio::test]
  async fn wildcard_module_target_runs_the_probe() {
    let store = MemoryStore::new().with_buildpack(
      ModuleDescriptor::new(Kind::Buildpack, "A", "v1").with_targets(vec![TargetMetadata::default()]),
    );
    let executor = Arc::new(RecordingExecutor::new());
    let runner = runner(executor.clone(), RunImageTarget::new("MacOS", "ARM64"));

    let module = &candidate(&store, vec![GroupElement::new("A", "v1")]).modules[0];
    let outputs = runner.ensure(module, &DetectRuns::new()).await;

    assert_eq!(outputs.code, 0);
    assert_eq!(executor.calls("Buildpack A@v1"), 1);
  }
}
