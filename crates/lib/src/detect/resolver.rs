//! Build plan resolution for one flattened candidate group.
//!
//! Every line written to the logger here is part of the detect transcript.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::Level;

use crate::detect::runs::DetectRuns;
use crate::detect::types::{CODE_DETECT_ERROR, CODE_DETECT_FAIL, CODE_DETECT_PASS, DetectError, DetectOutputs};
use crate::log::Logger;
use crate::module::GroupElement;
use crate::plan::{BuildPlan, BuildPlanEntry, PlanSections, Provide, Require};

/// A resolved candidate: the participating group and its plan entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
  pub group: Vec<GroupElement>,
  pub entries: Vec<BuildPlanEntry>,
}

pub trait DetectResolver: Send + Sync {
  /// Resolve `group` against the recorded probe outcomes.
  ///
  /// Returns [`DetectError::FailedDetection`] when the candidate does not
  /// resolve and [`DetectError::Buildpack`] when a detect run errored.
  ///
  /// A detect error is fatal even for an optional module, which is not
  /// dropped the way a failing optional module is. A target mismatch is not
  /// an error here and follows the skip/fail rules.
  fn resolve(&self, group: &[GroupElement], runs: &DetectRuns) -> Result<Resolution, DetectError>;
}

/// A module that passed detection, with the plan it produced.
struct DetectResult {
  element: GroupElement,
  plan: BuildPlan,
}

impl DetectResult {
  /// Primary sections first, then alternates. A module with alternates is
  /// never dropped as optional.
  fn options(&self) -> Vec<TrialOption> {
    let optional = self.element.optional && self.plan.or.is_empty();
    self
      .plan
      .options()
      .map(|sections| TrialOption {
        element: GroupElement {
          optional,
          ..self.element.clone()
        },
        sections: sections.clone(),
      })
      .collect()
  }
}

/// One module with the plan sections chosen for the current trial.
#[derive(Clone)]
struct TrialOption {
  element: GroupElement,
  sections: PlanSections,
}

#[derive(Default)]
struct DepEntry {
  providers: Vec<GroupElement>,
  requires: Vec<Require>,
  early_requires: Vec<GroupElement>,
  extra_provides: Vec<GroupElement>,
}

/// Dependency names in the order they were first seen.
#[derive(Default)]
struct DepMap {
  names: Vec<String>,
  entries: HashMap<String, DepEntry>,
}

impl DepMap {
  fn new(trial: &[TrialOption]) -> Self {
    let mut deps = DepMap::default();
    for option in trial {
      for provide in &option.sections.provides {
        deps.provide(&option.element, provide);
      }
      for require in &option.sections.requires {
        deps.require(&option.element, require);
      }
    }
    deps
  }

  fn entry(&mut self, name: &str) -> &mut DepEntry {
    if !self.entries.contains_key(name) {
      self.names.push(name.to_string());
    }
    self.entries.entry(name.to_string()).or_default()
  }

  fn provide(&mut self, element: &GroupElement, provide: &Provide) {
    self.entry(&provide.name).extra_provides.push(element.clone());
  }

  /// A require is met by every provide seen so far that no earlier require consumed.
  fn require(&mut self, element: &GroupElement, require: &Require) {
    let entry = self.entry(&require.name);
    let extra = std::mem::take(&mut entry.extra_provides);
    entry.providers.extend(extra);
    if entry.providers.is_empty() {
      entry.early_requires.push(element.clone());
    } else {
      entry.requires.push(require.clone());
    }
  }

  fn iter(&self) -> impl Iterator<Item = (&str, &DepEntry)> {
    self
      .names
      .iter()
      .filter_map(|name| self.entries.get(name).map(|entry| (name.as_str(), entry)))
  }

  fn unmet_requires(&self) -> Vec<(String, GroupElement)> {
    self
      .iter()
      .flat_map(|(name, entry)| entry.early_requires.iter().map(move |el| (name.to_string(), el.clone())))
      .collect()
  }

  fn unmet_provides(&self) -> Vec<(String, GroupElement)> {
    self
      .iter()
      .flat_map(|(name, entry)| entry.extra_provides.iter().map(move |el| (name.to_string(), el.clone())))
      .collect()
  }

  fn into_entries(mut self) -> Vec<BuildPlanEntry> {
    self
      .names
      .iter()
      .filter_map(|name| self.entries.remove(name))
      .map(|entry| {
        BuildPlanEntry {
          providers: entry.providers,
          requires: entry.requires,
        }
        .no_opt()
      })
      .collect()
  }
}

pub struct DefaultDetectResolver {
  logger: Arc<dyn Logger>,
}

impl DefaultDetectResolver {
  pub fn new(logger: Arc<dyn Logger>) -> Self {
    Self { logger }
  }

  fn log_run(&self, element: &GroupElement, run: &DetectOutputs) {
    let level = match run.code {
      CODE_DETECT_PASS | CODE_DETECT_FAIL => Level::DEBUG,
      _ => Level::INFO,
    };
    if !run.output.is_empty() {
      self.logger.log(level, &format!("======== Output: {element} ========"));
      self.logger.log(level, &String::from_utf8_lossy(&run.output));
    }
    if let Some(err) = &run.err {
      self.logger.log(level, &format!("======== Error: {element} ========"));
      self.logger.log(level, &err.to_string());
    }
  }

  /// Try every combination of primary and alternate sections, first module
  /// outermost, until one trial resolves.
  fn run_trials(
    &self,
    results: &[DetectResult],
    prefix: &mut Vec<TrialOption>,
    attempt: &mut usize,
  ) -> Result<(DepMap, Vec<TrialOption>), DetectError> {
    let Some((first, rest)) = results.split_first() else {
      *attempt += 1;
      return self.run_trial(*attempt, prefix.clone());
    };

    let mut last_err = DetectError::FailedDetection;
    for option in first.options() {
      prefix.push(option);
      let outcome = self.run_trials(rest, prefix, attempt);
      prefix.pop();
      match outcome {
        Ok(found) => return Ok(found),
        Err(err) => last_err = err,
      }
    }
    Err(last_err)
  }

  /// Drop optional modules with unmet requires or unused provides until the
  /// trial is stable. Any required module with either fails the trial.
  fn run_trial(&self, attempt: usize, mut trial: Vec<TrialOption>) -> Result<(DepMap, Vec<TrialOption>), DetectError> {
    self.logger.debug(&format!("Resolving plan... (try #{attempt})"));

    loop {
      let deps = DepMap::new(&trial);
      let mut retry = false;

      for (name, element) in deps.unmet_requires() {
        retry = true;
        if !element.optional {
          self.logger.debug(&format!("fail: {element} requires {name}"));
          return Err(DetectError::FailedDetection);
        }
        self.logger.debug(&format!("skip: {element} requires {name}"));
        trial.retain(|option| option.element != element);
      }

      for (name, element) in deps.unmet_provides() {
        retry = true;
        if !element.optional {
          self.logger.debug(&format!("fail: {element} provides unused {name}"));
          return Err(DetectError::FailedDetection);
        }
        self.logger.debug(&format!("skip: {element} provides unused {name}"));
        trial.retain(|option| option.element != element);
      }

      if retry {
        continue;
      }
      if trial.is_empty() {
        self.logger.debug("fail: no viable buildpacks in group");
        return Err(DetectError::FailedDetection);
      }
      return Ok((deps, trial));
    }
  }
}

impl DetectResolver for DefaultDetectResolver {
  fn resolve(&self, group: &[GroupElement], runs: &DetectRuns) -> Result<Resolution, DetectError> {
    let mut group_runs = Vec::with_capacity(group.len());
    for element in group {
      let key = element.key();
      let run = runs.get(&key).ok_or(DetectError::MissingDetection(key))?;
      self.log_run(element, &run);
      group_runs.push(run);
    }

    self.logger.debug("======== Results ========");

    let mut results = Vec::new();
    let mut detected = true;
    let mut any_buildpacks_passed = false;
    let mut buildpack_err = false;
    for (element, run) in group.iter().zip(group_runs) {
      match run.code {
        CODE_DETECT_PASS => {
          self.logger.debug(&format!("pass: {element}"));
          if !element.extension {
            any_buildpacks_passed = true;
          }
          results.push(DetectResult {
            element: element.clone(),
            plan: run.plan,
          });
          continue;
        }
        CODE_DETECT_FAIL if element.optional => self.logger.debug(&format!("skip: {element}")),
        CODE_DETECT_FAIL => self.logger.debug(&format!("fail: {element}")),
        CODE_DETECT_ERROR if run.err.as_ref().is_some_and(|e| e.is_target_mismatch()) => {
          self.logger.info(&format!("err:  {element}"))
        }
        CODE_DETECT_ERROR => {
          self.logger.info(&format!("err:  {element}"));
          buildpack_err = true;
        }
        code => {
          self.logger.info(&format!("err:  {element} ({code})"));
          buildpack_err = true;
        }
      }
      detected = detected && element.optional;
    }

    if buildpack_err {
      return Err(DetectError::Buildpack);
    }
    if !detected {
      return Err(DetectError::FailedDetection);
    }
    if !any_buildpacks_passed {
      self.logger.debug("fail: no viable buildpacks in group");
      return Err(DetectError::FailedDetection);
    }

    let mut attempt = 0;
    let (deps, trial) = self.run_trials(&results, &mut Vec::new(), &mut attempt)?;

    if group.len() != trial.len() {
      self
        .logger
        .info(&format!("{} of {} buildpacks participating", trial.len(), group.len()));
    }
    let width = trial.iter().map(|option| option.element.id.len()).max().unwrap_or(0);
    for option in &trial {
      self
        .logger
        .info(&format!("{:<width$} {}", option.element.id, option.element.version));
    }

    Ok(Resolution {
      group: trial.into_iter().map(|option| option.element.no_opt()).collect(),
      entries: deps.into_entries(),
    })
  }
}
