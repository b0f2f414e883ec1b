//! Subprocess detect executor.
//!
//! Runs `<module>/bin/detect <platform dir> <plan path>` from the app
//! directory. stdout and stderr share one capture file so their interleaving
//! is kept in the recorded output.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::api::ApiVersion;
use crate::detect::types::{CODE_DETECT_PASS, DetectConfig, DetectOutputs, ProbeError};
use crate::execute::env::{BuildEnv, EnvAction};
use crate::execute::{DetectExecutor, validate_plan};
use crate::log::Logger;
use crate::module::{Kind, ModuleDescriptor};
use crate::plan::BuildPlan;

pub const ENV_BUILDPACK_DIR: &str = "CNB_BUILDPACK_DIR";
pub const ENV_PLATFORM_DIR: &str = "CNB_PLATFORM_DIR";
pub const ENV_BUILD_PLAN_PATH: &str = "CNB_BUILD_PLAN_PATH";

/// First API that receives the platform dir and plan path through the environment.
const PATHS_IN_ENV_API: ApiVersion = ApiVersion::new(0, 8);
/// First API that receives `CNB_TARGET_*`.
const TARGET_ENV_API: ApiVersion = ApiVersion::new(0, 10);

pub struct ProcessExecutor {
  env: BuildEnv,
}

impl ProcessExecutor {
  /// # Arguments
  ///
  /// * `env` - base environment of every probe, before platform env files
  pub fn new(env: BuildEnv) -> Self {
    Self { env }
  }

  async fn detect_buildpack(&self, descriptor: &ModuleDescriptor, config: &DetectConfig) -> DetectOutputs {
    let scratch = match tempfile::Builder::new().prefix("plan.").tempdir() {
      Ok(dir) => dir,
      Err(err) => return DetectOutputs::error(ProbeError::Environment(err.to_string())),
    };
    self.run_and_read_plan(descriptor, config, scratch.path()).await
  }

  async fn detect_extension(&self, descriptor: &ModuleDescriptor, config: &DetectConfig) -> DetectOutputs {
    let detect_path = descriptor.root_dir.join("bin").join("detect");
    if tokio::fs::try_exists(&detect_path).await.unwrap_or(false) {
      return self.detect_buildpack(descriptor, config).await;
    }

    // Without bin/detect the extension root holds pre-populated output.
    let plan_path = descriptor.root_dir.join("detect").join("plan.toml");
    match tokio::fs::read_to_string(&plan_path).await {
      Ok(text) => match toml::from_str::<BuildPlan>(&text) {
        Ok(plan) => DetectOutputs::pass(plan),
        Err(err) => DetectOutputs::error(ProbeError::ParsePlan {
          path: plan_path,
          message: err.to_string(),
        }),
      },
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => DetectOutputs::pass(BuildPlan::default()),
      Err(err) => DetectOutputs::error(ProbeError::ReadPlan {
        path: plan_path,
        message: err.to_string(),
      }),
    }
  }

  async fn run_and_read_plan(&self, descriptor: &ModuleDescriptor, config: &DetectConfig, scratch: &Path) -> DetectOutputs {
    let plan_path = scratch.join("plan.toml");
    if let Err(err) = tokio::fs::write(&plan_path, "").await {
      return DetectOutputs::error(ProbeError::Environment(err.to_string()));
    }

    let result = self.run_detect(descriptor, config, &plan_path, scratch).await;
    if result.code != CODE_DETECT_PASS {
      return result;
    }

    let text = match tokio::fs::read_to_string(&plan_path).await {
      Ok(text) => text,
      Err(err) => {
        return DetectOutputs::error(ProbeError::ReadPlan {
          path: plan_path,
          message: err.to_string(),
        })
        .with_output(result.output);
      }
    };
    match toml::from_str::<BuildPlan>(&text) {
      Ok(plan) => DetectOutputs { plan, ..result },
      Err(err) => DetectOutputs::error(ProbeError::ParsePlan {
        path: plan_path,
        message: err.to_string(),
      })
      .with_output(result.output),
    }
  }

  /// Base env, then platform env files unless the module clears them, then
  /// build-config env files.
  fn probe_env(&self, descriptor: &ModuleDescriptor, platform_dir: &Path, config: &DetectConfig) -> std::io::Result<BuildEnv> {
    let mut env = if descriptor.info.clear_env {
      self.env.clone()
    } else {
      self.env.with_platform(platform_dir)?
    };
    env.add_env_dir(&config.build_config_dir.join("env"), EnvAction::Override)?;
    Ok(env)
  }

  async fn run_detect(
    &self,
    descriptor: &ModuleDescriptor,
    config: &DetectConfig,
    plan_path: &Path,
    scratch: &Path,
  ) -> DetectOutputs {
    let detect_path = descriptor.root_dir.join("bin").join("detect");
    let app_dir = absolute(&config.app_dir);
    let platform_dir = absolute(&config.platform_dir);

    let env = match self.probe_env(descriptor, &platform_dir, config) {
      Ok(env) => env,
      Err(err) => return DetectOutputs::error(ProbeError::Environment(err.to_string())),
    };

    let capture_path = scratch.join("detect.log");
    let stdio = std::fs::File::create(&capture_path).and_then(|file| Ok((file.try_clone()?, file)));
    let (stdout, stderr) = match stdio {
      Ok(files) => files,
      Err(err) => return DetectOutputs::error(ProbeError::Environment(err.to_string())),
    };

    // Unparseable APIs are rejected before detection, so treat them as current.
    let api = descriptor.api.parse::<ApiVersion>().ok();
    let at_least = |min: ApiVersion| api.is_none_or(|v| v.at_least(min));

    let mut command = Command::new(&detect_path);
    command
      .arg(&platform_dir)
      .arg(plan_path)
      .current_dir(&app_dir)
      .env_clear()
      .envs(env.vars())
      .env(ENV_BUILDPACK_DIR, &descriptor.root_dir)
      .stdin(Stdio::null())
      .stdout(Stdio::from(stdout))
      .stderr(Stdio::from(stderr));
    if at_least(PATHS_IN_ENV_API) {
      command
        .env(ENV_PLATFORM_DIR, &platform_dir)
        .env(ENV_BUILD_PLAN_PATH, plan_path);
    }
    if at_least(TARGET_ENV_API) {
      command.envs(config.run_image.env_vars());
    }

    debug!(detect = %detect_path.display(), app_dir = %app_dir.display(), "spawning detect");
    let status = command.status().await;
    let output = tokio::fs::read(&capture_path).await.unwrap_or_default();

    match status {
      Ok(status) => match status.code() {
        Some(code) => DetectOutputs::default().with_code(code).with_output(output),
        None => DetectOutputs::error(ProbeError::Signaled).with_output(output),
      },
      Err(err) => DetectOutputs::error(ProbeError::Spawn {
        path: detect_path,
        message: err.to_string(),
      })
      .with_output(output),
    }
  }
}

fn absolute(path: &Path) -> PathBuf {
  std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[async_trait]
impl DetectExecutor for ProcessExecutor {
  async fn detect(&self, descriptor: &ModuleDescriptor, config: &DetectConfig, logger: &dyn Logger) -> DetectOutputs {
    let outputs = match descriptor.kind {
      Kind::Buildpack => self.detect_buildpack(descriptor, config).await,
      Kind::Extension => self.detect_extension(descriptor, config).await,
    };
    debug!(module = %descriptor.key(), code = outputs.code, "detect finished");
    validate_plan(descriptor, outputs, logger)
  }
}
