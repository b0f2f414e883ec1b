//! Implementation of the `cairn detect` command.
//!
//! Runs detection over the order and writes the winning group and its build
//! plan for the build phase.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use cairn_lib::files;
use cairn_lib::platform::paths;

use super::LifecycleArgs;
use crate::output::{OutputFormat, describe_element, print_info, print_json, print_stat, print_success, symbols};

#[derive(Args, Debug, Clone)]
pub struct DetectArgs {
  #[command(flatten)]
  pub lifecycle: LifecycleArgs,

  /// Where to write group.toml (default: <layers>/group.toml)
  #[arg(long)]
  pub group: Option<PathBuf>,

  /// Where to write plan.toml (default: <layers>/plan.toml)
  #[arg(long)]
  pub plan: Option<PathBuf>,

  /// Output format
  #[arg(long, value_enum, default_value_t)]
  pub format: OutputFormat,
}

pub fn cmd_detect(args: &DetectArgs) -> Result<()> {
  let layers = args.lifecycle.layers_dir();
  let group_path = args.group.clone().unwrap_or_else(|| paths::group_path(&layers));
  let plan_path = args.plan.clone().unwrap_or_else(|| paths::plan_path(&layers));

  let detector = args.lifecycle.detector()?;
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let outcome = rt.block_on(detector.detect())?;

  files::write_group(&group_path, &outcome.group)
    .with_context(|| format!("Failed to write group: {}", group_path.display()))?;
  files::write_plan(&plan_path, &outcome.plan)
    .with_context(|| format!("Failed to write plan: {}", plan_path.display()))?;

  if args.format.is_json() {
    let json_output = serde_json::json!({
      "group": outcome.group,
      "plan": outcome.plan,
      "group_path": group_path,
      "plan_path": plan_path,
      "probes": detector.runs().len(),
    });
    return print_json(&json_output);
  }

  print_success(&format!(
    "Detected {} buildpack(s) and {} extension(s)",
    outcome.group.group.len(),
    outcome.group.group_extensions.len()
  ));
  for element in outcome.group.group_extensions.iter().chain(&outcome.group.group) {
    println!("  {} {}", symbols::ARROW, describe_element(element));
  }
  println!();
  print_stat("Plan entries", &outcome.plan.entries.len().to_string());
  print_stat("Probes run", &detector.runs().len().to_string());
  print_info(&format!("Group written to {}", group_path.display()));
  print_info(&format!("Plan written to {}", plan_path.display()));

  Ok(())
}
