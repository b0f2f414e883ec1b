//! Implementation of the `cairn candidates` command.
//!
//! Prints the flattened groups detection would try, in order, without
//! running any probe.

use anyhow::Result;
use clap::Args;

use cairn_lib::module::GroupElement;

use super::LifecycleArgs;
use crate::output::{OutputFormat, describe_element, print_info, print_json, symbols};

#[derive(Args, Debug, Clone)]
pub struct CandidatesArgs {
  #[command(flatten)]
  pub lifecycle: LifecycleArgs,

  /// Output format
  #[arg(long, value_enum, default_value_t)]
  pub format: OutputFormat,
}

pub fn cmd_candidates(args: &CandidatesArgs) -> Result<()> {
  let detector = args.lifecycle.detector()?;

  let mut candidates: Vec<Vec<GroupElement>> = Vec::new();
  for candidate in detector.candidates() {
    candidates.push(candidate?.group());
  }

  if args.format.is_json() {
    return print_json(&candidates);
  }

  if candidates.is_empty() {
    print_info("Order is empty; nothing to detect.");
    return Ok(());
  }
  print_info(&format!("{} candidate group(s)", candidates.len()));
  for (index, group) in candidates.iter().enumerate() {
    println!();
    println!("Candidate {}:", index + 1);
    for element in group {
      println!("  {} {}", symbols::INFO, describe_element(element));
    }
  }

  Ok(())
}
