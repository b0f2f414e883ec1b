mod cmd;
mod output;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cairn_lib::detect::DetectError;

use crate::cmd::{CandidatesArgs, DetectArgs, cmd_candidates, cmd_detect};
use crate::output::print_error;

/// Exit code for arguments clap rejects.
const EXIT_INVALID_ARGS: u8 = 3;
/// Exit code for anything without a more specific code.
const EXIT_FAILURE: u8 = 1;

/// cairn - buildpack detection
#[derive(Parser)]
#[command(name = "cairn")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Log level when RUST_LOG is unset (error, warn, info, debug, trace)
  #[arg(long, global = true, default_value = "info")]
  log_level: String,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Find the first group that passes detection and write group.toml and plan.toml
  Detect(DetectArgs),

  /// List the candidate groups detection would try, without running any probe
  Candidates(CandidatesArgs),
}

fn main() -> ExitCode {
  let cli = match Cli::try_parse() {
    Ok(cli) => cli,
    Err(err) => {
      let _ = err.print();
      return if err.use_stderr() {
        ExitCode::from(EXIT_INVALID_ARGS)
      } else {
        ExitCode::SUCCESS
      };
    }
  };

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_target(false)
    .without_time()
    .init();

  let result = match cli.command {
    Commands::Detect(args) => cmd_detect(&args),
    Commands::Candidates(args) => cmd_candidates(&args),
  };

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      print_error(&format!("{:#}", err));
      ExitCode::from(exit_code(&err))
    }
  }
}

fn exit_code(err: &anyhow::Error) -> u8 {
  err
    .chain()
    .find_map(|cause| cause.downcast_ref::<DetectError>())
    .and_then(|err| u8::try_from(err.exit_code()).ok())
    .unwrap_or(EXIT_FAILURE)
}
