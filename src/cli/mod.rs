//! CLI command definitions

use crate::runner::{RunResult, RunStatus};
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Run finished successfully.
pub const EXIT_SUCCESS: i32 = 0;

/// Validation, configuration, or agent failure.
pub const EXIT_FAILURE: i32 = 1;

/// The agent did not finish before the deadline.
pub const EXIT_TIMEOUT: i32 = 2;

/// Interrupted by the user (SIGINT).
pub const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser)]
#[command(name = "easel")]
#[command(about = "Run a coding agent once, under a deadline", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute one agent run
    Run {
        /// Model identifier, e.g. openai/gpt-4
        model: String,

        /// Agent mode (code, ask, architect, plan, debug)
        mode: String,

        /// Instruction for the agent
        message: String,

        /// Workspace directory (defaults to $EASEL_HOME/workspace)
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Deadline in seconds
        #[arg(short, long)]
        timeout: Option<String>,

        /// Show agent steps and output as they happen
        #[arg(short, long)]
        verbose: bool,

        /// Also write the result as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List the accepted agent modes
    Modes,
}

/// Process exit code for a finished run
pub fn exit_code(result: &RunResult) -> i32 {
    match result.status {
        RunStatus::Success => EXIT_SUCCESS,
        RunStatus::Timeout => EXIT_TIMEOUT,
        RunStatus::Failed if result.error_kind() == Some("cancelled") => EXIT_INTERRUPTED,
        RunStatus::Failed => EXIT_FAILURE,
    }
}

/// Human-readable summary of a finished run.
///
/// With `streamed`, the output was already shown chunk by chunk and is not
/// repeated.
pub fn print_result(
    out: &mut impl Write,
    err: &mut impl Write,
    result: &RunResult,
    streamed: bool,
) -> io::Result<()> {
    if result.is_success() {
        if let Some(output) = result.output.as_deref().filter(|_| !streamed) {
            writeln!(out, "{}", output)?;
            writeln!(out)?;
        }
        writeln!(out, "Completed in {:.1}s", result.elapsed_seconds)?;
        return Ok(());
    }

    writeln!(err, "Run {} after {:.1}s", result.status, result.elapsed_seconds)?;
    if let Some(failure) = &result.error {
        writeln!(err, "  {}: {}", failure.kind, failure.message)?;
    }
    Ok(())
}

pub fn save_result(path: &Path, result: &RunResult) -> crate::Result<()> {
    let json = serde_json::to_string_pretty(result)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Save the result if asked to, then pick the exit code.
///
/// A failed save is reported but never replaces the run's own exit code.
pub fn finish(result: &RunResult, output: Option<&Path>) -> i32 {
    if let Some(path) = output {
        match save_result(path, result) {
            Ok(()) => tracing::info!("Result written to {}", path.display()),
            Err(e) => {
                tracing::error!("Failed to write result to {}: {}", path.display(), e);
                eprintln!("Warning: could not write {}: {}", path.display(), e);
            }
        }
    }
    exit_code(result)
}
