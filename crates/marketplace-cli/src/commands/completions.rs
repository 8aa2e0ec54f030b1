//! Shell completion generation.

use anyhow::Result;
use clap::Command;
use clap_complete::{Shell, generate};
use marketplace_core::cli::ExitCode;
use std::io::Write;

/// Writes the completion script for `shell` to `out`.
///
/// # Examples
///
/// ```
/// use clap::Command;
/// use clap_complete::Shell;
/// use marketplace_cli::commands::completions;
///
/// let mut cmd = Command::new("marketplace");
/// let mut script = Vec::new();
/// completions::write_completions(Shell::Bash, &mut cmd, &mut script);
/// assert!(!script.is_empty());
/// ```
pub fn write_completions(shell: Shell, cmd: &mut Command, out: &mut dyn Write) {
    let name = cmd.get_name().to_string();
    generate(shell, cmd, name, out);
}

/// Prints the completion script for `shell` to stdout.
pub async fn run(shell: Shell, cmd: &mut Command) -> Result<ExitCode> {
    tracing::debug!(%shell, "generating completions");
    write_completions(shell, cmd, &mut std::io::stdout());
    Ok(ExitCode::SUCCESS)
}
