use anyhow::Result;
use clap::Args;
use clap_complete::{Shell, generate};

/// Arguments for `nag completions`.
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate the script for.
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Write the completion script to stdout.
///
/// # Errors
///
/// Never fails today; kept fallible like the other commands.
pub fn run_completions(shell: Shell, command: &mut clap::Command) -> Result<()> {
    let mut out = std::io::stdout();
    generate(shell, command, "nag", &mut out);
    Ok(())
}
