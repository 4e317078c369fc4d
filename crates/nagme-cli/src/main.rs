#![forbid(unsafe_code)]

mod cmd;
mod context;
mod output;
mod tui;

use std::env;
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use nagme_core::NagError;

use context::AppContext;
use output::{CliError, OutputMode, render_error, resolve_output_mode};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "nag: keep an eye on your nagme nags from the terminal",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Output format; wins over --json, FORMAT and the config file.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Config file to read instead of the default location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Output mode before the config file has been read.
    fn early_output_mode(&self) -> OutputMode {
        resolve_output_mode(self.format, self.json, None)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Session",
        about = "Sign in and save the session",
        long_about = "Sign in with email and password. The session is saved under the user config directory.",
        after_help = "EXAMPLES:\n    # Prompt for the password\n    nag login --email me@example.com\n\n    # Read the password from stdin\n    printf '%s\\n' \"$PW\" | nag login -e me@example.com --password-stdin"
    )]
    Login(cmd::login::LoginArgs),

    #[command(next_help_heading = "Session", about = "Forget the saved session")]
    Logout,

    #[command(
        next_help_heading = "Session",
        about = "Change the account password",
        long_about = "Change the password of the signed-in account. The new password needs at least 8 characters and is asked for twice.",
        after_help = "EXAMPLES:\n    # Prompt for the new password twice\n    nag passwd\n\n    # Password and confirmation from stdin\n    printf '%s\\n%s\\n' \"$PW\" \"$PW\" | nag passwd --password-stdin"
    )]
    Passwd(cmd::passwd::PasswdArgs),

    #[command(
        next_help_heading = "Read",
        about = "List nags",
        long_about = "Fetch current state and list nags, coloured and ordered by urgency.",
        after_help = "EXAMPLES:\n    # Everything due in the next 30 days\n    nag list\n\n    # Work bucket, most pressing first\n    nag list --bucket work --sort smart\n\n    # Every pending occurrence for the next year\n    nag list --recurring all-pending --horizon year\n\n    # Emit machine-readable output\n    nag list --json"
    )]
    List(cmd::list::ListArgs),

    #[command(
        next_help_heading = "Read",
        about = "Show one nag",
        long_about = "Show every field of one nag, its classification and its upcoming occurrences.",
        after_help = "EXAMPLES:\n    # Show a nag\n    nag show rent\n\n    # Emit machine-readable output\n    nag show rent --json"
    )]
    Show(cmd::show::ShowArgs),

    #[command(
        next_help_heading = "Read",
        about = "Open the interactive list",
        long_about = "Open a full-screen list that reloads in the background.",
        after_help = "EXAMPLES:\n    # Open the list\n    nag tui\n\n    # Start on the work bucket sorted by weight\n    nag tui --bucket work --sort weight"
    )]
    Tui(cmd::list::ListArgs),

    #[command(
        next_help_heading = "Write",
        about = "Create a nag",
        long_about = "Create a nag by appending a create event. Needs gateway.mode = \"read-write\".",
        after_help = "EXAMPLES:\n    # One-off with a due date\n    nag add \"Pay rent\" --due 2025-07-01 --bucket personal\n\n    # Every two weeks\n    nag add \"Water plants\" --every 2w\n\n    # First Monday of each month at 09:30\n    nag add \"Team report\" --pattern nth-weekday-of-month --nth 1 --weekday mon --at 09:30"
    )]
    Add(cmd::add::AddArgs),

    #[command(
        next_help_heading = "Write",
        about = "Change fields of a nag",
        after_help = "EXAMPLES:\n    # Move the due date\n    nag edit rent --due 2025-07-03\n\n    # Drop the recurrence\n    nag edit plants --no-recurrence"
    )]
    Edit(cmd::edit::EditArgs),

    #[command(
        next_help_heading = "Write",
        about = "Delete a nag",
        after_help = "EXAMPLES:\n    # Delete with a note\n    nag delete rent --reason \"moved out\""
    )]
    Delete(cmd::delete::DeleteArgs),

    #[command(
        next_help_heading = "Write",
        about = "Push a nag's due later",
        after_help = "EXAMPLES:\n    # Two days later\n    nag push rent 2d\n\n    # Three hours later\n    nag push rent 3h"
    )]
    Push(cmd::push::PushArgs),

    #[command(
        next_help_heading = "Write",
        about = "Mark a nag done",
        long_about = "Mark a nag done. A recurring nag moves on to its next occurrence.",
        after_help = "EXAMPLES:\n    # Complete the current occurrence\n    nag complete plants\n\n    # Complete a specific occurrence\n    nag complete plants --occurrence 2025-06-14"
    )]
    Complete(cmd::complete::CompleteArgs),

    #[command(
        next_help_heading = "Write",
        about = "Re-send every nag as a full snapshot",
        long_about = "Write a manual_sync row holding the full current state of every nag, so other devices can catch up from the latest rows.",
        after_help = "EXAMPLES:\n    # Snapshot everything\n    nag sync\n\n    # Report the count as JSON\n    nag sync --json"
    )]
    Sync,

    #[command(
        next_help_heading = "Offline",
        about = "Rebuild and list nags from a local dump",
        long_about = "Replay a local dump of events or backend rows and list the result. Never touches the network.",
        after_help = "EXAMPLES:\n    # Replay native events\n    nag replay --file events.json\n\n    # Replay an event-table export as of a fixed time\n    nag replay --file rows.json --input rows --now 2025-06-15T12:00:00Z --json"
    )]
    Replay(cmd::replay::ReplayArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Show or create the config file",
        after_help = "EXAMPLES:\n    # Show the effective config\n    nag config show\n\n    # Create a starter config\n    nag config init --endpoint https://xyz.supabase.co --api-key anon-key"
    )]
    Config(cmd::config::ConfigArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Generate shell completions",
        after_help = "EXAMPLES:\n    # Generate bash completions\n    nag completions bash\n\n    # Generate zsh completions\n    nag completions zsh"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("NAGME_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "nagme=debug,nag=debug,info"
        } else {
            "nagme=info,nag=info,warn"
        })
    });

    let format = env::var("NAGME_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry.with(fmt::layer().compact().with_writer(std::io::stderr)).init();
        }
    }
}

/// `mode` starts from the flags and is updated once the config file is read,
/// so errors render the way output would have.
fn run(cli: &Cli, mode: &mut OutputMode) -> anyhow::Result<()> {
    if let Commands::Completions(args) = &cli.command {
        let mut command = Cli::command();
        return cmd::completions::run_completions(args.shell, &mut command);
    }

    // `config init` is how a missing file comes into existence.
    let load_path = match &cli.command {
        Commands::Config(_) => cli.config.as_deref().filter(|p| p.exists()),
        _ => cli.config.as_deref(),
    };
    let ctx = AppContext::load(load_path, |config| {
        resolve_output_mode(cli.format, cli.json, config.output.as_deref())
    })
    .map_err(|err| NagError::Config(format!("{err:#}")))?;
    *mode = ctx.output;
    debug!(output = ?ctx.output, "context ready");

    match &cli.command {
        Commands::Login(args) => cmd::login::run_login(args, &ctx),
        Commands::Logout => cmd::login::run_logout(&ctx),
        Commands::Passwd(args) => cmd::passwd::run_passwd(args, &ctx),
        Commands::List(args) => cmd::list::run_list(args, &ctx),
        Commands::Show(args) => cmd::show::run_show(args, &ctx),
        Commands::Tui(args) => tui::run_tui(&args.view, &ctx),
        Commands::Add(args) => cmd::add::run_add(args, &ctx),
        Commands::Edit(args) => cmd::edit::run_edit(args, &ctx),
        Commands::Delete(args) => cmd::delete::run_delete(args, &ctx),
        Commands::Push(args) => cmd::push::run_push(args, &ctx),
        Commands::Complete(args) => cmd::complete::run_complete(args, &ctx),
        Commands::Sync => cmd::sync::run_sync(&ctx),
        Commands::Replay(args) => cmd::replay::run_replay(args, &ctx),
        Commands::Config(args) => cmd::config::run_config(args, cli.config.as_deref(), &ctx),
        Commands::Completions(_) => Ok(()),
    }
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let mut mode = cli.early_output_mode();
    if let Err(err) = run(&cli, &mut mode) {
        let _ = render_error(mode, &CliError::from_anyhow(&err));
        std::process::exit(1);
    }
}
