//! `nag login` / `nag logout`: manage the saved session.

use std::env;
use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Context, Result, bail};
use clap::Args;
use tracing::info;

use nagme_core::source::Gateway;
use nagme_remote::SessionStore;

use crate::context::AppContext;
use crate::output::render_success;

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Account email.
    #[arg(short, long)]
    pub email: String,

    /// Read the password from the first line of stdin instead of prompting.
    #[arg(long)]
    pub password_stdin: bool,
}

/// Prompt on the terminal without echoing what is typed.
pub(crate) fn prompt_hidden(prompt: &str) -> Result<String> {
    eprint!("{prompt}");
    io::stderr().flush()?;
    rpassword::read_password().context("Failed to read password")
}

/// One line of stdin, without its line ending.
pub(crate) fn read_stdin_line(lines: &mut impl BufRead) -> Result<String> {
    let mut line = String::new();
    lines.read_line(&mut line).context("Failed to read password")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn read_password(from_stdin: bool) -> Result<String> {
    if let Ok(password) = env::var("NAGME_PASSWORD") {
        return Ok(password);
    }
    let stdin = io::stdin();
    if from_stdin || !stdin.is_terminal() {
        return read_stdin_line(&mut stdin.lock());
    }
    prompt_hidden("Password: ")
}

/// # Errors
///
/// Config, auth, transport and session-file failures.
pub fn run_login(args: &LoginArgs, ctx: &AppContext) -> Result<()> {
    let gateway = ctx.gateway()?;
    let password = read_password(args.password_stdin)?;
    if password.is_empty() {
        bail!("password must not be empty");
    }

    let session = gateway.authenticate(&args.email, &password)?;
    let store = SessionStore::default_location()?;
    store.save(&session)?;
    info!(user = %session.user_id, path = %store.path().display(), "session saved");
    render_success(ctx.output, &format!("signed in as {}", session.user_id))
}

/// # Errors
///
/// Fails when the session file exists but cannot be removed.
pub fn run_logout(ctx: &AppContext) -> Result<()> {
    let store = SessionStore::default_location()?;
    let message = if store.clear()? {
        "signed out"
    } else {
        "no saved session"
    };
    render_success(ctx.output, message)
}
