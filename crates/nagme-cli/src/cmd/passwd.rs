//! `nag passwd`: change the account password for the saved session.

use std::env;
use std::io::{self, BufRead, IsTerminal};

use anyhow::{Result, bail};
use clap::Args;

use nagme_core::source::Gateway;

use super::login::{prompt_hidden, read_stdin_line};
use crate::context::AppContext;
use crate::output::render_success;

pub const MIN_PASSWORD_CHARS: usize = 8;

#[derive(Args, Debug)]
pub struct PasswdArgs {
    /// Read the new password and its confirmation from the first two lines
    /// of stdin instead of prompting.
    #[arg(long)]
    pub password_stdin: bool,
}

/// Check a new password and its confirmation; both are trimmed first.
///
/// # Errors
///
/// Too short, or the two entries differ.
pub fn validate_new_password(password: &str, confirmation: &str) -> Result<String> {
    let password = password.trim();
    if password.chars().count() < MIN_PASSWORD_CHARS {
        bail!("password must be at least {MIN_PASSWORD_CHARS} characters");
    }
    if password != confirmation.trim() {
        bail!("passwords do not match");
    }
    Ok(password.to_string())
}

fn read_new_password(from_stdin: bool) -> Result<String> {
    if let Ok(password) = env::var("NAGME_NEW_PASSWORD") {
        return validate_new_password(&password, &password);
    }
    let stdin = io::stdin();
    if from_stdin || !stdin.is_terminal() {
        let mut lines = stdin.lock();
        return read_pair(&mut lines);
    }
    let password = prompt_hidden("New password: ")?;
    if password.trim().chars().count() < MIN_PASSWORD_CHARS {
        bail!("password must be at least {MIN_PASSWORD_CHARS} characters");
    }
    let confirmation = prompt_hidden("Confirm new password: ")?;
    validate_new_password(&password, &confirmation)
}

fn read_pair(lines: &mut impl BufRead) -> Result<String> {
    let password = read_stdin_line(lines)?;
    let confirmation = read_stdin_line(lines)?;
    validate_new_password(&password, &confirmation)
}

/// # Errors
///
/// Validation, session, config, auth and transport failures.
pub fn run_passwd(args: &PasswdArgs, ctx: &AppContext) -> Result<()> {
    let gateway = ctx.gateway()?;
    let session = AppContext::session()?;
    let password = read_new_password(args.password_stdin)?;

    gateway.change_password(&session, &password)?;
    render_success(ctx.output, "password changed")
}
