//! `nag push`: move a nag's effective due later.

use anyhow::{Result, bail};
use clap::Args;

use nagme_core::duration::parse_duration_ms;
use nagme_core::event::{EventData, PushData};
use nagme_core::model::NagId;

use super::show::render_nag;
use crate::context::AppContext;

#[derive(Args, Debug)]
pub struct PushArgs {
    /// Nag id.
    pub id: NagId,

    /// How far to push: `30m`, `2h`, `3d`, `1w`; a bare number is days.
    pub by: String,
}

/// # Errors
///
/// Permission (read-only mode), bad duration, not found, config, session and
/// gateway failures.
pub fn run_push(args: &PushArgs, ctx: &AppContext) -> Result<()> {
    ctx.config.gateway.require_write()?;
    let by_ms = parse_duration_ms(&args.by)?;
    if by_ms <= 0 {
        bail!("push duration must be positive");
    }

    let state = ctx.load_state()?;
    let current = AppContext::find_nag(&state, &args.id)?;
    if current.due_ms.is_none() && !current.is_recurring() {
        bail!("nag '{}' has no due date to push", args.id);
    }
    match ctx.write(
        &args.id,
        Some(current),
        EventData::Push(PushData::new(by_ms)),
        state.source,
    )? {
        Some(nag) => render_nag(nag, ctx),
        None => bail!("push for '{}' produced no nag", args.id),
    }
}
