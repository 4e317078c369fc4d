//! `nag delete`: append a `delete` event; the direct row goes with it.

use anyhow::Result;
use clap::Args;

use nagme_core::event::{DeleteData, EventData};
use nagme_core::model::NagId;

use crate::context::AppContext;
use crate::output::render_success;

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Nag id.
    pub id: NagId,

    /// Why the nag is going away; stored with the event.
    #[arg(long)]
    pub reason: Option<String>,
}

/// # Errors
///
/// Permission (read-only mode), not found, config, session and gateway
/// failures.
pub fn run_delete(args: &DeleteArgs, ctx: &AppContext) -> Result<()> {
    ctx.config.gateway.require_write()?;

    let state = ctx.load_state()?;
    // A nag whose history no longer replays can still be deleted.
    let current = match AppContext::find_nag(&state, &args.id) {
        Ok(nag) => Some(nag),
        Err(_) if state.failures.contains_key(&args.id) => None,
        Err(err) => return Err(err),
    };

    let data = EventData::Delete(DeleteData {
        reason: args.reason.clone(),
        ..DeleteData::default()
    });
    ctx.write(&args.id, current, data, state.source)?;

    render_success(ctx.output, &format!("deleted {}", args.id))
}
