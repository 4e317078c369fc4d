//! `nag complete`: mark a nag (or one occurrence of a recurring nag) done.

use anyhow::{Result, bail};
use clap::Args;

use nagme_core::event::{CompleteData, EventData};
use nagme_core::model::NagId;
use nagme_core::timefmt::parse_datetime;

use super::show::render_nag;
use crate::context::AppContext;

#[derive(Args, Debug)]
pub struct CompleteArgs {
    /// Nag id.
    pub id: NagId,

    /// Which occurrence was done; defaults to the current due.
    #[arg(long)]
    pub occurrence: Option<String>,
}

/// # Errors
///
/// Permission (read-only mode), bad date, not found, config, session and
/// gateway failures.
pub fn run_complete(args: &CompleteArgs, ctx: &AppContext) -> Result<()> {
    ctx.config.gateway.require_write()?;
    let occurrence_ms = args
        .occurrence
        .as_deref()
        .map(|o| parse_datetime(o, ctx.utc_offset_minutes))
        .transpose()?;

    let state = ctx.load_state()?;
    let current = AppContext::find_nag(&state, &args.id)?;
    let data = EventData::Complete(CompleteData {
        occurrence_ms,
        ..CompleteData::default()
    });
    match ctx.write(&args.id, Some(current), data, state.source)? {
        Some(nag) => render_nag(nag, ctx),
        None => bail!("complete for '{}' produced no nag", args.id),
    }
}
