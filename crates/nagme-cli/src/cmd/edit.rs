//! `nag edit`: change fields of an existing nag with an `update` event.

use anyhow::{Result, bail};
use clap::Args;

use nagme_core::event::EventData;
use nagme_core::model::NagId;

use super::fields::NagFieldArgs;
use super::show::render_nag;
use crate::context::AppContext;

#[derive(Args, Debug)]
pub struct EditArgs {
    /// Nag id.
    pub id: NagId,

    /// New display text.
    #[arg(short, long)]
    pub title: Option<String>,

    #[command(flatten)]
    pub fields: NagFieldArgs,
}

/// # Errors
///
/// Permission (read-only mode), not found, validation, config, session and
/// gateway failures.
pub fn run_edit(args: &EditArgs, ctx: &AppContext) -> Result<()> {
    ctx.config.gateway.require_write()?;

    let mut patch = args
        .fields
        .to_patch(AppContext::now_ms(), ctx.utc_offset_minutes)?;
    if let Some(title) = &args.title {
        if title.trim().is_empty() {
            bail!("title must not be blank");
        }
        patch.title = Some(title.trim().to_string());
    }
    if patch.is_empty() {
        bail!("nothing to change; pass at least one field flag (see `nag edit --help`)");
    }

    let state = ctx.load_state()?;
    let current = AppContext::find_nag(&state, &args.id)?;
    match ctx.write(&args.id, Some(current), EventData::Update(patch), state.source)? {
        Some(nag) => render_nag(nag, ctx),
        None => bail!("update for '{}' produced no nag", args.id),
    }
}
