//! `nag sync`: re-send every nag as a full snapshot.
//!
//! Each snapshot goes out as a `manual_sync` row, so a device whose log is
//! missing history can rebuild the current state from the latest rows.

use anyhow::{Result, bail};
use tracing::{info, warn};

use nagme_core::event::{EventData, NagPatch};

use crate::context::AppContext;
use crate::output::render_success;

/// # Errors
///
/// Permission (read-only mode), config and session failures up front; a
/// summary error when any nag failed to sync.
pub fn run_sync(ctx: &AppContext) -> Result<()> {
    let writer = ctx.writer()?;
    let state = ctx.load_state()?;

    let total = state.nags.len();
    let mut failed = Vec::new();
    for (id, nag) in &state.nags {
        let data = EventData::Update(NagPatch::snapshot(nag));
        if let Err(err) = writer.commit(id, Some(nag.clone()), data, state.source) {
            warn!(nag = %id, error = %format!("{err:#}"), "sync failed");
            failed.push((id.to_string(), err));
        }
    }

    let synced = total - failed.len();
    info!(synced, failed = failed.len(), "sync finished");
    match failed.len() {
        0 => render_success(ctx.output, &format!("synced {synced} nag(s)")),
        // One failure: keep its error so the exit code reflects it.
        1 => {
            let (id, err) = failed.remove(0);
            Err(err.context(format!("synced {synced} of {total}; '{id}' failed")))
        }
        _ => {
            let first = format!("{:#}", failed[0].1);
            let ids: Vec<&str> = failed.iter().map(|(id, _)| id.as_str()).collect();
            bail!("synced {synced} of {total}; failed: {} (first error: {first})", ids.join(", "))
        }
    }
}
