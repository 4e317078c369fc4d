//! `nag add`: create a nag by appending a `create` event.

use anyhow::{Result, bail};
use clap::Args;
use tracing::debug;

use nagme_core::event::EventData;
use nagme_core::model::NagId;
use nagme_core::source::CurrentState;

use super::fields::NagFieldArgs;
use super::show::render_nag;
use crate::context::AppContext;

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Display text of the new nag.
    pub title: String,

    /// Explicit id; derived from the title when omitted.
    #[arg(long)]
    pub id: Option<NagId>,

    #[command(flatten)]
    pub fields: NagFieldArgs,
}

/// Lowercase ASCII words joined by `-`.
fn slug(title: &str) -> String {
    let mut out = String::new();
    for word in title
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        if !out.is_empty() {
            out.push('-');
        }
        out.push_str(&word.to_ascii_lowercase());
    }
    out
}

/// An id for `title` not used by any nag in `state`.
fn derive_id(title: &str, state: &CurrentState, now_ms: i64) -> Result<NagId> {
    let base = match slug(title) {
        s if s.is_empty() => format!("nag-{now_ms}"),
        s => s,
    };
    let taken = |candidate: &NagId| {
        state.nags.contains_key(candidate) || state.failures.contains_key(candidate)
    };
    for n in 1..1000 {
        let raw = if n == 1 { base.clone() } else { format!("{base}-{n}") };
        let candidate = NagId::new(&raw)?;
        if !taken(&candidate) {
            return Ok(candidate);
        }
    }
    bail!("could not find a free id for '{title}'; pass --id")
}

/// # Errors
///
/// Permission (read-only mode), validation, config, session and gateway
/// failures.
pub fn run_add(args: &AddArgs, ctx: &AppContext) -> Result<()> {
    ctx.config.gateway.require_write()?;
    if args.title.trim().is_empty() {
        bail!("title must not be blank");
    }

    let now_ms = AppContext::now_ms();
    let mut patch = args.fields.to_patch(now_ms, ctx.utc_offset_minutes)?;
    patch.title = Some(args.title.trim().to_string());
    patch.created_at_ms = Some(now_ms);

    let state = ctx.load_state()?;
    let id = match &args.id {
        Some(id) if state.nags.contains_key(id) => bail!("nag '{id}' already exists; use `nag edit`"),
        Some(id) => id.clone(),
        None => derive_id(&args.title, &state, now_ms)?,
    };
    debug!(nag = %id, "creating nag");

    match ctx.write(&id, None, EventData::Create(patch), state.source)? {
        Some(nag) => render_nag(nag, ctx),
        None => bail!("create for '{id}' produced no nag"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nagme_core::model::Nag;

    #[test]
    fn slugs_are_lowercase_words() {
        assert_eq!(slug("Pay the Rent!"), "pay-the-rent");
        assert_eq!(slug("  gym  "), "gym");
        assert_eq!(slug("日本"), "");
    }

    #[test]
    fn derived_ids_avoid_existing_nags() {
        let mut state = CurrentState::empty();
        let taken = NagId::new("gym").expect("id");
        state.nags.insert(taken.clone(), Nag::new(taken, "Gym", 0));
        assert_eq!(derive_id("Gym", &state, 5).expect("id").as_str(), "gym-2");
        assert_eq!(derive_id("Swim", &state, 5).expect("id").as_str(), "swim");
        assert_eq!(derive_id("!!", &state, 5).expect("id").as_str(), "nag-5");
    }
}
