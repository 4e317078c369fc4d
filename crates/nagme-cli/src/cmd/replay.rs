//! `nag replay`: rebuild and list nags from a local dump, no network.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, ValueEnum};
use serde_json::Value;
use tracing::{info, warn};

use nagme_core::event::NagEvent;
use nagme_core::source::{CurrentState, state_from_events, state_from_rows};
use nagme_remote::wire::{decode_direct_row, decode_event_row};

use super::list::{ViewArgs, render_state};
use crate::context::AppContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReplayInput {
    /// `NagEvent` JSON: an array, or one event per line.
    Events,
    /// Event-table rows as exported from the backend.
    Rows,
    /// Direct-state rows as exported from the backend.
    Direct,
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Dump to read.
    #[arg(short, long)]
    pub file: PathBuf,

    /// What the dump holds.
    #[arg(long, value_enum, default_value = "events")]
    pub input: ReplayInput,

    #[command(flatten)]
    pub view: ViewArgs,
}

/// An array, or newline-delimited values.
fn parse_values(text: &str) -> Result<Vec<Value>> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }
    trimmed
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("line {}: invalid JSON", n + 1))
        })
        .collect()
}

/// Rebuild state from the text of a dump.
///
/// # Errors
///
/// Fails when the text is not JSON or a native event does not parse.
pub fn state_from_dump(text: &str, input: ReplayInput, utc_offset_minutes: i32) -> Result<CurrentState> {
    let values = parse_values(text)?;
    let state = match input {
        ReplayInput::Events => {
            let events = values
                .into_iter()
                .enumerate()
                .map(|(i, v)| {
                    serde_json::from_value::<NagEvent>(v)
                        .with_context(|| format!("event #{i} does not parse"))
                })
                .collect::<Result<Vec<_>>>()?;
            state_from_events(&events)
        }
        ReplayInput::Rows => {
            let events: Vec<NagEvent> = values
                .iter()
                .enumerate()
                .filter_map(|(i, row)| match decode_event_row(row, i, utc_offset_minutes) {
                    Ok(event) => Some(event),
                    Err(err) => {
                        warn!(row = i, error = %err, "skipping row without a usable event");
                        None
                    }
                })
                .collect();
            state_from_events(&events)
        }
        ReplayInput::Direct => {
            let rows = values
                .iter()
                .enumerate()
                .filter_map(|(i, row)| match decode_direct_row(row, utc_offset_minutes) {
                    Ok(nag) => Some(nag),
                    Err(err) => {
                        warn!(row = i, error = %err, "skipping undecodable direct row");
                        None
                    }
                })
                .collect();
            state_from_rows(rows)
        }
    };
    Ok(state)
}

/// # Errors
///
/// Fails when the file cannot be read or parsed.
pub fn run_replay(args: &ReplayArgs, ctx: &AppContext) -> Result<()> {
    if !args.file.exists() {
        bail!("{} does not exist", args.file.display());
    }
    let text = fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let state = state_from_dump(&text, args.input, ctx.utc_offset_minutes)
        .with_context(|| format!("Failed to replay {}", args.file.display()))?;
    info!(source = %state.source, nags = state.nags.len(), "replayed dump");
    render_state(&state, &args.view, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nagme_core::model::NagId;
    use nagme_core::source::StateSource;
    use serde_json::json;

    fn id(raw: &str) -> NagId {
        NagId::new(raw).expect("id")
    }

    #[test]
    fn array_and_lines_both_parse() {
        let events = [
            json!({"event_id": "1", "nag_id": "a", "kind": "nag.create", "ts_ms": 0, "data": {"title": "A"}}),
            json!({"event_id": "2", "nag_id": "a", "kind": "nag.update", "ts_ms": 5, "data": {"due_ms": 200}}),
        ];
        let array = serde_json::to_string(&events).expect("json");
        let lines = format!("{}\n\n{}\n", events[0], events[1]);

        for text in [array, lines] {
            let state = state_from_dump(&text, ReplayInput::Events, 0).expect("replay");
            assert_eq!(state.source, StateSource::Events { events: 2 });
            assert_eq!(state.nags[&id("a")].due_ms, Some(200));
        }
    }

    #[test]
    fn bad_native_event_is_an_error() {
        let text = r#"[{"event_id": "1", "nag_id": "a", "kind": "nag.explode", "ts_ms": 0}]"#;
        assert!(state_from_dump(text, ReplayInput::Events, 0).is_err());
        assert!(state_from_dump("not json", ReplayInput::Events, 0).is_err());
    }

    #[test]
    fn backend_rows_are_decoded_and_bad_rows_skipped() {
        let text = json!([
            {"id": 1, "created_at": "2025-06-10T09:00:00Z",
             "payload": {"action": "create", "workName": "rent", "nagText": "Pay rent"}},
            {"id": 2, "payload": "not an object"},
            {"id": 3, "created_at": "2025-06-11T09:00:00Z",
             "payload": {"action": "delete", "workName": "rent"}}
        ])
        .to_string();
        let state = state_from_dump(&text, ReplayInput::Rows, 0).expect("replay");
        assert!(state.nags.is_empty());
        assert_eq!(state.source, StateSource::Events { events: 2 });
    }

    #[test]
    fn direct_rows_skip_deleted() {
        let text = json!([
            {"workName": "rent", "nagText": "Pay rent"},
            {"workName": "old", "nagText": "Old", "deleted": true}
        ])
        .to_string();
        let state = state_from_dump(&text, ReplayInput::Direct, 0).expect("replay");
        assert_eq!(state.nags.len(), 1);
        assert_eq!(state.nags[&id("rent")].title, "Pay rent");
    }
}
