//! `nag show`: one nag in full.

use std::io::{self, Write};

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use nagme_core::classify::{ClassifyOptions, Classification, classify};
use nagme_core::duration::format_compact;
use nagme_core::model::{DAY_MS, Nag, NagId, RecurrenceRule};
use nagme_core::schedule::due_windows_in_range;
use nagme_core::timefmt::format_local;

use crate::context::AppContext;
use crate::output::{pretty_kv, pretty_section, render_mode};

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Nag id.
    pub id: NagId,
}

#[derive(Debug, Serialize)]
pub struct ShowNag {
    #[serde(flatten)]
    pub nag: Nag,
    pub classification: Classification,
    /// Upcoming occurrences within the configured horizon.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub upcoming_ms: Vec<i64>,
    #[serde(skip)]
    utc_offset_minutes: i32,
}

impl ShowNag {
    pub fn new(nag: Nag, now_ms: i64, options: &ClassifyOptions, horizon_days: u32, utc_offset_minutes: i32) -> Self {
        let classification = classify(&nag, now_ms, options);
        let horizon_end = now_ms.saturating_add(i64::from(horizon_days) * DAY_MS);
        let upcoming_ms = due_windows_in_range(&nag, now_ms, horizon_end)
            .into_iter()
            .map(|w| w.due_ms)
            .take(12)
            .collect();
        Self {
            nag,
            classification,
            upcoming_ms,
            utc_offset_minutes,
        }
    }

    fn time(&self, ms: i64) -> String {
        format_local(ms, self.utc_offset_minutes)
    }

    fn recurrence_line(&self) -> Option<String> {
        let recurrence = self.nag.recurrence.as_ref()?;
        Some(match &recurrence.rule {
            RecurrenceRule::Every { period_ms, anchor_ms } => format!(
                "every {} from {} (window {})",
                format_compact(*period_ms),
                self.time(*anchor_ms),
                format_compact(recurrence.window_ms)
            ),
            RecurrenceRule::Calendar(rule) => format!(
                "{} at {:02}:{:02}",
                rule.pattern, rule.hour, rule.minute
            ),
        })
    }
}

fn render_show_text(item: &ShowNag, w: &mut dyn Write) -> io::Result<()> {
    let nag = &item.nag;
    writeln!(w, "id\t{}", nag.id)?;
    writeln!(w, "title\t{}", nag.title)?;
    writeln!(w, "bucket\t{}", nag.bucket)?;
    if let Some(project) = nag.effective_project() {
        writeln!(w, "project\t{project}")?;
    }
    writeln!(w, "status\t{}", nag.status)?;
    writeln!(w, "state\t{}", item.classification.state)?;
    if let Some(window) = item.classification.window {
        writeln!(w, "due\t{}", item.time(window.due_ms))?;
    }
    writeln!(w, "progress\t{}", item.classification.percent_label)?;
    writeln!(w, "weight\t{}", nag.weight)?;
    if let Some(line) = item.recurrence_line() {
        writeln!(w, "recurrence\t{line}")?;
    }
    Ok(())
}

fn render_show_human(item: &ShowNag, w: &mut dyn Write) -> io::Result<()> {
    let nag = &item.nag;
    pretty_section(w, &format!("{}  {}", nag.id, nag.title))?;
    pretty_kv(w, "Bucket", &nag.bucket)?;
    if let Some(project) = nag.effective_project() {
        pretty_kv(w, "Project", project)?;
    }
    pretty_kv(w, "Status", nag.status.to_string())?;
    pretty_kv(w, "State", item.classification.state.to_string())?;
    match item.classification.window {
        Some(window) => {
            pretty_kv(
                w,
                "Due",
                format!("{} ({})", item.time(window.due_ms), item.classification.time_label),
            )?;
            pretty_kv(w, "Window", format!("from {}", item.time(window.start_ms)))?;
        }
        None => pretty_kv(w, "Due", "-")?,
    }
    pretty_kv(w, "Progress", &item.classification.percent_label)?;
    pretty_kv(
        w,
        "Weight",
        format!("{} (late after {}d)", nag.weight, nag.lateness_days),
    )?;
    if let Some(line) = item.recurrence_line() {
        pretty_kv(w, "Recurs", line)?;
    }
    if nag.push.count > 0 {
        pretty_kv(
            w,
            "Pushed",
            format!("{}x, {} total", nag.push.count, format_compact(nag.push.total_ms)),
        )?;
    }
    if let Some(done) = nag.last_completed_ms {
        pretty_kv(w, "Completed", item.time(done))?;
    }
    if !item.upcoming_ms.is_empty() {
        let upcoming: Vec<String> = item.upcoming_ms.iter().map(|ms| item.time(*ms)).collect();
        pretty_kv(w, "Upcoming", upcoming.join(", "))?;
    }
    pretty_kv(w, "Created", item.time(nag.created_at_ms))?;
    Ok(())
}

/// # Errors
///
/// Not found, replay, config, session and gateway failures.
pub fn run_show(args: &ShowArgs, ctx: &AppContext) -> Result<()> {
    let state = ctx.load_state()?;
    let nag = AppContext::find_nag(&state, &args.id)?;
    render_nag(nag, ctx)
}

/// Print one nag in the context's output mode.
///
/// # Errors
///
/// Fails when stdout is closed.
pub fn render_nag(nag: Nag, ctx: &AppContext) -> Result<()> {
    let display = &ctx.config.display;
    let item = ShowNag::new(
        nag,
        AppContext::now_ms(),
        &ClassifyOptions::with_due_soon_days(display.due_soon_days),
        display.horizon_days,
        ctx.utc_offset_minutes,
    );
    render_mode(ctx.output, &item, render_show_text, render_show_human)
}
