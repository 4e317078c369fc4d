//! `nag list`: fetch, rebuild and list nags.
//!
//! The view flags and the row renderer here are shared with `nag replay`.

use std::io::{self, Write};

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tracing::warn;

use nagme_core::classify::{ClassifyOptions, push_summary_label, recurring_indicator};
use nagme_core::config::DisplayConfig;
use nagme_core::source::CurrentState;
use nagme_core::timefmt::{format_local, parse_datetime};
use nagme_core::view::{
    BucketFilter, Horizon, ListEntry, RecurringMode, SortMode, ViewOptions, build_entries,
    project_name, project_overview,
};

use crate::context::AppContext;
use crate::output::{OutputMode, Renderable, render_list};

#[derive(Args, Debug, Clone, Default)]
pub struct ViewArgs {
    /// Only these buckets (repeat or comma-separate; `all` shows every bucket).
    #[arg(short, long, value_delimiter = ',')]
    pub bucket: Vec<String>,

    /// Only nags of this project.
    #[arg(long)]
    pub project: Option<String>,

    /// Sort: due, bucket, progress, entered, weight, smart.
    #[arg(short, long, default_value = "due")]
    pub sort: SortMode,

    /// Recurring rows: next-only or all-pending.
    #[arg(short, long, default_value = "next-only")]
    pub recurring: RecurringMode,

    /// How far ahead recurring occurrences are listed: 30d or 1y.
    #[arg(long)]
    pub horizon: Option<Horizon>,

    /// One-time nags due within this many days count as due soon.
    #[arg(long)]
    pub due_soon_days: Option<u32>,

    /// One row per project instead of one per nag.
    #[arg(long)]
    pub projects: bool,

    /// Evaluate at this time instead of now (date, date-time or epoch ms).
    #[arg(long)]
    pub now: Option<String>,
}

impl ViewArgs {
    pub fn options(&self, display: &DisplayConfig) -> ViewOptions {
        ViewOptions {
            bucket: BucketFilter::from_names(&self.bucket),
            project: self.project.clone(),
            sort: self.sort,
            recurring: self.recurring,
            horizon: self
                .horizon
                .unwrap_or_else(|| Horizon::from_days(display.horizon_days)),
            classify: ClassifyOptions::with_due_soon_days(
                self.due_soon_days.unwrap_or(display.due_soon_days),
            ),
        }
    }

    /// # Errors
    ///
    /// Fails when `--now` does not parse.
    pub fn now_ms(&self, utc_offset_minutes: i32) -> Result<i64> {
        match &self.now {
            Some(text) => Ok(parse_datetime(text, utc_offset_minutes)?),
            None => Ok(AppContext::now_ms()),
        }
    }
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub view: ViewArgs,
}

/// One list row as printed.
#[derive(Debug, Clone, Serialize)]
pub struct NagRow {
    pub key: String,
    pub id: String,
    pub title: String,
    pub bucket: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due: Option<String>,
    pub time_label: String,
    pub percent_label: String,
    pub progress: f64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub recurrence: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub pushed: String,
    pub weight: u8,
}

impl NagRow {
    pub fn from_entry(entry: &ListEntry, utc_offset_minutes: i32, as_project: bool) -> Self {
        let nag = &entry.nag;
        let due_ms = entry.classification.window.map(|w| w.due_ms);
        let project = if as_project {
            Some(project_name(entry).to_string())
        } else {
            nag.effective_project().map(str::to_string)
        };
        Self {
            key: entry.key.clone(),
            id: nag.id.to_string(),
            title: nag.title.clone(),
            bucket: nag.bucket.clone(),
            project,
            state: entry.classification.state.to_string(),
            due_ms,
            due: due_ms.map(|ms| format_local(ms, utc_offset_minutes)),
            time_label: entry.classification.time_label.clone(),
            percent_label: entry.classification.percent_label.clone(),
            progress: entry.classification.progress,
            recurrence: recurring_indicator(nag).to_string(),
            pushed: push_summary_label(nag),
            weight: nag.weight,
        }
    }
}

const BAR_WIDTH: usize = 10;

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn progress_bar(fraction: f64) -> String {
    let filled = (fraction.clamp(0.0, 1.0) * BAR_WIDTH as f64).round() as usize;
    format!("[{}{}]", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled))
}

fn state_marker(state: &str) -> &'static str {
    match state {
        "overdue" => "!",
        "due-soon" => "*",
        "completed" => "✓",
        "recurring-pending" => "~",
        _ => " ",
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    out.push('…');
    out
}

impl Renderable for NagRow {
    fn render_human(&self, w: &mut dyn Write) -> io::Result<()> {
        let label = match &self.project {
            Some(project) => format!("{} / {project}", self.bucket),
            None => self.bucket.clone(),
        };
        let tags = [self.recurrence.as_str(), self.pushed.as_str()]
            .iter()
            .filter(|t| !t.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(
            w,
            "{} {:<32} {:<18} {:<16} {:>6} {} {:>5} {}",
            state_marker(&self.state),
            truncate(&self.title, 32),
            truncate(&label, 18),
            self.due.as_deref().unwrap_or("-"),
            self.time_label,
            progress_bar(self.progress),
            self.percent_label,
            tags
        )
    }

    fn render_json(&self, w: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer(&mut *w, self).map_err(io::Error::other)?;
        writeln!(w)
    }

    fn render_table(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.id,
            self.state,
            self.due.as_deref().unwrap_or("-"),
            self.time_label,
            self.percent_label,
            self.bucket,
            self.weight,
            self.recurrence,
            self.title
        )
    }

    fn table_headers() -> &'static [&'static str] {
        &[
            "id", "state", "due", "left", "progress", "bucket", "weight", "recur", "title",
        ]
    }
}

/// Rows for a rebuilt state under the given view flags.
///
/// # Errors
///
/// Fails when `--now` does not parse.
pub fn build_rows(state: &CurrentState, args: &ViewArgs, ctx: &AppContext) -> Result<Vec<NagRow>> {
    let now_ms = args.now_ms(ctx.utc_offset_minutes)?;
    let options = args.options(&ctx.config.display);
    let entries = if args.projects {
        project_overview(state.nags.values(), now_ms, &options.classify)
    } else {
        build_entries(state.nags.values(), now_ms, &options)
    };
    Ok(entries
        .iter()
        .map(|e| NagRow::from_entry(e, ctx.utc_offset_minutes, args.projects))
        .collect())
}

/// Print rows, then a note on stderr for nags that failed to rebuild.
///
/// # Errors
///
/// Fails when `--now` does not parse or stdout is closed.
pub fn render_state(state: &CurrentState, args: &ViewArgs, ctx: &AppContext) -> Result<()> {
    let rows = build_rows(state, args, ctx)?;
    render_list(&rows, ctx.output)?;

    if !state.failures.is_empty() && ctx.output != OutputMode::Json {
        eprintln!(
            "note: {} nag(s) hidden because their history could not be replayed:",
            state.failures.len()
        );
        for (id, failure) in &state.failures {
            eprintln!("  {id}: {failure}");
        }
    }
    Ok(())
}

/// # Errors
///
/// Config, session and gateway failures.
pub fn run_list(args: &ListArgs, ctx: &AppContext) -> Result<()> {
    let state = ctx.load_state()?;
    if !state.failures.is_empty() {
        warn!(failed = state.failures.len(), "some nags could not be rebuilt");
    }
    render_state(&state, &args.view, ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: ViewArgs,
    }

    #[test]
    fn view_defaults() {
        let w = Wrapper::parse_from(["test"]);
        let options = w.args.options(&DisplayConfig::default());
        assert_eq!(options.bucket, BucketFilter::All);
        assert_eq!(options.sort, SortMode::Due);
        assert_eq!(options.recurring, RecurringMode::NextOnly);
        assert_eq!(options.horizon, Horizon::Month);
        assert_eq!(options.classify, ClassifyOptions::default());
    }

    #[test]
    fn view_flags_parse() {
        let w = Wrapper::parse_from([
            "test", "-b", "Work,personal", "--sort", "by-progress", "-r", "all-pending",
            "--horizon", "1y", "--due-soon-days", "3",
        ]);
        let options = w.args.options(&DisplayConfig::default());
        assert!(options.bucket.matches("work"));
        assert!(options.bucket.matches("Personal"));
        assert!(!options.bucket.matches("Weekend"));
        assert_eq!(options.sort, SortMode::Progress);
        assert_eq!(options.recurring, RecurringMode::AllPending);
        assert_eq!(options.horizon, Horizon::Year);
        assert_eq!(options.classify, ClassifyOptions::with_due_soon_days(3));
    }

    #[test]
    fn unknown_sort_is_rejected() {
        assert!(Wrapper::try_parse_from(["test", "--sort", "random"]).is_err());
    }

    #[test]
    fn now_flag_accepts_epoch_millis() {
        let w = Wrapper::parse_from(["test", "--now", "1000"]);
        assert_eq!(w.args.now_ms(0).expect("now"), 1000);
    }

    #[test]
    fn bar_fills_proportionally() {
        assert_eq!(progress_bar(0.0), "[..........]");
        assert_eq!(progress_bar(0.5), "[#####.....]");
        assert_eq!(progress_bar(3.0), "[##########]");
    }

    #[test]
    fn long_titles_are_truncated() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long title", 6), "a ver…");
    }
}
