//! Display-state classification and list labels.
//!
//! Everything here is a pure function of a nag, an optional due window and
//! the current time.

use serde::Serialize;
use std::fmt;

use crate::duration::format_compact;
use crate::model::{DAY_MS, Nag, Status};
use crate::schedule::{DueWindow, resolve_due_window};

/// Default "due soon" horizon for one-time nags.
pub const DUE_SOON_DAYS: u32 = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayState {
    Overdue,
    DueSoon,
    OnTrack,
    Completed,
    RecurringPending,
}

impl DisplayState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Overdue => "overdue",
            Self::DueSoon => "due-soon",
            Self::OnTrack => "on-track",
            Self::Completed => "completed",
            Self::RecurringPending => "recurring-pending",
        }
    }
}

impl fmt::Display for DisplayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifyOptions {
    /// One-time nags due within this many ms count as due soon.
    pub due_soon_ms: i64,
}

impl ClassifyOptions {
    #[must_use]
    pub fn with_due_soon_days(days: u32) -> Self {
        Self {
            due_soon_ms: i64::from(days) * DAY_MS,
        }
    }
}

impl Default for ClassifyOptions {
    fn default() -> Self {
        Self::with_due_soon_days(DUE_SOON_DAYS)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub state: DisplayState,
    /// In `[0, 1]`. Before the due this is elapsed time within the window;
    /// after it, elapsed time within the lateness ramp.
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<DueWindow>,
    /// `3d` until due, or `+3d` past it. Empty without a due.
    pub time_label: String,
    pub percent_label: String,
}

/// Classify a nag against the window it resolves to at `now_ms`.
#[must_use]
pub fn classify(nag: &Nag, now_ms: i64, options: &ClassifyOptions) -> Classification {
    classify_window(nag, resolve_due_window(nag, now_ms), now_ms, options)
}

/// Classify a nag against a specific window (one row of an all-pending view).
#[must_use]
pub fn classify_window(
    nag: &Nag,
    window: Option<DueWindow>,
    now_ms: i64,
    options: &ClassifyOptions,
) -> Classification {
    let state = display_state(nag, window.as_ref(), now_ms, options);
    let derived = if state == DisplayState::Completed {
        1.0
    } else {
        window.map_or(0.0, |w| window_progress(nag, &w, now_ms))
    };
    let progress = nag.progress.map_or(derived, |p| p.clamp(0.0, 1.0));

    let time_label = window
        .map(|w| due_status_label(now_ms, w.due_ms))
        .unwrap_or_default();
    let percent_label = if nag.progress.is_some() || state == DisplayState::Completed {
        percent(progress)
    } else {
        window
            .map(|w| progress_percent_label(now_ms, w.start_ms, w.due_ms, nag.lateness_days))
            .unwrap_or_default()
    };

    Classification {
        state,
        progress,
        window,
        time_label,
        percent_label,
    }
}

fn display_state(
    nag: &Nag,
    window: Option<&DueWindow>,
    now_ms: i64,
    options: &ClassifyOptions,
) -> DisplayState {
    if let Some(recurrence) = &nag.recurrence {
        let Some(window) = window else {
            return DisplayState::RecurringPending;
        };
        let closes = window.due_ms.saturating_add(recurrence.window_ms);
        return if now_ms >= closes {
            DisplayState::Overdue
        } else if now_ms >= window.due_ms {
            DisplayState::DueSoon
        } else {
            DisplayState::RecurringPending
        };
    }

    if nag.status != Status::Active {
        return DisplayState::Completed;
    }
    match window {
        None => DisplayState::OnTrack,
        Some(w) if now_ms > w.due_ms => DisplayState::Overdue,
        Some(w) if w.due_ms - now_ms <= options.due_soon_ms => DisplayState::DueSoon,
        Some(_) => DisplayState::OnTrack,
    }
}

fn window_progress(nag: &Nag, window: &DueWindow, now_ms: i64) -> f64 {
    if now_ms <= window.due_ms {
        progress_fraction(now_ms, window.start_ms, window.due_ms)
    } else {
        let ramp_end = window
            .due_ms
            .saturating_add(overdue_ramp_ms(nag.lateness_days));
        progress_fraction(now_ms, window.due_ms, ramp_end)
    }
}

/// Length of the overdue ramp: `lateness_days` days, at least one.
#[must_use]
pub fn overdue_ramp_ms(lateness_days: u32) -> i64 {
    i64::from(lateness_days.max(1)) * DAY_MS
}

/// Fraction of `[start, end]` elapsed at `now`, clamped to `[0, 1]`.
///
/// A degenerate interval is 0 before its end and 1 from then on.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn progress_fraction(now_ms: i64, start_ms: i64, end_ms: i64) -> f64 {
    if end_ms <= start_ms {
        return if now_ms >= end_ms { 1.0 } else { 0.0 };
    }
    let ratio = (now_ms - start_ms) as f64 / (end_ms - start_ms) as f64;
    ratio.clamp(0.0, 1.0)
}

#[must_use]
pub fn due_status_label(now_ms: i64, due_ms: i64) -> String {
    if now_ms > due_ms {
        format!("+{}", format_compact(now_ms - due_ms))
    } else {
        format_compact(due_ms - now_ms)
    }
}

/// Percent through the pre-due window, or through the lateness ramp once
/// past due (so an overdue nag climbs from 0% again).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn progress_percent_label(now_ms: i64, start_ms: i64, due_ms: i64, lateness_days: u32) -> String {
    let ratio = if now_ms <= due_ms {
        let span = (due_ms - start_ms).max(1);
        (now_ms - start_ms).clamp(0, span) as f64 / span as f64
    } else {
        (now_ms - due_ms) as f64 / overdue_ramp_ms(lateness_days) as f64
    };
    percent(ratio)
}

#[allow(clippy::cast_possible_truncation)]
fn percent(ratio: f64) -> String {
    format!("{}%", (ratio * 100.0).round() as i64)
}

/// `R:M`, `R:W`, ... for recurring nags, empty otherwise.
#[must_use]
pub fn recurring_indicator(nag: &Nag) -> &'static str {
    nag.recurrence.as_ref().map_or("", |r| r.indicator())
}

/// `P{count}+{total}` once a nag has been pushed, empty otherwise.
#[must_use]
pub fn push_summary_label(nag: &Nag) -> String {
    if nag.push.count == 0 || nag.push.total_ms <= 0 {
        return String::new();
    }
    format!("P{}+{}", nag.push.count, format_compact(nag.push.total_ms))
}
