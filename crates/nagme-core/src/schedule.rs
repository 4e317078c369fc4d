//! Due windows: where a nag's current (or upcoming) occurrence sits in time.

use serde::Serialize;

use crate::model::{DAY_MS, Nag};

/// Upper bound on windows produced by [`due_windows_in_range`].
pub const MAX_WINDOWS: usize = 600;

/// The stretch of time leading up to one due instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DueWindow {
    /// Where the progress ramp starts (creation or the previous occurrence).
    pub start_ms: i64,
    /// Effective due: source due plus push offset.
    pub due_ms: i64,
    /// Due before the push offset; identifies the occurrence.
    pub source_due_ms: i64,
}

/// The occurrence a recurring nag is currently working towards.
///
/// A stored due wins. Otherwise the latest occurrence at or before `now_ms`
/// is used unless it was already completed, in which case the next
/// uncompleted one is.
#[must_use]
pub fn outstanding_occurrence(nag: &Nag, now_ms: i64) -> Option<i64> {
    let recurrence = nag.recurrence.as_ref()?;
    if let Some(due) = nag.due_ms {
        return Some(due);
    }
    let mut candidate = recurrence
        .occurrence_at_or_before(now_ms)
        .or_else(|| recurrence.next_occurrence_at_or_after(now_ms))?;
    for _ in 0..MAX_WINDOWS {
        if !nag.is_occurrence_completed(candidate) {
            return Some(candidate);
        }
        candidate = recurrence.next_occurrence_after(candidate)?;
    }
    None
}

/// The window a nag is measured against at `now_ms`.
///
/// One-time nags ramp from creation to their due. Recurring nags ramp from
/// the previous occurrence (or creation, whichever is later) to the
/// outstanding one.
#[must_use]
pub fn resolve_due_window(nag: &Nag, now_ms: i64) -> Option<DueWindow> {
    let Some(recurrence) = &nag.recurrence else {
        let source = nag.due_ms?;
        return Some(DueWindow {
            start_ms: nag.created_at_ms.min(source),
            due_ms: source.saturating_add(nag.push.offset_ms),
            source_due_ms: source,
        });
    };
    let source = outstanding_occurrence(nag, now_ms)?;
    let previous = recurrence.previous_occurrence_before(source);
    Some(window_for(nag, source, previous))
}

fn window_for(nag: &Nag, source: i64, previous: Option<i64>) -> DueWindow {
    let start = previous
        .map_or(nag.created_at_ms, |p| p.max(nag.created_at_ms))
        .min(source);
    DueWindow {
        start_ms: start,
        due_ms: source.saturating_add(nag.push.offset_ms),
        source_due_ms: source,
    }
}

/// Every uncompleted window whose effective due falls in `[from_ms, to_ms]`.
///
/// One-time nags yield their single window when it falls in range. The
/// search stops after [`MAX_WINDOWS`] windows.
#[must_use]
pub fn due_windows_in_range(nag: &Nag, from_ms: i64, to_ms: i64) -> Vec<DueWindow> {
    let Some(recurrence) = &nag.recurrence else {
        return resolve_due_window(nag, from_ms)
            .filter(|w| w.due_ms <= to_ms)
            .into_iter()
            .collect();
    };

    let mut windows = Vec::new();
    let mut cursor = recurrence.next_occurrence_at_or_after(from_ms);
    let mut previous = cursor.and_then(|c| recurrence.previous_occurrence_before(c));
    while let Some(occurrence) = cursor {
        if windows.len() >= MAX_WINDOWS {
            break;
        }
        let window = window_for(nag, occurrence, previous);
        if window.due_ms > to_ms {
            break;
        }
        if !nag.is_occurrence_completed(occurrence) {
            windows.push(window);
        }
        previous = Some(occurrence);
        cursor = recurrence.next_occurrence_after(occurrence);
    }
    windows
}

/// Whether a recurring window is close enough to show.
///
/// Nags with `visible_days_before_due` stay hidden until that many days
/// before their effective due.
#[must_use]
pub fn is_window_visible(nag: &Nag, window: &DueWindow, now_ms: i64) -> bool {
    match nag.visible_days_before_due {
        Some(days) if nag.is_recurring() => {
            let lead = i64::from(days).saturating_mul(DAY_MS);
            window.due_ms.saturating_sub(lead) <= now_ms
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NagId, Recurrence};

    fn nag() -> Nag {
        Nag::new(NagId::new("n").expect("id"), "N", 0)
    }

    #[test]
    fn one_time_window_spans_creation_to_due() {
        let mut n = nag();
        n.created_at_ms = 100;
        n.due_ms = Some(1_000);
        n.push.push(50);
        let w = resolve_due_window(&n, 500).expect("window");
        assert_eq!(
            w,
            DueWindow {
                start_ms: 100,
                due_ms: 1_050,
                source_due_ms: 1_000
            }
        );
    }

    #[test]
    fn no_due_means_no_window() {
        assert_eq!(resolve_due_window(&nag(), 0), None);
    }

    #[test]
    fn recurring_window_uses_previous_occurrence() {
        let mut n = nag();
        n.recurrence = Some(Recurrence::every(10, 0, 5));
        let w = resolve_due_window(&n, 23).expect("window");
        assert_eq!(w.source_due_ms, 20);
        assert_eq!(w.start_ms, 10);

        n.due_ms = Some(40);
        let w = resolve_due_window(&n, 23).expect("window");
        assert_eq!((w.start_ms, w.due_ms), (30, 40));
    }

    #[test]
    fn completed_occurrences_are_skipped() {
        let mut n = nag();
        n.recurrence = Some(Recurrence::every(10, 0, 5));
        n.record_completed_occurrence(20);
        assert_eq!(outstanding_occurrence(&n, 23), Some(30));

        let windows = due_windows_in_range(&n, 15, 50);
        let dues: Vec<i64> = windows.iter().map(|w| w.source_due_ms).collect();
        assert_eq!(dues, vec![30, 40, 50]);
    }

    #[test]
    fn range_search_is_bounded() {
        let mut n = nag();
        n.recurrence = Some(Recurrence::every(1, 0, 1));
        assert_eq!(due_windows_in_range(&n, 0, 1_000_000).len(), MAX_WINDOWS);
    }

    #[test]
    fn visibility_lead_only_applies_to_recurring() {
        let mut n = nag();
        n.visible_days_before_due = Some(2);
        let w = DueWindow {
            start_ms: 0,
            due_ms: 10 * DAY_MS,
            source_due_ms: 10 * DAY_MS,
        };
        assert!(is_window_visible(&n, &w, 0));
        n.recurrence = Some(Recurrence::every(DAY_MS * 30, 0, DAY_MS));
        assert!(!is_window_visible(&n, &w, 7 * DAY_MS));
        assert!(is_window_visible(&n, &w, 8 * DAY_MS));
    }
}
