//! Event replay: fold an unordered event log into current nag snapshots.
//!
//! # Ordering
//!
//! Events are grouped by nag id and sorted by
//! `(ts_ms, kind rank, event_id, arrival index)`. The first three keys come
//! from the events themselves, so any permutation of the same event set
//! produces the same order. Kind rank puts a delete after everything else at
//! its instant, so only strictly later events can bring a nag back. Arrival
//! index only separates exact duplicates, which fold identically anyway.
//!
//! # Fold
//!
//! The fold for one nag starts from "absent":
//!
//! - `create` initializes a fresh snapshot, even over a live one.
//! - `update`, `complete` and `push` patch the snapshot. On an absent nag the
//!   event acts as an implicit create (id as title, default bucket,
//!   `created_at_ms` = event time).
//! - `delete` returns the nag to absent; later events may bring it back. A
//!   patch that sets `status: deleted` does the same.
//!
//! A malformed event fails the whole nag. The nag lands in
//! [`Reconstruction::failures`]; every other nag is unaffected.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::event::{CompleteData, EventData, EventKind, NagEvent, NagPatch};
use crate::model::{DEFAULT_BUCKET, DEFAULT_PROJECT_NAME, Nag, NagId, Status};

/// Why one nag could not be rebuilt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("event {event_id} ({kind} at {ts_ms}): {reason}")]
pub struct MalformedEvent {
    pub event_id: String,
    pub kind: EventKind,
    pub ts_ms: i64,
    pub reason: String,
}

impl MalformedEvent {
    fn new(event: &NagEvent, reason: impl Into<String>) -> Self {
        Self {
            event_id: event.event_id.clone(),
            kind: event.kind,
            ts_ms: event.ts_ms,
            reason: reason.into(),
        }
    }
}

/// Output of [`reconstruct`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconstruction {
    /// Live nags, keyed by id. Deleted nags are absent.
    pub nags: BTreeMap<NagId, Nag>,
    /// Nags whose history contains an event that could not be applied.
    pub failures: BTreeMap<NagId, MalformedEvent>,
}

/// Rebuild every nag mentioned in `events`.
///
/// Pure: the result depends only on the set of events given, not on their
/// order or on anything outside the call.
pub fn reconstruct<'a, I>(events: I) -> Reconstruction
where
    I: IntoIterator<Item = &'a NagEvent>,
{
    let mut grouped: BTreeMap<&NagId, Vec<(usize, &NagEvent)>> = BTreeMap::new();
    for (arrival, event) in events.into_iter().enumerate() {
        grouped
            .entry(&event.nag_id)
            .or_default()
            .push((arrival, event));
    }

    let mut out = Reconstruction::default();
    for (id, mut group) in grouped {
        sort_for_replay(&mut group);
        let ordered: Vec<&NagEvent> = group.into_iter().map(|(_, e)| e).collect();
        match fold_nag(&ordered) {
            Ok(Some(nag)) => {
                debug!(nag = %id, events = ordered.len(), status = %nag.status, "replayed nag");
                out.nags.insert(id.clone(), nag);
            }
            Ok(None) => {
                debug!(nag = %id, events = ordered.len(), "nag deleted by history");
            }
            Err(failure) => {
                warn!(nag = %id, error = %failure, "skipping nag with malformed history");
                out.failures.insert(id.clone(), failure);
            }
        }
    }
    out
}

/// Sort one nag's events into replay order.
pub fn sort_for_replay(events: &mut [(usize, &NagEvent)]) {
    events.sort_by(|(arrival_a, a), (arrival_b, b)| {
        a.ts_ms
            .cmp(&b.ts_ms)
            .then_with(|| a.kind.replay_rank().cmp(&b.kind.replay_rank()))
            .then_with(|| a.event_id.cmp(&b.event_id))
            .then_with(|| arrival_a.cmp(arrival_b))
    });
}

/// Fold events that are already in replay order.
///
/// Returns `Ok(None)` when the last effective event was a delete.
///
/// # Errors
///
/// Returns the first [`MalformedEvent`] encountered; nothing from the fold is
/// kept in that case.
pub fn fold_nag(ordered: &[&NagEvent]) -> Result<Option<Nag>, MalformedEvent> {
    ordered
        .iter()
        .try_fold(None, |state, event| apply_event(state, event))
}

/// Apply one event to the current fold state.
///
/// # Errors
///
/// Returns [`MalformedEvent`] when the payload cannot be applied.
pub fn apply_event(state: Option<Nag>, event: &NagEvent) -> Result<Option<Nag>, MalformedEvent> {
    if let Some(keys) = unknown_keys(&event.data) {
        return Err(MalformedEvent::new(event, format!("unknown field(s): {keys}")));
    }

    let next = match &event.data {
        EventData::Create(patch) => {
            patch.validate().map_err(|r| MalformedEvent::new(event, r))?;
            let created = patch.created_at_ms.unwrap_or(event.ts_ms);
            let mut nag = Nag::new(event.nag_id.clone(), event.nag_id.as_str(), created);
            apply_patch(&mut nag, patch);
            if patch.status.is_none() {
                nag.status = Status::Active;
            }
            nag
        }
        EventData::Update(patch) => {
            patch.validate().map_err(|r| MalformedEvent::new(event, r))?;
            let mut nag = state.unwrap_or_else(|| implicit_create(event));
            apply_patch(&mut nag, patch);
            nag
        }
        EventData::Complete(data) => {
            let mut nag = state.unwrap_or_else(|| implicit_create(event));
            apply_complete(&mut nag, data, event.ts_ms);
            nag
        }
        EventData::Push(data) => {
            if data.by_ms <= 0 {
                return Err(MalformedEvent::new(
                    event,
                    format!("push duration must be positive, got {}ms", data.by_ms),
                ));
            }
            let mut nag = state.unwrap_or_else(|| implicit_create(event));
            nag.push.push(data.by_ms);
            nag
        }
        EventData::Delete(_) => return Ok(None),
    };

    // A patch that sets the deleted status removes the nag like a delete.
    if next.status == Status::Deleted {
        return Ok(None);
    }
    let mut nag = next;
    nag.updated_at_ms = nag.updated_at_ms.max(event.ts_ms);
    Ok(Some(nag))
}

fn unknown_keys(data: &EventData) -> Option<String> {
    let extra = data.extra();
    if extra.is_empty() {
        return None;
    }
    Some(extra.keys().map(String::as_str).collect::<Vec<_>>().join(", "))
}

fn implicit_create(event: &NagEvent) -> Nag {
    debug!(nag = %event.nag_id, kind = %event.kind, "implicit create from first event");
    Nag::new(event.nag_id.clone(), event.nag_id.as_str(), event.ts_ms)
}

/// Merge a validated patch into a snapshot. Absent fields stay untouched.
pub fn apply_patch(nag: &mut Nag, patch: &NagPatch) {
    if let Some(created) = patch.created_at_ms {
        nag.created_at_ms = created;
    }
    if let Some(title) = &patch.title {
        nag.title = title.trim().to_string();
    }
    if let Some(bucket) = &patch.bucket {
        let bucket = bucket.trim();
        nag.bucket = if bucket.is_empty() {
            DEFAULT_BUCKET.to_string()
        } else {
            bucket.to_string()
        };
    }
    if let Some(project) = &patch.project {
        nag.project = project
            .as_deref()
            .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|p| !p.is_empty());
    }
    if let Some(due) = patch.due_ms {
        nag.due_ms = due;
    }
    if let Some(recurrence) = &patch.recurrence {
        nag.recurrence = recurrence
            .clone()
            .map(|r| r.normalized(nag.created_at_ms));
    }
    if let Some(progress) = patch.progress {
        nag.progress = progress;
    }
    if let Some(last) = patch.last_completed_ms {
        nag.last_completed_ms = last;
    }
    if let Some(status) = patch.status {
        nag.status = status;
    }
    if let Some(weight) = patch.weight {
        nag.weight = u8::try_from(weight).unwrap_or(100);
    }
    if let Some(days) = patch.lateness_days {
        nag.lateness_days = days;
    }
    if let Some(enabled) = patch.notifications {
        nag.notifications = enabled;
    }
    if let Some(icon) = &patch.icon {
        nag.icon = icon.as_deref().map(str::trim).filter(|i| !i.is_empty()).map(str::to_string);
    }
    if let Some(days) = patch.visible_days_before_due {
        nag.visible_days_before_due = days.map(|d| d.max(1));
    }
    if let Some(push) = patch.push {
        nag.push = push;
    }
    if let Some(done) = &patch.completed_occurrences {
        nag.completed_occurrences.clear();
        for occurrence in done {
            nag.record_completed_occurrence(*occurrence);
        }
    }

    if nag.is_project() {
        if nag.project.is_none() {
            nag.project = Some(DEFAULT_PROJECT_NAME.to_string());
        }
    } else {
        nag.project = None;
    }
}

/// Mark a nag (or its current occurrence) done at `ts_ms`.
///
/// Recurring nags record the occurrence and move their due to the first
/// occurrence strictly after both the completion time and the current due.
/// The push offset belonged to the finished occurrence and is reset; the
/// push count and total are kept for the summary.
pub fn apply_complete(nag: &mut Nag, data: &CompleteData, ts_ms: i64) {
    nag.status = Status::Completed;
    nag.last_completed_ms = Some(ts_ms);

    let Some(recurrence) = nag.recurrence.clone() else {
        return;
    };
    let occurrence = data
        .occurrence_ms
        .or(nag.due_ms)
        .or_else(|| recurrence.occurrence_at_or_before(ts_ms));
    if let Some(occurrence) = occurrence {
        nag.record_completed_occurrence(occurrence);
    }

    let floor = [Some(ts_ms), nag.due_ms, occurrence]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(ts_ms);
    if let Some(next) = recurrence.next_occurrence_after(floor) {
        nag.due_ms = Some(next);
        nag.push.offset_ms = 0;
    }
}
