//! Where nag state comes from.
//!
//! [`Gateway`] is the seam to the hosted backend. [`load_current_state`]
//! is the one entry point the UI uses: direct rows first, the event log
//! plus replay when direct rows are missing or empty. [`commit_event`] is
//! the matching write path.
//!
//! [`RequestGenerations`] guards background fetches so a slow, superseded
//! request can never overwrite newer data.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, info};

use crate::error::NagError;
use crate::event::NagEvent;
use crate::model::{Nag, NagId, Status};
use crate::replay::{MalformedEvent, apply_event, reconstruct};

/// An authenticated session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub user_id: String,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Request/response contract of the hosted data store.
pub trait Gateway {
    /// # Errors
    /// [`NagError::Auth`] for rejected credentials.
    fn authenticate(&self, email: &str, password: &str) -> Result<Session, NagError>;

    /// # Errors
    /// [`NagError::NotFound`] when the direct-state collection does not exist.
    fn fetch_direct_rows(&self, session: &Session) -> Result<Vec<Nag>, NagError>;

    /// # Errors
    /// [`NagError::NotFound`] when no event collection exists.
    fn fetch_events(&self, session: &Session) -> Result<Vec<NagEvent>, NagError>;

    /// # Errors
    /// [`NagError::Permission`] when the backend rejects the write.
    fn write_event(&self, session: &Session, event: &NagEvent) -> Result<(), NagError>;

    /// # Errors
    /// [`NagError::Permission`] when the backend rejects the delete.
    fn delete_entity(&self, session: &Session, id: &NagId) -> Result<(), NagError>;

    /// Insert or replace the direct-state row for `nag`.
    ///
    /// # Errors
    /// [`NagError::NotFound`] when the direct-state collection does not
    /// exist, [`NagError::Permission`] when the backend rejects the write.
    fn upsert_direct_row(&self, session: &Session, nag: &Nag) -> Result<(), NagError>;

    /// # Errors
    /// [`NagError::Auth`] when the backend rejects the new password or the
    /// session.
    fn change_password(&self, session: &Session, new_password: &str) -> Result<(), NagError>;
}

/// Which collection produced a [`CurrentState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StateSource {
    Direct { rows: usize },
    Events { events: usize },
    /// Both collections were empty (or the event one missing).
    Empty,
}

impl fmt::Display for StateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct { rows } => write!(f, "direct rows ({rows})"),
            Self::Events { events } => write!(f, "event replay ({events} events)"),
            Self::Empty => f.write_str("empty"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurrentState {
    pub nags: BTreeMap<NagId, Nag>,
    pub failures: BTreeMap<NagId, MalformedEvent>,
    pub source: StateSource,
}

impl CurrentState {
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            nags: BTreeMap::new(),
            failures: BTreeMap::new(),
            source: StateSource::Empty,
        }
    }
}

/// First step of the load strategy, decided from the direct-row result alone.
#[derive(Debug)]
pub enum FallbackPlan {
    UseDirect(Vec<Nag>),
    /// Read the event log. `direct_missing` is true when the direct
    /// collection does not exist at all (as opposed to being empty).
    UseEvents { direct_missing: bool },
}

/// Decide what to do with the direct-row result.
///
/// # Errors
///
/// Any error other than [`NagError::NotFound`] is returned unchanged.
pub fn plan_fallback(direct: Result<Vec<Nag>, NagError>) -> Result<FallbackPlan, NagError> {
    match direct {
        Ok(rows) if rows.is_empty() => Ok(FallbackPlan::UseEvents {
            direct_missing: false,
        }),
        Ok(rows) => Ok(FallbackPlan::UseDirect(rows)),
        Err(NagError::NotFound(what)) => {
            debug!(collection = %what, "direct collection missing, falling back to events");
            Ok(FallbackPlan::UseEvents {
                direct_missing: true,
            })
        }
        Err(other) => Err(other),
    }
}

/// Load the current nag map: direct rows, or the replayed event log.
///
/// # Errors
///
/// Transport, auth and permission errors from either step. `NotFound` is
/// only returned when neither collection exists.
pub fn load_current_state<G>(gateway: &G, session: &Session) -> Result<CurrentState, NagError>
where
    G: Gateway + ?Sized,
{
    match plan_fallback(gateway.fetch_direct_rows(session))? {
        FallbackPlan::UseDirect(rows) => Ok(state_from_rows(rows)),
        FallbackPlan::UseEvents { direct_missing } => match gateway.fetch_events(session) {
            Ok(events) if events.is_empty() => Ok(CurrentState::empty()),
            Ok(events) => Ok(state_from_events(&events)),
            Err(NagError::NotFound(_)) if !direct_missing => Ok(CurrentState::empty()),
            Err(err) => Err(err),
        },
    }
}

/// Key direct rows by id. When an id repeats, the most recently updated row
/// wins, with a deleted row winning a tie. Ids whose winning row is marked
/// deleted are dropped.
#[must_use]
pub fn state_from_rows(rows: Vec<Nag>) -> CurrentState {
    let count = rows.len();
    let mut latest: BTreeMap<NagId, Nag> = BTreeMap::new();
    for row in rows {
        let newer = latest.get(&row.id).is_none_or(|existing| {
            (row.updated_at_ms, row.status == Status::Deleted)
                >= (existing.updated_at_ms, existing.status == Status::Deleted)
        });
        if newer {
            latest.insert(row.id.clone(), row);
        }
    }
    let nags: BTreeMap<NagId, Nag> = latest
        .into_iter()
        .filter(|(_, nag)| nag.status != Status::Deleted)
        .collect();
    info!(rows = count, nags = nags.len(), "loaded direct rows");
    CurrentState {
        nags,
        failures: BTreeMap::new(),
        source: StateSource::Direct { rows: count },
    }
}

#[must_use]
pub fn state_from_events(events: &[NagEvent]) -> CurrentState {
    let rebuilt = reconstruct(events);
    info!(
        events = events.len(),
        nags = rebuilt.nags.len(),
        failures = rebuilt.failures.len(),
        "rebuilt state from event log"
    );
    CurrentState {
        nags: rebuilt.nags,
        failures: rebuilt.failures,
        source: StateSource::Events {
            events: events.len(),
        },
    }
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Append `event` and bring the direct-state row in line with it.
///
/// `current` is the nag as the caller last saw it and `source` is where
/// that view came from. The event is applied to `current` before anything
/// is sent, so a malformed write never leaves the machine. After the event
/// is stored:
///
/// - a nag that still exists has its direct row replaced, but only when the
///   view was read from direct rows (otherwise one new row would hide every
///   nag the event log holds);
/// - a removed nag has its direct row deleted; a missing row or collection
///   is fine.
///
/// Returns the nag as it looks after the event.
///
/// # Errors
///
/// [`NagError::MalformedEvent`] before anything is written, then any
/// gateway failure.
pub fn commit_event<G>(
    gateway: &G,
    session: &Session,
    event: &NagEvent,
    current: Option<Nag>,
    source: StateSource,
) -> Result<Option<Nag>, NagError>
where
    G: Gateway + ?Sized,
{
    let after = apply_event(current, event).map_err(|source| NagError::MalformedEvent {
        nag_id: event.nag_id.clone(),
        source,
    })?;
    gateway.write_event(session, event)?;

    match &after {
        Some(nag) if matches!(source, StateSource::Direct { .. }) => {
            gateway.upsert_direct_row(session, nag)?;
            debug!(nag = %nag.id, "direct row replaced");
        }
        Some(_) => {}
        None => match gateway.delete_entity(session, &event.nag_id) {
            Ok(()) => debug!(nag = %event.nag_id, "direct row deleted"),
            Err(NagError::NotFound(what)) => debug!(%what, "no direct row to delete"),
            Err(err) => return Err(err),
        },
    }
    Ok(after)
}

// ---------------------------------------------------------------------------
// Request generations
// ---------------------------------------------------------------------------

/// Monotonic tag carried by each background fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Hands out generations and accepts only results from the latest one.
#[derive(Debug, Default)]
pub struct RequestGenerations {
    latest: u64,
}

impl RequestGenerations {
    #[must_use]
    pub const fn new() -> Self {
        Self { latest: 0 }
    }

    /// Start a request; every earlier generation becomes stale.
    pub const fn begin(&mut self) -> Generation {
        self.latest += 1;
        Generation(self.latest)
    }

    /// Abandon whatever is in flight without starting a new request.
    pub const fn invalidate(&mut self) {
        self.latest += 1;
    }

    #[must_use]
    pub const fn is_current(&self, generation: Generation) -> bool {
        generation.0 == self.latest
    }

    /// Gate a finished result.
    ///
    /// # Errors
    ///
    /// [`NagError::StaleResult`] when a newer request has started since.
    pub fn accept<T>(&self, generation: Generation, result: T) -> Result<T, NagError> {
        if self.is_current(generation) {
            Ok(result)
        } else {
            debug!(generation = generation.0, latest = self.latest, "discarding stale result");
            Err(NagError::StaleResult {
                generation: generation.0,
                latest: self.latest,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use crate::event::{DeleteData, EventData, NagPatch};

    #[test]
    fn plan_prefers_non_empty_direct_rows() {
        let row = Nag::new(NagId::new("a").expect("id"), "A", 0);
        assert!(matches!(
            plan_fallback(Ok(vec![row])),
            Ok(FallbackPlan::UseDirect(rows)) if rows.len() == 1
        ));
        assert!(matches!(
            plan_fallback(Ok(Vec::new())),
            Ok(FallbackPlan::UseEvents { direct_missing: false })
        ));
        assert!(matches!(
            plan_fallback(Err(NagError::NotFound("nag_state".into()))),
            Ok(FallbackPlan::UseEvents { direct_missing: true })
        ));
        assert!(matches!(
            plan_fallback(Err(NagError::Auth("expired".into()))),
            Err(NagError::Auth(_))
        ));
    }

    #[test]
    fn deleted_and_older_duplicate_rows_are_dropped() {
        let id = NagId::new("a").expect("id");
        let mut old = Nag::new(id.clone(), "old", 0);
        old.updated_at_ms = 1;
        let mut new = Nag::new(id.clone(), "new", 0);
        new.updated_at_ms = 2;
        let mut gone = Nag::new(NagId::new("b").expect("id"), "gone", 0);
        gone.status = Status::Deleted;

        let state = state_from_rows(vec![new, old, gone]);
        assert_eq!(state.nags.len(), 1);
        assert_eq!(state.nags[&id].title, "new");
        assert_eq!(state.source, StateSource::Direct { rows: 3 });
    }

    /// Records every call; the direct collection can be switched off.
    #[derive(Default)]
    struct MemoryGateway {
        direct: RefCell<BTreeMap<NagId, Nag>>,
        events: RefCell<Vec<NagEvent>>,
        direct_missing: bool,
    }

    impl Gateway for MemoryGateway {
        fn authenticate(&self, _: &str, _: &str) -> Result<Session, NagError> {
            Ok(session())
        }

        fn fetch_direct_rows(&self, _: &Session) -> Result<Vec<Nag>, NagError> {
            if self.direct_missing {
                return Err(NagError::NotFound("nag_state".into()));
            }
            Ok(self.direct.borrow().values().cloned().collect())
        }

        fn fetch_events(&self, _: &Session) -> Result<Vec<NagEvent>, NagError> {
            Ok(self.events.borrow().clone())
        }

        fn write_event(&self, _: &Session, event: &NagEvent) -> Result<(), NagError> {
            self.events.borrow_mut().push(event.clone());
            Ok(())
        }

        fn delete_entity(&self, _: &Session, id: &NagId) -> Result<(), NagError> {
            if self.direct_missing {
                return Err(NagError::NotFound("nag_state".into()));
            }
            self.direct.borrow_mut().remove(id);
            Ok(())
        }

        fn upsert_direct_row(&self, _: &Session, nag: &Nag) -> Result<(), NagError> {
            if self.direct_missing {
                return Err(NagError::NotFound("nag_state".into()));
            }
            self.direct.borrow_mut().insert(nag.id.clone(), nag.clone());
            Ok(())
        }

        fn change_password(&self, _: &Session, _: &str) -> Result<(), NagError> {
            Ok(())
        }
    }

    fn session() -> Session {
        Session {
            access_token: "t".into(),
            user_id: "u".into(),
        }
    }

    fn weight_update(nag: &NagId, ts_ms: i64, weight: u32) -> NagEvent {
        NagEvent::new(
            format!("w{ts_ms}"),
            nag.clone(),
            ts_ms,
            EventData::Update(NagPatch {
                weight: Some(weight),
                ..NagPatch::default()
            }),
        )
    }

    #[test]
    fn writes_show_up_when_direct_rows_are_in_use() {
        let id = NagId::new("n").expect("id");
        let gateway = MemoryGateway::default();
        gateway
            .direct
            .borrow_mut()
            .insert(id.clone(), Nag::new(id.clone(), "N", 0));

        let state = load_current_state(&gateway, &session()).expect("load");
        let current = state.nags.get(&id).cloned();
        let after = commit_event(&gateway, &session(), &weight_update(&id, 10, 90), current, state.source)
            .expect("commit")
            .expect("live");
        assert_eq!(after.weight, 90);
        assert_eq!(gateway.events.borrow().len(), 1);

        let reloaded = load_current_state(&gateway, &session()).expect("reload");
        assert!(matches!(reloaded.source, StateSource::Direct { .. }));
        assert_eq!(reloaded.nags[&id].weight, 90);
    }

    #[test]
    fn event_backed_views_leave_the_direct_collection_alone() {
        let id = NagId::new("n").expect("id");
        let gateway = MemoryGateway::default();
        gateway.events.borrow_mut().push(NagEvent::new(
            "c",
            id.clone(),
            0,
            EventData::Create(NagPatch::default()),
        ));

        let state = load_current_state(&gateway, &session()).expect("load");
        assert!(matches!(state.source, StateSource::Events { .. }));
        let current = state.nags.get(&id).cloned();
        commit_event(&gateway, &session(), &weight_update(&id, 10, 90), current, state.source)
            .expect("commit");
        assert!(gateway.direct.borrow().is_empty());

        let reloaded = load_current_state(&gateway, &session()).expect("reload");
        assert_eq!(reloaded.nags[&id].weight, 90);
    }

    #[test]
    fn deletes_drop_the_direct_row_even_without_a_direct_collection() {
        let id = NagId::new("n").expect("id");
        let delete = NagEvent::new("d", id.clone(), 10, EventData::Delete(DeleteData::default()));

        let gateway = MemoryGateway::default();
        gateway
            .direct
            .borrow_mut()
            .insert(id.clone(), Nag::new(id.clone(), "N", 0));
        let current = Some(Nag::new(id.clone(), "N", 0));
        let after = commit_event(&gateway, &session(), &delete, current, StateSource::Direct { rows: 1 })
            .expect("commit");
        assert!(after.is_none());
        assert!(gateway.direct.borrow().is_empty());

        let missing = MemoryGateway {
            direct_missing: true,
            ..MemoryGateway::default()
        };
        commit_event(&missing, &session(), &delete, None, StateSource::Events { events: 1 })
            .expect("missing direct collection is fine");
        assert_eq!(missing.events.borrow().len(), 1);
    }

    #[test]
    fn malformed_writes_are_refused_before_sending() {
        let id = NagId::new("n").expect("id");
        let gateway = MemoryGateway::default();
        let event = weight_update(&id, 10, 500);
        let err = commit_event(&gateway, &session(), &event, None, StateSource::Empty)
            .expect_err("weight out of range");
        assert!(matches!(err, NagError::MalformedEvent { .. }));
        assert!(gateway.events.borrow().is_empty());
    }

    #[test]
    fn newer_deleted_row_hides_an_older_live_one() {
        let id = NagId::new("x").expect("id");
        let mut live = Nag::new(id.clone(), "live", 0);
        live.updated_at_ms = 5;
        let mut deleted = Nag::new(id.clone(), "live", 0);
        deleted.updated_at_ms = 10;
        deleted.status = Status::Deleted;

        assert!(state_from_rows(vec![live.clone(), deleted.clone()]).nags.is_empty());
        assert!(state_from_rows(vec![deleted.clone(), live.clone()]).nags.is_empty());

        let mut revived = live;
        revived.updated_at_ms = 11;
        let state = state_from_rows(vec![deleted, revived]);
        assert_eq!(state.nags[&id].updated_at_ms, 11);
    }

    #[test]
    fn session_debug_redacts_token() {
        let session = Session {
            access_token: "secret-token".into(),
            user_id: "u1".into(),
        };
        let text = format!("{session:?}");
        assert!(!text.contains("secret-token"));
        assert!(text.contains("u1"));
    }

    #[test]
    fn only_latest_generation_is_accepted() {
        let mut generations = RequestGenerations::new();
        let first = generations.begin();
        let second = generations.begin();
        assert!(matches!(
            generations.accept(first, "old"),
            Err(NagError::StaleResult { generation: 1, latest: 2 })
        ));
        assert_eq!(generations.accept(second, "new").ok(), Some("new"));

        generations.invalidate();
        assert!(!generations.is_current(second));
    }
}
