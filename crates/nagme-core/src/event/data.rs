//! Typed payloads for each [`EventKind`].
//!
//! Every payload keeps unrecognised keys in an `extra` map instead of
//! rejecting them at parse time. Replay treats a non-empty `extra` as a
//! malformed event, which confines the damage to the one nag it touches.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use super::types::EventKind;
use crate::model::{Nag, PushState, Recurrence, Status};

/// Typed payload for a nag event.
///
/// `EventData` serializes by delegating to the inner struct and has no
/// `Deserialize` impl of its own; use [`EventData::deserialize_for`] with
/// the known [`EventKind`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    Create(NagPatch),
    Update(NagPatch),
    Complete(CompleteData),
    Delete(DeleteData),
    Push(PushData),
}

impl EventData {
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Create(_) => EventKind::Create,
            Self::Update(_) => EventKind::Update,
            Self::Complete(_) => EventKind::Complete,
            Self::Delete(_) => EventKind::Delete,
            Self::Push(_) => EventKind::Push,
        }
    }

    /// Deserialize a JSON value into the variant matching `kind`.
    ///
    /// # Errors
    ///
    /// Returns a [`DataParseError`] if the JSON does not match the payload
    /// shape for `kind`.
    pub fn deserialize_for(kind: EventKind, json: Value) -> Result<Self, DataParseError> {
        let result = match kind {
            EventKind::Create => serde_json::from_value::<NagPatch>(json).map(Self::Create),
            EventKind::Update => serde_json::from_value::<NagPatch>(json).map(Self::Update),
            EventKind::Complete => serde_json::from_value::<CompleteData>(json).map(Self::Complete),
            EventKind::Delete => serde_json::from_value::<DeleteData>(json).map(Self::Delete),
            EventKind::Push => serde_json::from_value::<PushData>(json).map(Self::Push),
        };
        result.map_err(|source| DataParseError { kind, source })
    }

    /// Unknown keys carried by the payload, if any.
    #[must_use]
    pub const fn extra(&self) -> &BTreeMap<String, Value> {
        match self {
            Self::Create(d) | Self::Update(d) => &d.extra,
            Self::Complete(d) => &d.extra,
            Self::Delete(d) => &d.extra,
            Self::Push(d) => &d.extra,
        }
    }
}

impl Serialize for EventData {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Create(d) | Self::Update(d) => d.serialize(serializer),
            Self::Complete(d) => d.serialize(serializer),
            Self::Delete(d) => d.serialize(serializer),
            Self::Push(d) => d.serialize(serializer),
        }
    }
}

/// Error returned when an event payload does not match its kind.
#[derive(Debug, thiserror::Error)]
#[error("invalid {kind} payload: {source}")]
pub struct DataParseError {
    pub kind: EventKind,
    #[source]
    pub source: serde_json::Error,
}

/// Serde adapter for `Option<Option<T>>`: a missing key leaves the field
/// untouched, an explicit `null` clears it.
mod nullable {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[allow(clippy::ref_option, clippy::option_option)]
    pub fn serialize<S, T>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: Serialize,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    #[allow(clippy::option_option)]
    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}

// ---------------------------------------------------------------------------
// NagPatch
// ---------------------------------------------------------------------------

/// Field changes carried by `nag.create` and `nag.update`.
///
/// `None` leaves a field alone. For clearable fields `Some(None)` clears it.
#[allow(clippy::option_option)]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NagPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub project: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub due_ms: Option<Option<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub recurrence: Option<Option<Recurrence>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub progress: Option<Option<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub last_completed_ms: Option<Option<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lateness_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub icon: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "nullable")]
    pub visible_days_before_due: Option<Option<u32>>,
    /// Absolute push state, as written by older clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push: Option<PushState>,
    /// Replaces the completed-occurrence set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_occurrences: Option<BTreeSet<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at_ms: Option<i64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl NagPatch {
    /// Structural checks that do not depend on the nag being patched.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason for the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if !self.extra.is_empty() {
            let keys: Vec<&str> = self.extra.keys().map(String::as_str).collect();
            return Err(format!("unknown field(s): {}", keys.join(", ")));
        }
        if self.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err("title must not be blank".to_string());
        }
        if let Some(Some(recurrence)) = &self.recurrence {
            recurrence.validate()?;
        }
        if let Some(Some(progress)) = self.progress
            && !(0.0..=1.0).contains(&progress)
        {
            return Err(format!("progress {progress} is outside 0..=1"));
        }
        if self.weight.is_some_and(|w| w > 100) {
            return Err("weight must be within 0..=100".to_string());
        }
        if self.lateness_days == Some(0) {
            return Err("lateness_days must be at least 1".to_string());
        }
        if let Some(push) = &self.push
            && (push.offset_ms < 0 || push.total_ms < 0)
        {
            return Err("push offsets must not be negative".to_string());
        }
        Ok(())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Every field of `nag`. Applied to a fresh nag with the same id it
    /// rebuilds `nag`, except for `updated_at_ms`.
    #[must_use]
    pub fn snapshot(nag: &Nag) -> Self {
        Self {
            title: Some(nag.title.clone()),
            bucket: Some(nag.bucket.clone()),
            project: Some(nag.project.clone()),
            due_ms: Some(nag.due_ms),
            recurrence: Some(nag.recurrence.clone()),
            progress: Some(nag.progress),
            last_completed_ms: Some(nag.last_completed_ms),
            status: Some(nag.status),
            weight: Some(u32::from(nag.weight)),
            lateness_days: Some(nag.lateness_days),
            notifications: Some(nag.notifications),
            icon: Some(nag.icon.clone()),
            visible_days_before_due: Some(nag.visible_days_before_due),
            push: Some(nag.push),
            completed_occurrences: Some(nag.completed_occurrences.clone()),
            created_at_ms: Some(nag.created_at_ms),
            extra: BTreeMap::new(),
        }
    }

    /// Whether every field is set, as in a [`NagPatch::snapshot`].
    #[must_use]
    pub const fn is_snapshot(&self) -> bool {
        self.title.is_some()
            && self.bucket.is_some()
            && self.project.is_some()
            && self.due_ms.is_some()
            && self.recurrence.is_some()
            && self.progress.is_some()
            && self.last_completed_ms.is_some()
            && self.status.is_some()
            && self.weight.is_some()
            && self.lateness_days.is_some()
            && self.notifications.is_some()
            && self.icon.is_some()
            && self.visible_days_before_due.is_some()
            && self.push.is_some()
            && self.completed_occurrences.is_some()
            && self.created_at_ms.is_some()
    }
}

// ---------------------------------------------------------------------------
// Complete / Delete / Push
// ---------------------------------------------------------------------------

/// Payload for `nag.complete`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteData {
    /// The occurrence being completed; defaults to the current due.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrence_ms: Option<i64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Payload for `nag.delete`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Payload for `nag.push`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushData {
    pub by_ms: i64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl PushData {
    #[must_use]
    pub const fn new(by_ms: i64) -> Self {
        Self {
            by_ms,
            extra: BTreeMap::new(),
        }
    }
}
