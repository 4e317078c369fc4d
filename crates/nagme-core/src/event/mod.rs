//! Event data model for the nag history log.
//!
//! A [`NagEvent`] is one immutable change to one nag. The remote log is
//! unordered; [`crate::replay`] sorts and folds events into state.
//!
//! # JSON form
//!
//! ```text
//! {"event_id": "...", "nag_id": "...", "kind": "nag.update", "ts_ms": 1718000000000, "data": {...}}
//! ```

pub mod data;
pub mod types;

pub use data::{CompleteData, DataParseError, DeleteData, EventData, NagPatch, PushData};
pub use types::{EventKind, UnknownEventKind};

use crate::model::NagId;
use serde::{Deserialize, Serialize};

/// A single event in a nag's history.
///
/// # Serde
///
/// The custom `Deserialize` reads `kind` first and uses it to pick the
/// payload type for `data`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NagEvent {
    /// Unique per event; breaks ties between events with the same timestamp.
    pub event_id: String,
    pub nag_id: NagId,
    pub kind: EventKind,
    /// Epoch milliseconds.
    pub ts_ms: i64,
    pub data: EventData,
}

impl<'de> Deserialize<'de> for NagEvent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct NagEventRaw {
            event_id: String,
            nag_id: NagId,
            kind: EventKind,
            ts_ms: i64,
            #[serde(default)]
            data: serde_json::Value,
        }

        let raw = NagEventRaw::deserialize(deserializer)?;
        let data_json = if raw.data.is_null() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            raw.data
        };
        let data =
            EventData::deserialize_for(raw.kind, data_json).map_err(serde::de::Error::custom)?;

        Ok(Self {
            event_id: raw.event_id,
            nag_id: raw.nag_id,
            kind: raw.kind,
            ts_ms: raw.ts_ms,
            data,
        })
    }
}

impl NagEvent {
    /// Build an event whose kind follows from its payload.
    #[must_use]
    pub fn new(event_id: impl Into<String>, nag_id: NagId, ts_ms: i64, data: EventData) -> Self {
        Self {
            event_id: event_id.into(),
            nag_id,
            kind: data.kind(),
            ts_ms,
            data,
        }
    }
}

impl std::fmt::Display for NagEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}",
            self.ts_ms, self.kind, self.nag_id, self.event_id
        )
    }
}
