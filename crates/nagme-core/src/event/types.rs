//! Event kinds.
//!
//! The string form uses the dotted `nag.<verb>` convention.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The five kinds of nag event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    /// Create (or re-create) a nag.
    Create,
    /// Patch fields of a nag.
    Update,
    /// Mark the nag, or its current occurrence, done.
    Complete,
    /// Remove the nag.
    Delete,
    /// Push the due date further out.
    Push,
}

/// Error returned when parsing an unknown event kind string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventKind {
    /// The unrecognised input string.
    pub raw: String,
}

impl fmt::Display for UnknownEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown event kind '{}': expected one of nag.create, nag.update, \
             nag.complete, nag.delete, nag.push",
            self.raw
        )
    }
}

impl std::error::Error for UnknownEventKind {}

impl EventKind {
    pub const ALL: [Self; 5] = [
        Self::Create,
        Self::Update,
        Self::Complete,
        Self::Delete,
        Self::Push,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "nag.create",
            Self::Update => "nag.update",
            Self::Complete => "nag.complete",
            Self::Delete => "nag.delete",
            Self::Push => "nag.push",
        }
    }

    /// Position among events that share a timestamp and event id.
    ///
    /// Creates apply first and deletes last, so a same-instant batch never
    /// resurrects a nag it also removes.
    #[must_use]
    pub const fn replay_rank(self) -> u8 {
        match self {
            Self::Create => 0,
            Self::Update => 1,
            Self::Push => 2,
            Self::Complete => 3,
            Self::Delete => 4,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind { raw: s.to_string() })
    }
}

impl Serialize for EventKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_parses_back() {
        for kind in EventKind::ALL {
            assert_eq!(kind.as_str().parse::<EventKind>(), Ok(kind));
        }
    }

    #[test]
    fn unknown_kind_names_the_input() {
        let err = "nag.archive".parse::<EventKind>().expect_err("should fail");
        assert_eq!(err.raw, "nag.archive");
        assert!(err.to_string().contains("nag.push"));
    }

    #[test]
    fn create_ranks_first_delete_last() {
        let mut kinds = EventKind::ALL;
        kinds.sort_by_key(|k| k.replay_rank());
        assert_eq!(kinds.first(), Some(&EventKind::Create));
        assert_eq!(kinds.last(), Some(&EventKind::Delete));
    }

    #[test]
    fn serde_uses_dotted_form() {
        let json = serde_json::to_string(&EventKind::Complete).expect("serialize");
        assert_eq!(json, "\"nag.complete\"");
        let back: EventKind = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, EventKind::Complete);
    }
}
