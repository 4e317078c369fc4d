use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use super::nag_id::NagId;
use super::recurrence::Recurrence;

pub const DEFAULT_BUCKETS: [&str; 5] = ["Work", "Personal", "Weekend", "Holiday", "Project"];
pub const DEFAULT_BUCKET: &str = "Work";
pub const PROJECT_BUCKET: &str = "Project";
pub const DEFAULT_PROJECT_NAME: &str = "General";
pub const DEFAULT_WEIGHT: u8 = 50;
pub const DEFAULT_LATENESS_DAYS: u32 = 7;
pub const MAX_COMPLETED_OCCURRENCES: usize = 200;

/// Lifecycle status of a nag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Active,
    Completed,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status '{raw}': expected active, completed or deleted")]
pub struct UnknownStatus {
    pub raw: String,
}

impl Status {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" | "open" => Ok(Self::Active),
            "completed" | "complete" | "done" => Ok(Self::Completed),
            "deleted" => Ok(Self::Deleted),
            _ => Err(UnknownStatus { raw: s.to_string() }),
        }
    }
}

/// Accumulated "push the due date out" state.
///
/// `offset_ms` is added to the stored due when computing the effective due;
/// `count` and `total_ms` only feed the `P{count}+{total}` summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushState {
    #[serde(default)]
    pub offset_ms: i64,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub total_ms: i64,
}

impl PushState {
    pub const fn push(&mut self, by_ms: i64) {
        self.offset_ms = self.offset_ms.saturating_add(by_ms);
        self.count = self.count.saturating_add(1);
        self.total_ms = self.total_ms.saturating_add(by_ms);
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0 && self.offset_ms == 0 && self.total_ms == 0
    }
}

/// A materialized nag: the result of replaying its events (or of reading a
/// direct row).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nag {
    pub id: NagId,
    #[serde(default)]
    pub title: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default)]
    pub due_ms: Option<i64>,
    #[serde(default)]
    pub recurrence: Option<Recurrence>,
    /// Explicit progress in `[0, 1]`; takes precedence over the derived value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default)]
    pub last_completed_ms: Option<i64>,
    #[serde(default)]
    pub status: Status,
    #[serde(default = "default_weight")]
    pub weight: u8,
    #[serde(default = "default_lateness_days")]
    pub lateness_days: u32,
    #[serde(default = "default_true")]
    pub notifications: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_days_before_due: Option<u32>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub completed_occurrences: BTreeSet<i64>,
    #[serde(default, skip_serializing_if = "PushState::is_empty")]
    pub push: PushState,
    #[serde(default)]
    pub created_at_ms: i64,
    #[serde(default)]
    pub updated_at_ms: i64,
}

fn default_bucket() -> String {
    DEFAULT_BUCKET.to_string()
}

const fn default_weight() -> u8 {
    DEFAULT_WEIGHT
}

const fn default_lateness_days() -> u32 {
    DEFAULT_LATENESS_DAYS
}

const fn default_true() -> bool {
    true
}

impl Nag {
    /// A fresh active nag with default settings.
    #[must_use]
    pub fn new(id: NagId, title: impl Into<String>, created_at_ms: i64) -> Self {
        Self {
            id,
            title: title.into(),
            bucket: default_bucket(),
            project: None,
            due_ms: None,
            recurrence: None,
            progress: None,
            last_completed_ms: None,
            status: Status::Active,
            weight: DEFAULT_WEIGHT,
            lateness_days: DEFAULT_LATENESS_DAYS,
            notifications: true,
            icon: None,
            visible_days_before_due: None,
            completed_occurrences: BTreeSet::new(),
            push: PushState::default(),
            created_at_ms,
            updated_at_ms: created_at_ms,
        }
    }

    #[must_use]
    pub const fn is_recurring(&self) -> bool {
        self.recurrence.is_some()
    }

    /// Stored due plus any push offset.
    #[must_use]
    pub const fn effective_due_ms(&self) -> Option<i64> {
        match self.due_ms {
            Some(due) => Some(due.saturating_add(self.push.offset_ms)),
            None => None,
        }
    }

    #[must_use]
    pub fn is_project(&self) -> bool {
        self.bucket.eq_ignore_ascii_case(PROJECT_BUCKET)
    }

    /// Project name for project-bucket nags.
    #[must_use]
    pub fn effective_project(&self) -> Option<&str> {
        if !self.is_project() {
            return None;
        }
        Some(
            self.project
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .unwrap_or(DEFAULT_PROJECT_NAME),
        )
    }

    /// Title shown in lists: the title, or the id when the title is blank.
    #[must_use]
    pub fn display_title(&self) -> &str {
        let title = self.title.trim();
        if title.is_empty() { self.id.as_str() } else { title }
    }

    /// Record a completed recurring occurrence, keeping the newest
    /// [`MAX_COMPLETED_OCCURRENCES`].
    pub fn record_completed_occurrence(&mut self, occurrence_ms: i64) {
        self.completed_occurrences.insert(occurrence_ms);
        while self.completed_occurrences.len() > MAX_COMPLETED_OCCURRENCES {
            self.completed_occurrences.pop_first();
        }
    }

    #[must_use]
    pub fn is_occurrence_completed(&self, occurrence_ms: i64) -> bool {
        self.completed_occurrences.contains(&occurrence_ms)
    }
}
