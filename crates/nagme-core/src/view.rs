//! List view building: filter, expand recurring windows, classify, sort.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::classify::{ClassifyOptions, Classification, DisplayState, classify, classify_window};
use crate::model::{DAY_MS, DEFAULT_BUCKETS, DEFAULT_PROJECT_NAME, Nag};
use crate::schedule::{due_windows_in_range, is_window_visible, outstanding_occurrence, resolve_due_window};

/// Error returned when parsing an unknown view option.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{raw}': expected one of {expected}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub raw: String,
    pub expected: &'static str,
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Which buckets to show. Matching is case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BucketFilter {
    #[default]
    All,
    Only(BTreeSet<String>),
}

impl BucketFilter {
    /// Build from user input; no names, or any name equal to `all`, means
    /// every bucket.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::new();
        for name in names {
            let name = name.as_ref().trim().to_lowercase();
            if name == "all" {
                return Self::All;
            }
            if !name.is_empty() {
                set.insert(name);
            }
        }
        if set.is_empty() { Self::All } else { Self::Only(set) }
    }

    #[must_use]
    pub fn matches(&self, bucket: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(set) => set.contains(&bucket.trim().to_lowercase()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortMode {
    #[default]
    Due,
    Bucket,
    Progress,
    Entered,
    Weight,
    Smart,
}

impl SortMode {
    pub const ALL: [Self; 6] = [
        Self::Due,
        Self::Bucket,
        Self::Progress,
        Self::Entered,
        Self::Weight,
        Self::Smart,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Due => "due",
            Self::Bucket => "bucket",
            Self::Progress => "progress",
            Self::Entered => "entered",
            Self::Weight => "weight",
            Self::Smart => "smart",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Due => "Due",
            Self::Bucket => "Bucket",
            Self::Progress => "Progress",
            Self::Entered => "Entered",
            Self::Weight => "Weight",
            Self::Smart => "Smart",
        }
    }

    #[must_use]
    pub const fn next(self) -> Self {
        match self {
            Self::Due => Self::Bucket,
            Self::Bucket => Self::Progress,
            Self::Progress => Self::Entered,
            Self::Entered => Self::Weight,
            Self::Weight => Self::Smart,
            Self::Smart => Self::Due,
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortMode {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let clean = s.trim().to_ascii_lowercase();
        let clean = clean.strip_prefix("by-").unwrap_or(&clean);
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == clean)
            .ok_or_else(|| ParseEnumError {
                kind: "sort mode",
                raw: s.to_string(),
                expected: "due, bucket, progress, entered, weight, smart",
            })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecurringMode {
    /// One row per recurring nag: its outstanding occurrence.
    #[default]
    NextOnly,
    /// One row per uncompleted occurrence inside the horizon.
    AllPending,
}

impl RecurringMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NextOnly => "next-only",
            Self::AllPending => "all-pending",
        }
    }

    #[must_use]
    pub const fn toggle(self) -> Self {
        match self {
            Self::NextOnly => Self::AllPending,
            Self::AllPending => Self::NextOnly,
        }
    }
}

impl fmt::Display for RecurringMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecurringMode {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "next-only" | "next" | "show-next-only" => Ok(Self::NextOnly),
            "all-pending" | "all" | "show-all-pending" => Ok(Self::AllPending),
            _ => Err(ParseEnumError {
                kind: "recurring mode",
                raw: s.to_string(),
                expected: "next-only, all-pending",
            }),
        }
    }
}

/// How far ahead recurring occurrences are listed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Horizon {
    #[default]
    Month,
    Year,
}

impl Horizon {
    #[must_use]
    pub const fn days(self) -> i64 {
        match self {
            Self::Month => 30,
            Self::Year => 365,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Month => "30d",
            Self::Year => "1y",
        }
    }

    #[must_use]
    pub const fn toggle(self) -> Self {
        match self {
            Self::Month => Self::Year,
            Self::Year => Self::Month,
        }
    }

    /// Nearest horizon for a configured day count.
    #[must_use]
    pub const fn from_days(days: u32) -> Self {
        if days >= 365 { Self::Year } else { Self::Month }
    }
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Horizon {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "30d" | "30" | "month" => Ok(Self::Month),
            "1y" | "365d" | "365" | "year" => Ok(Self::Year),
            _ => Err(ParseEnumError {
                kind: "horizon",
                raw: s.to_string(),
                expected: "30d, 1y",
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewOptions {
    pub bucket: BucketFilter,
    /// Restrict to one project (project-bucket nags only).
    pub project: Option<String>,
    pub sort: SortMode,
    pub recurring: RecurringMode,
    pub horizon: Horizon,
    pub classify: ClassifyOptions,
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// One row of the list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListEntry {
    /// Stable per row: the nag id, plus the occurrence for recurring rows.
    pub key: String,
    pub nag: Nag,
    pub classification: Classification,
}

impl ListEntry {
    fn new(nag: &Nag, key: String, classification: Classification) -> Self {
        Self {
            key,
            nag: nag.clone(),
            classification,
        }
    }

    /// Effective due of the row, `i64::MAX` without one.
    #[must_use]
    pub fn due_sort_ms(&self) -> i64 {
        self.classification.window.map_or(i64::MAX, |w| w.due_ms)
    }
}

/// Filter, expand and sort nags into list rows.
pub fn build_entries<'a, I>(nags: I, now_ms: i64, options: &ViewOptions) -> Vec<ListEntry>
where
    I: IntoIterator<Item = &'a Nag>,
{
    let horizon_ms = options.horizon.days() * DAY_MS;
    let horizon_end = now_ms.saturating_add(horizon_ms);
    let project = options.project.as_deref().map(str::to_lowercase);

    let mut entries = Vec::new();
    for nag in nags {
        if !options.bucket.matches(&nag.bucket) {
            continue;
        }
        if let Some(wanted) = &project
            && nag.effective_project().map(str::to_lowercase).as_ref() != Some(wanted)
        {
            continue;
        }

        if !nag.is_recurring() {
            let classification = classify(nag, now_ms, &options.classify);
            entries.push(ListEntry::new(nag, nag.id.to_string(), classification));
            continue;
        }

        match options.recurring {
            RecurringMode::AllPending => {
                let from = outstanding_occurrence(nag, now_ms).map_or(now_ms, |o| o.min(now_ms));
                for window in due_windows_in_range(nag, from, horizon_end) {
                    if !is_window_visible(nag, &window, now_ms) {
                        continue;
                    }
                    let classification =
                        classify_window(nag, Some(window), now_ms, &options.classify);
                    let key = format!("{}@{}", nag.id, window.source_due_ms);
                    entries.push(ListEntry::new(nag, key, classification));
                }
            }
            RecurringMode::NextOnly => {
                let Some(window) = resolve_due_window(nag, now_ms) else {
                    continue;
                };
                if window.due_ms.saturating_sub(now_ms) > horizon_ms
                    || !is_window_visible(nag, &window, now_ms)
                {
                    continue;
                }
                let classification = classify_window(nag, Some(window), now_ms, &options.classify);
                let key = format!("{}@{}", nag.id, window.source_due_ms);
                entries.push(ListEntry::new(nag, key, classification));
            }
        }
    }

    sort_entries(&mut entries, options.sort, now_ms, options.classify.due_soon_ms);
    entries
}

/// Smart-sort rank: overdue, due soon, later, no due, completed.
#[must_use]
pub fn smart_rank(entry: &ListEntry, now_ms: i64, due_soon_ms: i64) -> u8 {
    if entry.classification.state == DisplayState::Completed {
        return 4;
    }
    let due = entry.due_sort_ms();
    if due == i64::MAX {
        3
    } else if now_ms > due {
        0
    } else if due - now_ms <= due_soon_ms {
        1
    } else {
        2
    }
}

/// Sort rows in place. Every mode ends with the row key so the order is
/// total.
pub fn sort_entries(entries: &mut [ListEntry], mode: SortMode, now_ms: i64, due_soon_ms: i64) {
    let by_due = |a: &ListEntry, b: &ListEntry| a.due_sort_ms().cmp(&b.due_sort_ms());
    let by_weight = |a: &ListEntry, b: &ListEntry| b.nag.weight.cmp(&a.nag.weight);
    let by_created = |a: &ListEntry, b: &ListEntry| a.nag.created_at_ms.cmp(&b.nag.created_at_ms);

    entries.sort_by(|a, b| {
        let primary = match mode {
            SortMode::Due => by_due(a, b)
                .then_with(|| by_weight(a, b))
                .then_with(|| by_created(a, b)),
            SortMode::Bucket => a
                .nag
                .bucket
                .to_lowercase()
                .cmp(&b.nag.bucket.to_lowercase())
                .then_with(|| by_due(a, b)),
            SortMode::Progress => b
                .classification
                .progress
                .total_cmp(&a.classification.progress)
                .then_with(|| by_due(a, b)),
            SortMode::Entered => by_created(a, b).then_with(|| by_due(a, b)),
            SortMode::Weight => by_weight(a, b)
                .then_with(|| by_due(a, b))
                .then_with(|| by_created(a, b)),
            SortMode::Smart => smart_rank(a, now_ms, due_soon_ms)
                .cmp(&smart_rank(b, now_ms, due_soon_ms))
                .then_with(|| by_weight(a, b))
                .then_with(|| by_due(a, b))
                .then_with(|| by_created(a, b)),
        };
        primary.then_with(|| a.key.cmp(&b.key))
    });
}

/// Bucket choices: the defaults first, then any others in use.
pub fn bucket_options<'a, I>(nags: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a Nag>,
{
    let mut options: Vec<String> = DEFAULT_BUCKETS.iter().map(|b| (*b).to_string()).collect();
    let mut extra: BTreeMap<String, String> = BTreeMap::new();
    for nag in nags {
        let bucket = nag.bucket.trim();
        if bucket.is_empty() || options.iter().any(|o| o.eq_ignore_ascii_case(bucket)) {
            continue;
        }
        extra
            .entry(bucket.to_lowercase())
            .or_insert_with(|| bucket.to_string());
    }
    options.extend(extra.into_values());
    options
}

/// One row per project: the project's most pressing nag.
///
/// The representative is the first nag by (already due first, earliest
/// due, heaviest, oldest).
pub fn project_overview<'a, I>(nags: I, now_ms: i64, options: &ClassifyOptions) -> Vec<ListEntry>
where
    I: IntoIterator<Item = &'a Nag>,
{
    let mut best: BTreeMap<String, (&Nag, Classification)> = BTreeMap::new();
    for nag in nags {
        let Some(project) = nag.effective_project() else {
            continue;
        };
        let classification = classify(nag, now_ms, options);
        let slot = best.entry(project.to_lowercase());
        match slot {
            std::collections::btree_map::Entry::Vacant(v) => {
                v.insert((nag, classification));
            }
            std::collections::btree_map::Entry::Occupied(mut o) => {
                let (current, current_class) = o.get();
                if representative_order(nag, &classification, current, current_class, now_ms)
                    == Ordering::Less
                {
                    o.insert((nag, classification));
                }
            }
        }
    }

    best.into_iter()
        .map(|(name, (nag, classification))| {
            ListEntry::new(nag, format!("project:{name}"), classification)
        })
        .collect()
}

fn representative_order(
    a: &Nag,
    a_class: &Classification,
    b: &Nag,
    b_class: &Classification,
    now_ms: i64,
) -> Ordering {
    let key = |nag: &Nag, class: &Classification| {
        let due = class.window.map_or(i64::MAX, |w| w.due_ms);
        (
            u8::from(due > now_ms),
            due,
            std::cmp::Reverse(nag.weight),
            nag.created_at_ms,
            nag.id.clone(),
        )
    };
    key(a, a_class).cmp(&key(b, b_class))
}

/// Display name of the project a row stands for.
#[must_use]
pub fn project_name(entry: &ListEntry) -> &str {
    entry.nag.effective_project().unwrap_or(DEFAULT_PROJECT_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NagId, Recurrence};

    fn nag(id: &str, bucket: &str, due: Option<i64>, weight: u8) -> Nag {
        let mut n = Nag::new(NagId::new(id).expect("id"), id, 0);
        n.bucket = bucket.into();
        n.due_ms = due;
        n.weight = weight;
        n
    }

    fn keys(entries: &[ListEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.key.as_str()).collect()
    }

    #[test]
    fn bucket_filter_is_case_insensitive() {
        let filter = BucketFilter::from_names(["work", " Personal "]);
        assert!(filter.matches("Work"));
        assert!(filter.matches("personal"));
        assert!(!filter.matches("Holiday"));
        assert_eq!(BucketFilter::from_names(["Work", "ALL"]), BucketFilter::All);
        assert_eq!(BucketFilter::from_names(Vec::<String>::new()), BucketFilter::All);
    }

    #[test]
    fn sort_by_due_then_weight() {
        let nags = [
            nag("late", "Work", Some(300), 50),
            nag("light", "Work", Some(100), 10),
            nag("heavy", "Work", Some(100), 90),
            nag("none", "Work", None, 50),
        ];
        let entries = build_entries(&nags, 0, &ViewOptions::default());
        assert_eq!(keys(&entries), vec!["heavy", "light", "late", "none"]);
    }

    #[test]
    fn sort_by_bucket_groups() {
        let nags = [
            nag("w", "Work", Some(5), 50),
            nag("h", "Holiday", Some(9), 50),
            nag("p", "personal", Some(1), 50),
        ];
        let options = ViewOptions {
            sort: SortMode::Bucket,
            ..ViewOptions::default()
        };
        assert_eq!(keys(&build_entries(&nags, 0, &options)), vec!["h", "p", "w"]);
    }

    #[test]
    fn smart_puts_overdue_first() {
        let now = 100 * DAY_MS;
        let nags = [
            nag("later", "Work", Some(now + 60 * DAY_MS), 100),
            nag("soon", "Work", Some(now + DAY_MS), 10),
            nag("overdue", "Work", Some(now - DAY_MS), 0),
            nag("undated", "Work", None, 100),
        ];
        let options = ViewOptions {
            sort: SortMode::Smart,
            ..ViewOptions::default()
        };
        assert_eq!(
            keys(&build_entries(&nags, now, &options)),
            vec!["overdue", "soon", "later", "undated"]
        );
    }

    #[test]
    fn recurring_modes_expand_differently() {
        let mut r = nag("r", "Work", None, 50);
        r.recurrence = Some(Recurrence::every(7 * DAY_MS, 0, DAY_MS));
        let now = 7 * DAY_MS + 1;

        let next_only = build_entries([&r], now, &ViewOptions::default());
        assert_eq!(keys(&next_only), vec![format!("r@{}", 7 * DAY_MS)]);

        let all = ViewOptions {
            recurring: RecurringMode::AllPending,
            ..ViewOptions::default()
        };
        let rows = build_entries([&r], now, &all);
        // 7d (outstanding), 14d, 21d, 28d, 35d inside a 30-day horizon.
        assert_eq!(rows.len(), 5);
    }

    #[test]
    fn horizon_hides_far_recurring_rows() {
        let mut r = nag("r", "Work", Some(200 * DAY_MS), 50);
        r.recurrence = Some(Recurrence::every(365 * DAY_MS, 200 * DAY_MS, DAY_MS));
        assert!(build_entries([&r], 0, &ViewOptions::default()).is_empty());
        let year = ViewOptions {
            horizon: Horizon::Year,
            ..ViewOptions::default()
        };
        assert_eq!(build_entries([&r], 0, &year).len(), 1);
    }

    #[test]
    fn project_overview_picks_most_pressing() {
        let mut a = nag("a", "Project", Some(500), 50);
        a.project = Some("Shed".into());
        let mut b = nag("b", "Project", Some(50), 50);
        b.project = Some("shed".into());
        let mut c = nag("c", "Project", None, 50);
        c.project = Some("Garden".into());
        let work = nag("w", "Work", Some(1), 50);

        let rows = project_overview([&a, &b, &c, &work], 100, &ClassifyOptions::default());
        let picked: Vec<&str> = rows.iter().map(|e| e.nag.id.as_str()).collect();
        assert_eq!(picked, vec!["c", "b"]);
        assert_eq!(project_name(&rows[0]), "Garden");
    }

    #[test]
    fn bucket_options_append_custom_buckets() {
        let nags = [nag("x", "Errands", None, 50), nag("y", "errands", None, 50), nag("z", "work", None, 50)];
        let options = bucket_options(&nags);
        assert_eq!(options.len(), DEFAULT_BUCKETS.len() + 1);
        assert_eq!(options.last().map(String::as_str), Some("Errands"));
    }

    #[test]
    fn enum_options_parse() {
        assert_eq!("by-progress".parse(), Ok(SortMode::Progress));
        assert_eq!("all".parse(), Ok(RecurringMode::AllPending));
        assert_eq!("1y".parse(), Ok(Horizon::Year));
        assert!("sideways".parse::<SortMode>().is_err());
        assert_eq!(SortMode::Smart.next(), SortMode::Due);
    }
}
