//! Backend row format.
//!
//! Event rows look like
//!
//! ```text
//! {"id": 17, "created_at": "2025-06-10T09:00:00Z", "user_id": "...", "payload": {...}}
//! ```
//!
//! The payload is a camelCase nag snapshot tagged with an `action`, as the
//! mobile app writes it. It may be nested (`{"payload": {...}}`) or stored as
//! a JSON string. Decoding maps each row to one typed [`NagEvent`]:
//!
//! | action | event |
//! |---|---|
//! | `create` | `nag.create` with the snapshot as patch |
//! | `update`, `manual_sync`, `push_due`, anything else | `nag.update` |
//!
//! On the way out an update carrying a full snapshot is tagged
//! `manual_sync`, matching what the mobile app sends when it re-uploads a
//! nag. Direct-state rows are written as `{id, user_id, updated_at,
//! payload}` with the same snapshot shape.
//! | `complete` | `nag.complete` at `occurrenceEpochMillis` |
//! | `complete_occurrence` | `nag.complete` at the newest skipped occurrence |
//! | `push` | `nag.push` by `pushByMillis` |
//! | `delete` | `nag.delete` |
//!
//! Keys outside the known snapshot vocabulary, and known keys holding values
//! of the wrong type, end up in the event's `extra` map so that replay flags
//! the nag as malformed instead of silently guessing.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value, json};
use tracing::trace;

use nagme_core::event::{CompleteData, DeleteData, EventData, EventKind, NagEvent, NagPatch, PushData};
use nagme_core::model::{
    CalendarPattern, CalendarRule, InvalidNagId, Nag, NagId, PushState, Recurrence,
    RecurrenceRule, Status,
};
use nagme_core::replay::apply_patch;
use nagme_core::timefmt::{format_rfc3339_ms, parse_rfc3339_ms};

const MODE_ONE_TIME: &str = "ONE_TIME";
const MODE_MONTHLY: &str = "MONTHLY";
const MODE_INTERVAL: &str = "INTERVAL";

const GLYPH_KEYS: [&str; 5] = ["iconGlyph", "icon", "iconEmoji", "nagIcon", "iconText"];
const PROJECT_KEYS: [&str; 3] = ["projectName", "project", "project_name"];
const INVALID_ICON_TOKENS: [&str; 9] = ["", "none", "null", "non", "img", "undefined", "nan", "na", "n/a"];

/// Keys the decoder understands or deliberately ignores.
const KNOWN_KEYS: &[&str] = &[
    // envelope
    "action",
    "eventId",
    "syncedAtEpochMillis",
    "payloadVersion",
    "clientSyncedAt",
    "userId",
    "workName",
    // action arguments
    "occurrenceEpochMillis",
    "pushByMillis",
    "deleteReason",
    // snapshot
    "nagText",
    "bucket",
    "projectName",
    "project",
    "project_name",
    "latenessDays",
    "mode",
    "repeatMinutes",
    "continueMinutes",
    "notificationsEnabled",
    "weight",
    "oneTimeEpochMillis",
    "monthlyDay",
    "monthlyHour",
    "monthlyMinute",
    "createdAtEpochMillis",
    "skippedMonthlyDueEpochMillis",
    "iconGlyph",
    "icon",
    "iconEmoji",
    "nagIcon",
    "iconText",
    "iconPngBase64",
    "icon_png_base64",
    "iconImageBase64",
    "nagIconBase64",
    "imageUrl",
    "iconImageUrl",
    "nagImageUrl",
    "nagImage",
    "iconUrl",
    "image",
    "recurringPatternType",
    "recurringDayOfWeek",
    "recurringNthWeek",
    "recurringMonthOfYear",
    "recurringQuarterAnchorMonth",
    "recurringVisibleDaysBeforeDue",
    "recurringUtcOffsetMinutes",
    "recurrencePeriodMillis",
    "recurrenceWindowMillis",
    "recurrenceAnchorEpochMillis",
    "pushedOffsetMillis",
    "pushCount",
    "pushedTotalMillis",
    "status",
    "progress",
    "lastCompletedEpochMillis",
];

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("row has no readable payload")]
    NoPayload,
    #[error("payload has no workName")]
    MissingId,
    #[error("row has neither created_at nor syncedAtEpochMillis")]
    MissingTimestamp,
    #[error(transparent)]
    InvalidId(#[from] InvalidNagId),
    #[error("snapshot is invalid: {0}")]
    Invalid(String),
    #[error("row does not decode: {0}")]
    Json(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Unwrap a row's `payload` column: nested objects and JSON strings are
/// followed down to the innermost object.
#[must_use]
pub fn parse_payload(value: &Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => {
            if let Some(inner) = map.get("payload").filter(|v| v.is_object() || v.is_string())
                && let Some(nested) = parse_payload(inner)
            {
                return Some(nested);
            }
            Some(map.clone())
        }
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            match serde_json::from_str::<Value>(text) {
                Ok(Value::Object(map)) => Some(map),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Decode one event row.
///
/// `utc_offset_minutes` is the wall clock calendar rules are evaluated in
/// when the payload does not carry its own offset.
///
/// # Errors
///
/// Returns [`WireError`] when the row cannot be attributed to a nag or has
/// no timestamp. Field-level problems do not fail decoding; they surface
/// as unknown fields on the event.
pub fn decode_event_row(row: &Value, index: usize, utc_offset_minutes: i32) -> Result<NagEvent, WireError> {
    let payload = row
        .get("payload")
        .and_then(parse_payload)
        .ok_or(WireError::NoPayload)?;
    let nag_id = nag_id_of(&payload)?;
    let ts_ms = row
        .get("created_at")
        .and_then(Value::as_str)
        .and_then(parse_rfc3339_ms)
        .or_else(|| payload.get("syncedAtEpochMillis").and_then(as_i64))
        .ok_or(WireError::MissingTimestamp)?;
    let event_id = event_id_for(row, &payload, ts_ms, index);
    let data = translate_payload(&payload, utc_offset_minutes);
    trace!(%nag_id, %event_id, kind = %data.kind(), "decoded event row");
    Ok(NagEvent::new(event_id, nag_id, ts_ms, data))
}

fn nag_id_of(payload: &Map<String, Value>) -> Result<NagId, WireError> {
    let raw = payload
        .get("workName")
        .and_then(scalar_text)
        .ok_or(WireError::MissingId)?;
    if raw.trim().is_empty() {
        return Err(WireError::MissingId);
    }
    Ok(NagId::new(&raw)?)
}

/// Stable id for tie-breaking: the row's event id column, the payload's
/// `eventId`, the zero-padded row id, or finally time and position.
fn event_id_for(row: &Value, payload: &Map<String, Value>, ts_ms: i64, index: usize) -> String {
    let non_empty = |v: Option<&Value>| {
        v.and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    if let Some(id) = non_empty(row.get("event_id")).or_else(|| non_empty(payload.get("eventId"))) {
        return id;
    }
    match row.get("id") {
        Some(Value::Number(n)) => n
            .as_u64()
            .map_or_else(|| n.to_string(), |id| format!("{id:020}")),
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        _ => format!("{ts_ms}-{index:06}"),
    }
}

/// Map a payload to typed event data.
#[must_use]
pub fn translate_payload(payload: &Map<String, Value>, utc_offset_minutes: i32) -> EventData {
    let action = payload
        .get("action")
        .and_then(Value::as_str)
        .map(|a| a.trim().to_ascii_lowercase())
        .unwrap_or_default();
    let mut reader = Reader::new(payload);

    match action.as_str() {
        "create" => EventData::Create(reader.patch(utc_offset_minutes)),
        "delete" => {
            let reason = reader.text("deleteReason").flatten();
            EventData::Delete(DeleteData {
                reason,
                extra: reader.finish(),
            })
        }
        "push" => {
            let by_ms = reader.int("pushByMillis").flatten().unwrap_or(0);
            EventData::Push(PushData {
                by_ms,
                extra: reader.finish(),
            })
        }
        "complete" => {
            let occurrence_ms = reader.int("occurrenceEpochMillis").flatten();
            EventData::Complete(CompleteData {
                occurrence_ms,
                extra: reader.finish(),
            })
        }
        "complete_occurrence" => {
            let occurrence_ms = reader
                .int_set("skippedMonthlyDueEpochMillis")
                .and_then(|set| set.last().copied());
            EventData::Complete(CompleteData {
                occurrence_ms,
                extra: reader.finish(),
            })
        }
        other => {
            if !matches!(other, "update" | "manual_sync" | "push_due") {
                trace!(action = other, "unrecognized action decoded as update");
            }
            EventData::Update(reader.patch(utc_offset_minutes))
        }
    }
}

/// Decode a direct-state row: either a camelCase snapshot (bare or under
/// `payload`) or the native [`Nag`] JSON form.
///
/// # Errors
///
/// Returns [`WireError`] when the row is neither form or the snapshot does
/// not validate.
pub fn decode_direct_row(row: &Value, utc_offset_minutes: i32) -> Result<Nag, WireError> {
    let snapshot = row
        .get("payload")
        .and_then(parse_payload)
        .or_else(|| row.as_object().filter(|o| o.contains_key("workName")).cloned());
    let Some(payload) = snapshot else {
        return Ok(serde_json::from_value(row.clone())?);
    };

    let id = nag_id_of(&payload)?;
    let row_created = row
        .get("created_at")
        .and_then(Value::as_str)
        .and_then(parse_rfc3339_ms);
    let mut reader = Reader::new(&payload);
    let patch = reader.patch(utc_offset_minutes);
    patch.validate().map_err(WireError::Invalid)?;

    let created = patch.created_at_ms.or(row_created).unwrap_or_default();
    let mut nag = Nag::new(id.clone(), id.as_str(), created);
    apply_patch(&mut nag, &patch);
    if row.get("deleted").and_then(Value::as_bool) == Some(true) {
        nag.status = Status::Deleted;
    }
    nag.updated_at_ms = row
        .get("updated_at")
        .and_then(Value::as_str)
        .and_then(parse_rfc3339_ms)
        .or_else(|| payload.get("syncedAtEpochMillis").and_then(as_i64))
        .unwrap_or(created);
    Ok(nag)
}

/// Field reader that records type mismatches instead of failing.
struct Reader<'a> {
    payload: &'a Map<String, Value>,
    invalid: BTreeMap<String, Value>,
}

impl<'a> Reader<'a> {
    const fn new(payload: &'a Map<String, Value>) -> Self {
        Self {
            payload,
            invalid: BTreeMap::new(),
        }
    }

    fn reject(&mut self, key: &str) {
        let value = self.payload.get(key).cloned().unwrap_or(Value::Null);
        self.invalid.insert(key.to_string(), value);
    }

    /// `None` when absent, `Some(None)` for null or blank.
    fn int(&mut self, key: &str) -> Option<Option<i64>> {
        let payload = self.payload;
        let value = payload.get(key)?;
        if is_blank(value) {
            return Some(None);
        }
        as_i64(value).map_or_else(
            || {
                self.reject(key);
                None
            },
            |n| Some(Some(n)),
        )
    }

    fn small(&mut self, key: &str) -> Option<u32> {
        let n = self.int(key).flatten()?;
        u32::try_from(n).map_or_else(
            |_| {
                self.reject(key);
                None
            },
            Some,
        )
    }

    fn text(&mut self, key: &str) -> Option<Option<String>> {
        let payload = self.payload;
        let value = payload.get(key)?;
        if value.is_null() {
            return Some(None);
        }
        scalar_text(value).map_or_else(
            || {
                self.reject(key);
                None
            },
            |t| {
                let t = t.trim().to_string();
                Some((!t.is_empty()).then_some(t))
            },
        )
    }

    fn flag(&mut self, key: &str) -> Option<bool> {
        let payload = self.payload;
        match payload.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => Some(n.as_f64().is_some_and(|f| f != 0.0)),
            Value::Null => None,
            _ => {
                self.reject(key);
                None
            }
        }
    }

    fn int_set(&mut self, key: &str) -> Option<BTreeSet<i64>> {
        let payload = self.payload;
        match payload.get(key)? {
            Value::Array(items) => Some(items.iter().filter_map(as_i64).collect()),
            Value::Null => Some(BTreeSet::new()),
            _ => {
                self.reject(key);
                None
            }
        }
    }

    fn patch(&mut self, utc_offset_minutes: i32) -> NagPatch {
        let payload = self.payload;
        let mut patch = NagPatch {
            title: self.text("nagText").flatten(),
            bucket: self.text("bucket").flatten(),
            due_ms: self.int("oneTimeEpochMillis"),
            created_at_ms: self.int("createdAtEpochMillis").flatten(),
            last_completed_ms: self.int("lastCompletedEpochMillis"),
            notifications: self.flag("notificationsEnabled"),
            completed_occurrences: self.int_set("skippedMonthlyDueEpochMillis"),
            ..NagPatch::default()
        };

        if let Some(key) = PROJECT_KEYS.into_iter().find(|k| self.payload.contains_key(*k)) {
            patch.project = self.text(key);
        }
        patch.icon = GLYPH_KEYS
            .into_iter()
            .find_map(|k| self.payload.get(k).and_then(normalize_icon_glyph))
            .map(Some);

        if let Some(weight) = self.int("weight").flatten() {
            patch.weight = u32::try_from(weight.clamp(0, 100)).ok();
        }
        if let Some(days) = self.int("latenessDays").flatten() {
            patch.lateness_days = Some(u32::try_from(days.max(1)).unwrap_or(u32::MAX));
        }
        if let Some(days) = self.int("recurringVisibleDaysBeforeDue") {
            patch.visible_days_before_due =
                Some(days.map(|d| u32::try_from(d.max(1)).unwrap_or(u32::MAX)));
        }
        if ["pushedOffsetMillis", "pushCount", "pushedTotalMillis"]
            .iter()
            .any(|k| self.payload.contains_key(*k))
        {
            let offset_ms = self.int("pushedOffsetMillis").flatten().unwrap_or(0).max(0);
            let count = self.int("pushCount").flatten().unwrap_or(0).max(0);
            let total_ms = self.int("pushedTotalMillis").flatten().unwrap_or(0).max(0);
            patch.push = Some(PushState {
                offset_ms,
                count: u32::try_from(count).unwrap_or(u32::MAX),
                total_ms,
            });
        }
        if let Some(raw) = self.text("status").flatten() {
            match raw.parse::<Status>() {
                Ok(status) => patch.status = Some(status),
                Err(_) => self.reject("status"),
            }
        }
        match payload.get("progress") {
            None => {}
            Some(Value::Null) => patch.progress = Some(None),
            Some(value) => match value.as_f64() {
                Some(p) => patch.progress = Some(Some(p)),
                None => self.reject("progress"),
            },
        }
        patch.recurrence = self.recurrence(utc_offset_minutes);

        patch.extra = self.finish();
        patch
    }

    fn recurrence(&mut self, utc_offset_minutes: i32) -> Option<Option<Recurrence>> {
        let mode = self.text("mode").flatten().map(|m| m.to_ascii_uppercase());
        match mode.as_deref() {
            Some(MODE_ONE_TIME) => Some(None),
            Some(MODE_MONTHLY) => self.calendar(utc_offset_minutes).map(|rule| Some(Recurrence::calendar(rule))),
            Some(MODE_INTERVAL) => self.interval().map(Some),
            None if self.payload.contains_key("recurrencePeriodMillis") => self.interval().map(Some),
            None => None,
            Some(_) => {
                self.reject("mode");
                None
            }
        }
    }

    fn calendar(&mut self, utc_offset_minutes: i32) -> Option<CalendarRule> {
        let pattern = match self.text("recurringPatternType").flatten() {
            None => CalendarPattern::DayOfMonth,
            Some(raw) => match raw.parse() {
                Ok(pattern) => pattern,
                Err(_) => {
                    self.reject("recurringPatternType");
                    return None;
                }
            },
        };
        let mut rule = CalendarRule::new(
            pattern,
            self.small("monthlyHour").unwrap_or(0),
            self.small("monthlyMinute").unwrap_or(0),
        );
        rule.day_of_month = self.small("monthlyDay");
        rule.day_of_week = self.small("recurringDayOfWeek");
        rule.nth_week = self.small("recurringNthWeek");
        rule.month_of_year = self.small("recurringMonthOfYear");
        rule.quarter_anchor_month = self.small("recurringQuarterAnchorMonth");
        rule.utc_offset_minutes = self
            .int("recurringUtcOffsetMinutes")
            .flatten()
            .and_then(|m| i32::try_from(m).ok())
            .unwrap_or(utc_offset_minutes);
        Some(rule)
    }

    fn interval(&mut self) -> Option<Recurrence> {
        let Some(period_ms) = self.int("recurrencePeriodMillis").flatten() else {
            self.reject("recurrencePeriodMillis");
            return None;
        };
        let window_ms = self.int("recurrenceWindowMillis").flatten().unwrap_or(period_ms);
        let anchor_ms = self.int("recurrenceAnchorEpochMillis").flatten().unwrap_or(0);
        Some(Recurrence::every(period_ms, anchor_ms, window_ms))
    }

    /// Unknown keys plus rejected values.
    fn finish(&mut self) -> BTreeMap<String, Value> {
        let mut extra = std::mem::take(&mut self.invalid);
        for (key, value) in self.payload {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                extra.insert(key.clone(), value.clone());
            }
        }
        extra
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
        }
        _ => None,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Accept emoji-like glyphs only; placeholders and URLs are dropped.
fn normalize_icon_glyph(value: &Value) -> Option<String> {
    match value {
        Value::Object(map) => ["glyph", "emoji", "icon", "text", "value", "label", "name"]
            .into_iter()
            .find_map(|k| map.get(k).and_then(normalize_icon_glyph)),
        Value::Array(items) => items.iter().find_map(normalize_icon_glyph),
        other => {
            let text = scalar_text(other)?;
            let mut text = text.trim();
            let lower = text.to_ascii_lowercase();
            if INVALID_ICON_TOKENS.contains(&lower.as_str())
                || lower.starts_with("<img")
                || lower.starts_with("http")
            {
                return None;
            }
            if lower.starts_with("icon:") {
                text = text[5..].trim();
            }
            (!text.is_empty() && !text.is_ascii()).then(|| text.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// The `action` written for an event kind.
#[must_use]
pub const fn action_for(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Create => "create",
        EventKind::Update => "update",
        EventKind::Complete => "complete",
        EventKind::Delete => "delete",
        EventKind::Push => "push",
    }
}

/// The `action` written for one event: [`action_for`] its kind, except that
/// a snapshot update goes out as `manual_sync`.
#[must_use]
pub fn action_for_event(event: &NagEvent) -> &'static str {
    match &event.data {
        EventData::Update(patch) if patch.is_snapshot() => "manual_sync",
        data => action_for(data.kind()),
    }
}

/// Encode an event as an insertable row for `user_id`.
#[must_use]
pub fn encode_event(event: &NagEvent, user_id: &str) -> Value {
    let mut payload = Map::new();
    payload.insert("action".into(), json!(action_for_event(event)));
    payload.insert("eventId".into(), json!(event.event_id));
    payload.insert("syncedAtEpochMillis".into(), json!(event.ts_ms));
    payload.insert("workName".into(), json!(event.nag_id.as_str()));

    match &event.data {
        EventData::Create(patch) | EventData::Update(patch) => write_patch(&mut payload, patch),
        EventData::Complete(data) => {
            if let Some(occurrence) = data.occurrence_ms {
                payload.insert("occurrenceEpochMillis".into(), json!(occurrence));
            }
        }
        EventData::Push(data) => {
            payload.insert("pushByMillis".into(), json!(data.by_ms));
        }
        EventData::Delete(data) => {
            if let Some(reason) = &data.reason {
                payload.insert("deleteReason".into(), json!(reason));
            }
        }
    }

    json!({ "payload": Value::Object(payload), "user_id": user_id })
}

/// Encode `nag` as a direct-state row for `user_id`.
#[must_use]
pub fn encode_direct_row(nag: &Nag, user_id: &str) -> Value {
    let mut payload = Map::new();
    payload.insert("workName".into(), json!(nag.id.as_str()));
    payload.insert("syncedAtEpochMillis".into(), json!(nag.updated_at_ms));
    write_patch(&mut payload, &NagPatch::snapshot(nag));

    let mut row = json!({
        "id": nag.id.as_str(),
        "user_id": user_id,
        "payload": Value::Object(payload),
    });
    if let Some(updated) = format_rfc3339_ms(nag.updated_at_ms) {
        row["updated_at"] = json!(updated);
    }
    row
}

fn write_patch(out: &mut Map<String, Value>, patch: &NagPatch) {
    let mut put = |key: &str, value: Value| {
        out.insert(key.to_string(), value);
    };
    if let Some(title) = &patch.title {
        put("nagText", json!(title));
    }
    if let Some(bucket) = &patch.bucket {
        put("bucket", json!(bucket));
    }
    if let Some(project) = &patch.project {
        put("projectName", json!(project));
    }
    if let Some(due) = patch.due_ms {
        put("oneTimeEpochMillis", json!(due));
    }
    if let Some(progress) = patch.progress {
        put("progress", json!(progress));
    }
    if let Some(last) = patch.last_completed_ms {
        put("lastCompletedEpochMillis", json!(last));
    }
    if let Some(status) = patch.status {
        put("status", json!(status.as_str()));
    }
    if let Some(weight) = patch.weight {
        put("weight", json!(weight));
    }
    if let Some(days) = patch.lateness_days {
        put("latenessDays", json!(days));
    }
    if let Some(enabled) = patch.notifications {
        put("notificationsEnabled", json!(enabled));
    }
    if let Some(icon) = &patch.icon {
        put("iconGlyph", json!(icon));
    }
    if let Some(days) = patch.visible_days_before_due {
        put("recurringVisibleDaysBeforeDue", json!(days));
    }
    if let Some(push) = &patch.push {
        put("pushedOffsetMillis", json!(push.offset_ms));
        put("pushCount", json!(push.count));
        put("pushedTotalMillis", json!(push.total_ms));
    }
    if let Some(done) = &patch.completed_occurrences {
        put("skippedMonthlyDueEpochMillis", json!(done));
    }
    if let Some(created) = patch.created_at_ms {
        put("createdAtEpochMillis", json!(created));
    }
    match &patch.recurrence {
        None => {}
        Some(None) => put("mode", json!(MODE_ONE_TIME)),
        Some(Some(recurrence)) => write_recurrence(out, recurrence),
    }
}

fn write_recurrence(out: &mut Map<String, Value>, recurrence: &Recurrence) {
    match &recurrence.rule {
        RecurrenceRule::Every {
            period_ms,
            anchor_ms,
        } => {
            out.insert("mode".into(), json!(MODE_INTERVAL));
            out.insert("recurrencePeriodMillis".into(), json!(period_ms));
            out.insert("recurrenceWindowMillis".into(), json!(recurrence.window_ms));
            out.insert("recurrenceAnchorEpochMillis".into(), json!(anchor_ms));
        }
        RecurrenceRule::Calendar(rule) => {
            out.insert("mode".into(), json!(MODE_MONTHLY));
            out.insert("oneTimeEpochMillis".into(), Value::Null);
            out.insert("recurringPatternType".into(), json!(rule.pattern.as_str()));
            out.insert("monthlyHour".into(), json!(rule.hour));
            out.insert("monthlyMinute".into(), json!(rule.minute));
            out.insert("monthlyDay".into(), json!(rule.day_of_month));
            out.insert("recurringDayOfWeek".into(), json!(rule.day_of_week));
            out.insert("recurringNthWeek".into(), json!(rule.nth_week));
            out.insert("recurringMonthOfYear".into(), json!(rule.month_of_year));
            out.insert(
                "recurringQuarterAnchorMonth".into(),
                json!(rule.quarter_anchor_month),
            );
            out.insert(
                "recurringUtcOffsetMinutes".into(),
                json!(rule.utc_offset_minutes),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nagme_core::model::DAY_MS;
    use nagme_core::reconstruct;

    fn row(created_at: &str, payload: Value) -> Value {
        json!({"id": 1, "created_at": created_at, "user_id": "u1", "payload": payload})
    }

    #[test]
    fn payload_unwraps_nested_and_string_forms() {
        let inner = json!({"workName": "rent"});
        assert_eq!(
            parse_payload(&json!({"payload": inner.clone()})),
            inner.as_object().cloned()
        );
        assert_eq!(
            parse_payload(&json!("{\"workName\":\"rent\"}")),
            inner.as_object().cloned()
        );
        assert_eq!(parse_payload(&json!("  ")), None);
        assert_eq!(parse_payload(&json!(42)), None);
    }

    #[test]
    fn mobile_snapshot_decodes_to_create() {
        let event = decode_event_row(
            &row(
                "2025-06-10T09:00:00Z",
                json!({
                    "action": "create",
                    "workName": "rent",
                    "nagText": "Pay rent",
                    "bucket": "Personal",
                    "mode": "MONTHLY",
                    "monthlyDay": 1,
                    "monthlyHour": 9,
                    "monthlyMinute": 0,
                    "weight": 140,
                    "latenessDays": 0,
                    "repeatMinutes": 60,
                    "iconGlyph": "🏠",
                }),
            ),
            0,
            60,
        )
        .expect("decodes");

        assert_eq!(event.kind, EventKind::Create);
        assert_eq!(event.ts_ms, 1_749_546_000_000);
        assert_eq!(event.event_id, "00000000000000000001");
        let EventData::Create(patch) = &event.data else {
            panic!("expected create, got {:?}", event.data);
        };
        assert_eq!(patch.title.as_deref(), Some("Pay rent"));
        assert_eq!(patch.weight, Some(100));
        assert_eq!(patch.lateness_days, Some(1));
        assert_eq!(patch.icon, Some(Some("🏠".to_string())));
        assert!(patch.extra.is_empty());
        let Some(Some(recurrence)) = &patch.recurrence else {
            panic!("expected recurrence");
        };
        let RecurrenceRule::Calendar(rule) = &recurrence.rule else {
            panic!("expected calendar rule");
        };
        assert_eq!(rule.pattern, CalendarPattern::DayOfMonth);
        assert_eq!(rule.day_of_month, Some(1));
        assert_eq!(rule.utc_offset_minutes, 60);
        assert_eq!(recurrence.window_ms, DAY_MS);
    }

    #[test]
    fn actions_map_to_event_kinds() {
        let kind = |action: &str| {
            let mut payload = json!({"workName": "n", "action": action});
            payload["skippedMonthlyDueEpochMillis"] = json!([5, 9, 7]);
            let event = decode_event_row(&row("2025-01-01T00:00:00Z", payload), 0, 0).expect("decodes");
            (event.kind, event.data)
        };
        assert_eq!(kind("create").0, EventKind::Create);
        assert_eq!(kind("manual_sync").0, EventKind::Update);
        assert_eq!(kind("push_due").0, EventKind::Update);
        assert_eq!(kind("something_new").0, EventKind::Update);
        assert_eq!(kind("delete").0, EventKind::Delete);
        assert_eq!(kind("push").0, EventKind::Push);
        let (k, data) = kind("complete_occurrence");
        assert_eq!(k, EventKind::Complete);
        assert!(matches!(
            data,
            EventData::Complete(CompleteData { occurrence_ms: Some(9), .. })
        ));
    }

    #[test]
    fn unknown_keys_and_bad_types_become_extra() {
        let event = decode_event_row(
            &row(
                "2025-01-01T00:00:00Z",
                json!({"action": "update", "workName": "n", "colour": "red", "weight": "heavy"}),
            ),
            0,
            0,
        )
        .expect("decodes");
        let extra = event.data.extra();
        assert!(extra.contains_key("colour"));
        assert!(extra.contains_key("weight"));

        let out = reconstruct([&event]);
        assert!(out.nags.is_empty());
        assert_eq!(out.failures.len(), 1);
    }

    #[test]
    fn rows_without_identity_or_time_fail() {
        assert!(matches!(
            decode_event_row(&json!({"created_at": "2025-01-01T00:00:00Z"}), 0, 0),
            Err(WireError::NoPayload)
        ));
        assert!(matches!(
            decode_event_row(&row("2025-01-01T00:00:00Z", json!({"nagText": "x"})), 0, 0),
            Err(WireError::MissingId)
        ));
        assert!(matches!(
            decode_event_row(&json!({"payload": {"workName": "n"}}), 0, 0),
            Err(WireError::MissingTimestamp)
        ));
        let fallback = decode_event_row(
            &json!({"payload": {"workName": "n", "syncedAtEpochMillis": 77}}),
            3,
            0,
        )
        .expect("synced time is enough");
        assert_eq!(fallback.ts_ms, 77);
        assert_eq!(fallback.event_id, "77-000003");
    }

    #[test]
    fn encoded_events_decode_back() {
        let id = NagId::new("water").expect("id");
        let patch = NagPatch {
            title: Some("Water plants".into()),
            due_ms: Some(Some(1_000)),
            recurrence: Some(Some(Recurrence::every(DAY_MS, 0, DAY_MS / 2))),
            weight: Some(70),
            ..NagPatch::default()
        };
        let events = [
            NagEvent::new("e1", id.clone(), 10, EventData::Create(patch.clone())),
            NagEvent::new("e2", id.clone(), 20, EventData::Push(PushData::new(3_600_000))),
            NagEvent::new(
                "e3",
                id,
                30,
                EventData::Complete(CompleteData {
                    occurrence_ms: Some(0),
                    ..CompleteData::default()
                }),
            ),
        ];
        for event in &events {
            let row = encode_event(event, "u1");
            assert_eq!(row["user_id"], "u1");
            let decoded = decode_event_row(&row, 0, 0).expect("decodes");
            assert_eq!(&decoded, event);
        }
    }

    #[test]
    fn snapshot_updates_go_out_as_manual_sync() {
        let id = NagId::new("rent").expect("id");
        let mut nag = Nag::new(id.clone(), "Pay rent", 5);
        nag.due_ms = Some(1_000);

        let sync = NagEvent::new("s1", id.clone(), 50, EventData::Update(NagPatch::snapshot(&nag)));
        let row = encode_event(&sync, "u1");
        assert_eq!(row["payload"]["action"], "manual_sync");
        let decoded = decode_event_row(&row, 0, 0).expect("decodes");
        assert_eq!(decoded.kind, EventKind::Update);

        let edit = NagEvent::new(
            "e1",
            id,
            60,
            EventData::Update(NagPatch {
                weight: Some(10),
                ..NagPatch::default()
            }),
        );
        assert_eq!(encode_event(&edit, "u1")["payload"]["action"], "update");
    }

    #[test]
    fn direct_rows_are_written_in_the_shape_they_are_read() {
        let id = NagId::new("rent").expect("id");
        let mut nag = Nag::new(id, "Pay rent", 1_700_000_000_000);
        nag.due_ms = Some(1_700_100_000_000);
        nag.weight = 90;
        nag.updated_at_ms = 1_700_000_500_000;

        let row = encode_direct_row(&nag, "u1");
        assert_eq!(row["id"], "rent");
        assert_eq!(row["user_id"], "u1");
        assert_eq!(row["payload"]["workName"], "rent");

        let decoded = decode_direct_row(&row, 0).expect("decodes");
        assert_eq!(decoded.id, nag.id);
        assert_eq!(decoded.title, "Pay rent");
        assert_eq!(decoded.due_ms, nag.due_ms);
        assert_eq!(decoded.weight, 90);
        assert_eq!(decoded.status, Status::Active);
        assert_eq!(decoded.created_at_ms, nag.created_at_ms);
        assert_eq!(decoded.updated_at_ms, nag.updated_at_ms);
    }

    #[test]
    fn direct_rows_accept_both_shapes() {
        let snapshot = json!({
            "created_at": "2025-01-01T00:00:00Z",
            "payload": {"workName": "rent", "nagText": "Pay rent", "bucket": "Project", "oneTimeEpochMillis": 99}
        });
        let nag = decode_direct_row(&snapshot, 0).expect("snapshot row");
        assert_eq!(nag.title, "Pay rent");
        assert_eq!(nag.due_ms, Some(99));
        assert_eq!(nag.project.as_deref(), Some("General"));

        let native = json!({"id": "rent", "title": "Pay rent", "status": "deleted"});
        let nag = decode_direct_row(&native, 0).expect("native row");
        assert_eq!(nag.status, Status::Deleted);

        let bad = json!({"payload": {"workName": "x", "nagText": "X", "oddity": 1}});
        assert!(matches!(decode_direct_row(&bad, 0), Err(WireError::Invalid(_))));
    }
}
