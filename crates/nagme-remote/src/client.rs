//! Blocking HTTP gateway for a Supabase-style backend.
//!
//! - Auth: `POST /auth/v1/token?grant_type=password`, `PUT /auth/v1/user`
//! - Data: `GET|POST|DELETE /rest/v1/<table>` with `apikey` and bearer headers;
//!   direct rows are upserted with `on_conflict=id`
//!
//! Event tables are read page by page (`limit`/`offset`). When the backend
//! reports that one of the optional columns is missing, the page is retried
//! with the core column set. Rows present in several tables are folded into
//! one, preferring the table that currently holds the most rows.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::{Value, json};
use tracing::{debug, info, warn};

use nagme_core::config::{GatewayConfig, TablesConfig};
use nagme_core::event::NagEvent;
use nagme_core::model::{Nag, NagId};
use nagme_core::source::{Gateway, Session};
use nagme_core::NagError;

use crate::wire::{decode_direct_row, decode_event_row, encode_direct_row, encode_event};

/// Rows per page.
pub const PAGE_SIZE: usize = 1000;
pub const CORE_COLUMNS: &str = "id,created_at,payload,user_id";
pub const EXTENDED_COLUMNS: &str =
    "id,created_at,payload,user_id,icon_png_base64,payload_version,client_synced_at,event_id";
const OPTIONAL_COLUMNS: [&str; 4] = ["icon_png_base64", "payload_version", "client_synced_at", "event_id"];
const MAX_ERROR_BODY: usize = 300;

/// A reply outside the 2xx range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpFailure {
    pub status: u16,
    pub body: String,
}

enum CallError {
    Http(HttpFailure),
    Other(NagError),
}

impl From<NagError> for CallError {
    fn from(err: NagError) -> Self {
        Self::Other(err)
    }
}

fn call(result: Result<ureq::Response, ureq::Error>) -> Result<ureq::Response, CallError> {
    match result {
        Ok(response) => Ok(response),
        Err(ureq::Error::Status(status, response)) => Err(CallError::Http(HttpFailure {
            status,
            body: response.into_string().unwrap_or_default(),
        })),
        Err(ureq::Error::Transport(transport)) => {
            Err(CallError::Other(NagError::Transport(transport.to_string())))
        }
    }
}

/// Human-readable message from an error body: `error.message`, then
/// `message`, `error_description` or `error`, then the raw body.
#[must_use]
pub fn extract_error(status: u16, body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        let nested = map
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(Value::as_str);
        let flat = ["message", "error_description", "error"]
            .into_iter()
            .find_map(|k| map.get(k).and_then(Value::as_str).filter(|m| !m.is_empty()));
        if let Some(msg) = nested.filter(|m| !m.is_empty()).or(flat) {
            return format!("HTTP {status}: {msg}");
        }
    }
    let text = body.trim();
    if text.is_empty() {
        return format!("HTTP {status}: request failed");
    }
    let clipped: String = text.chars().take(MAX_ERROR_BODY).collect();
    format!("HTTP {status}: {clipped}")
}

/// Whether a failure means the table itself does not exist.
#[must_use]
pub fn is_missing_table(failure: &HttpFailure) -> bool {
    let body = failure.body.to_ascii_lowercase();
    failure.status == 404
        || (body.contains("relation") && body.contains("does not exist"))
        || body.contains("could not find the table")
}

/// Whether a failure only complains about an optional column.
#[must_use]
pub fn is_missing_optional_column(body: &str) -> bool {
    let body = body.to_ascii_lowercase();
    OPTIONAL_COLUMNS.iter().any(|c| body.contains(c))
        && ((body.contains("column") && body.contains("does not exist")) || body.contains("schema cache"))
}

/// Classify a data-endpoint failure. `what` names the table involved.
#[must_use]
pub fn status_error(failure: &HttpFailure, what: &str) -> NagError {
    if is_missing_table(failure) {
        return NagError::NotFound(what.to_string());
    }
    let message = extract_error(failure.status, &failure.body);
    if matches!(failure.status, 401 | 403) || failure.body.to_ascii_lowercase().contains("permission denied") {
        NagError::Permission(message)
    } else {
        NagError::Transport(message)
    }
}

/// Classify an auth-endpoint failure.
#[must_use]
pub fn auth_error(failure: &HttpFailure) -> NagError {
    let message = extract_error(failure.status, &failure.body);
    if matches!(failure.status, 400 | 401 | 403 | 422) {
        NagError::Auth(message)
    } else {
        NagError::Transport(message)
    }
}

/// Collapse rows that appear in more than one table.
///
/// Rows match on `(created_at, user_id, payload)`. A row carrying an icon
/// beats one without; otherwise the copy from `active` wins. The result is
/// ordered by `created_at`.
#[must_use]
pub fn dedupe_rows(rows: Vec<(String, Value)>, active: &str) -> Vec<Value> {
    let has_icon = |row: &Value| {
        row.get("icon_png_base64")
            .and_then(Value::as_str)
            .is_some_and(|s| !s.trim().is_empty())
    };
    let text_of = |row: &Value, key: &str| match row.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    let mut index: BTreeMap<(String, String, String), usize> = BTreeMap::new();
    let mut kept: Vec<(String, Value)> = Vec::with_capacity(rows.len());
    for (table, row) in rows {
        let key = (
            text_of(&row, "created_at"),
            text_of(&row, "user_id"),
            text_of(&row, "payload"),
        );
        let Some(&slot) = index.get(&key) else {
            index.insert(key, kept.len());
            kept.push((table, row));
            continue;
        };
        let (existing_table, existing) = &kept[slot];
        let replace = match (has_icon(&row), has_icon(existing)) {
            (true, false) => true,
            (false, true) => false,
            _ => table == active && existing_table != active,
        };
        if replace {
            kept[slot] = (table, row);
        }
    }

    let mut out: Vec<Value> = kept.into_iter().map(|(_, row)| row).collect();
    out.sort_by_key(|row| text_of(row, "created_at"));
    out
}

/// [`Gateway`] over HTTP.
pub struct SupabaseGateway {
    base_url: String,
    api_key: String,
    tables: TablesConfig,
    utc_offset_minutes: i32,
    agent: ureq::Agent,
    active_table: Mutex<Option<String>>,
}

impl std::fmt::Debug for SupabaseGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseGateway")
            .field("base_url", &self.base_url)
            .field("tables", &self.tables)
            .field("active_table", &self.active_table())
            .finish_non_exhaustive()
    }
}

impl SupabaseGateway {
    /// # Errors
    ///
    /// [`NagError::Config`] when the endpoint or API key is missing.
    pub fn new(config: &GatewayConfig, utc_offset_minutes: i32) -> Result<Self, NagError> {
        config.require_remote()?;
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .user_agent(concat!("nagme/", env!("CARGO_PKG_VERSION")))
            .build();
        Ok(Self {
            base_url: config.base_url().to_string(),
            api_key: config.api_key.trim().to_string(),
            tables: config.tables.clone(),
            utc_offset_minutes,
            agent,
            active_table: Mutex::new(None),
        })
    }

    /// The event table that served or accepted the last request.
    #[must_use]
    pub fn active_table(&self) -> Option<String> {
        self.active_table.lock().ok().and_then(|guard| guard.clone())
    }

    fn remember_table(&self, table: &str) {
        if let Ok(mut guard) = self.active_table.lock() {
            *guard = Some(table.to_string());
        }
    }

    /// Event tables to try, the active one first.
    fn table_order(&self) -> Vec<String> {
        let mut order: Vec<String> = self.active_table().into_iter().collect();
        for table in &self.tables.events {
            if !order.contains(table) {
                order.push(table.clone());
            }
        }
        order
    }

    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn authed(&self, request: ureq::Request, session: &Session) -> ureq::Request {
        request
            .set("apikey", &self.api_key)
            .set("Authorization", &format!("Bearer {}", session.access_token))
    }

    fn get_page(&self, session: &Session, table: &str, columns: &str, offset: usize) -> Result<Vec<Value>, CallError> {
        let request = self
            .authed(self.agent.get(&self.rest_url(table)), session)
            .query("select", columns)
            .query("order", "created_at.asc")
            .query("limit", &PAGE_SIZE.to_string())
            .query("offset", &offset.to_string());
        let response = call(request.call())?;
        let page: Value = response
            .into_json()
            .map_err(|e| NagError::Decode(format!("{table}: {e}")))?;
        match page {
            Value::Array(rows) => Ok(rows),
            _ => Err(NagError::Decode(format!("{table}: expected a JSON array of rows")).into()),
        }
    }

    /// Every row of one table.
    fn fetch_table(&self, session: &Session, table: &str, select_all: bool) -> Result<Vec<Value>, NagError> {
        let mut columns = if select_all { "*" } else { EXTENDED_COLUMNS };
        let mut rows = Vec::new();
        let mut offset = 0;
        loop {
            let page = match self.get_page(session, table, columns, offset) {
                Ok(page) => page,
                Err(CallError::Http(failure))
                    if columns == EXTENDED_COLUMNS && is_missing_optional_column(&failure.body) =>
                {
                    debug!(table, "optional columns missing, retrying with core columns");
                    columns = CORE_COLUMNS;
                    continue;
                }
                Err(CallError::Http(failure)) => return Err(status_error(&failure, table)),
                Err(CallError::Other(err)) => return Err(err),
            };
            let count = page.len();
            debug!(table, offset, count, "fetched page");
            rows.extend(page);
            if count < PAGE_SIZE {
                break;
            }
            offset += PAGE_SIZE;
        }
        Ok(rows)
    }
}

impl Gateway for SupabaseGateway {
    fn authenticate(&self, email: &str, password: &str) -> Result<Session, NagError> {
        let url = format!("{}/auth/v1/token", self.base_url);
        let request = self
            .agent
            .post(&url)
            .query("grant_type", "password")
            .set("apikey", &self.api_key);
        let body = json!({ "email": email.trim(), "password": password });
        let response = match call(request.send_json(body)) {
            Ok(response) => response,
            Err(CallError::Http(failure)) => return Err(auth_error(&failure)),
            Err(CallError::Other(err)) => return Err(err),
        };
        let reply: Value = response
            .into_json()
            .map_err(|e| NagError::Decode(format!("sign-in reply: {e}")))?;

        let access_token = reply.get("access_token").and_then(Value::as_str);
        let user_id = reply
            .get("user")
            .and_then(|u| u.get("id"))
            .and_then(Value::as_str);
        match (access_token, user_id) {
            (Some(token), Some(user)) if !token.is_empty() && !user.is_empty() => {
                info!(user, "signed in");
                Ok(Session {
                    access_token: token.to_string(),
                    user_id: user.to_string(),
                })
            }
            _ => Err(NagError::Auth(
                "sign-in returned no access token or user id".to_string(),
            )),
        }
    }

    fn fetch_direct_rows(&self, session: &Session) -> Result<Vec<Nag>, NagError> {
        let table = &self.tables.direct;
        let rows = self.fetch_table(session, table, true)?;
        let total = rows.len();
        let nags: Vec<Nag> = rows
            .iter()
            .filter_map(|row| match decode_direct_row(row, self.utc_offset_minutes) {
                Ok(nag) => Some(nag),
                Err(err) => {
                    warn!(table = %table, error = %err, "skipping undecodable direct row");
                    None
                }
            })
            .collect();
        info!(table = %table, rows = total, decoded = nags.len(), "fetched direct rows");
        Ok(nags)
    }

    fn fetch_events(&self, session: &Session) -> Result<Vec<NagEvent>, NagError> {
        let order = self.table_order();
        let mut merged: Vec<(String, Value)> = Vec::new();
        let mut counts: Vec<(String, usize)> = Vec::new();
        let mut first_error: Option<NagError> = None;

        for table in &order {
            match self.fetch_table(session, table, false) {
                Ok(rows) => {
                    counts.push((table.clone(), rows.len()));
                    merged.extend(rows.into_iter().map(|row| (table.clone(), row)));
                }
                Err(NagError::NotFound(_)) => debug!(table = %table, "event table missing, skipped"),
                Err(err) => {
                    warn!(table = %table, error = %err, "event table failed");
                    first_error.get_or_insert(err);
                }
            }
        }

        // Largest table wins; earlier tables win ties.
        let Some(active) = counts
            .iter()
            .rev()
            .max_by_key(|(_, count)| *count)
            .map(|(table, _)| table.clone())
        else {
            return Err(first_error.unwrap_or_else(|| NagError::NotFound(order.join(", "))));
        };
        self.remember_table(&active);

        let rows = dedupe_rows(merged, &active);
        let events: Vec<NagEvent> = rows
            .iter()
            .enumerate()
            .filter_map(|(index, row)| match decode_event_row(row, index, self.utc_offset_minutes) {
                Ok(event) => Some(event),
                Err(err) => {
                    debug!(index, error = %err, "skipping row without a usable event");
                    None
                }
            })
            .collect();
        info!(active = %active, rows = rows.len(), events = events.len(), "fetched event log");
        Ok(events)
    }

    fn write_event(&self, session: &Session, event: &NagEvent) -> Result<(), NagError> {
        let row = encode_event(event, &session.user_id);
        let order = self.table_order();
        for table in &order {
            let request = self
                .authed(self.agent.post(&self.rest_url(table)), session)
                .set("Prefer", "return=minimal");
            match call(request.send_json(row.clone())) {
                Ok(_) => {
                    info!(table = %table, event = %event, "wrote event");
                    self.remember_table(table);
                    return Ok(());
                }
                Err(CallError::Http(failure)) if is_missing_table(&failure) => {
                    debug!(table = %table, "event table missing, trying next");
                }
                Err(CallError::Http(failure)) => return Err(status_error(&failure, table)),
                Err(CallError::Other(err)) => return Err(err),
            }
        }
        Err(NagError::NotFound(order.join(", ")))
    }

    fn delete_entity(&self, session: &Session, id: &NagId) -> Result<(), NagError> {
        let table = &self.tables.direct;
        let request = self
            .authed(self.agent.delete(&self.rest_url(table)), session)
            .query("id", &format!("eq.{id}"))
            .set("Prefer", "return=minimal");
        match call(request.call()) {
            Ok(_) => {
                info!(table = %table, nag = %id, "deleted direct row");
                Ok(())
            }
            Err(CallError::Http(failure)) => Err(status_error(&failure, table)),
            Err(CallError::Other(err)) => Err(err),
        }
    }

    fn upsert_direct_row(&self, session: &Session, nag: &Nag) -> Result<(), NagError> {
        let table = &self.tables.direct;
        let request = self
            .authed(self.agent.post(&self.rest_url(table)), session)
            .query("on_conflict", "id")
            .set("Prefer", "resolution=merge-duplicates,return=minimal");
        match call(request.send_json(encode_direct_row(nag, &session.user_id))) {
            Ok(_) => {
                info!(table = %table, nag = %nag.id, "upserted direct row");
                Ok(())
            }
            Err(CallError::Http(failure)) => Err(status_error(&failure, table)),
            Err(CallError::Other(err)) => Err(err),
        }
    }

    fn change_password(&self, session: &Session, new_password: &str) -> Result<(), NagError> {
        let url = format!("{}/auth/v1/user", self.base_url);
        let request = self.authed(self.agent.put(&url), session);
        match call(request.send_json(json!({ "password": new_password }))) {
            Ok(_) => {
                info!(user = %session.user_id, "password changed");
                Ok(())
            }
            Err(CallError::Http(failure)) => Err(auth_error(&failure)),
            Err(CallError::Other(err)) => Err(err),
        }
    }
}
