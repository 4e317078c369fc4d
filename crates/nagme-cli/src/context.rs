//! Per-invocation state shared by the commands: resolved config, output
//! mode, clock, and lazy access to the session and gateway.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info};

use nagme_core::config::{AppConfig, resolve_config};
use nagme_core::event::{EventData, NagEvent};
use nagme_core::model::{Nag, NagId};
use nagme_core::source::{CurrentState, Session, StateSource, commit_event, load_current_state};
use nagme_core::timefmt::local_offset_minutes;
use nagme_core::NagError;
use nagme_remote::{SessionStore, SupabaseGateway};
use uuid::Uuid;

use crate::output::OutputMode;

pub struct AppContext {
    pub config: AppConfig,
    pub output: OutputMode,
    /// Wall clock for calendar recurrences and date input.
    pub utc_offset_minutes: i32,
}

impl AppContext {
    /// # Errors
    ///
    /// Fails when the config file cannot be read or parsed.
    pub fn load(config_path: Option<&Path>, output: impl FnOnce(&AppConfig) -> OutputMode) -> Result<Self> {
        let config = resolve_config(config_path)?;
        let utc_offset_minutes = config
            .display
            .utc_offset_minutes
            .unwrap_or_else(local_offset_minutes);
        let output = output(&config);
        debug!(
            mode = %config.gateway.mode,
            offset = utc_offset_minutes,
            "resolved config"
        );
        Ok(Self {
            config,
            output,
            utc_offset_minutes,
        })
    }

    #[must_use]
    pub fn now_ms() -> i64 {
        Utc::now().timestamp_millis()
    }

    /// # Errors
    ///
    /// [`NagError::Config`] when the gateway is not configured.
    pub fn gateway(&self) -> Result<SupabaseGateway> {
        Ok(SupabaseGateway::new(
            &self.config.gateway,
            self.utc_offset_minutes,
        )?)
    }

    /// # Errors
    ///
    /// [`NagError::NotSignedIn`] without a saved session.
    pub fn session() -> Result<Session> {
        let store = SessionStore::default_location()?;
        store.load()?.ok_or_else(|| NagError::NotSignedIn.into())
    }

    /// Fetch and rebuild the current nag map.
    ///
    /// # Errors
    ///
    /// Config, session and gateway failures.
    pub fn load_state(&self) -> Result<CurrentState> {
        let gateway = self.gateway()?;
        let session = Self::session()?;
        Ok(load_current_state(&gateway, &session)?)
    }

    /// Look up one nag. A nag whose history failed to replay reports the
    /// replay error instead of "not found".
    ///
    /// # Errors
    ///
    /// [`NagError::NotFound`] or [`NagError::MalformedEvent`].
    pub fn find_nag(state: &CurrentState, id: &NagId) -> Result<Nag> {
        if let Some(nag) = state.nags.get(id) {
            return Ok(nag.clone());
        }
        if let Some(failure) = state.failures.get(id) {
            return Err(NagError::MalformedEvent {
                nag_id: id.clone(),
                source: failure.clone(),
            }
            .into());
        }
        Err(NagError::NotFound(format!("nag '{id}'")).into())
    }

    /// A writer for the saved session.
    ///
    /// Read-only mode is rejected before anything touches the network.
    ///
    /// # Errors
    ///
    /// Permission, config and session failures.
    pub fn writer(&self) -> Result<Writer> {
        self.config.gateway.require_write()?;
        Ok(Writer::new(Arc::new(self.gateway()?), Arc::new(Self::session()?)))
    }

    /// Append one event for `nag_id`; see [`Writer::commit`].
    ///
    /// # Errors
    ///
    /// Permission, config, session, validation and gateway failures.
    pub fn write(
        &self,
        nag_id: &NagId,
        current: Option<Nag>,
        data: EventData,
        source: StateSource,
    ) -> Result<Option<Nag>> {
        self.writer()?.commit(nag_id, current, data, source)
    }
}

/// Signed-in gateway handle that appends events. Cheap to clone and safe to
/// move onto a worker thread.
#[derive(Clone)]
pub struct Writer {
    gateway: Arc<SupabaseGateway>,
    session: Arc<Session>,
}

impl Writer {
    #[must_use]
    pub const fn new(gateway: Arc<SupabaseGateway>, session: Arc<Session>) -> Self {
        Self { gateway, session }
    }

    /// Append one event for `nag_id`, returning the nag as it looks after
    /// the event is applied to `current`. `source` is where `current` was
    /// read from; direct rows are kept in step with the event log.
    ///
    /// # Errors
    ///
    /// Validation failures before anything is sent, then gateway failures.
    pub fn commit(
        &self,
        nag_id: &NagId,
        current: Option<Nag>,
        data: EventData,
        source: StateSource,
    ) -> Result<Option<Nag>> {
        let event = NagEvent::new(new_event_id(), nag_id.clone(), AppContext::now_ms(), data);
        let after = commit_event(self.gateway.as_ref(), &self.session, &event, current, source)
            .with_context(|| format!("Failed to write {} for '{nag_id}'", event.kind))?;
        info!(event = %event, "event written");
        Ok(after)
    }
}

/// Time-ordered event id (UUID v7).
#[must_use]
pub fn new_event_id() -> String {
    Uuid::now_v7().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_ids_are_unique_and_ordered() {
        let ids: Vec<String> = (0..64).map(|_| new_event_id()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted, ids);
        let parsed = Uuid::parse_str(&ids[0]).expect("uuid");
        assert_eq!(parsed.get_version_num(), 7);
    }

    #[test]
    fn missing_nag_is_not_found() {
        let state = CurrentState::empty();
        let err = AppContext::find_nag(&state, &NagId::new("rent").expect("id")).expect_err("absent");
        let nag = err.downcast_ref::<NagError>().expect("nag error");
        assert!(nag.is_not_found());
    }
}
