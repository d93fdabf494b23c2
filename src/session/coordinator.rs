//! Session coordinator
//!
//! Tracks video sessions created for matched groups and their rosters. Every
//! session lives in its own async slot, so roster changes for one session are
//! serialized while different sessions proceed in parallel.

use crate::error::{MeetingError, Result};
use crate::metrics::MetricsCollector;
use crate::session::provider::{RemoteSessionHandle, VideoProvider};
use crate::types::{ConnectionHandle, Identity, SessionId};
use crate::utils;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Lifecycle of a tracked session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Remote session exists, nobody registered yet
    Created,
    /// At least one participant registered
    Active,
    /// Closed; terminal
    Closed,
}

/// Roster entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionParticipant {
    pub identity: Identity,
    pub connection_handle: ConnectionHandle,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub remote: RemoteSessionHandle,
    pub state: SessionState,
    pub participants: Vec<SessionParticipant>,
    pub created_at: DateTime<Utc>,
}

type SessionSlot = Arc<Mutex<Option<Session>>>;

pub struct SessionCoordinator {
    provider: Arc<dyn VideoProvider>,
    sessions: RwLock<HashMap<SessionId, SessionSlot>>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl SessionCoordinator {
    pub fn new(provider: Arc<dyn VideoProvider>) -> Self {
        Self {
            provider,
            sessions: RwLock::new(HashMap::new()),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.provider_name()
    }

    fn lock_error() -> MeetingError {
        MeetingError::InternalError {
            message: "Failed to acquire session map lock".to_string(),
        }
    }

    fn unknown(session_id: SessionId) -> anyhow::Error {
        MeetingError::UnknownSession {
            session_id: session_id.to_string(),
        }
        .into()
    }

    /// Keep provider errors as `ProviderFailure`, naming the operation
    fn provider_error(&self, operation: &str, error: anyhow::Error) -> anyhow::Error {
        if let Some(metrics) = &self.metrics {
            metrics.record_provider_error(operation);
        }
        match MeetingError::find(&error) {
            Some(MeetingError::ProviderFailure { .. }) => error,
            _ => MeetingError::ProviderFailure {
                operation: operation.to_string(),
                reason: error.to_string(),
            }
            .into(),
        }
    }

    fn slot(&self, session_id: SessionId) -> Result<Option<SessionSlot>> {
        let sessions = self.sessions.read().map_err(|_| Self::lock_error())?;
        Ok(sessions.get(&session_id).cloned())
    }

    fn slot_or_insert(&self, session_id: SessionId) -> Result<SessionSlot> {
        let mut sessions = self.sessions.write().map_err(|_| Self::lock_error())?;
        Ok(sessions
            .entry(session_id)
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone())
    }

    fn forget(&self, session_id: SessionId, slot: &SessionSlot) -> Result<()> {
        let mut sessions = self.sessions.write().map_err(|_| Self::lock_error())?;
        if sessions
            .get(&session_id)
            .map(|current| Arc::ptr_eq(current, slot))
            .unwrap_or(false)
        {
            sessions.remove(&session_id);
        }
        Ok(())
    }

    /// Return the tracked session, or create it on the provider.
    ///
    /// A failed creation leaves nothing tracked.
    pub async fn create_or_reuse(&self, session_id: SessionId) -> Result<Session> {
        let slot = self.slot_or_insert(session_id)?;
        let mut guard = slot.lock().await;

        if let Some(session) = guard.as_ref() {
            debug!("Reusing tracked session {}", session_id);
            return Ok(session.clone());
        }

        let remote = match self.provider.create_session(session_id).await {
            Ok(remote) => remote,
            Err(e) => {
                error!("Failed to create session {}: {}", session_id, e);
                drop(guard);
                self.forget(session_id, &slot)?;
                return Err(self.provider_error("create session", e));
            }
        };

        let session = Session {
            id: session_id,
            remote,
            state: SessionState::Created,
            participants: Vec::new(),
            created_at: utils::current_timestamp(),
        };
        *guard = Some(session.clone());

        if let Some(metrics) = &self.metrics {
            metrics.record_session_created();
        }
        info!(
            "Created session {} on {} - remote id: {}",
            session_id,
            self.provider.provider_name(),
            session.remote.remote_id
        );
        Ok(session)
    }

    /// Add a participant to the roster. Re-registering replaces the handle.
    pub async fn register_participant(
        &self,
        session_id: SessionId,
        identity: &str,
        connection_handle: ConnectionHandle,
    ) -> Result<()> {
        let slot = self.slot(session_id)?.ok_or_else(|| Self::unknown(session_id))?;
        let mut guard = slot.lock().await;
        let session = guard.as_mut().ok_or_else(|| Self::unknown(session_id))?;

        match session
            .participants
            .iter_mut()
            .find(|p| p.identity == identity)
        {
            Some(existing) => {
                debug!(
                    "Replacing connection of '{}' in session {}",
                    identity, session_id
                );
                existing.connection_handle = connection_handle;
            }
            None => session.participants.push(SessionParticipant {
                identity: identity.to_string(),
                connection_handle,
            }),
        }

        if session.state == SessionState::Created {
            session.state = SessionState::Active;
        }

        debug!(
            "Registered '{}' in session {} - roster size: {}",
            identity,
            session_id,
            session.participants.len()
        );
        Ok(())
    }

    /// Drop a participant from the roster, if present
    pub async fn remove_participant(&self, session_id: SessionId, identity: &str) -> Result<()> {
        let slot = self.slot(session_id)?.ok_or_else(|| Self::unknown(session_id))?;
        let mut guard = slot.lock().await;
        let session = guard.as_mut().ok_or_else(|| Self::unknown(session_id))?;

        session.participants.retain(|p| p.identity != identity);
        debug!(
            "Removed '{}' from session {} - roster size: {}",
            identity,
            session_id,
            session.participants.len()
        );
        Ok(())
    }

    /// Tell the provider the roster is complete
    pub async fn activate(&self, session_id: SessionId) -> Result<()> {
        let slot = self.slot(session_id)?.ok_or_else(|| Self::unknown(session_id))?;
        let guard = slot.lock().await;
        let session = guard.as_ref().ok_or_else(|| Self::unknown(session_id))?;

        self.provider
            .activate_session(&session.remote)
            .await
            .map_err(|e| self.provider_error("activate session", e))?;

        info!(
            "Session {} active with {} participants",
            session_id,
            session.participants.len()
        );
        Ok(())
    }

    /// Close the remote session and stop tracking it.
    ///
    /// Returns false when the session was not tracked. If the provider fails
    /// the session stays tracked so the close can be retried.
    pub async fn close(&self, session_id: SessionId) -> Result<bool> {
        let Some(slot) = self.slot(session_id)? else {
            debug!("Close for untracked session {} ignored", session_id);
            return Ok(false);
        };

        let mut guard = slot.lock().await;
        let Some(session) = guard.as_mut() else {
            return Ok(false);
        };

        if let Err(e) = self.provider.close_session(&session.remote).await {
            warn!("Failed to close session {}: {}", session_id, e);
            return Err(self.provider_error("close session", e));
        }

        session.state = SessionState::Closed;
        let closed = guard.take();
        drop(guard);
        self.forget(session_id, &slot)?;

        if let Some(metrics) = &self.metrics {
            metrics.record_session_closed();
        }
        info!(
            "Closed session {} - participants: {}",
            session_id,
            closed.map(|s| s.participants.len()).unwrap_or(0)
        );
        Ok(true)
    }

    /// Copy of a tracked session
    pub async fn get(&self, session_id: SessionId) -> Result<Option<Session>> {
        let Some(slot) = self.slot(session_id)? else {
            return Ok(None);
        };
        let guard = slot.lock().await;
        Ok(guard.clone())
    }

    /// Current roster of a tracked session
    pub async fn participants(&self, session_id: SessionId) -> Result<Vec<SessionParticipant>> {
        self.get(session_id)
            .await?
            .map(|session| session.participants)
            .ok_or_else(|| Self::unknown(session_id))
    }

    pub fn session_count(&self) -> usize {
        self.sessions
            .read()
            .map(|sessions| sessions.len())
            .unwrap_or(0)
    }
}
