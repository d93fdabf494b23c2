//! Video conference providers
//!
//! `VideoProvider` is the seam to the conferencing backend. The OpenVidu
//! provider talks to the OpenVidu REST API; the in-memory provider keeps
//! sessions in a map for tests and local runs.

use crate::error::{MeetingError, Result};
use crate::types::SessionId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reference to a session on the provider's side
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSessionHandle {
    /// Provider-side session id
    pub remote_id: String,
    pub created_at: DateTime<Utc>,
}

impl RemoteSessionHandle {
    pub fn new(remote_id: impl Into<String>) -> Self {
        Self {
            remote_id: remote_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// Trait for video conference backends
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VideoProvider: Send + Sync {
    /// Create the remote session for `session_id`
    async fn create_session(&self, session_id: SessionId) -> Result<RemoteSessionHandle>;

    /// Tell the provider the roster is complete
    async fn activate_session(&self, _handle: &RemoteSessionHandle) -> Result<()> {
        Ok(())
    }

    /// Close the remote session. Closing an already closed session succeeds.
    async fn close_session(&self, handle: &RemoteSessionHandle) -> Result<()>;

    /// Short provider name for logs and health output
    fn provider_name(&self) -> &'static str;
}

fn provider_failure(operation: &str, reason: impl std::fmt::Display) -> anyhow::Error {
    MeetingError::ProviderFailure {
        operation: operation.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

/// In-process provider
#[derive(Debug, Default)]
pub struct InMemoryVideoProvider {
    sessions: RwLock<HashMap<String, RemoteSessionHandle>>,
}

impl InMemoryVideoProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_error() -> MeetingError {
        MeetingError::InternalError {
            message: "Failed to acquire video session lock".to_string(),
        }
    }

    /// Whether a remote session is currently open
    pub fn is_open(&self, remote_id: &str) -> bool {
        self.sessions
            .read()
            .map(|sessions| sessions.contains_key(remote_id))
            .unwrap_or(false)
    }

    pub fn open_sessions(&self) -> usize {
        self.sessions
            .read()
            .map(|sessions| sessions.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl VideoProvider for InMemoryVideoProvider {
    async fn create_session(&self, session_id: SessionId) -> Result<RemoteSessionHandle> {
        let mut sessions = self.sessions.write().map_err(|_| Self::lock_error())?;
        let handle = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| RemoteSessionHandle::new(session_id.to_string()))
            .clone();

        debug!("In-memory video session {} open", handle.remote_id);
        Ok(handle)
    }

    async fn close_session(&self, handle: &RemoteSessionHandle) -> Result<()> {
        let mut sessions = self.sessions.write().map_err(|_| Self::lock_error())?;
        if sessions.remove(&handle.remote_id).is_none() {
            debug!("In-memory video session {} already closed", handle.remote_id);
        }
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "inmemory"
    }
}

const OPENVIDU_USER: &str = "OPENVIDUAPP";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionBody {
    custom_session_id: String,
}

#[derive(Debug, Deserialize)]
struct SessionBody {
    id: String,
}

/// OpenVidu REST API client
pub struct OpenViduProvider {
    base_url: Url,
    secret: String,
    client: Client,
}

impl OpenViduProvider {
    pub fn new(base_url: &str, secret: &str, timeout: Duration) -> Result<Self> {
        let parsed = Url::parse(base_url).map_err(|e| MeetingError::ConfigurationError {
            message: format!("Invalid OpenVidu URL '{}': {}", base_url, e),
        })?;
        if parsed.cannot_be_a_base() {
            return Err(MeetingError::ConfigurationError {
                message: format!("OpenVidu URL '{}' cannot take a path", base_url),
            }
            .into());
        }

        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            MeetingError::ConfigurationError {
                message: format!("Failed to build OpenVidu HTTP client: {}", e),
            }
        })?;

        info!("Using OpenVidu at {}", base_url);

        Ok(Self {
            base_url: parsed,
            secret: secret.to_string(),
            client,
        })
    }

    /// Base URL with each segment percent-encoded onto the path
    fn api_url(&self, segments: &[&str]) -> Result<Url> {
        if let Some(bad) = segments
            .iter()
            .find(|s| s.is_empty() || **s == "." || **s == "..")
        {
            return Err(provider_failure(
                "build url",
                format!("'{}' is not a usable path segment", bad),
            ));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| provider_failure("build url", "OpenVidu URL cannot take a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn sessions_url(&self) -> Result<Url> {
        self.api_url(&["openvidu", "api", "sessions"])
    }

    fn session_url(&self, remote_id: &str) -> Result<Url> {
        self.api_url(&["openvidu", "api", "sessions", remote_id])
    }
}

#[async_trait]
impl VideoProvider for OpenViduProvider {
    async fn create_session(&self, session_id: SessionId) -> Result<RemoteSessionHandle> {
        let body = CreateSessionBody {
            custom_session_id: session_id.to_string(),
        };

        let response = self
            .client
            .post(self.sessions_url()?)
            .basic_auth(OPENVIDU_USER, Some(&self.secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| provider_failure("create session", e))?;

        match response.status() {
            StatusCode::CONFLICT => {
                debug!("OpenVidu session {} already exists", session_id);
                Ok(RemoteSessionHandle::new(session_id.to_string()))
            }
            status if status.is_success() => {
                let session: SessionBody = response
                    .json()
                    .await
                    .map_err(|e| provider_failure("create session", e))?;
                info!("Created OpenVidu session {}", session.id);
                Ok(RemoteSessionHandle::new(session.id))
            }
            status => Err(provider_failure(
                "create session",
                format!("OpenVidu returned {}", status),
            )),
        }
    }

    async fn activate_session(&self, handle: &RemoteSessionHandle) -> Result<()> {
        let response = self
            .client
            .get(self.session_url(&handle.remote_id)?)
            .basic_auth(OPENVIDU_USER, Some(&self.secret))
            .send()
            .await
            .map_err(|e| provider_failure("activate session", e))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(provider_failure(
                "activate session",
                format!("OpenVidu returned {} for {}", status, handle.remote_id),
            ))
        }
    }

    async fn close_session(&self, handle: &RemoteSessionHandle) -> Result<()> {
        let response = self
            .client
            .delete(self.session_url(&handle.remote_id)?)
            .basic_auth(OPENVIDU_USER, Some(&self.secret))
            .send()
            .await
            .map_err(|e| provider_failure("close session", e))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                warn!("OpenVidu session {} was already gone", handle.remote_id);
                Ok(())
            }
            status if status.is_success() => {
                info!("Closed OpenVidu session {}", handle.remote_id);
                Ok(())
            }
            status => Err(provider_failure(
                "close session",
                format!("OpenVidu returned {}", status),
            )),
        }
    }

    fn provider_name(&self) -> &'static str {
        "openvidu"
    }
}
