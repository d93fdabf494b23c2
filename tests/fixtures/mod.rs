//! Test fixtures and collaborator doubles for integration testing

#![allow(dead_code)]

use async_trait::async_trait;
use meeting_matcher::config::MatchingSettings;
use meeting_matcher::error::{MeetingError, Result};
use meeting_matcher::events::MockEventPublisher;
use meeting_matcher::friends::{FriendIndex, FriendLookupPolicy, SocialGraph, StaticSocialGraph};
use meeting_matcher::metrics::MetricsCollector;
use meeting_matcher::queue::{InMemoryQueueStore, ParticipantQueue};
use meeting_matcher::service::MeetingService;
use meeting_matcher::session::{
    InMemoryVideoProvider, RemoteSessionHandle, SessionCoordinator, VideoProvider,
};
use meeting_matcher::types::{ConnectionHandle, Gender, Identity, JoinOutcome, SessionId};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};

/// Social graph whose lookups block until the test opens the gate.
///
/// Lets a test hold a matching attempt in flight while it changes the queues.
pub struct GatedSocialGraph {
    inner: StaticSocialGraph,
    entered: Notify,
    gate: Semaphore,
}

impl GatedSocialGraph {
    pub fn new(inner: StaticSocialGraph) -> Self {
        Self {
            inner,
            entered: Notify::new(),
            gate: Semaphore::new(0),
        }
    }

    /// Resolves once some lookup is waiting at the gate
    pub async fn wait_until_entered(&self) {
        self.entered.notified().await;
    }

    /// Let every current and future lookup through
    pub fn open(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }
}

#[async_trait]
impl SocialGraph for GatedSocialGraph {
    async fn friends_of(&self, identity: &str) -> Result<HashSet<Identity>> {
        self.entered.notify_one();
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| MeetingError::InternalError {
                message: format!("gate closed: {}", e),
            })?;
        self.inner.friends_of(identity).await
    }
}

/// Social graph that counts lookups
#[derive(Default)]
pub struct CountingSocialGraph {
    inner: StaticSocialGraph,
    lookups: AtomicUsize,
}

impl CountingSocialGraph {
    pub fn new(inner: StaticSocialGraph) -> Self {
        Self {
            inner,
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SocialGraph for CountingSocialGraph {
    async fn friends_of(&self, identity: &str) -> Result<HashSet<Identity>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.friends_of(identity).await
    }
}

/// Video provider that rejects every session
#[derive(Debug, Default)]
pub struct RejectingVideoProvider;

#[async_trait]
impl VideoProvider for RejectingVideoProvider {
    async fn create_session(&self, _session_id: SessionId) -> Result<RemoteSessionHandle> {
        Err(MeetingError::ProviderFailure {
            operation: "create_session".to_string(),
            reason: "capacity exhausted".to_string(),
        }
        .into())
    }

    async fn close_session(&self, _handle: &RemoteSessionHandle) -> Result<()> {
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "rejecting"
    }
}

/// A complete in-process meeting matcher with its collaborators exposed
pub struct TestSystem {
    pub service: Arc<MeetingService>,
    pub queue: Arc<ParticipantQueue>,
    pub sessions: Arc<SessionCoordinator>,
    pub events: Arc<MockEventPublisher>,
    pub metrics: Arc<MetricsCollector>,
}

impl TestSystem {
    pub async fn join(&self, identity: &str, gender: Gender) -> JoinOutcome {
        self.service
            .join_queue(identity, connection(identity), gender)
            .await
            .unwrap()
    }

    pub async fn leave(&self, identity: &str, gender: Gender) {
        self.service.leave_queue(identity, gender).await.unwrap()
    }

    /// Identities waiting in one queue, head first
    pub async fn queued(&self, gender: Gender) -> Vec<Identity> {
        self.queue
            .snapshot(gender)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.identity)
            .collect()
    }
}

/// Build a system over the given social graph and video provider
pub fn create_test_system_with(
    group_size: usize,
    graph: Arc<dyn SocialGraph>,
    provider: Arc<dyn VideoProvider>,
) -> TestSystem {
    let settings = MatchingSettings {
        group_size,
        ..MatchingSettings::default()
    };
    create_test_system_with_settings(settings, graph, provider)
}

/// Build a system with explicit matching settings
pub fn create_test_system_with_settings(
    settings: MatchingSettings,
    graph: Arc<dyn SocialGraph>,
    provider: Arc<dyn VideoProvider>,
) -> TestSystem {
    let metrics = Arc::new(MetricsCollector::new().unwrap());
    let queue = Arc::new(ParticipantQueue::new(Arc::new(InMemoryQueueStore::new())));
    let friend_index = Arc::new(
        FriendIndex::new(
            graph,
            1_000,
            Duration::from_secs(60),
            FriendLookupPolicy::FailClosed,
        )
        .with_metrics(metrics.clone()),
    );
    let sessions = Arc::new(SessionCoordinator::new(provider).with_metrics(metrics.clone()));
    let events = Arc::new(MockEventPublisher::new());

    let service = Arc::new(MeetingService::new(
        queue.clone(),
        friend_index,
        sessions.clone(),
        events.clone(),
        metrics.clone(),
        settings,
    ));

    TestSystem {
        service,
        queue,
        sessions,
        events,
        metrics,
    }
}

/// Build a system with the given friend pairs and an in-memory provider
pub fn create_test_system(group_size: usize, friendships: &[(&str, &str)]) -> TestSystem {
    create_test_system_with(
        group_size,
        Arc::new(StaticSocialGraph::with_friendships(
            friendships.iter().copied(),
        )),
        Arc::new(InMemoryVideoProvider::new()),
    )
}

pub fn connection(identity: &str) -> ConnectionHandle {
    ConnectionHandle::new(format!("conn-{}", identity))
}

/// Sorted identities, for order-insensitive comparison
pub fn sorted(ids: impl IntoIterator<Item = Identity>) -> Vec<Identity> {
    let mut ids: Vec<Identity> = ids.into_iter().collect();
    ids.sort();
    ids
}

/// Social graph that fails lookups for one identity
pub struct FailingSocialGraph {
    inner: StaticSocialGraph,
    failing: Identity,
}

impl FailingSocialGraph {
    pub fn new(inner: StaticSocialGraph, failing: &str) -> Self {
        Self {
            inner,
            failing: failing.to_string(),
        }
    }
}

#[async_trait]
impl SocialGraph for FailingSocialGraph {
    async fn friends_of(&self, identity: &str) -> Result<HashSet<Identity>> {
        if identity == self.failing {
            return Err(MeetingError::FriendLookupFailure {
                identity: identity.to_string(),
                reason: "social graph unavailable".to_string(),
            }
            .into());
        }
        self.inner.friends_of(identity).await
    }
}
