//! Meeting service
//!
//! The entry point the surrounding application talks to. A join enqueues the
//! participant and, once both queues hold at least `K` people, runs one
//! matching attempt: snapshot and dispatch under the queue's commit lock,
//! wait for the worker, claim the result, then open a video session for the
//! group.

use crate::config::MatchingSettings;
use crate::error::{MeetingError, Result};
use crate::events::EventPublisher;
use crate::friends::FriendIndex;
use crate::matching::{
    FirstValidMatcher, GroupMatcher, MatchRequest, MatchResponse, MatchWorker, MatchWorkerHandle,
};
use crate::metrics::MetricsCollector;
use crate::queue::{ClaimOutcome, ParticipantQueue};
use crate::session::SessionCoordinator;
use crate::types::{
    ConnectionHandle, Gender, JoinOutcome, MatchResult, MatchedSession, Participant,
    QueuePosition, SessionClosed, SessionId, SessionReady,
};
use crate::utils;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use tracing::{debug, error, info, warn};

/// Counters kept by the meeting service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeetingServiceStats {
    pub joins: u64,
    pub leaves: u64,
    pub matches_made: u64,
    pub no_match_attempts: u64,
    pub stale_attempts: u64,
    pub failed_attempts: u64,
    pub sessions_closed: u64,
    pub males_waiting: usize,
    pub females_waiting: usize,
    pub active_sessions: usize,
}

pub struct MeetingService {
    queue: Arc<ParticipantQueue>,
    friend_index: Arc<FriendIndex>,
    worker: MatchWorkerHandle,
    sessions: Arc<SessionCoordinator>,
    event_publisher: Arc<dyn EventPublisher>,
    metrics: Arc<MetricsCollector>,
    settings: MatchingSettings,
    stats: RwLock<MeetingServiceStats>,
}

impl MeetingService {
    /// Create the service with the first-valid group matcher.
    ///
    /// Spawns the match worker, so it must be called inside a tokio runtime.
    pub fn new(
        queue: Arc<ParticipantQueue>,
        friend_index: Arc<FriendIndex>,
        sessions: Arc<SessionCoordinator>,
        event_publisher: Arc<dyn EventPublisher>,
        metrics: Arc<MetricsCollector>,
        settings: MatchingSettings,
    ) -> Self {
        let matcher = Arc::new(FirstValidMatcher::new(settings.group_size));
        Self::with_matcher(
            queue,
            friend_index,
            sessions,
            event_publisher,
            metrics,
            settings,
            matcher,
        )
    }

    /// Create the service with a custom group matcher
    pub fn with_matcher(
        queue: Arc<ParticipantQueue>,
        friend_index: Arc<FriendIndex>,
        sessions: Arc<SessionCoordinator>,
        event_publisher: Arc<dyn EventPublisher>,
        metrics: Arc<MetricsCollector>,
        settings: MatchingSettings,
        matcher: Arc<dyn GroupMatcher>,
    ) -> Self {
        let worker = MatchWorker::spawn(
            friend_index.clone(),
            matcher,
            settings.worker_queue_capacity,
        );

        Self {
            queue,
            friend_index,
            worker,
            sessions,
            event_publisher,
            metrics,
            settings,
            stats: RwLock::new(MeetingServiceStats::default()),
        }
    }

    /// Add a participant to a queue and try to form a group.
    ///
    /// `session` is set when this join produced a session. The joiner may or
    /// may not be part of it; `queue.position` is `None` when they are.
    pub async fn join_queue(
        &self,
        identity: &str,
        connection_handle: ConnectionHandle,
        gender: Gender,
    ) -> Result<JoinOutcome> {
        let timer = self.metrics.start_timer();

        info!(
            "Processing join - participant: '{}', gender: {}, connection: {}",
            identity, gender, connection_handle
        );

        let position = self
            .queue
            .enqueue(gender, Participant::new(identity, connection_handle))
            .await?;
        self.update_stats(|stats| stats.joins += 1)?;
        debug!(
            "Participant '{}' queued at {:?} of {}",
            identity, position.position, position.queue_length
        );

        let session = self.try_match().await?;

        let queue = match &session {
            Some(matched) if contains(matched, identity) => QueuePosition {
                gender,
                position: None,
                queue_length: self.queue.snapshot(gender).await?.len(),
            },
            _ => self.queue.position(gender, identity).await?,
        };

        let lengths = self.queue.lengths().await?;
        let duration = timer.stop();
        self.metrics.record_join(gender, lengths, duration);

        info!(
            "Join processed - participant: '{}', matched: {}, time: {:.2}ms",
            identity,
            queue.position.is_none(),
            duration.as_secs_f64() * 1000.0
        );

        Ok(JoinOutcome { queue, session })
    }

    /// Remove a participant from a queue. Does not trigger matching.
    pub async fn leave_queue(&self, identity: &str, gender: Gender) -> Result<()> {
        let removed = self.queue.remove(gender, identity).await?;
        if removed {
            self.update_stats(|stats| stats.leaves += 1)?;
            info!("Participant '{}' left the {} queue", identity, gender);
        }

        let lengths = self.queue.lengths().await?;
        self.metrics.record_leave(gender, lengths);
        Ok(())
    }

    /// Close a session. Closing an unknown or closed session is a no-op.
    pub async fn close_session(&self, session_id: SessionId) -> Result<()> {
        if !self.sessions.close(session_id).await? {
            return Ok(());
        }

        self.update_stats(|stats| stats.sessions_closed += 1)?;
        let event = SessionClosed {
            session_id,
            timestamp: utils::current_timestamp(),
        };
        if let Err(e) = self.event_publisher.publish_session_closed(event).await {
            error!("Failed to publish SessionClosed for {}: {}", session_id, e);
        }
        Ok(())
    }

    /// Current (male, female) queue lengths
    pub async fn queue_lengths(&self) -> Result<(usize, usize)> {
        self.queue.lengths().await
    }

    /// Forget the cached friend set of a participant
    pub async fn invalidate_friends(&self, identity: &str) {
        self.friend_index.invalidate(identity).await;
    }

    pub fn sessions(&self) -> Arc<SessionCoordinator> {
        self.sessions.clone()
    }

    pub fn queue(&self) -> Arc<ParticipantQueue> {
        self.queue.clone()
    }

    pub fn settings(&self) -> &MatchingSettings {
        &self.settings
    }

    /// Counters plus current queue and session sizes
    pub async fn get_stats(&self) -> Result<MeetingServiceStats> {
        let (males, females) = self.queue.lengths().await?;
        let mut stats = self
            .stats
            .read()
            .map_err(|_| Self::stats_lock_error())?
            .clone();

        stats.males_waiting = males;
        stats.females_waiting = females;
        stats.active_sessions = self.sessions.session_count();
        Ok(stats)
    }

    /// One matching attempt, retried with a fresh snapshot when the result
    /// went stale before it could be claimed
    async fn try_match(&self) -> Result<Option<MatchedSession>> {
        let group_size = self.settings.group_size;
        let mut stale_retries = 0;

        loop {
            let timer = self.metrics.start_timer();

            // Room in the worker buffer comes first so a full buffer never
            // holds up leaves behind the admission lock
            let slot = self.worker.reserve().await?;
            let pending = {
                let Some(ticket) = self.queue.admit(group_size).await? else {
                    return Ok(None);
                };
                slot.send(MatchRequest::new(ticket.snapshot))
                // Admission lock released here, before waiting on the worker
            };
            let attempt_id = pending.attempt_id();

            let response = pending.outcome().await?;
            let result = match response {
                MatchResponse::Matched(result) => result,
                MatchResponse::NoMatch => {
                    self.metrics.record_match_attempt("no_match", timer.stop());
                    self.update_stats(|stats| stats.no_match_attempts += 1)?;
                    debug!("Attempt {} found no compatible group", attempt_id);
                    return Ok(None);
                }
                MatchResponse::Failed(e) => {
                    self.metrics.record_match_attempt("failed", timer.stop());
                    self.update_stats(|stats| stats.failed_attempts += 1)?;
                    error!("Attempt {} failed: {}", attempt_id, e);
                    return Err(e.into());
                }
            };

            match self.queue.claim(&result).await? {
                ClaimOutcome::Claimed(claimed) => {
                    self.metrics.record_match_attempt("matched", timer.stop());
                    info!(
                        "Attempt {} matched - males: {:?}, females: {:?}",
                        attempt_id,
                        claimed.male_identities(),
                        claimed.female_identities()
                    );
                    return self.open_session(claimed).await.map(Some);
                }
                ClaimOutcome::Stale { missing } => {
                    self.metrics.record_match_attempt("stale", timer.stop());
                    self.update_stats(|stats| stats.stale_attempts += 1)?;

                    if stale_retries >= self.settings.max_stale_retries {
                        warn!(
                            "Attempt {} stale ({:?} left), giving up after {} retries",
                            attempt_id, missing, stale_retries
                        );
                        return Ok(None);
                    }
                    stale_retries += 1;
                    debug!(
                        "Attempt {} stale ({:?} left), retrying with a fresh snapshot",
                        attempt_id, missing
                    );
                }
            }
        }
    }

    /// Create the session for a claimed group and register everyone.
    ///
    /// On failure the group goes back to the tail of the queues.
    async fn open_session(&self, claimed: MatchResult) -> Result<MatchedSession> {
        let session_id = utils::generate_session_id();

        if let Err(e) = self.setup_session(session_id, &claimed).await {
            error!(
                "Session setup for {} failed, restoring participants: {}",
                session_id, e
            );

            if let Err(restore_error) = self.queue.restore(&claimed).await {
                return Err(restore_error.context(format!(
                    "failed to restore participants after session setup error: {}",
                    e
                )));
            }
            self.metrics
                .record_restored(claimed.males.len() + claimed.females.len());

            if let Err(close_error) = self.sessions.close(session_id).await {
                warn!(
                    "Failed to clean up session {} after setup error: {}",
                    session_id, close_error
                );
            }
            return Err(e);
        }

        for (gender, participant) in claimed.members() {
            self.metrics
                .record_wait_time(gender, utils::wait_duration(participant.joined_at));
        }
        self.update_stats(|stats| stats.matches_made += 1)?;

        let event = SessionReady {
            session_id,
            males: claimed.males.clone(),
            females: claimed.females.clone(),
            timestamp: utils::current_timestamp(),
        };
        if let Err(e) = self.event_publisher.publish_session_ready(event).await {
            error!("Failed to publish SessionReady for {}: {}", session_id, e);
        }

        Ok(MatchedSession {
            session_id,
            males: claimed.males,
            females: claimed.females,
        })
    }

    async fn setup_session(&self, session_id: SessionId, claimed: &MatchResult) -> Result<()> {
        self.sessions.create_or_reuse(session_id).await?;
        for (_, participant) in claimed.members() {
            self.sessions
                .register_participant(
                    session_id,
                    &participant.identity,
                    participant.connection_handle.clone(),
                )
                .await?;
        }
        self.sessions.activate(session_id).await
    }

    fn stats_lock_error() -> MeetingError {
        MeetingError::InternalError {
            message: "Failed to acquire stats lock".to_string(),
        }
    }

    fn update_stats(&self, update: impl FnOnce(&mut MeetingServiceStats)) -> Result<()> {
        let mut stats = self.stats.write().map_err(|_| Self::stats_lock_error())?;
        update(&mut stats);
        Ok(())
    }
}

fn contains(session: &MatchedSession, identity: &str) -> bool {
    session
        .males
        .iter()
        .chain(session.females.iter())
        .any(|p| p.identity == identity)
}
