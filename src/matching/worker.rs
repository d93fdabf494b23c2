//! Match worker
//!
//! Runs matching attempts away from the request path. Each request carries an
//! immutable snapshot of both queues; the worker hydrates friend sets, builds
//! the compatibility graph and runs the group search on the blocking pool, then
//! answers once over a oneshot channel. It never touches the live queues.

use crate::error::{MeetingError, Result};
use crate::friends::index::{FriendIndex, FriendSet};
use crate::matching::graph::CompatibilityGraph;
use crate::matching::matcher::GroupMatcher;
use crate::types::{AttemptId, Identity, MatchResult, QueueSnapshot};
use crate::utils;
use futures::future::try_join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// One matching attempt
#[derive(Debug, Clone)]
pub struct MatchRequest {
    pub attempt_id: AttemptId,
    pub snapshot: QueueSnapshot,
}

impl MatchRequest {
    pub fn new(snapshot: QueueSnapshot) -> Self {
        Self {
            attempt_id: utils::generate_attempt_id(),
            snapshot,
        }
    }
}

/// The worker's single answer to a request
#[derive(Debug)]
pub enum MatchResponse {
    Matched(MatchResult),
    NoMatch,
    Failed(MeetingError),
}

impl MatchResponse {
    /// Label used for logs and metrics
    pub fn outcome(&self) -> &'static str {
        match self {
            MatchResponse::Matched(_) => "matched",
            MatchResponse::NoMatch => "no_match",
            MatchResponse::Failed(_) => "failed",
        }
    }
}

struct Envelope {
    request: MatchRequest,
    reply: oneshot::Sender<MatchResponse>,
}

/// Attempt that has been handed to the worker
pub struct PendingMatch {
    attempt_id: AttemptId,
    receiver: oneshot::Receiver<MatchResponse>,
}

impl PendingMatch {
    pub fn attempt_id(&self) -> AttemptId {
        self.attempt_id
    }

    /// Wait for the worker's answer. A dropped reply is a `WorkerFailure`.
    pub async fn outcome(self) -> Result<MatchResponse> {
        self.receiver.await.map_err(|_| {
            MeetingError::WorkerFailure {
                reason: format!("attempt {} dropped without a reply", self.attempt_id),
            }
            .into()
        })
    }
}

/// Sending side of the worker
#[derive(Clone)]
pub struct MatchWorkerHandle {
    sender: mpsc::Sender<Envelope>,
}

impl MatchWorkerHandle {
    /// Wait for room in the worker's buffer.
    ///
    /// The returned slot holds that room until it is used or dropped, so a
    /// caller can reserve before taking the admission lock and never wait on
    /// a full buffer while holding it.
    pub async fn reserve(&self) -> Result<DispatchSlot<'_>> {
        let permit = self
            .sender
            .reserve()
            .await
            .map_err(|_| MeetingError::WorkerFailure {
                reason: "match worker is not running".to_string(),
            })?;
        Ok(DispatchSlot { permit })
    }

    /// Hand a request to the worker without waiting for the result
    pub async fn dispatch(&self, request: MatchRequest) -> Result<PendingMatch> {
        Ok(self.reserve().await?.send(request))
    }
}

/// Reserved room for one request in the worker's buffer
pub struct DispatchSlot<'a> {
    permit: mpsc::Permit<'a, Envelope>,
}

impl DispatchSlot<'_> {
    /// Hand the request over. Never waits.
    pub fn send(self, request: MatchRequest) -> PendingMatch {
        let attempt_id = request.attempt_id;
        let (reply, receiver) = oneshot::channel();

        self.permit.send(Envelope { request, reply });

        debug!("Dispatched matching attempt {}", attempt_id);
        PendingMatch {
            attempt_id,
            receiver,
        }
    }
}

pub struct MatchWorker;

impl MatchWorker {
    /// Start the worker loop. It stops once every handle has been dropped.
    pub fn spawn(
        friend_index: Arc<FriendIndex>,
        matcher: Arc<dyn GroupMatcher>,
        capacity: usize,
    ) -> MatchWorkerHandle {
        info!(
            "Match worker started - group size: {}, capacity: {}",
            matcher.group_size(),
            capacity
        );

        let (sender, receiver) = mpsc::channel(capacity.max(1));
        tokio::spawn(run_worker(receiver, friend_index, matcher));
        MatchWorkerHandle { sender }
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<Envelope>,
    friend_index: Arc<FriendIndex>,
    matcher: Arc<dyn GroupMatcher>,
) {
    while let Some(Envelope { request, reply }) = receiver.recv().await {
        let attempt_id = request.attempt_id;
        let attempt = tokio::spawn(run_attempt(
            request,
            friend_index.clone(),
            matcher.clone(),
        ));

        let response = match attempt.await {
            Ok(response) => response,
            Err(join_error) => {
                error!("Matching attempt {} crashed: {}", attempt_id, join_error);
                MatchResponse::Failed(MeetingError::WorkerFailure {
                    reason: format!("attempt {} crashed: {}", attempt_id, join_error),
                })
            }
        };

        debug!(
            "Matching attempt {} finished - outcome: {}",
            attempt_id,
            response.outcome()
        );
        if reply.send(response).is_err() {
            warn!("Caller for attempt {} went away before the reply", attempt_id);
        }
    }

    info!("Match worker stopped");
}

async fn run_attempt(
    request: MatchRequest,
    friend_index: Arc<FriendIndex>,
    matcher: Arc<dyn GroupMatcher>,
) -> MatchResponse {
    let MatchRequest {
        attempt_id,
        snapshot,
    } = request;

    let friends = match hydrate(&snapshot, &friend_index).await {
        Ok(friends) => friends,
        Err(error) => {
            warn!("Attempt {} aborted during friend lookup: {}", attempt_id, error);
            return MatchResponse::Failed(into_meeting_error(error));
        }
    };

    let search = tokio::task::spawn_blocking(move || {
        let graph = CompatibilityGraph::build(&snapshot, &friends);
        debug!(
            "Attempt {} graph - males: {}, females: {}, edges: {}",
            attempt_id,
            graph.males().len(),
            graph.females().len(),
            graph.edge_count()
        );
        matcher.find_group(&graph)
    })
    .await;

    match search {
        Ok(Some(result)) => MatchResponse::Matched(result),
        Ok(None) => MatchResponse::NoMatch,
        Err(join_error) => MatchResponse::Failed(MeetingError::WorkerFailure {
            reason: format!("group search for attempt {} crashed: {}", attempt_id, join_error),
        }),
    }
}

/// Resolve every participant's friend set concurrently
async fn hydrate(
    snapshot: &QueueSnapshot,
    friend_index: &FriendIndex,
) -> Result<HashMap<Identity, FriendSet>> {
    let identities: Vec<&Identity> = snapshot
        .males
        .iter()
        .chain(snapshot.females.iter())
        .map(|p| &p.identity)
        .collect();

    let sets = try_join_all(
        identities
            .iter()
            .map(|identity| friend_index.friends_of(identity)),
    )
    .await?;

    Ok(identities.into_iter().cloned().zip(sets).collect())
}

fn into_meeting_error(error: anyhow::Error) -> MeetingError {
    match error.downcast::<MeetingError>() {
        Ok(meeting_error) => meeting_error,
        Err(other) => MeetingError::InternalError {
            message: other.to_string(),
        },
    }
}
